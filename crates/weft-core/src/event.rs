#![forbid(unsafe_code)]

//! Decoded terminal input events.
//!
//! One event is produced per key press decoded from the raw byte stream.
//! Events are plain values: `Copy`, comparable, and hashable so tests and
//! consumers can pattern-match on them directly.

/// A single decoded key press.
///
/// Either a named key (cursor, navigation, editing, or function keys), a
/// literal typed character, or `Unknown` carrying the byte that failed to
/// map to anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputEvent {
    /// A literal typed character (printable ASCII or a decoded multi-byte
    /// UTF-8 codepoint).
    Char(char),

    /// Cursor up.
    Up,
    /// Cursor down.
    Down,
    /// Cursor left.
    Left,
    /// Cursor right.
    Right,

    /// Home (`ESC [ H` or `ESC [ 1 ~`).
    Home,
    /// End (`ESC [ F` or `ESC [ 4 ~`).
    End,
    /// Page up.
    PageUp,
    /// Page down.
    PageDown,
    /// Insert.
    Insert,
    /// Delete (`ESC [ 3 ~`, not the DEL byte, which is [`Backspace`]).
    ///
    /// [`Backspace`]: InputEvent::Backspace
    Delete,

    /// Backspace (0x08 or 0x7F).
    Backspace,
    /// Tab (0x09).
    Tab,
    /// Enter (carriage return, 0x0D).
    Enter,

    /// Function key F1 through F12.
    F(u8),

    /// A byte (control byte or escape-sequence terminator) with no mapping.
    Unknown(u8),
}

impl InputEvent {
    /// True for events that carry a typed character.
    #[must_use]
    pub fn is_char(&self) -> bool {
        matches!(self, InputEvent::Char(_))
    }
}
