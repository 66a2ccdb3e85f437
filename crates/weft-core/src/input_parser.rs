#![forbid(unsafe_code)]

//! Pull-based key event decoding.
//!
//! Decodes a raw terminal byte stream into [`crate::event::InputEvent`]
//! values by pulling exactly the bytes each event needs from a blocking
//! reader.
//!
//! # Design
//!
//! Unlike a push parser, [`EventReader`] holds no state between events: a
//! partially received escape sequence is completed by blocking on the next
//! byte, not by buffering across calls. Correctness therefore relies on the
//! underlying reader being able to block until the rest of a sequence
//! arrives. Sequences handled:
//!
//! - ASCII characters and control codes
//! - UTF-8 multi-byte sequences (relaxed validation, see [`crate::utf8`])
//! - CSI / SS3 key sequences (`ESC [` and `ESC O` introducers)
//!
//! The key table is a compatibility surface: cursor keys by final byte,
//! `F`/`H` finals for End/Home, SS3-style `P`..`S` for F1 to F4, single
//! tilde-terminated digits for the navigation block, and the two-digit
//! parameters `15`..`24` for F5 to F12, whose trailing byte is consumed and
//! discarded without validation. Anything else becomes
//! [`InputEvent::Unknown`].
//!
//! A read that reports end-of-stream (zero bytes) ends decoding: mid
//! sequence, the partial bytes are dropped and `next_event` returns
//! `Ok(None)`.

use std::io::{self, Read};

use crate::event::InputEvent;
use crate::utf8;

/// Decodes key events from a blocking byte reader.
///
/// ```ignore
/// let mut events = EventReader::new(&b"\x1b[A"[..]);
/// assert_eq!(events.next_event()?, Some(InputEvent::Up));
/// ```
#[derive(Debug)]
pub struct EventReader<R> {
    src: R,
}

impl<R: Read> EventReader<R> {
    pub fn new(src: R) -> Self {
        Self { src }
    }

    /// Consume the reader and return the underlying byte source.
    pub fn into_inner(self) -> R {
        self.src
    }

    /// Decode the next key event, blocking on the source as needed.
    ///
    /// Returns `Ok(None)` once the source reports end-of-stream, including
    /// in the middle of an escape or UTF-8 sequence.
    pub fn next_event(&mut self) -> io::Result<Option<InputEvent>> {
        let Some(byte) = self.next_byte()? else {
            return Ok(None);
        };
        match byte {
            0x1B => self.escape_sequence(),
            0x08 | 0x7F => Ok(Some(InputEvent::Backspace)),
            0x09 => Ok(Some(InputEvent::Tab)),
            0x0D => Ok(Some(InputEvent::Enter)),
            // Remaining C0 controls and the C1 range are ISO controls with
            // no key mapping.
            0x00..=0x1F | 0x80..=0x9F => Ok(Some(InputEvent::Unknown(byte))),
            _ => self.codepoint(byte),
        }
    }

    /// Pull one byte. `Ok(None)` is end-of-stream.
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.src.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Decode a (possibly multi-byte) codepoint whose lead byte was just
    /// read.
    fn codepoint(&mut self, lead: u8) -> io::Result<Option<InputEvent>> {
        let len = utf8::sequence_length(lead);
        let mut seq = [lead, 0, 0, 0];
        for slot in seq.iter_mut().take(len).skip(1) {
            let Some(byte) = self.next_byte()? else {
                return Ok(None);
            };
            *slot = byte;
        }
        let event = match utf8::decode(&seq[..len], 0) {
            // The relaxed decoder can produce values outside Unicode scalar
            // range; those have no `char` and map to Unknown.
            Some(cp) => match char::from_u32(cp.codepoint) {
                Some(c) => InputEvent::Char(c),
                None => InputEvent::Unknown(lead),
            },
            None => InputEvent::Unknown(lead),
        };
        Ok(Some(event))
    }

    /// Decode the remainder of a sequence whose ESC was just read.
    fn escape_sequence(&mut self) -> io::Result<Option<InputEvent>> {
        let Some(introducer) = self.next_byte()? else {
            return Ok(None);
        };
        if introducer != b'[' && introducer != b'O' {
            return Ok(Some(InputEvent::Unknown(introducer)));
        }
        let Some(byte) = self.next_byte()? else {
            return Ok(None);
        };
        let event = match byte {
            b'A' => InputEvent::Up,
            b'B' => InputEvent::Down,
            b'C' => InputEvent::Right,
            b'D' => InputEvent::Left,
            b'F' => InputEvent::End,
            b'H' => InputEvent::Home,
            b'P' => InputEvent::F(1),
            b'Q' => InputEvent::F(2),
            b'R' => InputEvent::F(3),
            b'S' => InputEvent::F(4),
            digit @ b'1'..=b'6' => return self.csi_parameter(digit),
            other => InputEvent::Unknown(other),
        };
        Ok(Some(event))
    }

    /// Decode a parameterized sequence after `ESC [ <digit>`.
    fn csi_parameter(&mut self, digit: u8) -> io::Result<Option<InputEvent>> {
        let Some(byte) = self.next_byte()? else {
            return Ok(None);
        };
        let event = match (digit, byte) {
            (b'1', b'~') => InputEvent::Home,
            (b'2', b'~') => InputEvent::Insert,
            (b'3', b'~') => InputEvent::Delete,
            (b'4', b'~') => InputEvent::End,
            (b'5', b'~') => InputEvent::PageUp,
            (b'6', b'~') => InputEvent::PageDown,
            (b'1', b'5') => return self.function_key(5),
            (b'1', b'7') => return self.function_key(6),
            (b'1', b'8') => return self.function_key(7),
            (b'1', b'9') => return self.function_key(8),
            (b'2', b'0') => return self.function_key(9),
            (b'2', b'1') => return self.function_key(10),
            (b'2', b'3') => return self.function_key(11),
            (b'2', b'4') => return self.function_key(12),
            (_, other) => InputEvent::Unknown(other),
        };
        Ok(Some(event))
    }

    /// Finish a two-digit function key: the trailing byte (`~` from real
    /// terminals) is consumed and discarded without validation.
    fn function_key(&mut self, n: u8) -> io::Result<Option<InputEvent>> {
        match self.next_byte()? {
            Some(_) => Ok(Some(InputEvent::F(n))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<InputEvent> {
        let mut events = EventReader::new(bytes);
        std::iter::from_fn(|| events.next_event().unwrap()).collect()
    }

    #[test]
    fn plain_ascii_chars() {
        assert_eq!(
            decode_all(b"hi!"),
            vec![
                InputEvent::Char('h'),
                InputEvent::Char('i'),
                InputEvent::Char('!'),
            ]
        );
    }

    #[test]
    fn multibyte_utf8_chars() {
        assert_eq!(
            decode_all("é中🎉".as_bytes()),
            vec![
                InputEvent::Char('é'),
                InputEvent::Char('中'),
                InputEvent::Char('🎉'),
            ]
        );
    }

    #[test]
    fn control_byte_keys() {
        assert_eq!(decode_all(&[0x08]), vec![InputEvent::Backspace]);
        assert_eq!(decode_all(&[0x7F]), vec![InputEvent::Backspace]);
        assert_eq!(decode_all(&[0x09]), vec![InputEvent::Tab]);
        assert_eq!(decode_all(&[0x0D]), vec![InputEvent::Enter]);
    }

    #[test]
    fn unmapped_controls_are_unknown() {
        assert_eq!(decode_all(&[0x0A]), vec![InputEvent::Unknown(0x0A)]);
        assert_eq!(decode_all(&[0x00]), vec![InputEvent::Unknown(0x00)]);
        assert_eq!(decode_all(&[0x9B]), vec![InputEvent::Unknown(0x9B)]);
    }

    #[test]
    fn cursor_and_navigation_finals() {
        let table: [(&[u8], InputEvent); 10] = [
            (b"\x1b[A", InputEvent::Up),
            (b"\x1b[B", InputEvent::Down),
            (b"\x1b[C", InputEvent::Right),
            (b"\x1b[D", InputEvent::Left),
            (b"\x1b[F", InputEvent::End),
            (b"\x1b[H", InputEvent::Home),
            (b"\x1b[P", InputEvent::F(1)),
            (b"\x1b[Q", InputEvent::F(2)),
            (b"\x1b[R", InputEvent::F(3)),
            (b"\x1b[S", InputEvent::F(4)),
        ];
        for (bytes, expected) in table {
            assert_eq!(decode_all(bytes), vec![expected], "sequence {bytes:?}");
        }
    }

    #[test]
    fn ss3_introducer_uses_the_same_table() {
        let table: [(&[u8], InputEvent); 6] = [
            (b"\x1bOA", InputEvent::Up),
            (b"\x1bOD", InputEvent::Left),
            (b"\x1bOH", InputEvent::Home),
            (b"\x1bOF", InputEvent::End),
            (b"\x1bOP", InputEvent::F(1)),
            (b"\x1bOS", InputEvent::F(4)),
        ];
        for (bytes, expected) in table {
            assert_eq!(decode_all(bytes), vec![expected], "sequence {bytes:?}");
        }
    }

    #[test]
    fn tilde_terminated_navigation_block() {
        let table: [(&[u8], InputEvent); 6] = [
            (b"\x1b[1~", InputEvent::Home),
            (b"\x1b[2~", InputEvent::Insert),
            (b"\x1b[3~", InputEvent::Delete),
            (b"\x1b[4~", InputEvent::End),
            (b"\x1b[5~", InputEvent::PageUp),
            (b"\x1b[6~", InputEvent::PageDown),
        ];
        for (bytes, expected) in table {
            assert_eq!(decode_all(bytes), vec![expected], "sequence {bytes:?}");
        }
    }

    #[test]
    fn two_digit_function_keys() {
        let table: [(&[u8], u8); 8] = [
            (b"\x1b[15~", 5),
            (b"\x1b[17~", 6),
            (b"\x1b[18~", 7),
            (b"\x1b[19~", 8),
            (b"\x1b[20~", 9),
            (b"\x1b[21~", 10),
            (b"\x1b[23~", 11),
            (b"\x1b[24~", 12),
        ];
        for (bytes, n) in table {
            assert_eq!(decode_all(bytes), vec![InputEvent::F(n)], "sequence {bytes:?}");
        }
    }

    #[test]
    fn function_key_trailing_byte_is_discarded_unvalidated() {
        // The byte after a recognized two-digit parameter is consumed even
        // when it is not `~`.
        assert_eq!(decode_all(b"\x1b[15x"), vec![InputEvent::F(5)]);
        assert_eq!(
            decode_all(b"\x1b[24~q"),
            vec![InputEvent::F(12), InputEvent::Char('q')]
        );
    }

    #[test]
    fn unrecognized_sequences_are_unknown() {
        // Non-introducer after ESC.
        assert_eq!(decode_all(b"\x1bx"), vec![InputEvent::Unknown(b'x')]);
        // Unknown final byte.
        assert_eq!(decode_all(b"\x1b[Z"), vec![InputEvent::Unknown(b'Z')]);
        // Digit pairs outside the table.
        assert_eq!(decode_all(b"\x1b[16"), vec![InputEvent::Unknown(b'6')]);
        assert_eq!(decode_all(b"\x1b[25"), vec![InputEvent::Unknown(b'5')]);
        assert_eq!(decode_all(b"\x1b[3x"), vec![InputEvent::Unknown(b'x')]);
    }

    #[test]
    fn end_of_stream_mid_sequence_ends_decoding() {
        assert_eq!(decode_all(b"\x1b"), vec![]);
        assert_eq!(decode_all(b"\x1b["), vec![]);
        assert_eq!(decode_all(b"\x1b[1"), vec![]);
        assert_eq!(decode_all(b"\x1b[15"), vec![]);
        // Truncated UTF-8 sequence.
        assert_eq!(decode_all(&[0xE4, 0xB8]), vec![]);
    }

    #[test]
    fn mixed_stream_decodes_in_order() {
        assert_eq!(
            decode_all(b"a\x1b[A\x09\x1b[15~z"),
            vec![
                InputEvent::Char('a'),
                InputEvent::Up,
                InputEvent::Tab,
                InputEvent::F(5),
                InputEvent::Char('z'),
            ]
        );
    }

    #[test]
    fn out_of_range_codepoint_maps_to_unknown() {
        // 0xED 0xA0 0x80 decodes to U+D800 under the relaxed policy, which
        // is a surrogate and not a `char`.
        assert_eq!(decode_all(&[0xED, 0xA0, 0x80]), vec![InputEvent::Unknown(0xED)]);
    }
}
