#![forbid(unsafe_code)]

//! Incremental UTF-8 codepoint decoding over a byte window.
//!
//! The decoder is deliberately lenient: the sequence length comes from the
//! lead byte alone and continuation bytes are masked, not validated. Callers
//! that need strict UTF-8 should validate separately; this layer's job is to
//! keep a terminal input stream moving byte-exactly. Decoding never blocks
//! and never allocates.
//!
//! # Contract
//!
//! - A window that ends before the declared sequence length yields `None`
//!   ("insufficient data"), so the caller can read more bytes and retry.
//! - A lead byte that matches no UTF-8 class (a stray continuation byte or
//!   0xF8 and above) decodes as a 1-byte passthrough of its own value, so
//!   the caller always makes forward progress.

/// One decoded codepoint and the number of bytes it consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utf8Codepoint {
    /// The decoded value. Under the relaxed policy this may fall outside
    /// Unicode scalar range (e.g. a surrogate smuggled in as WTF-8).
    pub codepoint: u32,
    /// Bytes consumed from the window, 1 through 4.
    pub bytes_consumed: usize,
}

/// Sequence length declared by a lead byte's high bits, 1 through 4.
///
/// Bytes that are not a valid lead (stray continuations, 0xF8..=0xFF) are
/// classed as length 1 so they pass through rather than stalling the stream.
#[must_use]
pub fn sequence_length(lead: u8) -> usize {
    if lead & 0x80 == 0x00 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else if lead & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

/// Decode one codepoint from `buf[start..]`.
///
/// Returns `None` when the window is empty at `start` or ends before the
/// sequence length declared by the lead byte. That is the "insufficient
/// data" outcome, not an error; see the module contract.
#[must_use]
pub fn decode(buf: &[u8], start: usize) -> Option<Utf8Codepoint> {
    let lead = *buf.get(start)?;
    let len = sequence_length(lead);
    if start + len > buf.len() {
        return None;
    }
    let codepoint = match len {
        2 => (u32::from(lead & 0x1F) << 6) | continuation(buf[start + 1]),
        3 => {
            (u32::from(lead & 0x0F) << 12)
                | (continuation(buf[start + 1]) << 6)
                | continuation(buf[start + 2])
        }
        4 => {
            (u32::from(lead & 0x07) << 18)
                | (continuation(buf[start + 1]) << 12)
                | (continuation(buf[start + 2]) << 6)
                | continuation(buf[start + 3])
        }
        // Plain ASCII and the invalid-lead passthrough.
        _ => u32::from(lead),
    };
    Some(Utf8Codepoint {
        codepoint,
        bytes_consumed: len,
    })
}

fn continuation(byte: u8) -> u32 {
    u32::from(byte & 0x3F)
}
