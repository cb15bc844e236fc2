// src/utf8.rs

//! Streaming UTF-8 codec.
//!
//! The decoder consumes one byte at a time and walks through
//! `Start -> Partial -> Accept | Reject`. On `Accept` the caller can read
//! both the raw byte sequence (`Seq`) and the decoded scalar value. On
//! `Reject` the machine has already reset itself; the caller decides what
//! to substitute (the terminal logs and discards, it does not print a
//! replacement character on the cell grid).

use std::fmt;

/// Maximum number of bytes in one encoded code point.
pub const LEN_MAX: usize = 4;

const SURROGATE_START: u32 = 0xD800;
const SURROGATE_END: u32 = 0xDFFF;
const CODE_POINT_MAX: u32 = 0x10_FFFF;

/// A short, inline byte sequence holding exactly one UTF-8 encoded code
/// point (1..=4 bytes). This is the unit stored per cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seq {
    bytes: [u8; LEN_MAX],
    len: u8,
}

impl Seq {
    /// A single ASCII byte.
    #[inline]
    pub const fn ascii(byte: u8) -> Self {
        Seq {
            bytes: [byte, 0, 0, 0],
            len: 1,
        }
    }

    /// The blank cell content (U+0020).
    #[inline]
    pub const fn space() -> Self {
        Seq::ascii(b' ')
    }

    /// Encodes `ch` into a fresh sequence.
    pub fn from_char(ch: char) -> Self {
        let mut bytes = [0u8; LEN_MAX];
        let len = ch.encode_utf8(&mut bytes).len() as u8;
        Seq { bytes, len }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The lead byte.
    #[inline]
    pub fn lead(&self) -> u8 {
        self.bytes[0]
    }

    /// Decodes back to a scalar value. Sequences are only ever built from
    /// accepted decoder output or `from_char`, so this cannot fail.
    pub fn to_char(&self) -> char {
        std::str::from_utf8(self.as_bytes())
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or('\u{FFFD}')
    }
}

impl Default for Seq {
    fn default() -> Self {
        Seq::space()
    }
}

impl fmt::Debug for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({:?})", self.to_char())
    }
}

/// Decoder state after consuming a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing buffered.
    Start,
    /// Mid-sequence, more bytes required.
    Partial,
    /// A complete code point is available via `seq()` / `code_point()`.
    Accept,
    /// The sequence was invalid. The machine has reset.
    Reject,
}

/// Incremental UTF-8 decoder.
///
/// Overlong encodings, surrogates, and out-of-range code points all land
/// in `Reject`.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    bytes: [u8; LEN_MAX],
    len: usize,
    expected: usize,
    code_point: u32,
}

impl Machine {
    pub fn new() -> Self {
        Machine::default()
    }

    #[inline]
    pub fn reset(&mut self) {
        self.len = 0;
        self.expected = 0;
        self.code_point = 0;
    }

    /// True while a multi-byte sequence is in progress.
    #[inline]
    pub fn in_progress(&self) -> bool {
        self.len != 0
    }

    /// The accepted sequence. Only meaningful directly after `consume`
    /// returned `State::Accept`.
    pub fn seq(&self) -> Seq {
        // Copy only the live bytes so equal sequences compare and hash
        // equal regardless of what a longer, earlier sequence left behind.
        let mut bytes = [0u8; LEN_MAX];
        bytes[..self.len].copy_from_slice(&self.bytes[..self.len]);
        Seq {
            bytes,
            len: self.len as u8,
        }
    }

    /// The accepted scalar value. Only meaningful after `State::Accept`.
    pub fn code_point(&self) -> u32 {
        self.code_point
    }

    /// Feeds one byte through the machine.
    pub fn consume(&mut self, byte: u8) -> State {
        if self.len == 0 {
            self.start_byte(byte)
        } else {
            self.continuation_byte(byte)
        }
    }

    fn start_byte(&mut self, byte: u8) -> State {
        match byte {
            0x00..=0x7F => {
                self.bytes[0] = byte;
                self.len = 1;
                self.code_point = u32::from(byte);
                State::Accept
            }
            // 0xC0/0xC1 would be overlong two-byte encodings.
            0xC2..=0xDF => self.begin(byte, 2),
            0xE0..=0xEF => self.begin(byte, 3),
            // 0xF5.. encodes beyond U+10FFFF.
            0xF0..=0xF4 => self.begin(byte, 4),
            _ => {
                self.reset();
                State::Reject
            }
        }
    }

    fn begin(&mut self, byte: u8, expected: usize) -> State {
        self.bytes[0] = byte;
        self.len = 1;
        self.expected = expected;
        let mask = match expected {
            2 => 0x1F,
            3 => 0x0F,
            _ => 0x07,
        };
        self.code_point = u32::from(byte & mask);
        State::Partial
    }

    fn continuation_byte(&mut self, byte: u8) -> State {
        if byte & 0xC0 != 0x80 {
            self.reset();
            return State::Reject;
        }

        self.bytes[self.len] = byte;
        self.len += 1;
        self.code_point = (self.code_point << 6) | u32::from(byte & 0x3F);

        if self.len < self.expected {
            return State::Partial;
        }

        let cp = self.code_point;
        let overlong = match self.expected {
            2 => cp < 0x80,
            3 => cp < 0x800,
            _ => cp < 0x1_0000,
        };

        if overlong || cp > CODE_POINT_MAX || (SURROGATE_START..=SURROGATE_END).contains(&cp) {
            self.reset();
            State::Reject
        } else {
            State::Accept
        }
    }
}

/// Encodes a scalar value; the inverse of the decoder.
pub fn encode(code_point: u32) -> Option<Seq> {
    char::from_u32(code_point).map(Seq::from_char)
}

/// Total sequence length implied by a lead byte, if valid.
pub fn lead_length(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}
