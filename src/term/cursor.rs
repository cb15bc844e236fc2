// src/term/cursor.rs

//! Cursor state: position, pending-wrap flag, current style, and the
//! character-set slots. A saved-cursor snapshot records all of it.

use crate::glyph::Style;
use crate::term::charset::{CharSub, CS_US, G0, G1};
use crate::term::geometry::Pos;

/// The live cursor. `wrap_next` latches when a printable lands in the last
/// column: the cursor stays visually on that column (col == cols - 1 for
/// drawing purposes) but the next printable wraps first.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pub pos: Pos,
    pub wrap_next: bool,
    pub style: Style,
    /// Active slot: G0 or G1, selected by SI/SO.
    pub charset: usize,
    /// Charset designated into each slot by ESC ( X / ESC ) X.
    pub charsets: [&'static CharSub; 2],
}

impl Cursor {
    pub fn new() -> Self {
        Cursor {
            pos: Pos::origin(),
            wrap_next: false,
            style: Style::normal(),
            charset: G0,
            charsets: [&CS_US, &CS_US],
        }
    }

    /// The table currently in effect.
    pub fn active_charset(&self) -> &'static CharSub {
        self.charsets[self.charset]
    }

    pub fn use_charset(&mut self, slot: usize) {
        debug_assert!(slot == G0 || slot == G1);
        self.charset = slot;
    }

    pub fn set_charset(&mut self, slot: usize, table: &'static CharSub) {
        debug_assert!(slot == G0 || slot == G1);
        self.charsets[slot] = table;
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::new()
    }
}
