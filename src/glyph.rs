// src/glyph.rs

//! Cell and style primitives for the terminal grid.

use bitflags::bitflags;

use crate::color::Color;
use crate::utf8::Seq;

bitflags! {
    /// Text attributes applied per cell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttrFlags: u8 {
        const BOLD      = 1 << 0;
        const FAINT     = 1 << 1;
        const ITALIC    = 1 << 2;
        const UNDERLINE = 1 << 3;
        const BLINK     = 1 << 4;
        const INVERSE   = 1 << 5;
        const CONCEAL   = 1 << 6;
    }
}

/// Foreground, background and attribute set for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub attrs: AttrFlags,
}

impl Style {
    pub const fn normal() -> Self {
        Style {
            fg: Color::text_fg(),
            bg: Color::text_bg(),
            attrs: AttrFlags::empty(),
        }
    }
}

impl Default for Style {
    fn default() -> Self {
        Style::normal()
    }
}

/// One character cell: a UTF-8 grapheme sequence plus its style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub seq: Seq,
    pub style: Style,
}

impl Cell {
    /// The blank cell: U+0020 with the default style.
    pub fn blank() -> Self {
        Cell {
            seq: Seq::space(),
            style: Style::normal(),
        }
    }

    pub fn new(seq: Seq, style: Style) -> Self {
        Cell { seq, style }
    }

    /// An ASCII cell with the given style.
    pub fn ascii(byte: u8, style: Style) -> Self {
        Cell {
            seq: Seq::ascii(byte),
            style,
        }
    }

    /// True when the cell holds only a space (its style may still differ
    /// from the default).
    pub fn is_blank(&self) -> bool {
        self.seq.as_bytes() == b" "
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::blank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_cell_is_space_with_normal_style() {
        let cell = Cell::blank();
        assert_eq!(cell.seq.to_char(), ' ');
        assert_eq!(cell.style, Style::normal());
        assert!(cell.is_blank());
    }

    #[test]
    fn styled_space_is_still_blank_text() {
        let mut style = Style::normal();
        style.attrs |= AttrFlags::INVERSE;
        let cell = Cell::ascii(b' ', style);
        assert!(cell.is_blank());
        assert_ne!(cell, Cell::blank());
    }

    #[test]
    fn attr_flags_compose() {
        let mut attrs = AttrFlags::empty();
        attrs |= AttrFlags::BOLD | AttrFlags::UNDERLINE;
        assert!(attrs.contains(AttrFlags::BOLD));
        attrs &= !AttrFlags::BOLD;
        assert!(!attrs.contains(AttrFlags::BOLD));
        assert!(attrs.contains(AttrFlags::UNDERLINE));
    }
}
