// src/color.rs

//! Colour values carried by cell styles.

use serde::{Deserialize, Serialize};

/// Stock colours resolved by the renderer's palette rather than the 256
/// colour cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockColor {
    TextFg,
    TextBg,
    SelectFg,
    SelectBg,
    CursorFill,
    CursorText,
}

/// A colour as tracked by the terminal: a stock palette entry, an indexed
/// (0-255) palette entry, or a direct 24-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Stock(StockColor),
    Indexed(u8),
    Direct(u8, u8, u8),
}

impl Color {
    /// Default foreground.
    pub const fn text_fg() -> Self {
        Color::Stock(StockColor::TextFg)
    }

    /// Default background.
    pub const fn text_bg() -> Self {
        Color::Stock(StockColor::TextBg)
    }
}
