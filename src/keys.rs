// src/keys.rs

//! Key symbols, modifier masks, and the actions key bindings can invoke.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Keyboard modifier state delivered with every input event.
    /// Serde support comes from the bitflags `serde` feature.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Modifiers: u8 {
        const SHIFT   = 1 << 0;
        const CONTROL = 1 << 1;
        const ALT     = 1 << 2;
        const SUPER   = 1 << 3;
        const NUM_LOCK = 1 << 4;
    }
}

/// Window-system independent key identity. The windowing layer translates
/// its native keysyms into these before calling into the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySymbol {
    Char(char),
    Return,
    Backspace,
    Tab,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
    KeypadEnter,
    Keypad0,
    Keypad1,
    Keypad2,
    Keypad3,
    Keypad4,
    Keypad5,
    Keypad6,
    Keypad7,
    Keypad8,
    Keypad9,
    KeypadAdd,
    KeypadSubtract,
    KeypadMultiply,
    KeypadDivide,
    KeypadDecimal,
    KeypadUp,
    KeypadDown,
    KeypadLeft,
    KeypadRight,
    KeypadHome,
    KeypadEnd,
    KeypadPageUp,
    KeypadPageDown,
    KeypadInsert,
    KeypadDelete,
    KeypadBegin,
}

impl KeySymbol {
    /// Whether the key on its own can produce input bytes. Pure modifier
    /// keys are filtered out by the windowing layer, but this also guards
    /// against symbols with no mapping at all.
    pub fn is_potent(&self) -> bool {
        !matches!(self, KeySymbol::F(0))
    }
}

/// Actions addressable by key bindings. Everything that is not plain
/// input-to-the-child goes through here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    LocalFontReset,
    LocalFontBigger,
    LocalFontSmaller,
    GlobalFontReset,
    GlobalFontBigger,
    GlobalFontSmaller,
    CopyToClipboard,
    PasteFromClipboard,
    ScrollUpOneLine,
    ScrollDownOneLine,
    ScrollUpOnePage,
    ScrollDownOnePage,
    ScrollTop,
    ScrollBottom,
    ClearHistory,
    DebugGlobalTags,
    DebugLocalTags,
    DebugHistory,
    DebugActive,
    DebugModes,
    DebugSelection,
    DebugStats,
    DebugStats2,
}
