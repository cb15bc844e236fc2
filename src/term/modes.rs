// src/term/modes.rs

//! The terminal mode bitset toggled by SM/RM, DECSET/DECRST, and a few
//! ESC sequences.

use bitflags::bitflags;

bitflags! {
    /// Every boolean mode the interpreter tracks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TermMode: u32 {
        /// DECAWM: wrap to the next line at the last column.
        const AUTO_WRAP           = 1 << 0;
        /// DECTCEM: the text cursor is drawn.
        const SHOW_CURSOR         = 1 << 1;
        /// DECARM: keys auto-repeat (tracked, acted on by the host).
        const AUTO_REPEAT         = 1 << 2;
        /// Alt-modified keys send an ESC prefix.
        const ALT_SENDS_ESC       = 1 << 3;
        /// DECCKM: cursor keys send SS3 sequences.
        const APPCURSOR           = 1 << 4;
        /// DECKPAM: keypad sends application sequences.
        const APPKEYPAD           = 1 << 5;
        /// DECSCNM: the whole screen renders reverse-video.
        const REVERSE             = 1 << 6;
        /// DECOM: cursor addressing is relative to the scroll margins.
        const ORIGIN              = 1 << 7;
        /// IRM: printed characters shift the remainder of the line right.
        const INSERT              = 1 << 8;
        /// SRM sense-inverted: locally echo transmitted bytes.
        const ECHO                = 1 << 9;
        /// LNM: LF implies CR.
        const CR_ON_LF            = 1 << 10;
        /// KAM: keyboard action (lock) mode.
        const KBDLOCK             = 1 << 11;
        /// Paste is wrapped in CSI 200~ / CSI 201~ guards.
        const BRACKETED_PASTE     = 1 << 12;
        /// Focus in/out is reported as CSI I / CSI O.
        const FOCUS               = 1 << 13;
        /// Alt sets bit 7 of single-byte input instead of ESC-prefixing.
        const META_8BIT           = 1 << 14;
        /// The Delete key sends DEL rather than CSI 3~.
        const DELETE_SENDS_DEL    = 1 << 15;
        /// Mouse button presses and releases are reported.
        const MOUSE_PRESS_RELEASE = 1 << 16;
        /// Motion with a button held is reported.
        const MOUSE_DRAG          = 1 << 17;
        /// All motion is reported.
        const MOUSE_MOTION        = 1 << 18;
        /// Selection still works alongside mouse reporting (mode 1001).
        const MOUSE_SELECT        = 1 << 19;
        /// Mouse reports use the SGR (1006) encoding.
        const MOUSE_FORMAT_SGR    = 1 << 20;
    }
}

impl TermMode {
    /// Modes set on a freshly reset terminal.
    pub fn initial() -> Self {
        TermMode::AUTO_WRAP | TermMode::SHOW_CURSOR | TermMode::AUTO_REPEAT | TermMode::ALT_SENDS_ESC
    }

    #[inline]
    pub fn get(&self, mode: TermMode) -> bool {
        self.contains(mode)
    }

    #[inline]
    pub fn set_to(&mut self, mode: TermMode, on: bool) {
        self.set(mode, on);
    }
}
