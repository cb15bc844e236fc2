// src/term/input.rs

//! Key-input encoding: (keysym, modifiers, mode flags) -> bytes for the
//! child.
//!
//! A static ordered table is scanned first; the first matching entry
//! wins. Entries constrain the modifier state and carry tri-state
//! conditions on keypad-application mode, cursor-application mode, and
//! CR-on-LF mode. Keys the table does not cover fall back to character
//! composition (control chars, plain text).

use crate::keys::{KeySymbol, Modifiers};
use crate::utf8::Seq;

/// Modifier requirement of a table entry.
#[derive(Debug, Clone, Copy)]
enum MaskCond {
    /// No modifiers may be held.
    None,
    /// Anything goes.
    Any,
    /// All listed modifiers must be held.
    Mods(Modifiers),
}

impl MaskCond {
    fn matches(&self, mods: Modifiers) -> bool {
        // NumLock never disqualifies an entry on its own.
        let mods = mods & !Modifiers::NUM_LOCK;
        match self {
            MaskCond::None => mods.is_empty(),
            MaskCond::Any => true,
            MaskCond::Mods(required) => mods.contains(*required),
        }
    }
}

/// Tri-state mode requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tri {
    Ignore,
    On,
    Off,
}

impl Tri {
    fn matches(&self, value: bool) -> bool {
        match self {
            Tri::Ignore => true,
            Tri::On => value,
            Tri::Off => !value,
        }
    }
}

/// Keypad-application requirement; `OnUnlessNumLock` is the keypad-digit
/// rule: application sequences apply only while NumLock is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeypadCond {
    Ignore,
    On,
    Off,
    OnUnlessNumLock,
}

impl KeypadCond {
    fn matches(&self, app_keypad: bool, num_lock: bool) -> bool {
        match self {
            KeypadCond::Ignore => true,
            KeypadCond::On => app_keypad,
            KeypadCond::Off => !app_keypad,
            KeypadCond::OnUnlessNumLock => app_keypad && !num_lock,
        }
    }
}

struct KeyEntry {
    sym: KeySymbol,
    mask: MaskCond,
    bytes: &'static [u8],
    app_keypad: KeypadCond,
    app_cursor: Tri,
    crlf: Tri,
}

/// Mode bits the encoder consults.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeFlags {
    pub app_keypad: bool,
    pub app_cursor: bool,
    pub crlf: bool,
    pub delete_sends_del: bool,
    pub alt_sends_esc: bool,
    pub meta_8bit: bool,
    pub num_lock: bool,
}

macro_rules! key {
    ($sym:expr, $mask:expr, $bytes:expr) => {
        key!($sym, $mask, $bytes, KeypadCond::Ignore, Tri::Ignore, Tri::Ignore)
    };
    ($sym:expr, $mask:expr, $bytes:expr, $kp:expr) => {
        key!($sym, $mask, $bytes, $kp, Tri::Ignore, Tri::Ignore)
    };
    ($sym:expr, $mask:expr, $bytes:expr, $kp:expr, $cur:expr) => {
        key!($sym, $mask, $bytes, $kp, $cur, Tri::Ignore)
    };
    ($sym:expr, $mask:expr, $bytes:expr, $kp:expr, $cur:expr, $crlf:expr) => {
        KeyEntry {
            sym: $sym,
            mask: $mask,
            bytes: $bytes,
            app_keypad: $kp,
            app_cursor: $cur,
            crlf: $crlf,
        }
    };
}

use self::KeypadCond as KC;
use self::MaskCond as M;
use crate::keys::KeySymbol::*;

const SHIFT: MaskCond = M::Mods(Modifiers::SHIFT);
const CTRL: MaskCond = M::Mods(Modifiers::CONTROL);
const ALT: MaskCond = M::Mods(Modifiers::ALT);

#[rustfmt::skip]
static KEY_TABLE: &[KeyEntry] = &[
    key!(KeypadHome,     SHIFT,  b"\x1b[1;2H"),
    key!(KeypadHome,     M::Any, b"\x1b[H",   KC::Ignore, Tri::Off),
    key!(KeypadHome,     M::Any, b"\x1b[1~",  KC::Ignore, Tri::On),
    key!(KeypadUp,       M::Any, b"\x1bOx",   KC::On),
    key!(KeypadUp,       M::Any, b"\x1b[A",   KC::Ignore, Tri::Off),
    key!(KeypadUp,       M::Any, b"\x1bOA",   KC::Ignore, Tri::On),
    key!(KeypadDown,     M::Any, b"\x1bOr",   KC::On),
    key!(KeypadDown,     M::Any, b"\x1b[B",   KC::Ignore, Tri::Off),
    key!(KeypadDown,     M::Any, b"\x1bOB",   KC::Ignore, Tri::On),
    key!(KeypadLeft,     M::Any, b"\x1bOt",   KC::On),
    key!(KeypadLeft,     M::Any, b"\x1b[D",   KC::Ignore, Tri::Off),
    key!(KeypadLeft,     M::Any, b"\x1bOD",   KC::Ignore, Tri::On),
    key!(KeypadRight,    M::Any, b"\x1bOv",   KC::On),
    key!(KeypadRight,    M::Any, b"\x1b[C",   KC::Ignore, Tri::Off),
    key!(KeypadRight,    M::Any, b"\x1bOC",   KC::Ignore, Tri::On),
    key!(KeypadPageUp,   SHIFT,  b"\x1b[5;2~"),
    key!(KeypadPageUp,   M::Any, b"\x1b[5~"),
    key!(KeypadBegin,    M::Any, b"\x1b[E"),
    key!(KeypadEnd,      CTRL,   b"\x1b[J",    KC::Off),
    key!(KeypadEnd,      CTRL,   b"\x1b[1;5F", KC::On),
    key!(KeypadEnd,      SHIFT,  b"\x1b[K",    KC::Off),
    key!(KeypadEnd,      SHIFT,  b"\x1b[1;2F", KC::On),
    key!(KeypadEnd,      M::Any, b"\x1b[4~"),
    key!(KeypadPageDown, SHIFT,  b"\x1b[6;2~"),
    key!(KeypadPageDown, M::Any, b"\x1b[6~"),
    key!(KeypadInsert,   SHIFT,  b"\x1b[2;2~", KC::On),
    key!(KeypadInsert,   SHIFT,  b"\x1b[4l",   KC::Off),
    key!(KeypadInsert,   CTRL,   b"\x1b[L",    KC::Off),
    key!(KeypadInsert,   CTRL,   b"\x1b[2;5~", KC::On),
    key!(KeypadInsert,   M::Any, b"\x1b[4h",   KC::Off),
    key!(KeypadInsert,   M::Any, b"\x1b[2~",   KC::On),
    key!(KeypadDelete,   CTRL,   b"\x1b[2J",   KC::Off),
    key!(KeypadDelete,   CTRL,   b"\x1b[3;5~", KC::On),
    key!(KeypadDelete,   SHIFT,  b"\x1b[2K",   KC::On),
    key!(KeypadDelete,   SHIFT,  b"\x1b[3;2~", KC::Off),
    key!(KeypadDelete,   M::Any, b"\x1b[P",    KC::Off),
    key!(KeypadDelete,   M::Any, b"\x1b[3~",   KC::On),
    key!(KeypadMultiply, M::Any, b"\x1bOj",    KC::OnUnlessNumLock),
    key!(KeypadAdd,      M::Any, b"\x1bOk",    KC::OnUnlessNumLock),
    key!(KeypadEnter,    M::Any, b"\x1bOM",    KC::OnUnlessNumLock),
    key!(KeypadEnter,    M::Any, b"\r",        KC::Off, Tri::Ignore, Tri::Off),
    key!(KeypadEnter,    M::Any, b"\r\n",      KC::Off, Tri::Ignore, Tri::On),
    key!(KeypadSubtract, M::Any, b"\x1bOm",    KC::OnUnlessNumLock),
    key!(KeypadDecimal,  M::Any, b"\x1bOn",    KC::OnUnlessNumLock),
    key!(KeypadDivide,   M::Any, b"\x1bOo",    KC::OnUnlessNumLock),
    key!(Keypad0,        M::Any, b"\x1bOp",    KC::OnUnlessNumLock),
    key!(Keypad1,        M::Any, b"\x1bOq",    KC::OnUnlessNumLock),
    key!(Keypad2,        M::Any, b"\x1bOr",    KC::OnUnlessNumLock),
    key!(Keypad3,        M::Any, b"\x1bOs",    KC::OnUnlessNumLock),
    key!(Keypad4,        M::Any, b"\x1bOt",    KC::OnUnlessNumLock),
    key!(Keypad5,        M::Any, b"\x1bOu",    KC::OnUnlessNumLock),
    key!(Keypad6,        M::Any, b"\x1bOv",    KC::OnUnlessNumLock),
    key!(Keypad7,        M::Any, b"\x1bOw",    KC::OnUnlessNumLock),
    key!(Keypad8,        M::Any, b"\x1bOx",    KC::OnUnlessNumLock),
    key!(Keypad9,        M::Any, b"\x1bOy",    KC::OnUnlessNumLock),
    key!(Backspace,      M::None, b"\x7f"),
    key!(Up,             SHIFT,  b"\x1b[1;2A"),
    key!(Up,             CTRL,   b"\x1b[1;5A"),
    key!(Up,             ALT,    b"\x1b[1;3A"),
    key!(Up,             M::Any, b"\x1b[A",   KC::Ignore, Tri::Off),
    key!(Up,             M::Any, b"\x1bOA",   KC::Ignore, Tri::On),
    key!(Down,           SHIFT,  b"\x1b[1;2B"),
    key!(Down,           CTRL,   b"\x1b[1;5B"),
    key!(Down,           ALT,    b"\x1b[1;3B"),
    key!(Down,           M::Any, b"\x1b[B",   KC::Ignore, Tri::Off),
    key!(Down,           M::Any, b"\x1bOB",   KC::Ignore, Tri::On),
    key!(Left,           SHIFT,  b"\x1b[1;2D"),
    key!(Left,           CTRL,   b"\x1b[1;5D"),
    key!(Left,           ALT,    b"\x1b[1;3D"),
    key!(Left,           M::Any, b"\x1b[D",   KC::Ignore, Tri::Off),
    key!(Left,           M::Any, b"\x1bOD",   KC::Ignore, Tri::On),
    key!(Right,          SHIFT,  b"\x1b[1;2C"),
    key!(Right,          CTRL,   b"\x1b[1;5C"),
    key!(Right,          ALT,    b"\x1b[1;3C"),
    key!(Right,          M::Any, b"\x1b[C",   KC::Ignore, Tri::Off),
    key!(Right,          M::Any, b"\x1bOC",   KC::Ignore, Tri::On),
    key!(Tab,            SHIFT,  b"\x1b[Z"),
    key!(Return,         ALT,    b"\x1b\r",   KC::Ignore, Tri::Ignore, Tri::Off),
    key!(Return,         ALT,    b"\x1b\r\n", KC::Ignore, Tri::Ignore, Tri::On),
    key!(Return,         M::Any, b"\r",       KC::Ignore, Tri::Ignore, Tri::Off),
    key!(Return,         M::Any, b"\r\n",     KC::Ignore, Tri::Ignore, Tri::On),
    key!(Insert,         SHIFT,  b"\x1b[4l",  KC::Off),
    key!(Insert,         SHIFT,  b"\x1b[2;2~", KC::On),
    key!(Insert,         CTRL,   b"\x1b[L",    KC::Off),
    key!(Insert,         CTRL,   b"\x1b[2;5~", KC::On),
    key!(Insert,         M::Any, b"\x1b[4h",   KC::Off),
    key!(Insert,         M::Any, b"\x1b[2~",   KC::On),
    key!(Delete,         CTRL,   b"\x1b[2J",   KC::Off),
    key!(Delete,         CTRL,   b"\x1b[3;5~", KC::On),
    key!(Delete,         SHIFT,  b"\x1b[2K",   KC::On),
    key!(Delete,         SHIFT,  b"\x1b[3;2~", KC::Off),
    key!(Delete,         M::Any, b"\x1b[P",    KC::Off),
    key!(Delete,         M::Any, b"\x1b[3~",   KC::On),
    key!(Home,           SHIFT,  b"\x1b[1;2H"),
    key!(Home,           M::Any, b"\x1b[H",   KC::Ignore, Tri::Off),
    key!(Home,           M::Any, b"\x1b[1~",  KC::Ignore, Tri::On),
    key!(End,            CTRL,   b"\x1b[J",    KC::Off),
    key!(End,            CTRL,   b"\x1b[1;5F", KC::On),
    key!(End,            SHIFT,  b"\x1b[K",    KC::Off),
    key!(End,            SHIFT,  b"\x1b[1;2F", KC::On),
    key!(End,            M::Any, b"\x1b[4~"),
    key!(PageUp,         CTRL,   b"\x1b[5;5~"),
    key!(PageUp,         SHIFT,  b"\x1b[5;2~"),
    key!(PageUp,         M::None, b"\x1b[5~"),
    key!(PageDown,       CTRL,   b"\x1b[6;5~"),
    key!(PageDown,       SHIFT,  b"\x1b[6;2~"),
    key!(PageDown,       M::Any, b"\x1b[6~"),
    key!(F(1),           M::None, b"\x1bOP"),
    key!(F(1),           SHIFT,  b"\x1b[1;2P"),
    key!(F(1),           CTRL,   b"\x1b[1;5P"),
    key!(F(1),           ALT,    b"\x1b[1;3P"),
    key!(F(2),           M::None, b"\x1bOQ"),
    key!(F(2),           SHIFT,  b"\x1b[1;2Q"),
    key!(F(2),           CTRL,   b"\x1b[1;5Q"),
    key!(F(2),           ALT,    b"\x1b[1;3Q"),
    key!(F(3),           M::None, b"\x1bOR"),
    key!(F(3),           SHIFT,  b"\x1b[1;2R"),
    key!(F(3),           CTRL,   b"\x1b[1;5R"),
    key!(F(3),           ALT,    b"\x1b[1;3R"),
    key!(F(4),           M::None, b"\x1bOS"),
    key!(F(4),           SHIFT,  b"\x1b[1;2S"),
    key!(F(4),           ALT,    b"\x1b[1;3S"),
    key!(F(5),           M::None, b"\x1b[15~"),
    key!(F(5),           SHIFT,  b"\x1b[15;2~"),
    key!(F(5),           CTRL,   b"\x1b[15;5~"),
    key!(F(5),           ALT,    b"\x1b[15;3~"),
    key!(F(6),           M::None, b"\x1b[17~"),
    key!(F(6),           SHIFT,  b"\x1b[17;2~"),
    key!(F(6),           CTRL,   b"\x1b[17;5~"),
    key!(F(6),           ALT,    b"\x1b[17;3~"),
    key!(F(7),           M::None, b"\x1b[18~"),
    key!(F(7),           SHIFT,  b"\x1b[18;2~"),
    key!(F(7),           CTRL,   b"\x1b[18;5~"),
    key!(F(7),           ALT,    b"\x1b[18;3~"),
    key!(F(8),           M::None, b"\x1b[19~"),
    key!(F(8),           SHIFT,  b"\x1b[19;2~"),
    key!(F(8),           CTRL,   b"\x1b[19;5~"),
    key!(F(8),           ALT,    b"\x1b[19;3~"),
    key!(F(9),           M::None, b"\x1b[20~"),
    key!(F(9),           SHIFT,  b"\x1b[20;2~"),
    key!(F(9),           CTRL,   b"\x1b[20;5~"),
    key!(F(9),           ALT,    b"\x1b[20;3~"),
    key!(F(10),          M::None, b"\x1b[21~"),
    key!(F(10),          SHIFT,  b"\x1b[21;2~"),
    key!(F(10),          CTRL,   b"\x1b[21;5~"),
    key!(F(10),          ALT,    b"\x1b[21;3~"),
    key!(F(11),          M::None, b"\x1b[23~"),
    key!(F(11),          SHIFT,  b"\x1b[23;2~"),
    key!(F(11),          CTRL,   b"\x1b[23;5~"),
    key!(F(11),          ALT,    b"\x1b[23;3~"),
    key!(F(12),          M::None, b"\x1b[24~"),
    key!(F(12),          SHIFT,  b"\x1b[24;2~"),
    key!(F(12),          CTRL,   b"\x1b[24;5~"),
    key!(F(12),          ALT,    b"\x1b[24;3~"),
    key!(F(13),          M::None, b"\x1b[1;2P"),
    key!(F(14),          M::None, b"\x1b[1;2Q"),
    key!(F(15),          M::None, b"\x1b[1;2R"),
    key!(F(16),          M::None, b"\x1b[1;2S"),
    key!(F(17),          M::None, b"\x1b[15;2~"),
    key!(F(18),          M::None, b"\x1b[17;2~"),
    key!(F(19),          M::None, b"\x1b[18;2~"),
    key!(F(20),          M::None, b"\x1b[19;2~"),
];

/// Encodes one key event. Returns true and fills `out` when the key maps
/// to input bytes; false means "no mapping, swallow the event".
pub fn compose_input(sym: KeySymbol, mods: Modifiers, flags: &ModeFlags, out: &mut Vec<u8>) -> bool {
    // DEL-mode short-circuits the Delete table entries.
    if flags.delete_sends_del && matches!(sym, KeySymbol::Delete | KeySymbol::KeypadDelete) {
        out.push(0x7F);
        return true;
    }

    for entry in KEY_TABLE {
        if entry.sym != sym {
            continue;
        }
        if !entry.mask.matches(mods) {
            continue;
        }
        if !entry.app_keypad.matches(flags.app_keypad, flags.num_lock) {
            continue;
        }
        if !entry.app_cursor.matches(flags.app_cursor) {
            continue;
        }
        if !entry.crlf.matches(flags.crlf) {
            continue;
        }
        out.extend_from_slice(entry.bytes);
        return true;
    }

    compose_fallback(sym, mods, flags, out)
}

/// Character composition for keys the table does not cover.
fn compose_fallback(sym: KeySymbol, mods: Modifiers, flags: &ModeFlags, out: &mut Vec<u8>) -> bool {
    let byte = match sym {
        KeySymbol::Tab => Some(b'\t'),
        KeySymbol::Escape => Some(0x1B),
        KeySymbol::Backspace => Some(0x7F),
        KeySymbol::Char(c) if mods.contains(Modifiers::CONTROL) => control_byte(c),
        KeySymbol::Char(c) => {
            return emit_char(c, mods, flags, out);
        }
        _ => None,
    };

    match byte {
        Some(b) => {
            if mods.contains(Modifiers::ALT) && flags.alt_sends_esc {
                out.push(0x1B);
            }
            out.push(b);
            true
        }
        None => false,
    }
}

fn emit_char(c: char, mods: Modifiers, flags: &ModeFlags, out: &mut Vec<u8>) -> bool {
    let seq = Seq::from_char(c);
    if mods.contains(Modifiers::ALT) {
        if flags.alt_sends_esc {
            out.push(0x1B);
            out.extend_from_slice(seq.as_bytes());
            return true;
        }
        if flags.meta_8bit && seq.len() == 1 {
            // Set bit 7, then re-encode the result as UTF-8.
            let cp = u32::from(seq.lead()) | 0x80;
            if let Some(meta) = crate::utf8::encode(cp) {
                out.extend_from_slice(meta.as_bytes());
                return true;
            }
        }
    }
    out.extend_from_slice(seq.as_bytes());
    true
}

/// Ctrl-key composition: letters map to 0x01..0x1A, the usual punctuation
/// maps to the remaining C0 values.
fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' => Some(c as u8 - b'a' + 1),
        'A'..='Z' => Some(c as u8 - b'A' + 1),
        '[' => Some(0x1B),
        '\\' => Some(0x1C),
        ']' => Some(0x1D),
        '^' => Some(0x1E),
        '_' => Some(0x1F),
        ' ' => Some(0x00),
        '?' => Some(0x7F),
        _ => None,
    }
}
