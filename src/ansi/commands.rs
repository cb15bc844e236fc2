// src/ansi/commands.rs

//! Events emitted by the VT parser, plus small helper enums used when the
//! interpreter decodes CSI arguments.

use log::warn;

use crate::utf8::Seq;

/// A fully classified unit of the inbound byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VtEvent {
    /// A printable grapheme sequence (GROUND state).
    Normal(Seq),
    /// A C0 control byte (0x00-0x1F outside of string states).
    Control(u8),
    /// ESC followed directly by a final byte.
    Escape(u8),
    /// ESC with intermediates, e.g. `ESC ( B` or `ESC # 8`.
    Special {
        intermediates: Vec<u8>,
        code: u8,
    },
    /// A complete CSI sequence.
    Csi {
        /// Private marker collected ahead of the parameters (`?`, `>`, ...).
        private: Option<u8>,
        /// Decimal parameters; absent parameters appear as 0.
        args: Vec<u16>,
        /// Intermediate bytes 0x20-0x2F.
        intermediates: Vec<u8>,
        /// Final byte 0x40-0x7E.
        code: u8,
    },
    /// An OSC string, split on `;`.
    Osc(Vec<Vec<u8>>),
    /// A DCS payload (bounded; consumed but not interpreted).
    Dcs(Vec<u8>),
}

/// Accesses argument `n`, falling back when absent.
pub fn nth_arg(args: &[u16], n: usize, fallback: u16) -> u16 {
    args.get(n).copied().unwrap_or(fallback)
}

/// Like [`nth_arg`] but a present-but-zero argument also takes the
/// fallback, matching the "default is 1, clamped non-zero" CSI rule.
pub fn nth_arg_non_zero(args: &[u16], n: usize, fallback: u16) -> u16 {
    match nth_arg(args, n, fallback) {
        0 => fallback,
        v => v,
    }
}

/// ED / EL argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    ToEnd,
    ToStart,
    All,
    Scrollback,
    Unknown,
}

impl From<u16> for EraseMode {
    fn from(value: u16) -> Self {
        match value {
            0 => EraseMode::ToEnd,
            1 => EraseMode::ToStart,
            2 => EraseMode::All,
            3 => EraseMode::Scrollback,
            _ => {
                warn!("unknown erase mode {}", value);
                EraseMode::Unknown
            }
        }
    }
}

/// TBC argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabClearMode {
    CurrentColumn,
    All,
    Unknown,
}

impl From<u16> for TabClearMode {
    fn from(value: u16) -> Self {
        match value {
            0 => TabClearMode::CurrentColumn,
            3 => TabClearMode::All,
            _ => {
                warn!("unknown tab clear mode {}", value);
                TabClearMode::Unknown
            }
        }
    }
}
