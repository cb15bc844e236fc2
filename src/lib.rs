//! ember-term: a VT102/xterm-compatible terminal emulator core.
//!
//! The core converts the byte stream from a child process into a drawable
//! grid of styled cells, and user input events back into bytes for the
//! child. Everything window-system shaped stays outside: the host feeds
//! pty reads into [`term::Terminal::tty_data`], implements
//! [`term::observer::Observer`] for bells/titles/clipboard/draw calls,
//! and hands the core a [`io::Tty`] for the write direction.

pub mod ansi;
pub mod color;
pub mod config;
pub mod glyph;
pub mod io;
pub mod keys;
pub mod term;
pub mod utf8;

pub use config::Config;
pub use term::observer::Observer;
pub use term::Terminal;
