// src/io.rs

//! The pty boundary as the core sees it.
//!
//! The pseudo-terminal device, child spawning, and the event loop that
//! feeds reads back into `Terminal::tty_data` all live in the host. The
//! core only ever writes to the child and tells it about size changes.

use std::io;

pub trait Tty {
    /// Queues bytes for the child. Implementations buffer internally and
    /// flush when the descriptor is writable.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Propagates a grid resize to the pty (TIOCSWINSZ).
    fn resize(&mut self, rows: u16, cols: u16);
}

/// A sink for tests and headless use.
#[derive(Debug, Default)]
pub struct NullTty {
    pub written: Vec<u8>,
    pub size: Option<(u16, u16)>,
}

impl Tty for NullTty {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn resize(&mut self, rows: u16, cols: u16) {
        self.size = Some((rows, cols));
    }
}
