// src/term/observer.rs

//! The callback surface between the terminal core and its host.
//!
//! The host (window layer) implements this trait; the core invokes it for
//! everything that leaves the grid: bells, titles, clipboard traffic,
//! child exit, and the draw contract. Draw calls arrive in a fixed order
//! inside one `draw_begin`/`draw_end` pair: background runs, foreground
//! runs, cursor, scrollbar.

use crate::color::Color;
use crate::glyph::AttrFlags;
use crate::term::buffer::BarState;
use crate::term::geometry::{Pos, Region};

pub trait Observer {
    /// BEL arrived.
    fn beep(&mut self) {}

    /// A key binding asked for a per-terminal font size change
    /// (delta: -1 smaller, 0 reset, +1 bigger).
    fn resize_local_font(&mut self, delta: i32) {
        let _ = delta;
    }

    /// Like [`Observer::resize_local_font`] but for every terminal.
    fn resize_global_font(&mut self, delta: i32) {
        let _ = delta;
    }

    /// Selected text should be placed in the primary selection or, when
    /// `clipboard` is true, the clipboard.
    fn copy(&mut self, text: &str, clipboard: bool) {
        let _ = (text, clipboard);
    }

    /// The core wants a paste delivered back through `Terminal::paste`.
    fn paste(&mut self, clipboard: bool) {
        let _ = clipboard;
    }

    fn set_window_title(&mut self, title: &str) {
        let _ = title;
    }

    fn set_icon_name(&mut self, name: &str) {
        let _ = name;
    }

    fn reset_title_and_icon(&mut self) {}

    /// DSR 7: the display name, written back to the child.
    fn get_display(&mut self, out: &mut String) {
        let _ = out;
    }

    /// DECCOLM wants the window resized to the given grid.
    fn resize_buffer(&mut self, rows: usize, cols: usize) {
        let _ = (rows, cols);
    }

    /// The child exited; delivered after the final pty read drained.
    fn child_exited(&mut self, exit_code: i32) {
        let _ = exit_code;
    }

    // --- Draw contract ---

    /// Opens a repair. Returning false defers it: per-line damage stays
    /// marked and no other draw call is made.
    fn draw_begin(&mut self) -> bool {
        true
    }

    /// A run of `count` cells sharing one background colour.
    fn draw_bg(&mut self, pos: Pos, color: Color, count: usize) {
        let _ = (pos, color, count);
    }

    /// A run of `count` non-blank cells sharing (fg, attrs); `bytes` is
    /// their concatenated UTF-8 text.
    fn draw_fg(&mut self, pos: Pos, color: Color, attrs: AttrFlags, bytes: &[u8], count: usize) {
        let _ = (pos, color, attrs, bytes, count);
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_cursor(
        &mut self,
        pos: Pos,
        fg: Color,
        bg: Color,
        attrs: AttrFlags,
        bytes: &[u8],
        wrap_next: bool,
        focused: bool,
    ) {
        let _ = (pos, fg, bg, attrs, bytes, wrap_next, focused);
    }

    fn draw_scrollbar(&mut self, bar: BarState, rows: usize) {
        let _ = (bar, rows);
    }

    /// Closes the repair opened by `draw_begin`.
    fn draw_end(&mut self, damage: Region, scrollbar_dirty: bool) {
        let _ = (damage, scrollbar_dirty);
    }
}
