// src/term/mod.rs

//! The terminal interpreter.
//!
//! `Terminal` consumes parsed [`VtEvent`]s and user input, mutates the
//! cell buffers, and talks back to the host through the [`Observer`]
//! trait and the pty through the [`Tty`] trait. It owns the cursor,
//! saved-cursor slots, tab stops, and the mode bitset; the buffers are
//! pure grids.
//!
//! Externally invoked methods set a dispatch guard and fail fast on
//! re-entry. `resize` is the documented exception: font-size changes
//! arrive while a key press is still being dispatched.

pub mod buffer;
pub mod charset;
pub mod cursor;
pub mod dedupe;
pub mod geometry;
pub mod input;
pub mod modes;
pub mod mouse;
pub mod observer;
pub mod selection;

use log::{debug, error, warn};
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Mutex;

use crate::ansi::{nth_arg, nth_arg_non_zero, EraseMode, Processor, TabClearMode, VtEvent};
use crate::color::Color;
use crate::config::Config;
use crate::glyph::{AttrFlags, Cell};
use crate::io::Tty;
use crate::keys::{Action, KeySymbol, Modifiers};
use crate::utf8::Seq;

use self::buffer::Buffer;
use self::charset::{CS_SPECIAL, CS_UK, CS_US, G0, G1};
use self::cursor::Cursor;
use self::geometry::{HPos, Pos, Region};
use self::input::ModeFlags;
use self::modes::TermMode;
use self::mouse::MouseButton;
use self::observer::Observer;

/// Primary device attributes: "I am a VT102".
const DA_RESPONSE: &[u8] = b"\x1b[?6c";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs a recognised-but-unimplemented sequence: once per distinct
/// message in release builds, every time in debug builds.
fn nyi(what: &str) {
    static SEEN: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));
    if cfg!(debug_assertions) {
        warn!("NYI: {}", what);
        return;
    }
    let mut seen = SEEN.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if seen.insert(what.to_owned()) {
        warn!("NYI: {}", what);
    }
}

/// Why a draw is happening; controls scroll-snap and what gets emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Tty,
    Client,
    Focus,
    Other,
}

/// What the held mouse button is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Press {
    None,
    /// Driving a selection.
    Select,
    /// Being reported to the child.
    Report,
}

/// Wheel direction delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDir {
    Up,
    Down,
}

/// The terminal core. One per pty.
pub struct Terminal<O: Observer, T: Tty> {
    observer: O,
    tty: T,
    config: Config,
    processor: Processor,

    pri_buffer: Buffer,
    alt_buffer: Buffer,
    alt_active: bool,

    cursor: Cursor,
    saved_pri: Option<Cursor>,
    saved_alt: Option<Cursor>,
    tabs: Vec<bool>,
    modes: TermMode,

    press: Press,
    button: MouseButton,
    pointer_pos: Pos,
    focused: bool,
    /// Last printed grapheme, for REP.
    last_seq: Option<Seq>,

    dispatch: bool,
}

const TAB_INTERVAL: usize = 8;

fn default_tabs(cols: usize) -> Vec<bool> {
    (0..cols).map(|col| col % TAB_INTERVAL == 0).collect()
}

impl<O: Observer, T: Tty> Terminal<O, T> {
    pub fn new(
        config: Config,
        deduper: Rc<RefCell<dedupe::Deduper>>,
        rows: usize,
        cols: usize,
        observer: O,
        tty: T,
    ) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        let history = config.history_limit();
        Terminal {
            observer,
            tty,
            pri_buffer: Buffer::new(deduper.clone(), rows, cols, history),
            alt_buffer: Buffer::new(deduper, rows, cols, 0),
            alt_active: false,
            cursor: Cursor::new(),
            saved_pri: None,
            saved_alt: None,
            tabs: default_tabs(cols),
            modes: TermMode::initial(),
            processor: Processor::new(),
            press: Press::None,
            button: MouseButton::Left,
            pointer_pos: Pos::origin(),
            focused: true,
            last_seq: None,
            dispatch: false,
            config,
        }
    }

    // --- Introspection (hosts and tests) ---

    pub fn rows(&self) -> usize {
        self.buffer().rows()
    }

    pub fn cols(&self) -> usize {
        self.buffer().cols()
    }

    /// Cursor (row, col); col equals `cols` exactly while a wrap is
    /// pending.
    pub fn cursor_pos(&self) -> (usize, usize) {
        (self.cursor.pos.row, self.cursor.pos.col)
    }

    pub fn wrap_next(&self) -> bool {
        self.cursor.wrap_next
    }

    pub fn modes(&self) -> TermMode {
        self.modes
    }

    pub fn alt_active(&self) -> bool {
        self.alt_active
    }

    pub fn line_text(&self, row: usize) -> String {
        self.buffer().line_text(row)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.buffer().cell(row, col)
    }

    pub fn history_len(&self) -> usize {
        self.pri_buffer.history_len()
    }

    /// Lines the view is scrolled back into history; 0 is the live
    /// screen.
    pub fn view_offset(&self) -> usize {
        self.pri_buffer.view_offset()
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn tty(&self) -> &T {
        &self.tty
    }

    pub fn term_name(&self) -> &str {
        &self.config.term_name
    }

    fn buffer(&self) -> &Buffer {
        if self.alt_active {
            &self.alt_buffer
        } else {
            &self.pri_buffer
        }
    }

    fn buffer_mut(&mut self) -> &mut Buffer {
        if self.alt_active {
            &mut self.alt_buffer
        } else {
            &mut self.pri_buffer
        }
    }

    /// Disjoint borrows for the draw path.
    fn buffer_and_observer(&mut self) -> (&mut Buffer, &mut O) {
        let buffer = if self.alt_active {
            &mut self.alt_buffer
        } else {
            &mut self.pri_buffer
        };
        (buffer, &mut self.observer)
    }

    // --- Dispatch guard ---

    fn enter_dispatch(&mut self) {
        assert!(!self.dispatch, "re-entrant terminal dispatch");
        self.dispatch = true;
    }

    fn leave_dispatch(&mut self) {
        self.dispatch = false;
    }

    // --- Pty input ---

    /// A block of bytes read from the pty. One call is atomic with
    /// respect to drawing.
    pub fn tty_data(&mut self, data: &[u8]) {
        self.enter_dispatch();
        if self.config.trace_tty {
            trace_bytes(data);
        }
        self.interpret_bytes(data);
        if self.config.sync_tty {
            self.fix_damage(Trigger::Tty);
        }
        self.leave_dispatch();
    }

    /// The host finished a batch of reads; repair accumulated damage.
    pub fn tty_sync(&mut self) {
        self.enter_dispatch();
        self.fix_damage(Trigger::Tty);
        self.leave_dispatch();
    }

    /// The child exited; the host delivers this after the final read.
    pub fn tty_exited(&mut self, exit_code: i32) {
        self.enter_dispatch();
        self.observer.child_exited(exit_code);
        self.leave_dispatch();
    }

    fn interpret_bytes(&mut self, data: &[u8]) {
        let events = self.processor.process_bytes(data);
        for event in events {
            self.interpret_event(event);
        }
    }

    fn interpret_event(&mut self, event: VtEvent) {
        match event {
            VtEvent::Normal(seq) => {
                self.last_seq = Some(seq);
                self.write_grapheme(seq);
            }
            VtEvent::Control(byte) => self.control(byte),
            VtEvent::Escape(code) => self.escape(code),
            VtEvent::Special { intermediates, code } => self.special(&intermediates, code),
            VtEvent::Csi {
                private,
                args,
                intermediates,
                code,
            } => self.csi(private, &args, &intermediates, code),
            VtEvent::Osc(args) => self.osc(&args),
            VtEvent::Dcs(_) => {
                // Recognised, payload discarded.
            }
        }
    }

    // --- Character output ---

    fn write_grapheme(&mut self, seq: Seq) {
        let seq = self.cursor.active_charset().translate(seq);
        let cols = self.cols();

        if self.cursor.wrap_next {
            if self.modes.get(TermMode::AUTO_WRAP) {
                self.cursor.wrap_next = false;
                self.cursor.pos.col = 0;
                self.forward_index(false);
                let row = self.cursor.pos.row;
                self.buffer_mut().set_cont(row, true);
            } else {
                self.cursor.wrap_next = false;
                self.cursor.pos.col = cols - 1;
            }
        }

        let Pos { row, col } = self.cursor.pos;
        if self.modes.get(TermMode::INSERT) {
            self.buffer_mut().insert_cells(row, col, 1);
        }
        let cell = Cell::new(seq, self.cursor.style);
        self.buffer_mut().set_cell(row, col, cell);

        if col + 1 == cols {
            self.cursor.wrap_next = true;
            self.cursor.pos.col = cols;
        } else {
            self.cursor.pos.col = col + 1;
        }
    }

    // --- C0 controls ---

    fn control(&mut self, byte: u8) {
        match byte {
            0x07 => self.observer.beep(),
            0x08 => self.backspace(),
            0x09 => self.tab_forward(1),
            0x0A | 0x0B | 0x0C => {
                if self.modes.get(TermMode::CR_ON_LF) {
                    self.carriage_return();
                }
                self.forward_index(false);
            }
            0x0D => self.carriage_return(),
            0x0E => self.cursor.use_charset(G1),
            0x0F => self.cursor.use_charset(G0),
            _ => {}
        }
    }

    fn backspace(&mut self) {
        if self.cursor.wrap_next {
            self.cursor.wrap_next = false;
            self.cursor.pos.col = self.cols() - 1;
        } else if self.cursor.pos.col > 0 {
            self.cursor.pos.col -= 1;
        }
    }

    fn carriage_return(&mut self) {
        self.cursor.wrap_next = false;
        self.cursor.pos.col = 0;
    }

    /// Pins a pending wrap back onto the last column before any cursor
    /// movement.
    fn settle_wrap(&mut self) {
        if self.cursor.wrap_next {
            self.cursor.wrap_next = false;
            self.cursor.pos.col = self.cols() - 1;
        }
    }

    /// IND: down one line, scrolling inside the margins. With
    /// `carriage_return` set this is NEL.
    fn forward_index(&mut self, carriage_return: bool) {
        if carriage_return {
            self.carriage_return();
        }
        self.settle_wrap();
        let row = self.cursor.pos.row;
        let margin_end = self.buffer().margin_end();
        if row + 1 == margin_end {
            self.buffer_mut().add_line();
        } else if row + 1 < self.rows() {
            self.cursor.pos.row = row + 1;
        }
    }

    /// RI: up one line, scrolling inside the margins.
    fn reverse_index(&mut self) {
        self.settle_wrap();
        let row = self.cursor.pos.row;
        let margin_begin = self.buffer().margin_begin();
        if row == margin_begin {
            self.buffer_mut().scroll_down_margins(1);
        } else if row > 0 {
            self.cursor.pos.row = row - 1;
        }
    }

    // --- Tabs ---

    fn tab_forward(&mut self, n: usize) {
        self.settle_wrap();
        let cols = self.cols();
        let mut col = self.cursor.pos.col;
        for _ in 0..n {
            col = (col + 1..cols).find(|&c| self.tabs[c]).unwrap_or(cols - 1);
        }
        self.cursor.pos.col = col;
    }

    fn tab_backward(&mut self, n: usize) {
        self.settle_wrap();
        let mut col = self.cursor.pos.col;
        for _ in 0..n {
            col = (0..col).rev().find(|&c| self.tabs[c]).unwrap_or(0);
        }
        self.cursor.pos.col = col;
    }

    // --- Cursor addressing ---

    /// CUP-style absolute move; `origin` confines and offsets into the
    /// scrolling region.
    fn move_cursor(&mut self, pos: Pos, origin: bool) {
        self.cursor.wrap_next = false;
        let (row_base, row_limit) = if origin {
            (self.buffer().margin_begin(), self.buffer().margin_end())
        } else {
            (0, self.rows())
        };
        self.cursor.pos.row = (row_base + pos.row).min(row_limit - 1);
        self.cursor.pos.col = pos.col.min(self.cols() - 1);
    }

    /// Relative or absolute row/col adjustment. Relative vertical moves
    /// stop at the margins when the cursor starts inside them.
    fn move_cursor_row(&mut self, relative: bool, row: isize) {
        self.cursor.wrap_next = false;
        if relative {
            let (lo, hi) = self.row_clamp_range();
            let target = self.cursor.pos.row as isize + row;
            self.cursor.pos.row = target.clamp(lo as isize, hi as isize) as usize;
        } else {
            self.cursor.pos.row = (row.max(0) as usize).min(self.rows() - 1);
        }
    }

    fn row_clamp_range(&self) -> (usize, usize) {
        let row = self.cursor.pos.row;
        let begin = self.buffer().margin_begin();
        let end = self.buffer().margin_end();
        if row >= begin && row < end {
            (begin, end - 1)
        } else {
            (0, self.rows() - 1)
        }
    }

    fn move_cursor_col(&mut self, relative: bool, col: isize) {
        self.cursor.wrap_next = false;
        let cols = self.cols() as isize;
        let base = if relative {
            self.cursor.pos.col.min(self.cols() - 1) as isize
        } else {
            0
        };
        self.cursor.pos.col = (base + col).clamp(0, cols - 1) as usize;
    }

    // --- Saved cursor ---

    fn save_cursor(&mut self) {
        let slot = if self.alt_active {
            &mut self.saved_alt
        } else {
            &mut self.saved_pri
        };
        *slot = Some(self.cursor);
    }

    fn restore_cursor(&mut self) {
        let saved = if self.alt_active {
            self.saved_alt
        } else {
            self.saved_pri
        };
        self.cursor = saved.unwrap_or_default();
        self.cursor.wrap_next = false;
        self.cursor.pos.row = self.cursor.pos.row.min(self.rows() - 1);
        self.cursor.pos.col = self.cursor.pos.col.min(self.cols() - 1);
    }

    // --- ESC dispatch ---

    fn escape(&mut self, code: u8) {
        match code {
            b'D' => self.forward_index(false),
            b'E' => self.forward_index(true),
            b'H' => {
                let col = self.cursor.pos.col.min(self.cols() - 1);
                self.tabs[col] = true;
            }
            b'M' => self.reverse_index(),
            b'N' => nyi("SS2"),
            b'O' => nyi("SS3"),
            b'Z' => self.write_tty(DA_RESPONSE),
            b'c' => self.full_reset(),
            b'=' => self.modes.set_to(TermMode::APPKEYPAD, true),
            b'>' => self.modes.set_to(TermMode::APPKEYPAD, false),
            b'7' => self.save_cursor(),
            b'8' => self.restore_cursor(),
            b'\\' => {
                // ST closing an already-dispatched string.
            }
            _ => nyi(&format!("ESC {}", code as char)),
        }
    }

    fn full_reset(&mut self) {
        self.pri_buffer.reset();
        self.alt_buffer.reset();
        self.alt_active = false;
        self.cursor = Cursor::new();
        self.saved_pri = None;
        self.saved_alt = None;
        self.tabs = default_tabs(self.cols());
        self.modes = TermMode::initial();
        self.last_seq = None;
        self.processor.reset();
        self.observer.reset_title_and_icon();
    }

    // --- ESC with intermediates ---

    fn special(&mut self, intermediates: &[u8], code: u8) {
        match (intermediates, code) {
            (b"#", b'8') => self.buffer_mut().test_pattern(),
            (b"#", _) => nyi(&format!("DEC test ESC # {}", code as char)),
            (b"(", designator) => self.designate_charset(G0, designator),
            (b")", designator) => self.designate_charset(G1, designator),
            _ => nyi(&format!(
                "ESC {} {}",
                String::from_utf8_lossy(intermediates),
                code as char
            )),
        }
    }

    fn designate_charset(&mut self, slot: usize, designator: u8) {
        match designator {
            b'B' => self.cursor.set_charset(slot, &CS_US),
            b'A' => self.cursor.set_charset(slot, &CS_UK),
            b'0' => self.cursor.set_charset(slot, &CS_SPECIAL),
            _ => nyi(&format!("charset designator {}", designator as char)),
        }
    }

    // --- CSI dispatch ---

    fn csi(&mut self, private: Option<u8>, args: &[u16], intermediates: &[u8], code: u8) {
        if !intermediates.is_empty() {
            self.csi_intermediate(private, args, intermediates, code);
            return;
        }

        let n1 = usize::from(nth_arg_non_zero(args, 0, 1));
        match code {
            b'@' => {
                self.settle_wrap();
                let Pos { row, col } = self.cursor.pos;
                self.buffer_mut().insert_cells(row, col, n1);
            }
            b'A' => self.move_cursor_row(true, -(n1 as isize)),
            b'B' => self.move_cursor_row(true, n1 as isize),
            b'C' => self.move_cursor_col(true, n1 as isize),
            b'D' => self.move_cursor_col(true, -(n1 as isize)),
            b'E' => {
                self.move_cursor_row(true, n1 as isize);
                self.cursor.pos.col = 0;
            }
            b'F' => {
                self.move_cursor_row(true, -(n1 as isize));
                self.cursor.pos.col = 0;
            }
            b'G' | b'`' => self.move_cursor_col(false, n1 as isize - 1),
            b'H' | b'f' => {
                let row = usize::from(nth_arg_non_zero(args, 0, 1)) - 1;
                let col = usize::from(nth_arg_non_zero(args, 1, 1)) - 1;
                self.move_cursor(Pos::new(row, col), self.modes.get(TermMode::ORIGIN));
            }
            b'I' => self.tab_forward(n1),
            b'J' => self.erase_in_display(EraseMode::from(nth_arg(args, 0, 0))),
            b'K' => self.erase_in_line(EraseMode::from(nth_arg(args, 0, 0))),
            b'L' => {
                self.settle_wrap();
                let row = self.cursor.pos.row;
                self.buffer_mut().insert_lines(row, n1);
            }
            b'M' => {
                self.settle_wrap();
                let row = self.cursor.pos.row;
                self.buffer_mut().erase_lines(row, n1);
            }
            b'P' => {
                self.settle_wrap();
                let Pos { row, col } = self.cursor.pos;
                self.buffer_mut().erase_cells(row, col, n1);
            }
            b'S' => self.buffer_mut().scroll_up_margins(n1),
            b'T' => self.buffer_mut().scroll_down_margins(n1),
            b'X' => {
                self.settle_wrap();
                let Pos { row, col } = self.cursor.pos;
                self.buffer_mut().blank_cells(row, col, n1);
            }
            b'Z' => self.tab_backward(n1),
            b'a' => self.move_cursor_col(true, n1 as isize),
            b'b' => self.repeat_last(n1),
            b'c' => self.write_tty(DA_RESPONSE),
            b'd' => self.move_cursor_row(false, nth_arg_non_zero(args, 0, 1) as isize - 1),
            b'e' => self.move_cursor_row(true, n1 as isize),
            b'g' => self.clear_tab_stops(TabClearMode::from(nth_arg(args, 0, 0))),
            b'W' => match nth_arg(args, 0, 0) {
                0 => {
                    let col = self.cursor.pos.col.min(self.cols() - 1);
                    self.tabs[col] = true;
                }
                2 => self.clear_tab_stops(TabClearMode::CurrentColumn),
                5 => self.clear_tab_stops(TabClearMode::All),
                other => nyi(&format!("CSI {} W", other)),
            },
            b'h' => self.set_modes(private, args, true),
            b'l' => self.set_modes(private, args, false),
            b'm' => self.select_graphic_rendition(args),
            b'n' => self.device_status_report(args),
            b'r' => self.set_scrolling_region(args),
            b's' => self.save_cursor(),
            b'u' => self.restore_cursor(),
            b't' => nyi("window ops (CSI t)"),
            _ => nyi(&format!(
                "CSI {:?} {:?} {}",
                private.map(|b| b as char),
                args,
                code as char
            )),
        }
    }

    fn csi_intermediate(&mut self, private: Option<u8>, args: &[u16], intermediates: &[u8], code: u8) {
        match (intermediates, code) {
            (b"$", b'p') => {
                // DECRQM: report the mode as not recognised, like the
                // hardware we claim to be.
                let mode = nth_arg_non_zero(args, 0, 1);
                let reply = format!("\x1b[?{};0$y", mode);
                self.write_tty(reply.as_bytes());
            }
            (b" ", b'q') => nyi("DECSCUSR"),
            _ => nyi(&format!(
                "CSI {:?} {} {}",
                private.map(|b| b as char),
                String::from_utf8_lossy(intermediates),
                code as char
            )),
        }
    }

    fn repeat_last(&mut self, n: usize) {
        if let Some(seq) = self.last_seq.take() {
            for _ in 0..n {
                self.write_grapheme(seq);
            }
        }
    }

    fn erase_in_display(&mut self, mode: EraseMode) {
        self.settle_wrap();
        let Pos { row, col } = self.cursor.pos;
        match mode {
            EraseMode::ToEnd => self.buffer_mut().clear_below(row, col),
            EraseMode::ToStart => self.buffer_mut().clear_above(row, col),
            EraseMode::All => {
                self.buffer_mut().clear();
                self.move_cursor(Pos::origin(), self.modes.get(TermMode::ORIGIN));
            }
            EraseMode::Scrollback => self.pri_buffer.clear_history(),
            EraseMode::Unknown => {}
        }
    }

    fn erase_in_line(&mut self, mode: EraseMode) {
        self.settle_wrap();
        let Pos { row, col } = self.cursor.pos;
        match mode {
            EraseMode::ToEnd => self.buffer_mut().clear_line_right(row, col),
            EraseMode::ToStart => self.buffer_mut().clear_line_left(row, col),
            EraseMode::All => self.buffer_mut().clear_line(row),
            EraseMode::Scrollback | EraseMode::Unknown => {}
        }
    }

    fn clear_tab_stops(&mut self, mode: TabClearMode) {
        match mode {
            TabClearMode::CurrentColumn => {
                let col = self.cursor.pos.col.min(self.cols() - 1);
                self.tabs[col] = false;
            }
            TabClearMode::All => self.tabs.fill(false),
            TabClearMode::Unknown => {}
        }
    }

    fn set_scrolling_region(&mut self, args: &[u16]) {
        let rows = self.rows();
        if args.is_empty() {
            self.buffer_mut().reset_margins();
        } else {
            let top = usize::from(nth_arg_non_zero(args, 0, 1)) - 1;
            let bottom = usize::from(nth_arg_non_zero(args, 1, rows as u16)) - 1;
            let top = top.min(rows - 1);
            let bottom = bottom.min(rows - 1);
            self.buffer_mut().set_margins(top, bottom + 1);
        }
        self.move_cursor(Pos::origin(), self.modes.get(TermMode::ORIGIN));
    }

    fn device_status_report(&mut self, args: &[u16]) {
        match nth_arg(args, 0, 0) {
            5 => self.write_tty(b"\x1b[0n"),
            6 => {
                let reply = format!(
                    "\x1b[{};{}R",
                    self.cursor.pos.row + 1,
                    self.cursor.pos.col.min(self.cols() - 1) + 1
                );
                self.write_tty(reply.as_bytes());
            }
            7 => {
                let mut display = String::new();
                self.observer.get_display(&mut display);
                display.push('\n');
                self.write_tty(display.as_bytes());
            }
            8 => {
                let title = format!("ember-term {}", VERSION);
                self.observer.set_window_title(&title);
            }
            15 => self.write_tty(b"\x1b[?13n"),
            other => nyi(&format!("DSR {}", other)),
        }
    }

    // --- SGR ---

    fn select_graphic_rendition(&mut self, args: &[u16]) {
        if args.is_empty() {
            self.cursor.style = Default::default();
            return;
        }

        let style = &mut self.cursor.style;
        let mut i = 0;
        while i < args.len() {
            match args[i] {
                0 => *style = Default::default(),
                1 => style.attrs |= AttrFlags::BOLD,
                2 => style.attrs |= AttrFlags::FAINT,
                3 => style.attrs |= AttrFlags::ITALIC,
                4 => style.attrs |= AttrFlags::UNDERLINE,
                5 | 6 => style.attrs |= AttrFlags::BLINK,
                7 => style.attrs |= AttrFlags::INVERSE,
                8 => style.attrs |= AttrFlags::CONCEAL,
                22 => style.attrs &= !(AttrFlags::BOLD | AttrFlags::FAINT),
                23 => style.attrs &= !AttrFlags::ITALIC,
                24 => style.attrs &= !AttrFlags::UNDERLINE,
                25 => style.attrs &= !AttrFlags::BLINK,
                27 => style.attrs &= !AttrFlags::INVERSE,
                28 => style.attrs &= !AttrFlags::CONCEAL,
                30..=37 => style.fg = Color::Indexed((args[i] - 30) as u8),
                39 => style.fg = Color::text_fg(),
                40..=47 => style.bg = Color::Indexed((args[i] - 40) as u8),
                49 => style.bg = Color::text_bg(),
                90..=97 => style.fg = Color::Indexed((args[i] - 90 + 8) as u8),
                100..=107 => style.bg = Color::Indexed((args[i] - 100 + 8) as u8),
                38 | 48 => {
                    let background = args[i] == 48;
                    match Self::parse_extended_color(args, &mut i) {
                        Some(color) if background => style.bg = color,
                        Some(color) => style.fg = color,
                        None => break,
                    }
                }
                other => warn!("unhandled SGR attribute {}", other),
            }
            i += 1;
        }
    }

    /// Consumes `5;n` or `2;r;g;b` after a 38/48; `i` points at the
    /// 38/48 on entry and at the last consumed argument on exit.
    fn parse_extended_color(args: &[u16], i: &mut usize) -> Option<Color> {
        match args.get(*i + 1) {
            Some(5) => {
                let index = args.get(*i + 2).copied();
                *i += 2;
                match index {
                    Some(v) if v <= 255 => Some(Color::Indexed(v as u8)),
                    Some(v) => {
                        warn!("256-colour index {} out of range", v);
                        None
                    }
                    None => {
                        warn!("missing 256-colour index");
                        None
                    }
                }
            }
            Some(2) => {
                let r = args.get(*i + 2).copied();
                let g = args.get(*i + 3).copied();
                let b = args.get(*i + 4).copied();
                *i += 4;
                match (r, g, b) {
                    (Some(r), Some(g), Some(b)) => {
                        Some(Color::Direct(r.min(255) as u8, g.min(255) as u8, b.min(255) as u8))
                    }
                    _ => {
                        warn!("incomplete direct-colour sequence");
                        None
                    }
                }
            }
            Some(other) => {
                nyi(&format!("extended colour mode {}", other));
                *i += 1;
                None
            }
            None => {
                warn!("missing extended colour specifier");
                None
            }
        }
    }

    // --- Modes ---

    fn set_modes(&mut self, private: Option<u8>, args: &[u16], set: bool) {
        for &arg in args {
            match private {
                Some(b'?') => self.set_dec_mode(arg, set),
                None => self.set_ansi_mode(arg, set),
                Some(marker) => {
                    warn!("mode set/reset with unknown marker {:?}", marker as char);
                    return;
                }
            }
        }
        // CSI h / CSI l with no parameters means mode 0 (error, ignored).
        if args.is_empty() {
            debug!("SM/RM without parameters ignored");
        }
    }

    fn set_dec_mode(&mut self, mode: u16, set: bool) {
        match mode {
            1 => self.modes.set_to(TermMode::APPCURSOR, set),
            2 => nyi("DECANM"),
            3 => {
                // DECCOLM: reset the buffer and ask the host for the
                // 132/80-column window.
                self.buffer_mut().reset();
                let rows = self.rows();
                self.observer.resize_buffer(rows, if set { 132 } else { 80 });
            }
            4 => nyi("DECSCLM"),
            5 => {
                if self.modes.get(TermMode::REVERSE) != set {
                    self.modes.set_to(TermMode::REVERSE, set);
                    self.buffer_mut().damage_viewport(false);
                }
            }
            6 => {
                self.modes.set_to(TermMode::ORIGIN, set);
                self.move_cursor(Pos::origin(), set);
            }
            7 => self.modes.set_to(TermMode::AUTO_WRAP, set),
            8 => self.modes.set_to(TermMode::AUTO_REPEAT, set),
            9 => nyi("X10 mouse"),
            12 => {
                // Cursor blink; the renderer owns blinking.
            }
            18 | 19 => nyi("printer modes"),
            25 => self.modes.set_to(TermMode::SHOW_CURSOR, set),
            1000 => {
                self.modes.set_to(TermMode::MOUSE_PRESS_RELEASE, set);
                if set {
                    self.modes.set_to(TermMode::MOUSE_DRAG, false);
                    self.modes.set_to(TermMode::MOUSE_MOTION, false);
                    self.modes.set_to(TermMode::MOUSE_SELECT, false);
                }
            }
            1001 => {
                self.modes.set_to(TermMode::MOUSE_PRESS_RELEASE, set);
                self.modes.set_to(TermMode::MOUSE_SELECT, set);
                if set {
                    self.modes.set_to(TermMode::MOUSE_DRAG, false);
                    self.modes.set_to(TermMode::MOUSE_MOTION, false);
                }
            }
            1002 => {
                self.modes.set_to(TermMode::MOUSE_PRESS_RELEASE, set);
                self.modes.set_to(TermMode::MOUSE_DRAG, set);
                if set {
                    self.modes.set_to(TermMode::MOUSE_MOTION, false);
                    self.modes.set_to(TermMode::MOUSE_SELECT, false);
                }
            }
            1003 => {
                self.modes.set_to(TermMode::MOUSE_PRESS_RELEASE, set);
                self.modes.set_to(TermMode::MOUSE_DRAG, set);
                self.modes.set_to(TermMode::MOUSE_MOTION, set);
                if set {
                    self.modes.set_to(TermMode::MOUSE_SELECT, false);
                }
            }
            1004 => self.modes.set_to(TermMode::FOCUS, set),
            1005 => nyi("UTF-8 mouse format"),
            1006 => self.modes.set_to(TermMode::MOUSE_FORMAT_SGR, set),
            1015 => nyi("urxvt mouse format"),
            1034 => self.modes.set_to(TermMode::META_8BIT, set),
            1037 => self.modes.set_to(TermMode::DELETE_SENDS_DEL, set),
            1039 => self.modes.set_to(TermMode::ALT_SENDS_ESC, set),
            47 => self.switch_buffer(set, false),
            1047 => self.switch_buffer(set, set),
            1048 => {
                if set {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if set {
                    if !self.alt_active {
                        self.save_cursor();
                    }
                    self.switch_buffer(true, true);
                } else if self.alt_active {
                    self.switch_buffer(false, false);
                    self.restore_cursor();
                }
            }
            2004 => self.modes.set_to(TermMode::BRACKETED_PASTE, set),
            other => error!("unknown private mode {}", other),
        }
    }

    fn set_ansi_mode(&mut self, mode: u16, set: bool) {
        match mode {
            0 => {}
            2 => self.modes.set_to(TermMode::KBDLOCK, set),
            4 => self.modes.set_to(TermMode::INSERT, set),
            // SRM has inverted sense: set means *no* local echo.
            12 => self.modes.set_to(TermMode::ECHO, !set),
            20 => self.modes.set_to(TermMode::CR_ON_LF, set),
            other => error!("unknown ANSI mode {}", other),
        }
    }

    fn switch_buffer(&mut self, alt: bool, clear: bool) {
        if self.alt_active == alt {
            return;
        }
        self.alt_active = alt;
        self.buffer_mut().activate(clear);
        // The buffers may disagree about margins; keep the cursor legal.
        self.cursor.wrap_next = false;
        self.cursor.pos.row = self.cursor.pos.row.min(self.rows() - 1);
        self.cursor.pos.col = self.cursor.pos.col.min(self.cols() - 1);
    }

    // --- OSC ---

    fn osc(&mut self, args: &[Vec<u8>]) {
        let Some(selector) = args.first() else {
            return;
        };
        let selector = String::from_utf8_lossy(selector);
        let code: u32 = match selector.parse() {
            Ok(code) => code,
            Err(_) => {
                error!("OSC selector {:?} is not a number", selector);
                return;
            }
        };
        let text = args
            .get(1)
            .map(|raw| String::from_utf8_lossy(raw).into_owned());

        match code {
            0 => {
                if let Some(text) = text {
                    self.observer.set_icon_name(&text);
                    self.observer.set_window_title(&text);
                }
            }
            1 => {
                if let Some(text) = text {
                    self.observer.set_icon_name(&text);
                }
            }
            2 => {
                if let Some(text) = text {
                    self.observer.set_window_title(&text);
                }
            }
            112 => {
                // Cursor-colour reset, seen from tmux; nothing to do.
            }
            666 => self.fix_damage(Trigger::Tty),
            other => nyi(&format!("OSC {}", other)),
        }
    }

    // --- User input ---

    /// Returns true when the event was consumed (binding fired or bytes
    /// were written).
    pub fn key_press(&mut self, sym: KeySymbol, modifiers: Modifiers) -> bool {
        self.enter_dispatch();
        let consumed = self.key_press_inner(sym, modifiers);
        self.leave_dispatch();
        consumed
    }

    fn key_press_inner(&mut self, sym: KeySymbol, modifiers: Modifiers) -> bool {
        if let Some(action) = self.config.bindings.lookup(sym, modifiers) {
            self.run_action(action);
            return true;
        }

        if !sym.is_potent() {
            return false;
        }

        if self.modes.get(TermMode::KBDLOCK) {
            debug!("keyboard locked, dropping key");
            return true;
        }

        if self.config.scroll_on_tty_key_press && self.pri_buffer.scroll_bottom_history() {
            self.fix_damage(Trigger::Other);
        }

        let flags = ModeFlags {
            app_keypad: self.modes.get(TermMode::APPKEYPAD),
            app_cursor: self.modes.get(TermMode::APPCURSOR),
            crlf: self.modes.get(TermMode::CR_ON_LF),
            delete_sends_del: self.modes.get(TermMode::DELETE_SENDS_DEL),
            alt_sends_esc: self.modes.get(TermMode::ALT_SENDS_ESC),
            meta_8bit: self.modes.get(TermMode::META_8BIT),
            num_lock: modifiers.contains(Modifiers::NUM_LOCK),
        };
        let mut bytes = Vec::with_capacity(8);
        if !input::compose_input(sym, modifiers, &flags, &mut bytes) {
            return false;
        }

        self.write_tty(&bytes);
        if self.modes.get(TermMode::ECHO) {
            self.echo(&bytes);
        }
        true
    }

    fn run_action(&mut self, action: Action) {
        match action {
            Action::LocalFontReset => self.observer.resize_local_font(0),
            Action::LocalFontBigger => self.observer.resize_local_font(1),
            Action::LocalFontSmaller => self.observer.resize_local_font(-1),
            Action::GlobalFontReset => self.observer.resize_global_font(0),
            Action::GlobalFontBigger => self.observer.resize_global_font(1),
            Action::GlobalFontSmaller => self.observer.resize_global_font(-1),
            Action::CopyToClipboard => {
                let mut text = String::new();
                if self.buffer().selected_text(&mut text) {
                    self.observer.copy(&text, true);
                }
            }
            Action::PasteFromClipboard => self.observer.paste(true),
            Action::ScrollUpOneLine => self.scroll_history_action(1, true),
            Action::ScrollDownOneLine => self.scroll_history_action(1, false),
            Action::ScrollUpOnePage => self.scroll_history_action(self.rows(), true),
            Action::ScrollDownOnePage => self.scroll_history_action(self.rows(), false),
            Action::ScrollTop => {
                if self.pri_buffer.scroll_top_history() {
                    self.fix_damage(Trigger::Other);
                }
            }
            Action::ScrollBottom => {
                if self.pri_buffer.scroll_bottom_history() {
                    self.fix_damage(Trigger::Other);
                }
            }
            Action::ClearHistory => {
                self.pri_buffer.clear_history();
                self.fix_damage(Trigger::Other);
            }
            Action::DebugGlobalTags => self.pri_buffer.deduper().borrow().dump(),
            Action::DebugLocalTags => self.pri_buffer.dump_tags(),
            Action::DebugHistory => self.pri_buffer.dump_history(),
            Action::DebugActive => self.buffer().dump_active(),
            Action::DebugModes => {
                let text = format!("{:?}", self.modes);
                self.observer.set_window_title(&text);
            }
            Action::DebugSelection => self.buffer().dump_selection(),
            Action::DebugStats => {
                let (stored, raw) = self.deduper_stats_bytes();
                let text = format!("line-data={}B (non-dedupe={}B)", stored, raw);
                self.observer.set_window_title(&text);
            }
            Action::DebugStats2 => {
                let (unique, total) = self.deduper_stats();
                let local = self.pri_buffer.history_len();
                let factor = if unique == 0 {
                    0.0
                } else {
                    total as f64 / unique as f64
                };
                let text = format!(
                    "local={} global={} unique={} (dedupe-factor={:.2})",
                    local, total, unique, factor
                );
                self.observer.set_window_title(&text);
            }
        }
    }

    fn deduper_stats(&self) -> (usize, u64) {
        self.pri_buffer.deduper().borrow().stats()
    }

    fn deduper_stats_bytes(&self) -> (usize, u64) {
        self.pri_buffer.deduper().borrow().stats_bytes()
    }

    fn scroll_history_action(&mut self, lines: usize, up: bool) {
        let moved = if up {
            self.pri_buffer.scroll_up_history(lines)
        } else {
            self.pri_buffer.scroll_down_history(lines)
        };
        if moved {
            self.fix_damage(Trigger::Other);
        }
    }

    /// Locally replays written bytes through the interpreter, rendering
    /// C0 controls in caret form.
    fn echo(&mut self, data: &[u8]) {
        let mut rest = data;
        while let Some((&byte, tail)) = rest.split_first() {
            if byte == 0x1B {
                self.interpret_bytes(b"^[");
            } else if byte < 0x20 {
                if byte != 0x0A && byte != 0x0D && byte != 0x09 {
                    self.interpret_bytes(b"^");
                    self.interpret_bytes(&[byte | 0x40]);
                } else {
                    self.interpret_bytes(&[byte]);
                }
            } else {
                break;
            }
            rest = tail;
        }
        if !rest.is_empty() {
            self.interpret_bytes(rest);
        }
        if !self.config.sync_tty {
            self.fix_damage(Trigger::Tty);
        }
    }

    // --- Mouse ---

    pub fn button_press(&mut self, button: MouseButton, count: usize, modifiers: Modifiers, hpos: HPos) {
        self.enter_dispatch();
        debug_assert_eq!(self.press, Press::None);

        let reporting = self.modes.get(TermMode::MOUSE_PRESS_RELEASE);
        if reporting {
            self.send_mouse_report(mouse::press_code(button, modifiers), hpos.pos, false);
            self.press = Press::Report;
        }
        if !reporting || self.modes.get(TermMode::MOUSE_SELECT) {
            match button {
                MouseButton::Left => {
                    if count == 1 {
                        self.buffer_mut().mark_selection(hpos);
                    } else {
                        let delimiters = self.config.word_delimiters.clone();
                        self.buffer_mut().expand_selection(hpos, count, &delimiters);
                    }
                    self.fix_damage(Trigger::Other);
                }
                MouseButton::Middle => self.observer.paste(false),
                MouseButton::Right => {
                    let rectangular = modifiers.contains(Modifiers::ALT);
                    self.buffer_mut().delimit_selection(hpos, rectangular);
                    self.fix_damage(Trigger::Other);
                }
                _ => {}
            }
            self.press = Press::Select;
        }

        self.button = button;
        self.pointer_pos = hpos.pos;
        self.leave_dispatch();
    }

    pub fn pointer_motion(&mut self, modifiers: Modifiers, hpos: HPos) {
        self.enter_dispatch();

        let report_drag = self.press == Press::Report && self.modes.get(TermMode::MOUSE_DRAG);
        let report_motion = self.press == Press::None && self.modes.get(TermMode::MOUSE_MOTION);
        if report_drag || report_motion {
            if hpos.pos != self.pointer_pos {
                self.send_mouse_report(mouse::motion_code(self.button, modifiers), hpos.pos, false);
            }
        } else if self.press == Press::Select
            && matches!(self.button, MouseButton::Left | MouseButton::Right)
        {
            let rectangular = modifiers.contains(Modifiers::ALT);
            self.buffer_mut().delimit_selection(hpos, rectangular);
            self.fix_damage(Trigger::Other);
        }

        self.pointer_pos = hpos.pos;
        self.leave_dispatch();
    }

    pub fn button_release(&mut self, modifiers: Modifiers) {
        self.enter_dispatch();

        let mut report = false;
        match self.press {
            Press::Select => {
                if let Some(selection) = self.buffer_mut().selection_mut() {
                    selection.active = false;
                }
                let mut text = String::new();
                if self.buffer().selected_text(&mut text) {
                    self.observer.copy(&text, false);
                }
                report = self.modes.get(TermMode::MOUSE_SELECT)
                    && self.modes.get(TermMode::MOUSE_PRESS_RELEASE);
            }
            Press::Report => {
                report = self.modes.get(TermMode::MOUSE_PRESS_RELEASE);
            }
            Press::None => {}
        }

        if report {
            let sgr = self.modes.get(TermMode::MOUSE_FORMAT_SGR);
            let code = mouse::release_code(self.button, modifiers, sgr);
            self.send_mouse_report(code, self.pointer_pos, true);
        }

        self.press = Press::None;
        self.leave_dispatch();
    }

    pub fn scroll_wheel(&mut self, dir: ScrollDir, modifiers: Modifiers, pos: Pos) {
        self.enter_dispatch();

        if self.modes.get(TermMode::MOUSE_PRESS_RELEASE) {
            let button = match dir {
                ScrollDir::Up => MouseButton::ScrollUp,
                ScrollDir::Down => MouseButton::ScrollDown,
            };
            self.send_mouse_report(mouse::press_code(button, modifiers), pos, false);
        } else {
            let lines = if modifiers.contains(Modifiers::SHIFT) {
                1
            } else {
                (self.rows() / 4).max(1)
            };
            let moved = match dir {
                ScrollDir::Up => self.pri_buffer.scroll_up_history(lines),
                ScrollDir::Down => self.pri_buffer.scroll_down_history(lines),
            };
            if moved {
                self.fix_damage(Trigger::Other);
            }
        }

        self.leave_dispatch();
    }

    fn send_mouse_report(&mut self, code: u32, pos: Pos, release: bool) {
        let sgr = self.modes.get(TermMode::MOUSE_FORMAT_SGR);
        if let Some(report) = mouse::encode_report(sgr, code, pos, release) {
            self.write_tty(&report);
        }
    }

    // --- Paste, focus, selection ---

    pub fn paste(&mut self, data: &[u8]) {
        self.enter_dispatch();

        if self.config.scroll_on_paste && self.pri_buffer.scroll_bottom_history() {
            self.fix_damage(Trigger::Other);
        }

        if self.modes.get(TermMode::BRACKETED_PASTE) {
            self.write_tty(b"\x1b[200~");
            self.write_tty(data);
            self.write_tty(b"\x1b[201~");
        } else {
            self.write_tty(data);
        }

        self.leave_dispatch();
    }

    pub fn focus_change(&mut self, focused: bool) {
        self.enter_dispatch();

        if self.focused != focused {
            self.focused = focused;
            if self.modes.get(TermMode::FOCUS) {
                self.write_tty(if focused { b"\x1b[I" } else { b"\x1b[O" });
            }
            if self.modes.get(TermMode::SHOW_CURSOR) {
                self.fix_damage(Trigger::Focus);
            }
        }

        self.leave_dispatch();
    }

    pub fn clear_selection(&mut self) {
        self.enter_dispatch();
        self.buffer_mut().clear_selection();
        self.fix_damage(Trigger::Other);
        self.leave_dispatch();
    }

    // --- Resize ---

    /// Resizes the grid. Permitted during dispatch: font-size changes
    /// land here from inside key handling.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        self.pri_buffer.resize_reflow(rows, cols);
        self.alt_buffer.resize_clip(rows, cols);
        self.tabs = default_tabs(cols);
        self.cursor.wrap_next = false;
        self.cursor.pos.row = self.cursor.pos.row.min(rows - 1);
        self.cursor.pos.col = self.cursor.pos.col.min(cols - 1);
        self.tty.resize(rows as u16, cols as u16);
    }

    // --- Draw ---

    /// Full repaint on the host's request.
    pub fn redraw(&mut self) {
        self.enter_dispatch();
        self.fix_damage(Trigger::Client);
        self.leave_dispatch();
    }

    fn fix_damage(&mut self, trigger: Trigger) {
        if trigger == Trigger::Tty && self.config.scroll_on_tty_output {
            self.pri_buffer.scroll_bottom_history();
        }

        if !self.observer.draw_begin() {
            // Deferred; per-line damage stays marked.
            return;
        }
        let (damage, scrollbar) = self.draw(trigger);
        self.observer.draw_end(damage, scrollbar);
    }

    fn draw(&mut self, trigger: Trigger) -> (Region, bool) {
        let reverse = self.modes.get(TermMode::REVERSE);
        let show_cursor = self.modes.get(TermMode::SHOW_CURSOR);
        let cursor_pos = Pos::new(
            self.cursor.pos.row,
            self.cursor.pos.col.min(self.cols() - 1),
        );
        let wrap_next = self.cursor.wrap_next;
        let focused = self.focused;

        let mut damage = Region::default();
        let (buffer, observer) = self.buffer_and_observer();

        if trigger == Trigger::Focus {
            if show_cursor {
                buffer.dispatch_cursor(reverse, cursor_pos, wrap_next, |pos, fg, bg, attrs, bytes, wn| {
                    damage.accommodate_cell(pos);
                    observer.draw_cursor(pos, fg, bg, attrs, bytes, wn, focused);
                });
            }
            return (damage, false);
        }

        if trigger == Trigger::Client {
            buffer.damage_viewport(true);
        }
        buffer.accumulate_damage(&mut damage);
        buffer.dispatch_bg(reverse, |pos, color, count| {
            observer.draw_bg(pos, color, count);
        });
        buffer.dispatch_fg(reverse, |pos, color, attrs, bytes, count| {
            observer.draw_fg(pos, color, attrs, bytes, count);
        });
        if show_cursor {
            buffer.dispatch_cursor(reverse, cursor_pos, wrap_next, |pos, fg, bg, attrs, bytes, wn| {
                observer.draw_cursor(pos, fg, bg, attrs, bytes, wn, focused);
            });
        }

        let scrollbar = buffer.bar_damage();
        if scrollbar {
            let bar = buffer.bar();
            let rows = buffer.rows();
            observer.draw_scrollbar(bar, rows);
        }

        buffer.reset_damage();
        (damage, scrollbar)
    }

    // --- Outbound ---

    fn write_tty(&mut self, data: &[u8]) {
        if let Err(err) = self.tty.write(data) {
            error!("pty write failed: {}", err);
        }
    }
}

/// ANSI-coloured rendition of inbound bytes on stderr, for `trace_tty`.
fn trace_bytes(data: &[u8]) {
    let mut rendered = String::with_capacity(data.len() * 2);
    for &byte in data {
        match byte {
            0x1B => rendered.push_str("\x1b[31mESC\x1b[0m"),
            0x00..=0x1F => {
                rendered.push_str(&format!("\x1b[33m^{}\x1b[0m", (byte | 0x40) as char));
            }
            0x20..=0x7E => rendered.push(byte as char),
            _ => rendered.push_str(&format!("\x1b[35m\\x{:02x}\x1b[0m", byte)),
        }
    }
    eprintln!("{}", rendered);
}

#[cfg(test)]
mod tests;
