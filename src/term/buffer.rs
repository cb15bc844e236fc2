// src/term/buffer.rs

//! The cell buffer: a grid of damage-tracked lines plus scrollback
//! history, margins, a scrolled view, and the selection.
//!
//! The buffer is a pure grid: cursor position, style, charsets, and tab
//! stops live on the interpreter, which passes explicit coordinates to
//! every mutator. Two buffers exist per terminal; only the primary one
//! carries history. Evicted lines are stored as tags into the shared
//! [`Deduper`].

use log::{debug, warn};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::color::{Color, StockColor};
use crate::glyph::{AttrFlags, Cell, Style};
use crate::term::dedupe::{Deduper, Tag};
use crate::term::geometry::{Hand, HPos, Pos, Region};
use crate::term::selection::Selection;
use crate::utf8::Seq;

/// One grid row with its damage range `[damage_begin, damage_end)`.
#[derive(Debug, Clone)]
pub struct Line {
    cells: Vec<Cell>,
    damage_begin: usize,
    damage_end: usize,
    /// True when this line continues the previous one (soft wrap).
    cont: bool,
}

impl Line {
    fn new(cols: usize) -> Self {
        let mut line = Line {
            cells: vec![Cell::blank(); cols],
            damage_begin: 0,
            damage_end: 0,
            cont: false,
        };
        line.damage_all();
        line
    }

    fn from_cells(mut cells: Vec<Cell>, cols: usize, cont: bool) -> Self {
        cells.resize(cols, Cell::blank());
        let mut line = Line {
            cells,
            damage_begin: 0,
            damage_end: 0,
            cont,
        };
        line.damage_all();
        line
    }

    pub fn cols(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, col: usize) -> &Cell {
        &self.cells[col]
    }

    pub fn damage(&self) -> (usize, usize) {
        (self.damage_begin, self.damage_end)
    }

    fn set_cell(&mut self, col: usize, cell: Cell) {
        self.cells[col] = cell;
        self.damage_add(col, col + 1);
    }

    fn insert(&mut self, before_col: usize, n: usize) {
        let cols = self.cols();
        let n = n.min(cols - before_col);
        if n == 0 {
            return;
        }
        self.cells[before_col..].rotate_right(n);
        for cell in &mut self.cells[before_col..before_col + n] {
            *cell = Cell::blank();
        }
        self.damage_add(before_col, cols);
    }

    fn erase(&mut self, col: usize, n: usize) {
        let cols = self.cols();
        let n = n.min(cols - col);
        if n == 0 {
            return;
        }
        self.cells[col..].rotate_left(n);
        for cell in &mut self.cells[cols - n..] {
            *cell = Cell::blank();
        }
        self.damage_add(col, cols);
    }

    /// ECH: blank the text, keep each cell's style.
    fn blank(&mut self, col: usize, n: usize) {
        let end = (col + n).min(self.cols());
        for cell in &mut self.cells[col..end] {
            cell.seq = Seq::space();
        }
        if col < end {
            self.damage_add(col, end);
        }
    }

    fn fill(&mut self, begin: usize, end: usize, cell: Cell) {
        let end = end.min(self.cols());
        if begin >= end {
            return;
        }
        for slot in &mut self.cells[begin..end] {
            *slot = cell;
        }
        self.damage_add(begin, end);
    }

    fn clear(&mut self) {
        let cols = self.cols();
        self.fill(0, cols, Cell::blank());
        self.cont = false;
    }

    fn resize(&mut self, cols: usize) {
        let old = self.cols();
        self.cells.resize(cols, Cell::blank());
        if cols > old {
            self.damage_add(old, cols);
        } else {
            self.damage_begin = self.damage_begin.min(cols);
            self.damage_end = self.damage_end.min(cols);
        }
    }

    fn reset_damage(&mut self) {
        self.damage_begin = 0;
        self.damage_end = 0;
    }

    fn damage_all(&mut self) {
        self.damage_begin = 0;
        self.damage_end = self.cols();
    }

    fn damage_add(&mut self, begin: usize, end: usize) {
        debug_assert!(begin < end && end <= self.cols());
        if self.damage_begin == self.damage_end {
            self.damage_begin = begin;
            self.damage_end = end;
        } else {
            self.damage_begin = self.damage_begin.min(begin);
            self.damage_end = self.damage_end.max(end);
        }
    }
}

/// Scrollbar geometry reported to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarState {
    /// Total line count: history plus screen.
    pub total: usize,
    /// Index of the first visible line within the total.
    pub offset: usize,
}

/// The cell buffer.
pub struct Buffer {
    deduper: Rc<RefCell<Deduper>>,
    /// Evicted lines, oldest first.
    history: VecDeque<Tag>,
    /// The active grid.
    lines: VecDeque<Line>,
    cols: usize,
    margin_begin: usize,
    margin_end: usize,
    /// 0 disables history entirely (the alternate buffer).
    max_history: usize,
    /// Lines scrolled back into history; 0 shows the live screen.
    view_offset: usize,
    /// Set when viewport rows backed by history need redrawing.
    history_damage: bool,
    bar_damage: bool,
    selection: Option<Selection>,
}

impl Buffer {
    pub fn new(deduper: Rc<RefCell<Deduper>>, rows: usize, cols: usize, max_history: usize) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Buffer {
            deduper,
            history: VecDeque::new(),
            lines: (0..rows).map(|_| Line::new(cols)).collect(),
            cols,
            margin_begin: 0,
            margin_end: rows,
            max_history,
            view_offset: 0,
            history_damage: false,
            bar_damage: false,
            selection: None,
        }
    }

    // --- Accessors ---

    pub fn rows(&self) -> usize {
        self.lines.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn margin_begin(&self) -> usize {
        self.margin_begin
    }

    pub fn margin_end(&self) -> usize {
        self.margin_end
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn view_offset(&self) -> usize {
        self.view_offset
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.lines[row].cell(col)
    }

    /// The text of an active row, for debug dumps and tests.
    pub fn line_text(&self, row: usize) -> String {
        self.lines[row].cells.iter().map(|c| c.seq.to_char()).collect()
    }

    pub fn line_cont(&self, row: usize) -> bool {
        self.lines[row].cont
    }

    // --- Margins ---

    pub fn set_margins(&mut self, begin: usize, end: usize) {
        if begin < end && end <= self.rows() {
            self.margin_begin = begin;
            self.margin_end = end;
        } else {
            warn!("invalid margins ({}, {}) for {} rows, using full screen", begin, end, self.rows());
            self.reset_margins();
        }
    }

    pub fn reset_margins(&mut self) {
        self.margin_begin = 0;
        self.margin_end = self.rows();
    }

    // --- Cell mutation ---

    pub fn set_cell(&mut self, row: usize, col: usize, cell: Cell) {
        self.lines[row].set_cell(col, cell);
    }

    /// Marks whether the line wraps into the next (set by the interpreter
    /// when a printable triggered an auto-wrap).
    pub fn set_cont(&mut self, row: usize, cont: bool) {
        self.lines[row].cont = cont;
    }

    pub fn insert_cells(&mut self, row: usize, col: usize, n: usize) {
        self.lines[row].insert(col, n);
    }

    pub fn erase_cells(&mut self, row: usize, col: usize, n: usize) {
        self.lines[row].erase(col, n);
    }

    pub fn blank_cells(&mut self, row: usize, col: usize, n: usize) {
        self.lines[row].blank(col, n);
    }

    pub fn clear_line_right(&mut self, row: usize, col: usize) {
        let cols = self.cols;
        self.lines[row].fill(col, cols, Cell::blank());
    }

    pub fn clear_line_left(&mut self, row: usize, col: usize) {
        self.lines[row].fill(0, col + 1, Cell::blank());
    }

    pub fn clear_line(&mut self, row: usize) {
        self.lines[row].clear();
    }

    pub fn clear_below(&mut self, row: usize, col: usize) {
        self.clear_line_right(row, col);
        for r in row + 1..self.rows() {
            self.lines[r].clear();
        }
    }

    pub fn clear_above(&mut self, row: usize, col: usize) {
        for r in 0..row {
            self.lines[r].clear();
        }
        self.clear_line_left(row, col);
    }

    pub fn clear(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
    }

    /// DECALN: fill the screen with `E`.
    pub fn test_pattern(&mut self) {
        let cols = self.cols;
        for line in &mut self.lines {
            line.fill(0, cols, Cell::ascii(b'E', Style::normal()));
            line.cont = false;
        }
    }

    // --- Line scrolling within margins ---

    /// Scrolls the margin region up one line; on the primary buffer with
    /// the margin at the top of the screen, the evicted line moves to
    /// history.
    pub fn add_line(&mut self) {
        self.scroll_up_margins(1);
    }

    pub fn scroll_up_margins(&mut self, n: usize) {
        let span = self.margin_end - self.margin_begin;
        let n = n.min(span);
        for _ in 0..n {
            let evicted = self.lines.remove(self.margin_begin).expect("margin row in range");
            if self.margin_begin == 0 && self.max_history > 0 {
                self.push_history(evicted);
            }
            self.lines.insert(self.margin_end - 1, Line::new(self.cols));
        }
        if n > 0 {
            self.damage_margin_region();
        }
    }

    pub fn scroll_down_margins(&mut self, n: usize) {
        let span = self.margin_end - self.margin_begin;
        let n = n.min(span);
        for _ in 0..n {
            self.lines.remove(self.margin_end - 1);
            self.lines.insert(self.margin_begin, Line::new(self.cols));
        }
        if n > 0 {
            self.damage_margin_region();
        }
    }

    /// IL: insert blank lines before `before_row`, pushing lines toward
    /// the bottom margin.
    pub fn insert_lines(&mut self, before_row: usize, n: usize) {
        if before_row < self.margin_begin || before_row >= self.margin_end {
            return;
        }
        let n = n.min(self.margin_end - before_row);
        for _ in 0..n {
            self.lines.remove(self.margin_end - 1);
            self.lines.insert(before_row, Line::new(self.cols));
        }
        if n > 0 {
            self.damage_margin_region();
        }
    }

    /// DL: delete lines starting at `row`, pulling lines up from the
    /// bottom margin.
    pub fn erase_lines(&mut self, row: usize, n: usize) {
        if row < self.margin_begin || row >= self.margin_end {
            return;
        }
        let n = n.min(self.margin_end - row);
        for _ in 0..n {
            self.lines.remove(row);
            self.lines.insert(self.margin_end - 1, Line::new(self.cols));
        }
        if n > 0 {
            self.damage_margin_region();
        }
    }

    fn damage_margin_region(&mut self) {
        for row in self.margin_begin..self.margin_end {
            self.lines[row].damage_all();
        }
    }

    fn push_history(&mut self, line: Line) {
        let tag = self.deduper.borrow_mut().store(line.cells, line.cont);
        self.history.push_back(tag);
        self.bar_damage = true;
        // Keep a scrolled-back view anchored on the same content.
        if self.view_offset > 0 {
            self.view_offset = (self.view_offset + 1).min(self.history.len());
            self.history_damage = true;
        }
        while self.history.len() > self.max_history {
            let evicted = self.history.pop_front().expect("non-empty history");
            self.deduper.borrow_mut().release(evicted);
            self.shift_selection_for_eviction();
        }
    }

    fn shift_selection_for_eviction(&mut self) {
        let clear = match self.selection.as_mut() {
            None => return,
            Some(selection) => {
                if selection.anchor.pos.row == 0 || selection.head.pos.row == 0 {
                    true
                } else {
                    selection.anchor.pos.row -= 1;
                    selection.head.pos.row -= 1;
                    false
                }
            }
        };
        if clear {
            self.selection = None;
            self.damage_viewport(false);
        }
    }

    // --- History view ---

    pub fn scroll_up_history(&mut self, n: usize) -> bool {
        let target = (self.view_offset + n).min(self.history.len());
        self.set_view_offset(target)
    }

    pub fn scroll_down_history(&mut self, n: usize) -> bool {
        let target = self.view_offset.saturating_sub(n);
        self.set_view_offset(target)
    }

    pub fn scroll_top_history(&mut self) -> bool {
        self.set_view_offset(self.history.len())
    }

    pub fn scroll_bottom_history(&mut self) -> bool {
        self.set_view_offset(0)
    }

    fn set_view_offset(&mut self, offset: usize) -> bool {
        if offset == self.view_offset {
            return false;
        }
        self.view_offset = offset;
        self.damage_viewport(true);
        true
    }

    pub fn clear_history(&mut self) {
        let mut deduper = self.deduper.borrow_mut();
        for &tag in &self.history {
            deduper.release(tag);
        }
        drop(deduper);
        self.history.clear();
        self.view_offset = 0;
        self.selection = None;
        self.bar_damage = true;
        self.history_damage = true;
    }

    /// Full reset: grid, history, margins, selection.
    pub fn reset(&mut self) {
        self.clear_history();
        self.clear();
        self.reset_margins();
        self.damage_viewport(true);
    }

    /// Called on the buffer being switched to. With `clear` (modes
    /// 1047/1049) the destination grid is wiped first.
    pub fn activate(&mut self, clear: bool) {
        if clear {
            self.clear();
        }
        self.damage_viewport(true);
    }

    // --- Resize ---

    /// Alternate-screen resize: truncate or pad, never reflow, never
    /// produce history.
    pub fn resize_clip(&mut self, rows: usize, cols: usize) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        self.selection = None;
        if rows < self.rows() {
            self.lines.truncate(rows);
        }
        while self.rows() < rows {
            self.lines.push_back(Line::new(cols));
        }
        if cols != self.cols {
            for line in &mut self.lines {
                line.resize(cols);
            }
            self.cols = cols;
        }
        self.margin_begin = 0;
        self.margin_end = rows;
        self.view_offset = 0;
        self.damage_viewport(true);
    }

    /// Primary-screen resize: soft-wrapped paragraphs are re-flowed at the
    /// new width, history included.
    pub fn resize_reflow(&mut self, rows: usize, cols: usize) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        self.selection = None;

        // Unwrap everything into logical paragraphs.
        let mut paragraphs: Vec<Vec<Cell>> = Vec::new();
        {
            let mut deduper = self.deduper.borrow_mut();
            for &tag in &self.history {
                let cells = deduper.lookup(tag).to_vec();
                let cont = deduper.lookup_cont(tag);
                append_unwrapped(&mut paragraphs, cells, cont);
                deduper.release(tag);
            }
        }
        self.history.clear();
        for line in std::mem::take(&mut self.lines) {
            let cont = line.cont;
            append_unwrapped(&mut paragraphs, line.cells, cont);
        }

        // A paragraph's trailing blanks are padding from its last
        // physical line; shed them before re-wrapping. Fully blank
        // trailing paragraphs are screen padding, dropped entirely.
        for paragraph in &mut paragraphs {
            while paragraph.last().is_some_and(Cell::is_blank) {
                paragraph.pop();
            }
        }
        while paragraphs.last().is_some_and(|p| p.is_empty()) {
            paragraphs.pop();
        }

        // Re-wrap at the new width.
        let mut wrapped: Vec<Line> = Vec::new();
        for paragraph in paragraphs {
            if paragraph.is_empty() {
                wrapped.push(Line::new(cols));
                continue;
            }
            let mut first = true;
            for chunk in paragraph.chunks(cols) {
                let mut line = Line::from_cells(chunk.to_vec(), cols, !first);
                line.damage_all();
                wrapped.push(line);
                first = false;
            }
        }

        // The last `rows` lines fill the screen; the overflow becomes
        // history again.
        if wrapped.len() > rows {
            let overflow = wrapped.len() - rows;
            let mut deduper = self.deduper.borrow_mut();
            for line in wrapped.drain(..overflow) {
                let tag = deduper.store(line.cells, line.cont);
                self.history.push_back(tag);
            }
            drop(deduper);
            while self.history.len() > self.max_history {
                let evicted = self.history.pop_front().expect("non-empty history");
                self.deduper.borrow_mut().release(evicted);
            }
        }
        self.lines = wrapped.into();
        while self.rows() < rows {
            self.lines.push_back(Line::new(cols));
        }

        self.cols = cols;
        self.margin_begin = 0;
        self.margin_end = rows;
        self.view_offset = 0;
        self.bar_damage = true;
        self.damage_viewport(true);
        debug!("reflowed to {}x{}, history {} lines", rows, cols, self.history.len());
    }

    // --- Selection ---

    fn abs_row(&self, viewport_row: usize) -> usize {
        self.history.len() - self.view_offset + viewport_row
    }

    pub fn mark_selection(&mut self, hpos: HPos) {
        self.damage_selection();
        let abs = HPos {
            pos: Pos::new(self.abs_row(hpos.pos.row), hpos.pos.col),
            hand: hpos.hand,
        };
        self.selection = Some(Selection::at(abs));
    }

    /// Double / triple click: expand to the word or line under the
    /// position.
    pub fn expand_selection(&mut self, hpos: HPos, count: usize, delimiters: &str) {
        self.damage_selection();
        let row = self.abs_row(hpos.pos.row);
        let cols = self.cols;
        let (begin, end) = if count >= 3 {
            (0, cols.saturating_sub(1))
        } else {
            self.word_bounds(row, hpos.pos.col.min(cols.saturating_sub(1)), delimiters)
        };
        self.selection = Some(Selection {
            anchor: HPos::new(row, begin, Hand::Left),
            head: HPos::new(row, end, Hand::Right),
            rectangular: false,
            active: true,
        });
        self.damage_selection();
    }

    fn word_bounds(&self, abs_row: usize, col: usize, delimiters: &str) -> (usize, usize) {
        let cells = self.resolve_row(abs_row);
        let is_delim = |cell: &Cell| delimiters.contains(cell.seq.to_char());
        if cells.is_empty() || is_delim(&cells[col.min(cells.len() - 1)]) {
            return (col, col);
        }
        let mut begin = col;
        while begin > 0 && !is_delim(&cells[begin - 1]) {
            begin -= 1;
        }
        let mut end = col;
        while end + 1 < cells.len() && !is_delim(&cells[end + 1]) {
            end += 1;
        }
        (begin, end)
    }

    /// Extends the selection during a drag.
    pub fn delimit_selection(&mut self, hpos: HPos, rectangular: bool) {
        self.damage_selection();
        let abs = HPos {
            pos: Pos::new(self.abs_row(hpos.pos.row), hpos.pos.col),
            hand: hpos.hand,
        };
        match &mut self.selection {
            Some(selection) => {
                selection.head = abs;
                selection.rectangular = rectangular;
            }
            None => {
                let mut selection = Selection::at(abs);
                selection.rectangular = rectangular;
                self.selection = Some(selection);
            }
        }
        self.damage_selection();
    }

    pub fn clear_selection(&mut self) {
        self.damage_selection();
        self.selection = None;
    }

    fn damage_selection(&mut self) {
        let Some(selection) = self.selection else {
            return;
        };
        let (first, last) = selection.row_range();
        let history_len = self.history.len();
        let base = history_len - self.view_offset;
        for viewport_row in 0..self.rows() {
            let abs = base + viewport_row;
            if abs >= first && abs <= last {
                if viewport_row < self.view_offset {
                    self.history_damage = true;
                } else {
                    self.lines[viewport_row - self.view_offset].damage_all();
                }
            }
        }
    }

    fn resolve_row(&self, abs_row: usize) -> Vec<Cell> {
        if abs_row < self.history.len() {
            self.deduper.borrow().lookup(self.history[abs_row]).to_vec()
        } else {
            self.lines[abs_row - self.history.len()].cells.clone()
        }
    }

    fn resolve_row_cont(&self, abs_row: usize) -> bool {
        if abs_row < self.history.len() {
            self.deduper.borrow().lookup_cont(self.history[abs_row])
        } else {
            self.lines[abs_row - self.history.len()].cont
        }
    }

    /// Appends the selected text to `out`; returns false when there is no
    /// non-empty selection.
    pub fn selected_text(&self, out: &mut String) -> bool {
        let Some(selection) = self.selection else {
            return false;
        };
        if selection.is_empty() {
            return false;
        }

        let (first, last) = selection.row_range();
        let total = self.history.len() + self.rows();
        let mut wrote = false;
        for abs_row in first..=last.min(total.saturating_sub(1)) {
            let cells = self.resolve_row(abs_row);
            let line_cols = cells.len().max(self.cols);
            let Some((begin, span_end)) = selection.line_span(abs_row, line_cols) else {
                continue;
            };
            let end = span_end.min(cells.len());
            let begin = begin.min(end);
            let mut text: String = cells[begin..end].iter().map(|c| c.seq.to_char()).collect();
            // Strip trailing blanks when the selection ran to the line end.
            if span_end >= cells.len() || span_end >= self.cols {
                while text.ends_with(' ') {
                    text.pop();
                }
            }
            if wrote {
                // Soft-wrapped lines rejoin without the newline.
                let joins_wrap = !selection.rectangular && self.resolve_row_cont(abs_row);
                if !joins_wrap {
                    out.push('\n');
                }
            }
            out.push_str(&text);
            wrote = true;
        }
        wrote
    }

    fn viewport_selection_span(&self, viewport_row: usize) -> Option<(usize, usize)> {
        let selection = self.selection?;
        if selection.is_empty() {
            return None;
        }
        selection.line_span(self.abs_row(viewport_row), self.cols)
    }

    // --- Damage and draw dispatch ---

    /// Marks the whole viewport damaged; with `all` the scrollbar is
    /// damaged too.
    pub fn damage_viewport(&mut self, all: bool) {
        for line in &mut self.lines {
            line.damage_all();
        }
        self.history_damage = true;
        if all {
            self.bar_damage = true;
        }
    }

    /// Unions per-line damage into a single region, in viewport
    /// coordinates.
    pub fn accumulate_damage(&self, damage: &mut Region) {
        for viewport_row in 0..self.rows() {
            if viewport_row < self.view_offset {
                if self.history_damage {
                    damage.accommodate_span(viewport_row, 0, self.cols);
                }
            } else {
                let (begin, end) = self.lines[viewport_row - self.view_offset].damage();
                if begin != end {
                    damage.accommodate_span(viewport_row, begin, end);
                }
            }
        }
    }

    pub fn reset_damage(&mut self) {
        for line in &mut self.lines {
            line.reset_damage();
        }
        self.history_damage = false;
        self.bar_damage = false;
    }

    /// Viewport row -> cells, borrowing history through the deduper.
    fn with_viewport_row<R>(&self, viewport_row: usize, f: impl FnOnce(&[Cell], (usize, usize)) -> R) -> R {
        if viewport_row < self.view_offset {
            let abs = self.history.len() - self.view_offset + viewport_row;
            let damage = if self.history_damage { (0, self.cols) } else { (0, 0) };
            let deduper = self.deduper.borrow();
            f(deduper.lookup(self.history[abs]), damage)
        } else {
            let line = &self.lines[viewport_row - self.view_offset];
            f(&line.cells, line.damage())
        }
    }

    /// Emits contiguous runs of equal background colour across the damaged
    /// parts of the viewport.
    pub fn dispatch_bg(&self, reverse: bool, mut callback: impl FnMut(Pos, Color, usize)) {
        for viewport_row in 0..self.rows() {
            let span = self.viewport_selection_span(viewport_row);
            self.with_viewport_row(viewport_row, |cells, (begin, end)| {
                if begin == end {
                    return;
                }
                let mut run_begin = begin;
                let mut run_color: Option<Color> = None;
                for col in begin..end {
                    let cell = cells.get(col).copied().unwrap_or_else(Cell::blank);
                    let selected = span.is_some_and(|(b, e)| col >= b && col < e);
                    let (_, bg) = resolve_colors(&cell, reverse, selected);
                    match run_color {
                        Some(color) if color == bg => {}
                        Some(color) => {
                            callback(Pos::new(viewport_row, run_begin), color, col - run_begin);
                            run_begin = col;
                            run_color = Some(bg);
                        }
                        None => run_color = Some(bg),
                    }
                }
                if let Some(color) = run_color {
                    callback(Pos::new(viewport_row, run_begin), color, end - run_begin);
                }
            });
        }
    }

    /// Emits contiguous runs of non-blank cells sharing (fg, attrs). The
    /// callback receives the concatenated UTF-8 bytes and the cell count.
    pub fn dispatch_fg(
        &self,
        reverse: bool,
        mut callback: impl FnMut(Pos, Color, AttrFlags, &[u8], usize),
    ) {
        let mut bytes: Vec<u8> = Vec::with_capacity(self.cols * 4);
        for viewport_row in 0..self.rows() {
            let span = self.viewport_selection_span(viewport_row);
            self.with_viewport_row(viewport_row, |cells, (begin, end)| {
                let mut run: Option<(usize, Color, AttrFlags, usize)> = None;
                bytes.clear();
                for col in begin..end {
                    let cell = cells.get(col).copied().unwrap_or_else(Cell::blank);
                    let selected = span.is_some_and(|(b, e)| col >= b && col < e);
                    let (fg, _) = resolve_colors(&cell, reverse, selected);
                    let attrs = cell.style.attrs;
                    let blank = cell.is_blank();
                    match run {
                        Some((run_begin, run_fg, run_attrs, count))
                            if !blank && run_fg == fg && run_attrs == attrs =>
                        {
                            bytes.extend_from_slice(cell.seq.as_bytes());
                            run = Some((run_begin, run_fg, run_attrs, count + 1));
                        }
                        Some((run_begin, run_fg, run_attrs, count)) => {
                            callback(Pos::new(viewport_row, run_begin), run_fg, run_attrs, &bytes, count);
                            bytes.clear();
                            run = None;
                            if !blank {
                                bytes.extend_from_slice(cell.seq.as_bytes());
                                run = Some((col, fg, attrs, 1));
                            }
                        }
                        None if !blank => {
                            bytes.extend_from_slice(cell.seq.as_bytes());
                            run = Some((col, fg, attrs, 1));
                        }
                        None => {}
                    }
                }
                if let Some((run_begin, run_fg, run_attrs, count)) = run {
                    callback(Pos::new(viewport_row, run_begin), run_fg, run_attrs, &bytes, count);
                }
            });
        }
    }

    /// Emits the cursor cell. `pos` is the cursor's position on the live
    /// screen; nothing is emitted when the cursor has scrolled out of the
    /// viewport.
    pub fn dispatch_cursor(
        &self,
        _reverse: bool,
        pos: Pos,
        wrap_next: bool,
        mut callback: impl FnMut(Pos, Color, Color, AttrFlags, &[u8], bool),
    ) {
        let viewport_row = pos.row + self.view_offset;
        if viewport_row >= self.rows() || pos.col >= self.cols {
            return;
        }
        let cell = *self.cell(pos.row, pos.col);
        callback(
            Pos::new(viewport_row, pos.col),
            Color::Stock(StockColor::CursorText),
            Color::Stock(StockColor::CursorFill),
            cell.style.attrs,
            cell.seq.as_bytes(),
            wrap_next,
        );
    }

    // --- Scrollbar ---

    pub fn bar_damage(&self) -> bool {
        self.bar_damage
    }

    pub fn bar(&self) -> BarState {
        BarState {
            total: self.history.len() + self.rows(),
            offset: self.history.len() - self.view_offset,
        }
    }

    // --- Debug dumps ---

    pub fn dump_active(&self) {
        for row in 0..self.rows() {
            debug!("{:3} |{}|", row, self.line_text(row).trim_end());
        }
    }

    pub fn dump_history(&self) {
        let deduper = self.deduper.borrow();
        for (i, &tag) in self.history.iter().enumerate() {
            let text: String = deduper.lookup(tag).iter().map(|c| c.seq.to_char()).collect();
            debug!("{:5} {:#018x} |{}|", i, tag, text.trim_end());
        }
    }

    pub fn dump_tags(&self) {
        for &tag in &self.history {
            debug!("tag {:#018x} refs={}", tag, self.deduper.borrow().refs(tag));
        }
    }

    pub fn dump_selection(&self) {
        debug!("selection: {:?}", self.selection);
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn deduper(&self) -> &Rc<RefCell<Deduper>> {
        &self.deduper
    }

    pub fn selection_mut(&mut self) -> Option<&mut Selection> {
        self.selection.as_mut()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let mut deduper = self.deduper.borrow_mut();
        for &tag in &self.history {
            deduper.release(tag);
        }
    }
}

/// Splits a stored physical line back into the paragraph stream used by
/// reflow: a continuation line joins the previous paragraph.
fn append_unwrapped(paragraphs: &mut Vec<Vec<Cell>>, mut cells: Vec<Cell>, cont: bool) {
    if cont {
        if let Some(last) = paragraphs.last_mut() {
            last.append(&mut cells);
            return;
        }
    }
    paragraphs.push(cells);
}

/// Resolved (fg, bg) for a cell, honouring INVERSE, global reverse video,
/// and selection highlight.
fn resolve_colors(cell: &Cell, reverse: bool, selected: bool) -> (Color, Color) {
    let mut fg = cell.style.fg;
    let mut bg = cell.style.bg;
    if cell.style.attrs.contains(AttrFlags::INVERSE) {
        std::mem::swap(&mut fg, &mut bg);
    }
    if reverse {
        std::mem::swap(&mut fg, &mut bg);
    }
    if selected {
        fg = Color::Stock(StockColor::SelectFg);
        bg = Color::Stock(StockColor::SelectBg);
    }
    (fg, bg)
}
