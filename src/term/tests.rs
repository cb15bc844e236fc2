// src/term/tests.rs

use std::cell::RefCell;
use std::rc::Rc;

use test_log::test;

use super::buffer::BarState;
use super::dedupe::Deduper;
use super::geometry::{Hand, HPos, Pos, Region};
use super::mouse::MouseButton;
use super::observer::Observer;
use super::{ScrollDir, Terminal};
use crate::color::Color;
use crate::config::Config;
use crate::glyph::AttrFlags;
use crate::io::NullTty;
use crate::keys::{KeySymbol, Modifiers};
use crate::term::modes::TermMode;

/// Records every observer callback for assertions.
#[derive(Default)]
struct Recorder {
    beeps: usize,
    titles: Vec<String>,
    icons: Vec<String>,
    title_resets: usize,
    copies: Vec<(String, bool)>,
    paste_requests: Vec<bool>,
    display_name: String,
    resize_requests: Vec<(usize, usize)>,
    exited: Option<i32>,
    local_font: Vec<i32>,

    defer_draw: bool,
    draw_begins: usize,
    bg_runs: Vec<(Pos, Color, usize)>,
    fg_runs: Vec<(Pos, String, usize)>,
    cursor_draws: Vec<(Pos, bool, bool)>,
    scrollbars: Vec<(BarState, usize)>,
    damage_regions: Vec<(Region, bool)>,
}

impl Recorder {
    fn clear_draws(&mut self) {
        self.bg_runs.clear();
        self.fg_runs.clear();
        self.cursor_draws.clear();
        self.scrollbars.clear();
        self.damage_regions.clear();
    }
}

impl Observer for Recorder {
    fn beep(&mut self) {
        self.beeps += 1;
    }

    fn resize_local_font(&mut self, delta: i32) {
        self.local_font.push(delta);
    }

    fn copy(&mut self, text: &str, clipboard: bool) {
        self.copies.push((text.to_owned(), clipboard));
    }

    fn paste(&mut self, clipboard: bool) {
        self.paste_requests.push(clipboard);
    }

    fn set_window_title(&mut self, title: &str) {
        self.titles.push(title.to_owned());
    }

    fn set_icon_name(&mut self, name: &str) {
        self.icons.push(name.to_owned());
    }

    fn reset_title_and_icon(&mut self) {
        self.title_resets += 1;
    }

    fn get_display(&mut self, out: &mut String) {
        out.push_str(&self.display_name);
    }

    fn resize_buffer(&mut self, rows: usize, cols: usize) {
        self.resize_requests.push((rows, cols));
    }

    fn child_exited(&mut self, exit_code: i32) {
        self.exited = Some(exit_code);
    }

    fn draw_begin(&mut self) -> bool {
        self.draw_begins += 1;
        !self.defer_draw
    }

    fn draw_bg(&mut self, pos: Pos, color: Color, count: usize) {
        self.bg_runs.push((pos, color, count));
    }

    fn draw_fg(&mut self, pos: Pos, _color: Color, _attrs: AttrFlags, bytes: &[u8], count: usize) {
        self.fg_runs
            .push((pos, String::from_utf8_lossy(bytes).into_owned(), count));
    }

    fn draw_cursor(
        &mut self,
        pos: Pos,
        _fg: Color,
        _bg: Color,
        _attrs: AttrFlags,
        _bytes: &[u8],
        wrap_next: bool,
        focused: bool,
    ) {
        self.cursor_draws.push((pos, wrap_next, focused));
    }

    fn draw_scrollbar(&mut self, bar: BarState, rows: usize) {
        self.scrollbars.push((bar, rows));
    }

    fn draw_end(&mut self, damage: Region, scrollbar_dirty: bool) {
        self.damage_regions.push((damage, scrollbar_dirty));
    }
}

type TestTerm = Terminal<Recorder, NullTty>;

fn make_term(rows: usize, cols: usize) -> TestTerm {
    make_term_with(rows, cols, Config::default())
}

fn make_term_with(rows: usize, cols: usize, config: Config) -> TestTerm {
    let deduper = Rc::new(RefCell::new(Deduper::new()));
    Terminal::new(config, deduper, rows, cols, Recorder::default(), NullTty::default())
}

fn written(term: &TestTerm) -> &[u8] {
    &term.tty().written
}

// --- Plain text and CRLF ---

#[test]
fn plain_text_and_crlf() {
    let mut term = make_term(3, 10);
    term.redraw();
    term.observer_mut().clear_draws();

    term.tty_data(b"Hi\r\n");
    assert_eq!(term.line_text(0), "Hi        ");
    assert_eq!(term.cursor_pos(), (1, 0));

    term.tty_sync();
    let (damage, _) = *term.observer().damage_regions.last().unwrap();
    assert_eq!(damage.begin, Pos::new(0, 0));
    assert_eq!(damage.end, Pos::new(1, 2));
    assert_eq!(
        term.observer().fg_runs,
        vec![(Pos::new(0, 0), "Hi".to_owned(), 2)]
    );
}

// --- SGR colour application ---

#[test]
fn sgr_colours_apply_per_cell() {
    let mut term = make_term(1, 10);
    term.tty_data(b"\x1b[31mA\x1b[0mB");
    assert_eq!(term.cell(0, 0).seq.to_char(), 'A');
    assert_eq!(term.cell(0, 0).style.fg, Color::Indexed(1));
    assert_eq!(term.cell(0, 1).seq.to_char(), 'B');
    assert_eq!(term.cell(0, 1).style.fg, Color::text_fg());
}

// --- Origin mode ---

#[test]
fn origin_mode_confines_home() {
    let mut term = make_term(5, 10);
    term.tty_data(b"\x1b[2;4r\x1b[HX");
    assert_eq!(term.cursor_pos(), (0, 1));
    assert_eq!(term.cell(0, 0).seq.to_char(), 'X');

    let mut term = make_term(5, 10);
    term.tty_data(b"\x1b[?6h\x1b[2;4r\x1b[HX");
    assert_eq!(term.cell(1, 0).seq.to_char(), 'X');
}

// --- Cursor visibility ---

#[test]
fn hidden_cursor_is_not_drawn() {
    let mut term = make_term(2, 10);
    term.tty_data(b"\x1b[?25l");
    assert!(!term.modes().get(TermMode::SHOW_CURSOR));
    term.observer_mut().clear_draws();
    term.redraw();
    assert!(term.observer().cursor_draws.is_empty());

    term.tty_data(b"\x1b[?25h");
    term.observer_mut().clear_draws();
    term.redraw();
    assert_eq!(term.observer().cursor_draws.len(), 1);
}

// --- AppCursor key encoding ---

#[test]
fn cursor_keys_follow_appcursor_mode() {
    let mut term = make_term(2, 10);
    assert!(term.key_press(KeySymbol::Up, Modifiers::empty()));
    assert_eq!(written(&term), b"\x1b[A");

    let mut term = make_term(2, 10);
    term.tty_data(b"\x1b[?1h");
    assert!(term.key_press(KeySymbol::Up, Modifiers::empty()));
    assert_eq!(written(&term), b"\x1bOA");
}

// --- Bracketed paste ---

#[test]
fn bracketed_paste_wraps_payload() {
    let mut term = make_term(2, 10);
    term.tty_data(b"\x1b[?2004h");
    term.paste(b"abc");
    assert_eq!(written(&term), b"\x1b[200~abc\x1b[201~");

    let mut term = make_term(2, 10);
    term.paste(b"abc");
    assert_eq!(written(&term), b"abc");
}

// --- Wrap behaviour ---

#[test]
fn wrap_next_latches_at_last_column() {
    let mut term = make_term(3, 4);
    term.tty_data(b"abcd");
    assert!(term.wrap_next());
    assert_eq!(term.cursor_pos(), (0, 4));
    assert_eq!(term.line_text(0), "abcd");

    term.tty_data(b"e");
    assert!(!term.wrap_next());
    assert_eq!(term.cursor_pos(), (1, 1));
    assert_eq!(term.cell(1, 0).seq.to_char(), 'e');
}

#[test]
fn wrap_disabled_overwrites_last_column() {
    let mut term = make_term(2, 4);
    term.tty_data(b"\x1b[?7l");
    term.tty_data(b"abcdef");
    assert_eq!(term.line_text(0), "abcf");
    assert_eq!(term.line_text(1), "    ");
}

#[test]
fn wrap_scrolls_at_margin_bottom() {
    let mut term = make_term(2, 3);
    term.tty_data(b"abcdef");
    // "abc" wrapped into "def" on row 1; one more char scrolls.
    assert!(term.wrap_next());
    term.tty_data(b"g");
    assert_eq!(term.line_text(0), "def");
    assert_eq!(term.line_text(1), "g  ");
    assert_eq!(term.history_len(), 1);
}

#[test]
fn backspace_clears_wrap_next() {
    let mut term = make_term(1, 3);
    term.tty_data(b"abc");
    assert!(term.wrap_next());
    term.tty_data(b"\x08");
    assert!(!term.wrap_next());
    assert_eq!(term.cursor_pos(), (0, 2));
    term.tty_data(b"\x08\x08\x08");
    assert_eq!(term.cursor_pos(), (0, 0));
}

// --- Cursor movement ---

#[test]
fn cursor_movement_family() {
    let mut term = make_term(10, 20);
    term.tty_data(b"\x1b[5;8H");
    assert_eq!(term.cursor_pos(), (4, 7));
    term.tty_data(b"\x1b[2A");
    assert_eq!(term.cursor_pos(), (2, 7));
    term.tty_data(b"\x1b[3B");
    assert_eq!(term.cursor_pos(), (5, 7));
    term.tty_data(b"\x1b[4C");
    assert_eq!(term.cursor_pos(), (5, 11));
    term.tty_data(b"\x1b[11D");
    assert_eq!(term.cursor_pos(), (5, 0));
    term.tty_data(b"\x1b[2E");
    assert_eq!(term.cursor_pos(), (7, 0));
    term.tty_data(b"\x1b[F");
    assert_eq!(term.cursor_pos(), (6, 0));
    term.tty_data(b"\x1b[9G");
    assert_eq!(term.cursor_pos(), (6, 8));
    term.tty_data(b"\x1b[3d");
    assert_eq!(term.cursor_pos(), (2, 8));
    term.tty_data(b"\x1b[2e");
    assert_eq!(term.cursor_pos(), (4, 8));
    term.tty_data(b"\x1b[3`");
    assert_eq!(term.cursor_pos(), (4, 2));
    term.tty_data(b"\x1b[5a");
    assert_eq!(term.cursor_pos(), (4, 7));
}

#[test]
fn cursor_clamps_at_edges() {
    let mut term = make_term(3, 5);
    term.tty_data(b"\x1b[99;99H");
    assert_eq!(term.cursor_pos(), (2, 4));
    term.tty_data(b"\x1b[99A\x1b[99D");
    assert_eq!(term.cursor_pos(), (0, 0));
}

#[test]
fn relative_moves_stop_at_margins() {
    let mut term = make_term(10, 10);
    term.tty_data(b"\x1b[3;6r");
    // DECSTBM homes the cursor; move inside the region.
    term.tty_data(b"\x1b[4;1H");
    term.tty_data(b"\x1b[99B");
    assert_eq!(term.cursor_pos(), (5, 0));
    term.tty_data(b"\x1b[99A");
    assert_eq!(term.cursor_pos(), (2, 0));
}

// --- Erase and edit ---

#[test]
fn erase_in_line_variants() {
    let mut term = make_term(1, 6);
    term.tty_data(b"abcdef\x1b[4G");
    term.tty_data(b"\x1b[K");
    assert_eq!(term.line_text(0), "abc   ");

    let mut term = make_term(1, 6);
    term.tty_data(b"abcdef\x1b[4G\x1b[1K");
    assert_eq!(term.line_text(0), "    ef");

    let mut term = make_term(1, 6);
    term.tty_data(b"abcdef\x1b[2K");
    assert_eq!(term.line_text(0), "      ");
}

#[test]
fn erase_in_display_variants() {
    let mut term = make_term(3, 3);
    term.tty_data(b"aaa" );
    term.tty_data(b"\x1b[2;1Hbbb");
    term.tty_data(b"\x1b[3;1Hccc");
    term.tty_data(b"\x1b[2;2H\x1b[J");
    assert_eq!(term.line_text(0), "aaa");
    assert_eq!(term.line_text(1), "b  ");
    assert_eq!(term.line_text(2), "   ");

    term.tty_data(b"\x1b[1;1Haaa\x1b[2;1Hbbb\x1b[3;1Hccc");
    term.tty_data(b"\x1b[2;2H\x1b[1J");
    assert_eq!(term.line_text(0), "   ");
    assert_eq!(term.line_text(1), "  b");
    assert_eq!(term.line_text(2), "ccc");
}

#[test]
fn erase_display_all_homes_cursor() {
    let mut term = make_term(3, 3);
    term.tty_data(b"abc\x1b[2;2H\x1b[2J");
    assert_eq!(term.line_text(0), "   ");
    assert_eq!(term.cursor_pos(), (0, 0));
}

#[test]
fn erase_scrollback_only() {
    let mut term = make_term(2, 3);
    term.tty_data(b"one\r\ntwo\r\n");
    assert!(term.history_len() > 0);
    let row0 = term.line_text(0);
    term.tty_data(b"\x1b[3J");
    assert_eq!(term.history_len(), 0);
    assert_eq!(term.line_text(0), row0);
}

#[test]
fn insert_and_delete_characters() {
    let mut term = make_term(1, 6);
    term.tty_data(b"abcdef\x1b[2G\x1b[2@");
    assert_eq!(term.line_text(0), "a  bcd");
    term.tty_data(b"\x1b[2P");
    assert_eq!(term.line_text(0), "abcd  ");
}

#[test]
fn erase_characters_without_shift() {
    let mut term = make_term(1, 6);
    term.tty_data(b"abcdef\x1b[2G\x1b[3X");
    assert_eq!(term.line_text(0), "a   ef");
}

#[test]
fn insert_mode_shifts_line() {
    let mut term = make_term(1, 6);
    term.tty_data(b"abcdef\x1b[1G\x1b[4hXY\x1b[4l");
    assert_eq!(term.line_text(0), "XYabcd");
}

#[test]
fn repeat_last_character() {
    let mut term = make_term(1, 10);
    term.tty_data(b"ab\x1b[3b");
    assert_eq!(term.line_text(0), "abbbb     ");
}

// --- Scrolling regions ---

#[test]
fn scroll_region_index_and_reverse() {
    let mut term = make_term(4, 3);
    term.tty_data(b"r0 \x1b[2;1Hr1 \x1b[3;1Hr2 \x1b[4;1Hr3 ");
    term.tty_data(b"\x1b[2;3r");
    // LF at the bottom margin scrolls rows 1..3 only.
    term.tty_data(b"\x1b[3;1H\n");
    assert_eq!(term.line_text(0), "r0 ");
    assert_eq!(term.line_text(1), "r2 ");
    assert_eq!(term.line_text(2), "   ");
    assert_eq!(term.line_text(3), "r3 ");
    // RI at the top margin scrolls back down.
    term.tty_data(b"\x1b[2;1H\x1bM");
    assert_eq!(term.line_text(1), "   ");
    assert_eq!(term.line_text(2), "r2 ");
}

#[test]
fn scroll_up_and_down_commands() {
    let mut term = make_term(3, 3);
    term.tty_data(b"aaa\x1b[2;1Hbbb\x1b[3;1Hccc");
    term.tty_data(b"\x1b[S");
    assert_eq!(term.line_text(0), "bbb");
    assert_eq!(term.line_text(2), "   ");
    term.tty_data(b"\x1b[T");
    assert_eq!(term.line_text(0), "   ");
    assert_eq!(term.line_text(1), "bbb");
}

#[test]
fn insert_and_delete_lines() {
    let mut term = make_term(3, 3);
    term.tty_data(b"aaa\x1b[2;1Hbbb\x1b[3;1Hccc");
    term.tty_data(b"\x1b[2;1H\x1b[L");
    assert_eq!(term.line_text(1), "   ");
    assert_eq!(term.line_text(2), "bbb");
    term.tty_data(b"\x1b[M");
    assert_eq!(term.line_text(1), "bbb");
    assert_eq!(term.line_text(2), "   ");
}

#[test]
fn decstbm_validates_and_homes() {
    let mut term = make_term(5, 5);
    term.tty_data(b"\x1b[4;2r");
    // Inverted region falls back to the full screen.
    term.tty_data(b"\x1b[5;1H\n");
    assert_eq!(term.history_len(), 1);
}

// --- Tabs ---

#[test]
fn tab_stops_default_and_custom() {
    let mut term = make_term(1, 20);
    term.tty_data(b"\t");
    assert_eq!(term.cursor_pos(), (0, 8));
    term.tty_data(b"\t");
    assert_eq!(term.cursor_pos(), (0, 16));
    term.tty_data(b"\t");
    assert_eq!(term.cursor_pos(), (0, 19));

    // Set a custom stop at column 3, clear all others.
    term.tty_data(b"\x1b[1;4H\x1bH\x1b[1;1H");
    term.tty_data(b"\x1b[3g\x1b[1;4H\x1bH\x1b[1;1H\t");
    assert_eq!(term.cursor_pos(), (0, 3));
}

#[test]
fn backward_tab() {
    let mut term = make_term(1, 20);
    term.tty_data(b"\x1b[1;18H\x1b[Z");
    assert_eq!(term.cursor_pos(), (0, 16));
    term.tty_data(b"\x1b[2Z");
    assert_eq!(term.cursor_pos(), (0, 0));
}

#[test]
fn tbc_clears_single_stop() {
    let mut term = make_term(1, 20);
    term.tty_data(b"\x1b[1;9H\x1b[g\x1b[1;1H\t");
    assert_eq!(term.cursor_pos(), (0, 16));
}

// --- Save/restore cursor ---

#[test]
fn save_restore_round_trip() {
    let mut term = make_term(5, 10);
    term.tty_data(b"\x1b[31m\x1b[3;4H\x1b7");
    term.tty_data(b"\x1b[H\x1b[0m\x1b[999B");
    term.tty_data(b"\x1b8");
    assert_eq!(term.cursor_pos(), (2, 3));
    term.tty_data(b"x");
    assert_eq!(term.cell(2, 3).style.fg, Color::Indexed(1));
}

#[test]
fn ansi_save_restore() {
    let mut term = make_term(5, 10);
    term.tty_data(b"\x1b[2;2H\x1b[s\x1b[H\x1b[u");
    assert_eq!(term.cursor_pos(), (1, 1));
}

// --- Modes ---

#[test]
fn set_then_reset_is_noop() {
    let term_modes = |bytes: &[u8]| {
        let mut term = make_term(3, 5);
        term.tty_data(bytes);
        term.modes()
    };
    let fresh = term_modes(b"");
    assert_eq!(term_modes(b"\x1b[?6h\x1b[?6l"), fresh);
    assert_eq!(term_modes(b"\x1b[?7l\x1b[?7h"), fresh);
    assert_eq!(term_modes(b"\x1b[4h\x1b[4l"), fresh);
    assert_eq!(term_modes(b"\x1b[?2004h\x1b[?2004l"), fresh);
}

#[test]
fn srm_sense_is_inverted() {
    let mut term = make_term(2, 5);
    assert!(!term.modes().get(TermMode::ECHO));
    term.tty_data(b"\x1b[12l");
    assert!(term.modes().get(TermMode::ECHO));
    term.tty_data(b"\x1b[12h");
    assert!(!term.modes().get(TermMode::ECHO));
}

#[test]
fn keypad_application_mode_via_esc() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x1b=");
    assert!(term.modes().get(TermMode::APPKEYPAD));
    term.tty_data(b"\x1b>");
    assert!(!term.modes().get(TermMode::APPKEYPAD));
}

#[test]
fn deccolm_asks_host_for_resize() {
    let mut term = make_term(5, 10);
    term.tty_data(b"\x1b[?3h");
    assert_eq!(term.observer().resize_requests.last(), Some(&(5, 132)));
    term.tty_data(b"\x1b[?3l");
    assert_eq!(term.observer().resize_requests.last(), Some(&(5, 80)));
}

// --- Alternate screen ---

#[test]
fn alt_screen_1049_saves_and_restores() {
    let mut term = make_term(3, 5);
    term.tty_data(b"hello\x1b[2;3H");
    term.tty_data(b"\x1b[?1049h");
    assert!(term.alt_active());
    // Alt starts cleared.
    assert_eq!(term.line_text(0), "     ");
    term.tty_data(b"alt");
    term.tty_data(b"\x1b[?1049l");
    assert!(!term.alt_active());
    assert_eq!(term.line_text(0), "hello");
    assert_eq!(term.cursor_pos(), (1, 2));
}

#[test]
fn alt_screen_47_keeps_content() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x1b[?47h");
    term.tty_data(b"alt  ");
    term.tty_data(b"\x1b[?47l\x1b[?47h");
    // Mode 47 does not clear the alternate buffer.
    assert_eq!(term.line_text(0), "alt  ");
}

#[test]
fn alt_screen_has_no_history() {
    let mut term = make_term(2, 3);
    term.tty_data(b"\x1b[?1049h");
    term.tty_data(b"a\r\nb\r\nc\r\nd\r\n");
    assert_eq!(term.history_len(), 0);
}

// --- Charsets ---

#[test]
fn dec_special_graphics_via_so_si() {
    let mut term = make_term(1, 10);
    term.tty_data(b"\x1b)0a\x0eq\x0fq");
    assert_eq!(term.cell(0, 0).seq.to_char(), 'a');
    assert_eq!(term.cell(0, 1).seq.to_char(), '─');
    assert_eq!(term.cell(0, 2).seq.to_char(), 'q');
}

#[test]
fn uk_charset_on_g0() {
    let mut term = make_term(1, 10);
    term.tty_data(b"\x1b(A#\x1b(B#");
    assert_eq!(term.cell(0, 0).seq.to_char(), '£');
    assert_eq!(term.cell(0, 1).seq.to_char(), '#');
}

// --- Reports ---

#[test]
fn device_attributes_reports_vt102() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x1b[c");
    assert_eq!(written(&term), b"\x1b[?6c");

    let mut term = make_term(2, 5);
    term.tty_data(b"\x1bZ");
    assert_eq!(written(&term), b"\x1b[?6c");
}

#[test]
fn device_status_reports() {
    let mut term = make_term(5, 10);
    term.tty_data(b"\x1b[5n");
    assert_eq!(written(&term), b"\x1b[0n");

    let mut term = make_term(5, 10);
    term.tty_data(b"\x1b[3;7H\x1b[6n");
    assert_eq!(written(&term), b"\x1b[3;7R");
}

#[test]
fn display_name_report() {
    let mut term = make_term(2, 5);
    term.observer_mut().display_name = ":0".to_owned();
    term.tty_data(b"\x1b[7n");
    assert_eq!(written(&term), b":0\n");
}

#[test]
fn decrqm_reports_unrecognised() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x1b[?2004$p");
    assert_eq!(written(&term), b"\x1b[?2004;0$y");
}

// --- OSC ---

#[test]
fn osc_title_and_icon() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x1b]2;my title\x07");
    assert_eq!(term.observer().titles, vec!["my title".to_owned()]);

    term.tty_data(b"\x1b]1;icon\x07");
    assert_eq!(term.observer().icons, vec!["icon".to_owned()]);

    term.tty_data(b"\x1b]0;both\x1b\\");
    assert_eq!(term.observer().titles.last().unwrap(), "both");
    assert_eq!(term.observer().icons.last().unwrap(), "both");
}

#[test]
fn osc_bad_number_is_ignored() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x1b]nope;stuff\x07");
    assert!(term.observer().titles.is_empty());
    assert_eq!(written(&term), b"");
}

// --- Bell, focus, echo ---

#[test]
fn bel_beeps() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x07\x07");
    assert_eq!(term.observer().beeps, 2);
}

#[test]
fn focus_reporting() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x1b[?1004h");
    term.focus_change(false);
    term.focus_change(true);
    // Repeated state is not re-reported.
    term.focus_change(true);
    assert_eq!(written(&term), b"\x1b[O\x1b[I");
}

#[test]
fn focus_draw_emits_cursor_only() {
    let mut term = make_term(2, 5);
    term.redraw();
    term.observer_mut().clear_draws();
    term.focus_change(false);
    assert_eq!(term.observer().cursor_draws.len(), 1);
    assert!(term.observer().bg_runs.is_empty());
    assert_eq!(term.observer().cursor_draws[0].2, false);
}

#[test]
fn echo_mode_renders_caret_controls() {
    let mut term = make_term(2, 10);
    term.tty_data(b"\x1b[12l");
    term.key_press(KeySymbol::Char('c'), Modifiers::CONTROL);
    // ^C locally, 0x03 on the wire.
    assert_eq!(term.line_text(0), "^C        ");
    assert_eq!(written(&term), &[0x03]);
}

// --- Reset ---

#[test]
fn full_reset_restores_initial_state() {
    let mut term = make_term(3, 5);
    term.tty_data(b"\x1b[31mxy\x1b[?6h\x1b[?25l\x1b[2;3r\x1b]2;t\x07");
    term.tty_data(b"\x1bc");
    assert_eq!(term.modes(), TermMode::initial());
    assert_eq!(term.line_text(0), "     ");
    assert_eq!(term.cursor_pos(), (0, 0));
    assert_eq!(term.observer().title_resets, 1);
    // Fresh style after reset.
    term.tty_data(b"z");
    assert_eq!(term.cell(0, 0).style.fg, Color::text_fg());
}

#[test]
fn reset_reprint_matches_fresh_terminal() {
    let input: &[u8] = b"one\r\n\x1b[1;34mtwo\x1b[0m\r\n\tthree";

    let mut fresh = make_term(5, 20);
    fresh.tty_data(input);

    let mut reused = make_term(5, 20);
    reused.tty_data(b"garbage\x1b[31m more garbage");
    reused.tty_data(b"\x1bc");
    reused.tty_data(input);

    for row in 0..5 {
        assert_eq!(fresh.line_text(row), reused.line_text(row));
        for col in 0..20 {
            assert_eq!(fresh.cell(row, col), reused.cell(row, col));
        }
    }
}

// --- DECALN ---

#[test]
fn alignment_pattern() {
    let mut term = make_term(2, 3);
    term.tty_data(b"\x1b#8");
    assert_eq!(term.line_text(0), "EEE");
    assert_eq!(term.line_text(1), "EEE");
}

// --- Mouse reporting ---

fn hpos(row: usize, col: usize) -> HPos {
    HPos::new(row, col, Hand::Left)
}

#[test]
fn mouse_press_release_legacy() {
    let mut term = make_term(24, 80);
    term.tty_data(b"\x1b[?1000h");
    term.button_press(MouseButton::Left, 1, Modifiers::empty(), hpos(10, 5));
    term.button_release(Modifiers::empty());
    assert_eq!(
        written(&term),
        &[0x1b, b'[', b'M', 32, 38, 43, 0x1b, b'[', b'M', 35, 38, 43]
    );
}

#[test]
fn mouse_press_release_sgr() {
    let mut term = make_term(24, 80);
    term.tty_data(b"\x1b[?1000h\x1b[?1006h");
    term.button_press(MouseButton::Left, 1, Modifiers::empty(), hpos(10, 5));
    term.button_release(Modifiers::empty());
    assert_eq!(written(&term), b"\x1b[<0;6;11M\x1b[<0;6;11m");
}

#[test]
fn mouse_motion_reported_only_in_drag_mode() {
    let mut term = make_term(24, 80);
    term.tty_data(b"\x1b[?1002h\x1b[?1006h");
    term.button_press(MouseButton::Left, 1, Modifiers::empty(), hpos(0, 0));
    term.pointer_motion(Modifiers::empty(), hpos(0, 1));
    term.button_release(Modifiers::empty());
    let bytes = written(&term);
    // press, motion (code 32), release
    assert_eq!(bytes, b"\x1b[<0;1;1M\x1b[<32;2;1M\x1b[<0;2;1m");
}

#[test]
fn mouse_selection_when_not_reporting() {
    let mut term = make_term(2, 10);
    term.tty_data(b"hello");
    term.button_press(MouseButton::Left, 1, Modifiers::empty(), hpos(0, 0));
    term.pointer_motion(Modifiers::empty(), HPos::new(0, 4, Hand::Right));
    term.button_release(Modifiers::empty());
    assert_eq!(written(&term), b"");
    let copies = &term.observer().copies;
    assert_eq!(copies.last(), Some(&("hello".to_owned(), false)));
}

#[test]
fn mouse_double_click_selects_word() {
    let mut term = make_term(2, 20);
    term.tty_data(b"alpha beta");
    term.button_press(MouseButton::Left, 2, Modifiers::empty(), hpos(0, 7));
    term.button_release(Modifiers::empty());
    assert_eq!(
        term.observer().copies.last(),
        Some(&("beta".to_owned(), false))
    );
}

#[test]
fn wheel_scrolls_history_when_not_reporting() {
    let mut term = make_term(2, 3);
    for _ in 0..5 {
        term.tty_data(b"x\r\n");
    }
    assert!(term.history_len() > 0);
    term.scroll_wheel(ScrollDir::Up, Modifiers::SHIFT, Pos::origin());
    assert_eq!(written(&term), b"");

    let mut term = make_term(24, 80);
    term.tty_data(b"\x1b[?1000h\x1b[?1006h");
    term.scroll_wheel(ScrollDir::Up, Modifiers::empty(), Pos::new(3, 3));
    assert_eq!(written(&term), b"\x1b[<64;4;4M");
}

// --- Scrollback interaction ---

#[test]
fn scroll_on_output_snaps_view_to_bottom() {
    let mut config = Config::default();
    config.scroll_on_tty_output = true;
    config.sync_tty = true;
    let mut term = make_term_with(2, 3, config);
    for i in 0..5 {
        term.tty_data(format!("l{}\r\n", i).as_bytes());
    }
    term.scroll_wheel(ScrollDir::Up, Modifiers::SHIFT, Pos::origin());
    assert!(term.view_offset() > 0);
    term.tty_data(b"x");
    assert_eq!(term.view_offset(), 0);
}

#[test]
fn output_while_scrolled_keeps_view_anchored() {
    let mut term = make_term(2, 3);
    for i in 0..5 {
        term.tty_data(format!("l{}\r\n", i).as_bytes());
    }
    let before = term.history_len();
    term.scroll_wheel(ScrollDir::Up, Modifiers::SHIFT, Pos::origin());
    term.tty_data(b"new\r\n");
    assert_eq!(term.history_len(), before + 1);
}

#[test]
fn scrollbar_damage_reported() {
    let mut term = make_term(2, 3);
    term.redraw();
    term.observer_mut().clear_draws();
    term.tty_data(b"a\r\nb\r\n");
    term.tty_sync();
    let (_, scrollbar) = *term.observer().damage_regions.last().unwrap();
    assert!(scrollbar);
    assert!(!term.observer().scrollbars.is_empty());
}

// --- Deferred draws ---

#[test]
fn deferred_draw_keeps_damage() {
    let mut term = make_term(2, 5);
    term.redraw();
    term.observer_mut().clear_draws();

    term.observer_mut().defer_draw = true;
    term.tty_data(b"hi");
    term.tty_sync();
    assert!(term.observer().damage_regions.is_empty());
    assert!(term.observer().draw_begins > 0);

    term.observer_mut().defer_draw = false;
    term.tty_sync();
    let (damage, _) = *term.observer().damage_regions.last().unwrap();
    assert_eq!(damage.begin, Pos::new(0, 0));
    assert_eq!(damage.end, Pos::new(1, 2));
}

// --- Key bindings and actions ---

#[test]
fn copy_binding_uses_clipboard() {
    let mut term = make_term(2, 10);
    term.tty_data(b"words");
    term.button_press(MouseButton::Left, 1, Modifiers::empty(), hpos(0, 0));
    term.pointer_motion(Modifiers::empty(), HPos::new(0, 4, Hand::Right));
    term.button_release(Modifiers::empty());

    assert!(term.key_press(KeySymbol::Char('C'), Modifiers::CONTROL | Modifiers::SHIFT));
    assert_eq!(
        term.observer().copies.last(),
        Some(&("words".to_owned(), true))
    );

    assert!(term.key_press(KeySymbol::Char('V'), Modifiers::CONTROL | Modifiers::SHIFT));
    assert_eq!(term.observer().paste_requests, vec![true]);
}

#[test]
fn font_actions_via_bindings() {
    let mut config = Config::default();
    config.bindings.bindings.push(crate::config::Keybinding {
        key: KeySymbol::F(1),
        mods: Modifiers::CONTROL,
        action: crate::keys::Action::LocalFontBigger,
    });
    let mut term = make_term_with(2, 5, config);
    assert!(term.key_press(KeySymbol::F(1), Modifiers::CONTROL));
    assert_eq!(term.observer().local_font, vec![1]);
    assert_eq!(written(&term), b"");
}

#[test]
fn kbd_lock_swallows_input() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x1b[2h");
    assert!(term.key_press(KeySymbol::Char('a'), Modifiers::empty()));
    assert_eq!(written(&term), b"");
    term.tty_data(b"\x1b[2l");
    term.key_press(KeySymbol::Char('a'), Modifiers::empty());
    assert_eq!(written(&term), b"a");
}

#[test]
fn meta_8bit_key_input() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x1b[?1039l\x1b[?1034h");
    term.key_press(KeySymbol::Char('a'), Modifiers::ALT);
    assert_eq!(written(&term), &[0xC3, 0xA1]);
}

// --- Resize ---

#[test]
fn resize_reflows_primary_and_tells_pty() {
    let mut term = make_term(2, 8);
    term.tty_data(b"abcdefgh");
    term.resize(2, 4);
    assert_eq!(term.tty().size, Some((2, 4)));
    // The wrapped paragraph fills the narrower screen exactly.
    assert_eq!(term.history_len(), 0);
    assert_eq!(term.line_text(0), "abcd");
    assert_eq!(term.line_text(1), "efgh");
    let (row, col) = term.cursor_pos();
    assert!(row < 2 && col < 4);
}

#[test]
fn resize_clips_alternate() {
    let mut term = make_term(2, 5);
    term.tty_data(b"\x1b[?1049h");
    term.tty_data(b"abcde");
    term.resize(2, 3);
    assert_eq!(term.line_text(0), "abc");
    assert_eq!(term.history_len(), 0);
}

#[test]
fn child_exit_is_forwarded() {
    let mut term = make_term(2, 5);
    term.tty_exited(42);
    assert_eq!(term.observer().exited, Some(42));
}

// --- UTF-8 on the grid ---

#[test]
fn utf8_text_lands_in_cells() {
    let mut term = make_term(1, 5);
    term.tty_data("héllo".as_bytes());
    assert_eq!(term.line_text(0), "héllo");
}

#[test]
fn invalid_utf8_is_dropped() {
    let mut term = make_term(1, 5);
    term.tty_data(&[b'a', 0xFF, 0xC0, b'b']);
    assert_eq!(term.line_text(0), "ab   ");
}
