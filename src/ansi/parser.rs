// src/ansi/parser.rs

//! The VT control-sequence state machine.
//!
//! Explicit state + per-byte transition rules following the Paul Williams
//! parser diagram. Two transitions outrank everything else: CAN/SUB cancel
//! the sequence in progress, and ESC starts a new escape (first flushing a
//! pending OSC or DCS payload, which have no other way to terminate when
//! the stream is cut short).

use log::{trace, warn};
use std::mem;

use super::commands::VtEvent;
use super::lexer::{Token, DEL, ESC};
use crate::utf8::Seq;

const CAN: u8 = 0x18;
const SUB: u8 = 0x1A;
const BEL: u8 = 0x07;

/// Maximum number of CSI parameters retained.
const MAX_PARAMS: usize = 16;
/// Maximum number of intermediate bytes retained.
const MAX_INTERMEDIATES: usize = 2;
/// Cap on accumulated OSC payload bytes.
const MAX_OSC_LEN: usize = 1024;
/// Cap on retained DCS passthrough bytes; the payload is discarded by the
/// interpreter, the cap only bounds memory against hostile input.
const MAX_DCS_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    DcsEntry,
    DcsParam,
    DcsIntermediate,
    DcsIgnore,
    DcsPassthrough,
    OscString,
    SosPmApcString,
}

/// Consumes lexer tokens and produces [`VtEvent`]s.
#[derive(Debug, Default)]
pub(super) struct Parser {
    state: State,
    params: Vec<u16>,
    intermediates: Vec<u8>,
    private: Option<u8>,
    osc: Vec<u8>,
    dcs: Vec<u8>,
    events: Vec<VtEvent>,
}

impl Parser {
    pub fn new() -> Self {
        Parser::default()
    }

    pub fn take_events(&mut self) -> Vec<VtEvent> {
        mem::take(&mut self.events)
    }

    /// Hard reset back to GROUND, dropping any accumulated sequence.
    pub fn reset(&mut self) {
        self.state = State::Ground;
        self.clear_sequence();
    }

    fn clear_sequence(&mut self) {
        self.params.clear();
        self.intermediates.clear();
        self.private = None;
        self.osc.clear();
        self.dcs.clear();
    }

    pub fn process_token(&mut self, token: Token) {
        let before = self.state;
        match token {
            Token::Control(byte) => self.process_control(byte),
            Token::Print(seq) => self.process_print(seq),
        }
        if self.state != before {
            trace!("parser state {:?} -> {:?}", before, self.state);
        }
    }

    /// C0 controls, ESC, and DEL. These are recognised in every state.
    fn process_control(&mut self, byte: u8) {
        match byte {
            CAN | SUB => {
                // Cancel whatever is in flight.
                self.state = State::Ground;
                self.clear_sequence();
            }
            ESC => {
                match self.state {
                    State::OscString => self.dispatch_osc(),
                    State::DcsPassthrough => self.dispatch_dcs(),
                    _ => {}
                }
                self.clear_sequence();
                self.state = State::Escape;
            }
            DEL => {
                // Ignored in every state.
            }
            _ => match self.state {
                State::OscString => {
                    if byte == BEL {
                        self.dispatch_osc();
                        self.state = State::Ground;
                    }
                    // Other controls inside an OSC string are dropped.
                }
                State::SosPmApcString | State::DcsPassthrough | State::DcsIgnore => {
                    // String payloads swallow embedded controls.
                }
                _ => {
                    // Executed immediately without disturbing the sequence.
                    self.events.push(VtEvent::Control(byte));
                }
            },
        }
    }

    fn process_print(&mut self, seq: Seq) {
        if self.state == State::Ground {
            self.events.push(VtEvent::Normal(seq));
            return;
        }

        if seq.len() != 1 {
            // Multi-byte text inside a control sequence: only string states
            // can meaningfully hold it.
            match self.state {
                State::OscString => self.collect_osc(seq.as_bytes()),
                State::DcsPassthrough => self.collect_dcs(seq.as_bytes()),
                State::SosPmApcString | State::DcsIgnore => {}
                _ => warn!("multi-byte sequence inside control sequence, ignored"),
            }
            return;
        }

        let byte = seq.lead();
        match self.state {
            State::Ground => unreachable!(),
            State::Escape => self.escape_byte(byte),
            State::EscapeIntermediate => self.escape_intermediate_byte(byte),
            State::CsiEntry => self.csi_entry_byte(byte),
            State::CsiParam => self.csi_param_byte(byte),
            State::CsiIntermediate => self.csi_intermediate_byte(byte),
            State::CsiIgnore => {
                if (0x40..=0x7E).contains(&byte) {
                    self.state = State::Ground;
                }
            }
            State::DcsEntry => self.dcs_entry_byte(byte),
            State::DcsParam => self.dcs_param_byte(byte),
            State::DcsIntermediate => self.dcs_intermediate_byte(byte),
            State::DcsIgnore | State::SosPmApcString => {
                // Consumed without effect; terminated via ESC / CAN / SUB.
            }
            State::DcsPassthrough => self.collect_dcs(&[byte]),
            State::OscString => self.collect_osc(&[byte]),
        }
    }

    // --- ESCAPE ---

    fn escape_byte(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => {
                self.collect_intermediate(byte);
                self.state = State::EscapeIntermediate;
            }
            b'[' => {
                self.clear_sequence();
                self.state = State::CsiEntry;
            }
            b']' => {
                self.clear_sequence();
                self.state = State::OscString;
            }
            b'P' => {
                self.clear_sequence();
                self.state = State::DcsEntry;
            }
            b'X' | b'^' | b'_' => {
                self.state = State::SosPmApcString;
            }
            0x30..=0x4F | 0x51..=0x57 | 0x59 | 0x5A | 0x5C | 0x60..=0x7E => {
                self.events.push(VtEvent::Escape(byte));
                self.state = State::Ground;
            }
            _ => {
                warn!("unexpected byte {:#04x} after ESC", byte);
                self.state = State::Ground;
            }
        }
    }

    fn escape_intermediate_byte(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => self.collect_intermediate(byte),
            0x30..=0x7E => {
                self.events.push(VtEvent::Special {
                    intermediates: mem::take(&mut self.intermediates),
                    code: byte,
                });
                self.state = State::Ground;
            }
            _ => {
                warn!("unexpected byte {:#04x} in escape intermediate", byte);
                self.state = State::Ground;
            }
        }
    }

    // --- CSI ---

    fn csi_entry_byte(&mut self, byte: u8) {
        match byte {
            0x30..=0x39 | b';' => {
                self.param_byte(byte);
                self.state = State::CsiParam;
            }
            0x3C..=0x3F => {
                self.private = Some(byte);
                self.state = State::CsiParam;
            }
            b':' => self.state = State::CsiIgnore,
            0x20..=0x2F => {
                self.collect_intermediate(byte);
                self.state = State::CsiIntermediate;
            }
            0x40..=0x7E => self.dispatch_csi(byte),
            _ => self.state = State::CsiIgnore,
        }
    }

    fn csi_param_byte(&mut self, byte: u8) {
        match byte {
            0x30..=0x39 | b';' => self.param_byte(byte),
            b':' | 0x3C..=0x3F => self.state = State::CsiIgnore,
            0x20..=0x2F => {
                self.collect_intermediate(byte);
                self.state = State::CsiIntermediate;
            }
            0x40..=0x7E => self.dispatch_csi(byte),
            _ => self.state = State::CsiIgnore,
        }
    }

    fn csi_intermediate_byte(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => self.collect_intermediate(byte),
            0x30..=0x3F => self.state = State::CsiIgnore,
            0x40..=0x7E => self.dispatch_csi(byte),
            _ => self.state = State::CsiIgnore,
        }
    }

    fn dispatch_csi(&mut self, code: u8) {
        self.events.push(VtEvent::Csi {
            private: self.private.take(),
            args: mem::take(&mut self.params),
            intermediates: mem::take(&mut self.intermediates),
            code,
        });
        self.state = State::Ground;
    }

    // --- DCS (payload discarded, states honoured) ---

    fn dcs_entry_byte(&mut self, byte: u8) {
        match byte {
            0x30..=0x39 | b';' => self.state = State::DcsParam,
            0x3C..=0x3F => self.state = State::DcsParam,
            b':' => self.state = State::DcsIgnore,
            0x20..=0x2F => self.state = State::DcsIntermediate,
            0x40..=0x7E => self.state = State::DcsPassthrough,
            _ => self.state = State::DcsIgnore,
        }
    }

    fn dcs_param_byte(&mut self, byte: u8) {
        match byte {
            0x30..=0x39 | b';' => {}
            b':' | 0x3C..=0x3F => self.state = State::DcsIgnore,
            0x20..=0x2F => self.state = State::DcsIntermediate,
            0x40..=0x7E => self.state = State::DcsPassthrough,
            _ => self.state = State::DcsIgnore,
        }
    }

    fn dcs_intermediate_byte(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => {}
            0x30..=0x3F => self.state = State::DcsIgnore,
            0x40..=0x7E => self.state = State::DcsPassthrough,
            _ => self.state = State::DcsIgnore,
        }
    }

    fn dispatch_dcs(&mut self) {
        self.events.push(VtEvent::Dcs(mem::take(&mut self.dcs)));
        self.state = State::Ground;
    }

    fn collect_dcs(&mut self, bytes: &[u8]) {
        if self.dcs.len() < MAX_DCS_LEN {
            let room = MAX_DCS_LEN - self.dcs.len();
            self.dcs.extend_from_slice(&bytes[..bytes.len().min(room)]);
        }
    }

    // --- OSC ---

    fn dispatch_osc(&mut self) {
        let raw = mem::take(&mut self.osc);
        let args: Vec<Vec<u8>> = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split(|&b| b == b';').map(<[u8]>::to_vec).collect()
        };
        self.events.push(VtEvent::Osc(args));
        self.state = State::Ground;
    }

    fn collect_osc(&mut self, bytes: &[u8]) {
        if self.osc.len() < MAX_OSC_LEN {
            let room = MAX_OSC_LEN - self.osc.len();
            self.osc.extend_from_slice(&bytes[..bytes.len().min(room)]);
        } else {
            trace!("OSC payload over {} bytes, truncating", MAX_OSC_LEN);
        }
    }

    // --- shared collectors ---

    fn collect_intermediate(&mut self, byte: u8) {
        if self.intermediates.len() < MAX_INTERMEDIATES {
            self.intermediates.push(byte);
        } else {
            warn!("too many intermediate bytes, dropping {:#04x}", byte);
        }
    }

    fn param_byte(&mut self, byte: u8) {
        if byte == b';' {
            if self.params.is_empty() {
                self.params.push(0);
            }
            if self.params.len() < MAX_PARAMS {
                self.params.push(0);
            }
            return;
        }

        let digit = u16::from(byte - b'0');
        if self.params.is_empty() {
            self.params.push(0);
        }
        if let Some(last) = self.params.last_mut() {
            *last = last.saturating_mul(10).saturating_add(digit);
        }
    }
}
