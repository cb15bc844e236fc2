// src/config.rs

//! Configuration consumed by the terminal core.
//!
//! The host owns file discovery and parsing; this module only defines the
//! deserializable shape and its defaults.

use serde::{Deserialize, Serialize};

use crate::keys::{Action, KeySymbol, Modifiers};

/// One key binding: a combo mapped to an [`Action`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keybinding {
    pub key: KeySymbol,
    pub mods: Modifiers,
    pub action: Action,
}

/// All configured key bindings. First match wins on lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeybindingsConfig {
    pub bindings: Vec<Keybinding>,
}

impl KeybindingsConfig {
    pub fn lookup(&self, key: KeySymbol, mods: Modifiers) -> Option<Action> {
        self.bindings
            .iter()
            .find(|b| b.key == key && b.mods == mods)
            .map(|b| b.action)
    }
}

impl Default for KeybindingsConfig {
    fn default() -> Self {
        KeybindingsConfig {
            bindings: vec![
                Keybinding {
                    key: KeySymbol::Char('C'),
                    mods: Modifiers::CONTROL | Modifiers::SHIFT,
                    action: Action::CopyToClipboard,
                },
                Keybinding {
                    key: KeySymbol::Char('V'),
                    mods: Modifiers::CONTROL | Modifiers::SHIFT,
                    action: Action::PasteFromClipboard,
                },
                Keybinding {
                    key: KeySymbol::PageUp,
                    mods: Modifiers::SHIFT,
                    action: Action::ScrollUpOnePage,
                },
                Keybinding {
                    key: KeySymbol::PageDown,
                    mods: Modifiers::SHIFT,
                    action: Action::ScrollDownOnePage,
                },
            ],
        }
    }
}

/// Options the core reads. Everything else in a host config file is the
/// host's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lines kept in scrollback history (ignored when unlimited).
    pub scroll_back_history: usize,
    /// Never evict history lines.
    pub unlimited_scroll_back: bool,
    /// Snap the view to the bottom when the child produces output.
    pub scroll_on_tty_output: bool,
    /// Snap the view to the bottom on key press.
    pub scroll_on_tty_key_press: bool,
    /// Snap the view to the bottom on paste.
    pub scroll_on_paste: bool,
    /// Repair damage after every read instead of batching.
    pub sync_tty: bool,
    /// Emit an ANSI-coloured parser trace on stderr.
    pub trace_tty: bool,
    /// Value advertised through $TERM.
    pub term_name: String,
    /// Characters that end a word for double-click selection.
    pub word_delimiters: String,
    pub bindings: KeybindingsConfig,
}

impl Config {
    /// Effective history limit.
    pub fn history_limit(&self) -> usize {
        if self.unlimited_scroll_back {
            usize::MAX
        } else {
            self.scroll_back_history
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scroll_back_history: 1024,
            unlimited_scroll_back: false,
            scroll_on_tty_output: false,
            scroll_on_tty_key_press: true,
            scroll_on_paste: true,
            sync_tty: false,
            trace_tty: false,
            term_name: "xterm-256color".to_string(),
            word_delimiters: " `\"'()[]{}<>".to_string(),
            bindings: KeybindingsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binding_lookup() {
        let config = Config::default();
        assert_eq!(
            config
                .bindings
                .lookup(KeySymbol::Char('C'), Modifiers::CONTROL | Modifiers::SHIFT),
            Some(Action::CopyToClipboard)
        );
        assert_eq!(
            config.bindings.lookup(KeySymbol::Char('C'), Modifiers::CONTROL),
            None
        );
    }

    #[test]
    fn history_limit_unlimited() {
        let mut config = Config::default();
        assert_eq!(config.history_limit(), 1024);
        config.unlimited_scroll_back = true;
        assert_eq!(config.history_limit(), usize::MAX);
    }
}
