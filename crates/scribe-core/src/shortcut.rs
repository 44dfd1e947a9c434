//! Keyboard shortcuts: the configurable proofread trigger and undo/redo.

use smol_str::SmolStr;

use crate::error::ScribeError;

/// Platform-agnostic key value. Hosts convert their native key events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A character key.
    Character(SmolStr),
    Enter,
    Escape,
    Tab,
    Space,
    Backspace,
    Delete,
    Unidentified,
}

impl Key {
    pub fn character(s: impl Into<SmolStr>) -> Self {
        Self::Character(s.into())
    }

    /// Map a DOM `KeyboardEvent.key` value.
    pub fn from_dom(key: &str) -> Self {
        match key {
            "Enter" => Self::Enter,
            "Escape" => Self::Escape,
            "Tab" => Self::Tab,
            " " | "Spacebar" => Self::Space,
            "Backspace" => Self::Backspace,
            "Delete" => Self::Delete,
            k if k.chars().count() == 1 => Self::Character(SmolStr::new(k)),
            _ => Self::Unidentified,
        }
    }

    fn same_key(&self, other: &Key) -> bool {
        match (self, other) {
            (Self::Character(a), Self::Character(b)) => a.to_lowercase() == b.to_lowercase(),
            (a, b) => a == b,
        }
    }
}

/// Modifier key state for a key combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        alt: false,
        shift: false,
        meta: false,
    };

    pub const CTRL: Self = Self {
        ctrl: true,
        ..Self::NONE
    };

    pub const META: Self = Self {
        meta: true,
        ..Self::NONE
    };

    /// The primary modifier for the platform (Cmd on Mac, Ctrl elsewhere).
    pub fn primary(is_mac: bool) -> Self {
        if is_mac { Self::META } else { Self::CTRL }
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }
}

/// A key combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyCombo {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    pub fn primary(key: Key, is_mac: bool) -> Self {
        Self::new(key, Modifiers::primary(is_mac))
    }

    /// Whether a key event matches. Character keys compare case-insensitively
    /// since Shift changes the reported character.
    pub fn matches(&self, key: &Key, modifiers: Modifiers) -> bool {
        self.modifiers == modifiers && self.key.same_key(key)
    }
}

/// Parse a shortcut such as `"Mod+Shift+P"` or `"Ctrl+Alt+K"`.
///
/// `Mod`, `Primary` and `CmdOrCtrl` name the platform's primary modifier.
pub fn parse_shortcut(raw: &str, is_mac: bool) -> Result<KeyCombo, ScribeError> {
    let invalid = |reason: &str| ScribeError::InvalidShortcut {
        raw: raw.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = raw.split('+').map(str::trim).collect();
    let Some((key_part, modifier_parts)) = parts.split_last() else {
        return Err(invalid("empty shortcut"));
    };
    if key_part.is_empty() {
        return Err(invalid("missing key"));
    }

    let mut modifiers = Modifiers::NONE;
    for part in modifier_parts {
        match part.to_ascii_lowercase().as_str() {
            "mod" | "primary" | "cmdorctrl" => {
                let primary = Modifiers::primary(is_mac);
                modifiers.ctrl |= primary.ctrl;
                modifiers.meta |= primary.meta;
            }
            "ctrl" | "control" => modifiers.ctrl = true,
            "cmd" | "meta" | "command" => modifiers.meta = true,
            "alt" | "option" => modifiers.alt = true,
            "shift" => modifiers.shift = true,
            other => return Err(invalid(&format!("unknown modifier `{other}`"))),
        }
    }

    let key = match key_part.to_ascii_lowercase().as_str() {
        "enter" | "return" => Key::Enter,
        "escape" | "esc" => Key::Escape,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        k if k.chars().count() == 1 => Key::character(k),
        _ => return Err(invalid("unsupported key")),
    };
    Ok(KeyCombo::new(key, modifiers))
}

/// History shortcut recognised from a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Undo,
    Redo,
}

/// Primary+Z undoes, Primary+Shift+Z redoes, and Ctrl+Y also redoes off Mac.
pub fn history_action(key: &Key, modifiers: Modifiers, is_mac: bool) -> Option<HistoryAction> {
    let z = Key::character("z");
    let primary = Modifiers::primary(is_mac);
    if KeyCombo::new(z.clone(), primary).matches(key, modifiers) {
        return Some(HistoryAction::Undo);
    }
    if KeyCombo::new(z, primary.with_shift()).matches(key, modifiers) {
        return Some(HistoryAction::Redo);
    }
    if !is_mac && KeyCombo::new(Key::character("y"), Modifiers::CTRL).matches(key, modifiers) {
        return Some(HistoryAction::Redo);
    }
    None
}
