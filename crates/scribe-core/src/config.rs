//! Engine configuration and user preferences.
//!
//! [`ScribeConfig`] is fixed for the lifetime of a session. [`Preferences`] are
//! read-mostly external state delivered through a [`PreferenceSource`].

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::correction::CorrectionType;
use crate::subscription::{Emitter, Subscription};

/// Overlay used for plain-text surfaces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayKind {
    /// Canvas painting with re-implemented line wrapping.
    #[default]
    Paint,
    /// Invisible typographic clone of the surface.
    Mirror,
}

/// Session-wide engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScribeConfig {
    /// Identifier echoed in every issue update.
    pub page_id: SmolStr,
    /// Quiet period after the last input before a run is dispatched.
    pub debounce_ms: u64,
    /// Texts shorter than this (in chars) skip detection and use the fallback.
    pub min_detection_chars: usize,
    /// Minimum detector confidence to trust a language.
    pub detection_confidence: f32,
    pub fallback_language: SmolStr,
    /// Undo snapshots kept per surface.
    pub undo_depth: usize,
    pub overlay: OverlayKind,
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            page_id: SmolStr::new_static("page"),
            debounce_ms: 400,
            min_detection_chars: 20,
            detection_confidence: 0.6,
            fallback_language: SmolStr::new_static("en"),
            undo_depth: 100,
            overlay: OverlayKind::Paint,
        }
    }
}

impl ScribeConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// How issue spans are decorated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnderlineStyle {
    #[default]
    Wavy,
    Solid,
    Dotted,
    Dashed,
    /// Tinted background instead of an underline.
    Highlight,
}

/// User preferences consumed by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub enabled_types: BTreeSet<CorrectionType>,
    /// CSS colours per correction type.
    pub type_colors: BTreeMap<CorrectionType, SmolStr>,
    pub underline_style: UnderlineStyle,
    /// Proofread while typing. Explicit requests run regardless.
    pub live_proofreading: bool,
    /// Shortcut for an explicit proofreading request, e.g. `"Mod+Shift+P"`.
    pub shortcut: SmolStr,
    /// Double-clicking an issue applies its replacement.
    pub double_click_autofix: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            enabled_types: CorrectionType::ALL.into_iter().collect(),
            type_colors: default_colors(),
            underline_style: UnderlineStyle::Wavy,
            live_proofreading: true,
            shortcut: SmolStr::new_static("Mod+Shift+P"),
            double_click_autofix: false,
        }
    }
}

impl Preferences {
    pub fn is_enabled(&self, correction_type: CorrectionType) -> bool {
        self.enabled_types.contains(&correction_type)
    }

    pub fn color_for(&self, correction_type: CorrectionType) -> SmolStr {
        self.type_colors
            .get(&correction_type)
            .cloned()
            .unwrap_or_else(|| SmolStr::new_static("#e53935"))
    }
}

fn default_colors() -> BTreeMap<CorrectionType, SmolStr> {
    [
        (CorrectionType::Spelling, "#e53935"),
        (CorrectionType::Grammar, "#1e88e5"),
        (CorrectionType::Punctuation, "#8e24aa"),
        (CorrectionType::Capitalization, "#fb8c00"),
        (CorrectionType::Preposition, "#00897b"),
        (CorrectionType::MissingWords, "#6d4c41"),
        (CorrectionType::Other, "#757575"),
    ]
    .into_iter()
    .map(|(t, c)| (t, SmolStr::new_static(c)))
    .collect()
}

/// Read/subscribe access to persisted preferences.
pub trait PreferenceSource {
    fn snapshot(&self) -> Preferences;

    /// Called with the new value after every change.
    fn subscribe(&self, listener: Box<dyn FnMut(&Preferences)>) -> Subscription;
}

/// In-memory preference source for hosts without persistence.
#[derive(Clone, Debug, Default)]
pub struct MemoryPreferences {
    current: Rc<RefCell<Preferences>>,
    changes: Emitter<Preferences>,
}

impl MemoryPreferences {
    pub fn new(initial: Preferences) -> Self {
        Self {
            current: Rc::new(RefCell::new(initial)),
            changes: Emitter::new(),
        }
    }

    /// Mutate and notify subscribers.
    pub fn update(&self, change: impl FnOnce(&mut Preferences)) {
        let next = {
            let mut current = self.current.borrow_mut();
            change(&mut current);
            current.clone()
        };
        self.changes.emit(&next);
    }
}

impl PreferenceSource for MemoryPreferences {
    fn snapshot(&self) -> Preferences {
        self.current.borrow().clone()
    }

    fn subscribe(&self, mut listener: Box<dyn FnMut(&Preferences)>) -> Subscription {
        self.changes.subscribe(move |p| listener(p))
    }
}
