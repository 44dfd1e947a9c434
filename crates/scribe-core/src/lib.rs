//! scribe-core: live proofreading engine without host dependencies.
//!
//! This crate provides:
//! - `Tracker` - discovery, identity and focus of editable surfaces
//! - `Controller` - debounced, cancellable proofreading runs per surface
//! - `CorrectionStore` - canonical corrections, rebasing and issue updates
//! - `mutation::apply` + `UndoHistory` - writing corrections into surfaces
//! - `RenderEngine` - native-range, mirror and paint overlays
//! - `Session` - the single-threaded driver wiring all of the above
//!
//! Hosts implement the traits at the edges (`SurfaceNode`, `EditableSurface`,
//! `HighlighterFactory`, `Proofreader`, `LanguageDetector`). The `memory`
//! module has in-memory implementations of the host side.

pub mod busy;
pub mod config;
pub mod controller;
pub mod correction;
pub mod error;
pub mod history;
pub mod memory;
pub mod mutation;
pub mod position;
pub mod render;
pub mod service;
pub mod session;
pub mod shortcut;
pub mod store;
pub mod subscription;
pub mod text;
pub mod tracker;
pub mod types;

pub use busy::{BusyState, BusyTracker};
pub use config::{
    MemoryPreferences, OverlayKind, PreferenceSource, Preferences, ScribeConfig, UnderlineStyle,
};
pub use controller::{Completion, Controller, Dispatch, InputKind, Phase, RunEnd, RunId, Scope};
pub use correction::{Correction, CorrectionType, Issue, IssueId};
pub use error::{PlatformError, RenderError, Result, ScribeError};
pub use history::{Snapshot, UndoHistory};
pub use mutation::{ApplyOutcome, EditableSurface};
pub use render::{Highlighter, HighlighterFactory, RenderEngine, Strategy};
pub use service::{
    LanguageCandidate, LanguageDetector, NoDetector, ProofreadRequest, ProofreadResponse,
    ProofreadResult, Proofreader, ProofreaderFactory,
};
pub use session::Session;
pub use smol_str::SmolStr;
pub use store::{CorrectionStore, IssueGroup, IssueUpdate, RevisionGuard, SurfaceMessage};
pub use subscription::{Emitter, Subscription, SubscriptionSet};
pub use text::{EditorRope, TextBuffer};
pub use tracker::{StructuralChange, StructuralFeed, SurfaceNode, Tracker, TrackerEvent};
pub use types::{NodeKey, Selection, SurfaceId, SurfaceKind};
pub use web_time::Instant;
