//! Browser DOM layer for scribe.
//!
//! This crate implements the host traits of `scribe-core` over `web-sys`. It
//! assumes a `wasm32-unknown-unknown` target environment.
//!
//! # Architecture
//!
//! - `node`: DOM elements as tracker nodes, with `WeakMap` identity
//! - `feed`: `MutationObserver`-backed structural change feed
//! - `surface`: inputs, textareas and editable elements as mutation targets
//! - `highlight`: CSS Custom Highlight registry for rich surfaces
//! - `mirror` / `canvas`: overlay hosts for plain-text surfaces
//! - `factory`: highlighter construction per strategy
//! - `driver`: DOM events and scheduling around one `Session`
//! - `platform`: Browser/OS detection for shortcut resolution
//! - `logging`: console `tracing` subscriber and panic hook
//!
//! # Re-exports
//!
//! This crate re-exports `scribe-core` for convenience, so consumers only
//! need to depend on `scribe-browser`.

pub use scribe_core;
pub use scribe_core::*;

pub mod canvas;
pub mod driver;
pub mod factory;
pub mod feed;
pub mod highlight;
pub mod logging;
pub mod mirror;
pub mod node;
pub mod platform;
pub mod style;
pub mod surface;

pub use driver::BrowserScribe;
pub use factory::DomHighlighterFactory;
pub use feed::MutationFeed;
pub use node::{DomDocument, DomNode};
pub use platform::{Platform, platform};
pub use surface::DomSurface;
