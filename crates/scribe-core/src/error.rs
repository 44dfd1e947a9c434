//! Error types for the proofreading core.

use thiserror::Error;

use crate::correction::IssueId;
use crate::service::ErrorCode;
use crate::types::SurfaceId;

/// Errors surfaced by core operations.
///
/// None of these are meant to cross the host boundary as panics: the session
/// driver converts them into per-surface messages or log lines.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ScribeError {
    /// An offset could not be mapped onto live content.
    #[error("offset {offset} cannot be resolved against content of length {len}")]
    Resolution { offset: usize, len: usize },

    /// A range was empty, reversed, or past the end of the text.
    #[error("range {start}..{end} is invalid for text of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    /// The surface is not (or no longer) tracked.
    #[error("surface {0} is not tracked")]
    UnknownSurface(SurfaceId),

    /// The issue is not part of the surface's current correction set.
    #[error("issue {issue} not found on surface {surface}")]
    UnknownIssue { surface: SurfaceId, issue: IssueId },

    /// No language detector is available in this host.
    #[error("language detection unavailable")]
    DetectorUnavailable,

    /// The language detector failed.
    #[error("language detection failed: {0}")]
    Detection(String),

    /// The proofreading service rejected or failed a request.
    #[error("proofreading service error ({code}): {message}")]
    Service { code: ErrorCode, message: String },

    /// Teardown was requested while proofreaders were still in use.
    #[error("proofreader pool busy with {active} active operation(s)")]
    PoolBusy { active: usize },

    /// A keyboard shortcut string could not be parsed.
    #[error("invalid shortcut `{raw}`: {reason}")]
    InvalidShortcut { raw: String, reason: String },

    /// Host adapter failure.
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Error type for host platform operations (DOM calls, canvas, etc.).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl From<&str> for PlatformError {
    fn from(s: &str) -> Self {
        PlatformError(s.to_string())
    }
}

impl From<String> for PlatformError {
    fn from(s: String) -> Self {
        PlatformError(s)
    }
}

/// Highlighter construction failures.
///
/// These are fatal for one surface's highlighter only.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RenderError {
    /// The paint context (e.g. a 2D canvas context) could not be acquired.
    #[error("paint context unavailable: {0}")]
    ContextUnavailable(String),

    /// The surface kind cannot be rendered by the requested strategy.
    #[error("strategy {strategy:?} cannot render surface {surface}")]
    Unsupported {
        surface: SurfaceId,
        strategy: crate::render::Strategy,
    },

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

pub type Result<T, E = ScribeError> = std::result::Result<T, E>;
