//! Correction spans and the issues derived from them.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};

use crate::text::char_slice;
use crate::types::{SurfaceId, SurfaceKind};

/// Category of a correction, as reported by the proofreading engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrectionType {
    Spelling,
    Grammar,
    Punctuation,
    Capitalization,
    Preposition,
    MissingWords,
    #[serde(other)]
    Other,
}

impl CorrectionType {
    pub const ALL: [CorrectionType; 7] = [
        Self::Spelling,
        Self::Grammar,
        Self::Punctuation,
        Self::Capitalization,
        Self::Preposition,
        Self::MissingWords,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spelling => "spelling",
            Self::Grammar => "grammar",
            Self::Punctuation => "punctuation",
            Self::Capitalization => "capitalization",
            Self::Preposition => "preposition",
            Self::MissingWords => "missing-words",
            Self::Other => "other",
        }
    }
}

/// An offset-addressed span plus its suggested replacement.
///
/// Offsets are char offsets into one snapshot of a surface's text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub start_index: usize,
    pub end_index: usize,
    pub replacement_text: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub correction_type: Option<CorrectionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Correction {
    pub fn new(start_index: usize, end_index: usize, replacement_text: impl Into<String>) -> Self {
        Self {
            start_index,
            end_index,
            replacement_text: replacement_text.into(),
            correction_type: None,
            explanation: None,
        }
    }

    pub fn with_type(mut self, correction_type: CorrectionType) -> Self {
        self.correction_type = Some(correction_type);
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    /// Only corrections with `end > start` may be rendered or applied.
    pub fn is_renderable(&self) -> bool {
        self.end_index > self.start_index
    }

    pub fn range(&self) -> Range<usize> {
        self.start_index..self.end_index
    }

    /// Type used for styling and filtering; untyped corrections count as `Other`.
    pub fn kind(&self) -> CorrectionType {
        self.correction_type.unwrap_or(CorrectionType::Other)
    }

    /// Char length change produced by applying this correction.
    pub fn length_delta(&self) -> isize {
        self.replacement_text.chars().count() as isize
            - (self.end_index as isize - self.start_index as isize)
    }

    /// Whether this span intersects `range` (touching ends do not count).
    pub fn overlaps(&self, range: &Range<usize>) -> bool {
        self.start_index < range.end && self.end_index > range.start
    }

    /// Shift both offsets by `delta`. None if that would go negative.
    pub fn shifted(&self, delta: isize) -> Option<Self> {
        let start = self.start_index.checked_add_signed(delta)?;
        let end = self.end_index.checked_add_signed(delta)?;
        Some(Self {
            start_index: start,
            end_index: end,
            ..self.clone()
        })
    }
}

/// Identity of an issue within one snapshot of a surface's corrections.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(pub SmolStr);

impl IssueId {
    /// Derive an id from offsets and the ordinal within the filtered list.
    pub fn derive(start: usize, end: usize, ordinal: usize) -> Self {
        Self(format_smolstr!("{start}:{end}:{ordinal}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A correction with a stable identity and denormalised context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: IssueId,
    #[serde(flatten)]
    pub correction: Correction,
    pub original_text: String,
    pub surface_id: SurfaceId,
    pub surface_label: Option<SmolStr>,
    pub surface_kind: SurfaceKind,
}

impl Issue {
    pub fn range(&self) -> Range<usize> {
        self.correction.range()
    }

    pub fn kind(&self) -> CorrectionType {
        self.correction.kind()
    }
}

/// Surface context copied into every issue.
#[derive(Clone, Debug, PartialEq)]
pub struct IssueContext<'a> {
    pub surface_id: SurfaceId,
    pub surface_label: Option<&'a SmolStr>,
    pub surface_kind: SurfaceKind,
}

/// Assign ids to the renderable corrections, preserving order.
///
/// The ordinal counts positions in the filtered list, so ids are unique even
/// when two corrections share offsets.
pub fn identify(corrections: &[Correction]) -> impl Iterator<Item = (IssueId, &Correction)> {
    corrections
        .iter()
        .filter(|c| c.is_renderable())
        .enumerate()
        .map(|(ordinal, c)| (IssueId::derive(c.start_index, c.end_index, ordinal), c))
}

/// Build issues against the live `text`. Corrections whose offsets no longer
/// fit the text are skipped.
pub fn build_issues(text: &str, corrections: &[Correction], ctx: &IssueContext<'_>) -> Vec<Issue> {
    identify(corrections)
        .filter_map(|(id, c)| {
            let original = char_slice(text, c.range())?;
            Some(Issue {
                id,
                correction: c.clone(),
                original_text: original.to_string(),
                surface_id: ctx.surface_id,
                surface_label: ctx.surface_label.cloned(),
                surface_kind: ctx.surface_kind,
            })
        })
        .collect()
}

/// Find the issue covering a char offset.
pub fn issue_at_offset(issues: &[Issue], offset: usize) -> Option<&Issue> {
    issues
        .iter()
        .find(|i| i.correction.start_index <= offset && offset < i.correction.end_index)
}
