//! Writing corrections into live surfaces.
//!
//! Every change goes through [`apply`], which picks the least disruptive
//! mechanism the surface offers and falls back to rewriting the whole text
//! when that fails.

use std::ops::Range;

use crate::error::{PlatformError, Result, ScribeError};
use crate::position::{NodePosition, TextNode, resolve_range};
use crate::text::{char_len, splice_chars};
use crate::types::{Selection, SurfaceKind};

/// Host-side view of an editable surface.
///
/// All offsets are char offsets into [`text`](Self::text).
pub trait EditableSurface {
    /// Handle to one text node of a rich surface.
    type Node: Clone;

    fn kind(&self) -> SurfaceKind;

    fn text(&self) -> String;

    /// Current selection, if the surface has one.
    fn selection(&self) -> Option<Selection>;

    fn set_selection(&mut self, selection: Selection) -> Result<(), PlatformError>;

    /// Native linear replacement (`setRangeText` or equivalent).
    fn replace_range(&mut self, range: Range<usize>, replacement: &str) -> Result<(), PlatformError>;

    /// Text nodes in document order. Empty for linear surfaces.
    fn text_nodes(&self) -> Vec<TextNode<Self::Node>>;

    /// Replace the content between two node positions.
    fn replace_nodes(
        &mut self,
        start: &NodePosition<Self::Node>,
        end: &NodePosition<Self::Node>,
        replacement: &str,
    ) -> Result<(), PlatformError>;

    /// Overwrite the whole text.
    fn set_text(&mut self, text: &str) -> Result<(), PlatformError>;

    /// Fire the surface's input event so host frameworks observe the change.
    fn dispatch_input(&mut self);
}

/// Which path an [`apply`] took.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Range-level replacement; caret and native undo preserved where possible.
    Native,
    /// Whole-text reconstruction.
    Degraded,
}

/// Replace `range` with `replacement` in `surface`.
///
/// The selection is carried across the replacement (shifted when outside it,
/// collapsed to the end of the replacement when overlapping) and the surface's
/// input event is fired on success.
pub fn apply<S: EditableSurface>(
    surface: &mut S,
    range: Range<usize>,
    replacement: &str,
) -> Result<ApplyOutcome> {
    let text = surface.text();
    let len = char_len(&text);
    if range.start >= range.end || range.end > len {
        return Err(ScribeError::InvalidRange {
            start: range.start,
            end: range.end,
            len,
        });
    }

    let selection = surface.selection();
    let outcome = match try_native(surface, range.clone(), replacement) {
        Ok(()) => ApplyOutcome::Native,
        Err(e) => {
            tracing::warn!(
                target: "scribe::mutation",
                kind = surface.kind().as_str(),
                error = %e,
                "native replacement failed, rewriting whole text"
            );
            let rebuilt = splice_chars(&text, range.clone(), replacement).ok_or(
                ScribeError::InvalidRange {
                    start: range.start,
                    end: range.end,
                    len,
                },
            )?;
            surface.set_text(&rebuilt)?;
            ApplyOutcome::Degraded
        }
    };

    if let Some(selection) = selection {
        let mapped = selection.across_replacement(range.clone(), char_len(replacement));
        if let Err(e) = surface.set_selection(mapped) {
            tracing::debug!(target: "scribe::mutation", error = %e, "could not restore selection");
        }
    }
    surface.dispatch_input();
    tracing::trace!(
        target: "scribe::mutation",
        ?range,
        ?outcome,
        "applied replacement"
    );
    Ok(outcome)
}

fn try_native<S: EditableSurface>(
    surface: &mut S,
    range: Range<usize>,
    replacement: &str,
) -> Result<(), PlatformError> {
    if surface.kind().is_linear() {
        return surface.replace_range(range, replacement);
    }
    let nodes = surface.text_nodes();
    let (start, end) = resolve_range(&nodes, range.start, range.end).ok_or_else(|| {
        PlatformError(format!(
            "range {}..{} does not resolve against {} text node(s)",
            range.start,
            range.end,
            nodes.len()
        ))
    })?;
    surface.replace_nodes(&start, &end, replacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySurface;

    #[test]
    fn test_linear_apply_preserves_caret_after_range() {
        let mut surface = MemorySurface::plain(SurfaceKind::PlainMultiline, "I has a radnom typo.")
            .with_selection(Selection::collapsed(20));
        let outcome = apply(&mut surface, 2..5, "have").unwrap();
        assert_eq!(outcome, ApplyOutcome::Native);
        assert_eq!(surface.text(), "I have a radnom typo.");
        assert_eq!(surface.selection(), Some(Selection::collapsed(21)));
        assert_eq!(surface.input_events(), 1);
    }

    #[test]
    fn test_overlapping_selection_collapses_to_replacement_end() {
        let mut surface = MemorySurface::plain(SurfaceKind::PlainInput, "teh cat")
            .with_selection(Selection::new(1, 5));
        apply(&mut surface, 0..3, "the").unwrap();
        assert_eq!(surface.selection(), Some(Selection::collapsed(3)));
    }

    #[test]
    fn test_rich_apply_resolves_through_nodes() {
        let mut surface = MemorySurface::rich(&["I has ", "a radnom", " typo."]);
        let outcome = apply(&mut surface, 9..14, "andom").unwrap();
        assert_eq!(outcome, ApplyOutcome::Native);
        assert_eq!(surface.text(), "I has a random typo.");
        assert_eq!(surface.node_texts().len(), 3);
    }

    #[test]
    fn test_failed_native_degrades_to_whole_text() {
        let mut surface =
            MemorySurface::rich(&["I has a radnom typo."]).with_broken_native();
        let outcome = apply(&mut surface, 2..5, "have").unwrap();
        assert_eq!(outcome, ApplyOutcome::Degraded);
        assert_eq!(surface.text(), "I have a radnom typo.");
        assert_eq!(surface.input_events(), 1);
    }

    #[test]
    fn test_invalid_range_is_rejected_without_input_event() {
        let mut surface = MemorySurface::plain(SurfaceKind::PlainInput, "short");
        assert!(matches!(
            apply(&mut surface, 3..9, "x"),
            Err(ScribeError::InvalidRange { len: 5, .. })
        ));
        assert!(apply(&mut surface, 2..2, "x").is_err());
        assert_eq!(surface.input_events(), 0);
    }
}
