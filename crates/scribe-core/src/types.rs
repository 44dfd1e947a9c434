//! Core identifiers and selection types.
//!
//! These types are framework-agnostic; hosts map their own element handles
//! onto [`NodeKey`]s and the tracker hands out [`SurfaceId`]s.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Stable identity of a tracked editable surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Host-provided key identifying an element across structural moves.
///
/// The browser adapter keeps these in a `WeakMap`, so re-inserting the same
/// element elsewhere in the document yields the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(pub u64);

/// What kind of editable surface an element is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SurfaceKind {
    /// Single-line `<input>` of a text-like type.
    PlainInput,
    /// `<textarea>`.
    PlainMultiline,
    /// Any element with the editable flag set.
    RichEditable,
}

impl SurfaceKind {
    /// Whether the surface exposes native linear range editing
    /// (`setRangeText`/`setSelectionRange`).
    pub fn is_linear(&self) -> bool {
        !matches!(self, Self::RichEditable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainInput => "plain-input",
            Self::PlainMultiline => "plain-multiline",
            Self::RichEditable => "rich-editable",
        }
    }
}

/// Text selection with anchor and head positions, in char offsets.
///
/// The anchor is where the selection started, the head is where the caret is now.
/// They may be in any order - use `start()` and `end()` for ordered bounds.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// Create a collapsed selection (caret position).
    pub fn collapsed(offset: usize) -> Self {
        Self {
            anchor: offset,
            head: offset,
        }
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    pub fn is_empty(&self) -> bool {
        self.is_collapsed()
    }

    pub fn to_range(&self) -> Range<usize> {
        self.start()..self.end()
    }

    pub fn is_backwards(&self) -> bool {
        self.head < self.anchor
    }

    /// Map this selection across a replacement of `replaced` by `new_len` chars.
    ///
    /// A selection entirely before the replaced range is untouched, one entirely
    /// after it shifts by the length delta, and one overlapping it collapses to
    /// the end of the replacement.
    pub fn across_replacement(&self, replaced: Range<usize>, new_len: usize) -> Self {
        if self.end() <= replaced.start {
            return *self;
        }
        if self.start() >= replaced.end {
            let shift = |p: usize| p - replaced.len() + new_len;
            return Self::new(shift(self.anchor), shift(self.head));
        }
        Self::collapsed(replaced.start + new_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_bounds() {
        let sel = Selection::new(10, 5);
        assert_eq!(sel.start(), 5);
        assert_eq!(sel.end(), 10);
        assert!(sel.is_backwards());
        assert_eq!(sel.to_range(), 5..10);
    }

    #[test]
    fn test_selection_before_replacement_untouched() {
        let sel = Selection::new(0, 2);
        assert_eq!(sel.across_replacement(2..5, 4), sel);
    }

    #[test]
    fn test_selection_after_replacement_shifts() {
        // "I has a" -> "I have a": caret after "a" moves one right.
        let sel = Selection::collapsed(7);
        assert_eq!(sel.across_replacement(2..5, 4), Selection::collapsed(8));

        // Shrinking replacement keeps direction.
        let sel = Selection::new(12, 9);
        assert_eq!(sel.across_replacement(2..5, 1), Selection::new(10, 7));
    }

    #[test]
    fn test_selection_overlapping_collapses() {
        let sel = Selection::new(3, 8);
        assert_eq!(sel.across_replacement(2..5, 4), Selection::collapsed(6));
    }

    #[test]
    fn test_surface_kind_linear() {
        assert!(SurfaceKind::PlainInput.is_linear());
        assert!(SurfaceKind::PlainMultiline.is_linear());
        assert!(!SurfaceKind::RichEditable.is_linear());
    }
}
