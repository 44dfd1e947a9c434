//! Per-surface undo/redo of applied corrections.
//!
//! Applying a correction goes through the mutation layer, which the native undo
//! stack of many surfaces cannot see. `UndoHistory` keeps its own snapshot
//! stacks so those applications can be reverted with the usual shortcuts.

use std::collections::HashMap;

use smol_str::SmolStr;

use crate::types::{Selection, SurfaceId};

/// Text and selection of a surface at one point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub text: String,
    pub selection: Option<Selection>,
    /// Free-form tag, e.g. the issue id that triggered the save.
    pub metadata: Option<SmolStr>,
}

impl Snapshot {
    pub fn new(text: impl Into<String>, selection: Option<Selection>) -> Self {
        Self {
            text: text.into(),
            selection,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<SmolStr>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

#[derive(Debug, Default)]
struct Stacks {
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
}

/// Bounded undo/redo stacks keyed by surface.
#[derive(Debug)]
pub struct UndoHistory {
    stacks: HashMap<SurfaceId, Stacks>,
    max_steps: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl UndoHistory {
    pub fn new(max_steps: usize) -> Self {
        Self {
            stacks: HashMap::new(),
            max_steps: max_steps.max(1),
        }
    }

    /// Record the state before a mediated change.
    ///
    /// Consecutive snapshots with identical text are collapsed. Saving clears
    /// the redo stack.
    pub fn save(&mut self, surface: SurfaceId, snapshot: Snapshot) {
        let stacks = self.stacks.entry(surface).or_default();
        stacks.redo.clear();
        if stacks.undo.last().is_some_and(|top| top.text == snapshot.text) {
            return;
        }
        stacks.undo.push(snapshot);
        if stacks.undo.len() > self.max_steps {
            let excess = stacks.undo.len() - self.max_steps;
            stacks.undo.drain(..excess);
        }
    }

    pub fn can_undo(&self, surface: SurfaceId) -> bool {
        self.stacks.get(&surface).is_some_and(|s| !s.undo.is_empty())
    }

    pub fn can_redo(&self, surface: SurfaceId) -> bool {
        self.stacks.get(&surface).is_some_and(|s| !s.redo.is_empty())
    }

    /// Restore the most recent snapshot that differs from `current`.
    ///
    /// `current` goes onto the redo stack and `restore` is called with the
    /// snapshot being restored. Returns false when there is nothing to undo.
    pub fn undo(
        &mut self,
        surface: SurfaceId,
        current: Snapshot,
        restore: impl FnOnce(&Snapshot),
    ) -> bool {
        let Some(stacks) = self.stacks.get_mut(&surface) else {
            return false;
        };
        let Some(target) = pop_differing(&mut stacks.undo, &current.text) else {
            return false;
        };
        restore(&target);
        stacks.redo.push(current);
        true
    }

    /// Re-apply the most recently undone snapshot.
    pub fn redo(
        &mut self,
        surface: SurfaceId,
        current: Snapshot,
        restore: impl FnOnce(&Snapshot),
    ) -> bool {
        let Some(stacks) = self.stacks.get_mut(&surface) else {
            return false;
        };
        let Some(target) = pop_differing(&mut stacks.redo, &current.text) else {
            return false;
        };
        restore(&target);
        stacks.undo.push(current);
        if stacks.undo.len() > self.max_steps {
            stacks.undo.remove(0);
        }
        true
    }

    pub fn clear(&mut self, surface: SurfaceId) {
        self.stacks.remove(&surface);
    }

    pub fn clear_all(&mut self) {
        self.stacks.clear();
    }
}

fn pop_differing(stack: &mut Vec<Snapshot>, current: &str) -> Option<Snapshot> {
    while let Some(top) = stack.pop() {
        if top.text != current {
            return Some(top);
        }
    }
    None
}
