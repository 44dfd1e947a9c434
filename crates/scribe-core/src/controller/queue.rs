use std::collections::VecDeque;

use crate::types::SurfaceId;

use super::Dispatch;

/// Global FIFO of dispatches awaiting a proofreader.
///
/// Requests across surfaces are served one at a time in arrival order. A
/// surface has at most one queued dispatch: a newer one takes the older one's
/// place at the back of the queue.
#[derive(Debug, Default)]
pub struct ProofreadQueue {
    items: VecDeque<Dispatch>,
}

impl ProofreadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue, returning the dispatch it superseded, if any.
    pub fn push(&mut self, dispatch: Dispatch) -> Option<Dispatch> {
        let superseded = self
            .items
            .iter()
            .position(|d| d.surface == dispatch.surface)
            .and_then(|i| self.items.remove(i));
        self.items.push_back(dispatch);
        superseded
    }

    pub fn pop(&mut self) -> Option<Dispatch> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove a surface's queued dispatch.
    pub fn drop_surface(&mut self, surface: SurfaceId) -> Option<Dispatch> {
        let index = self.items.iter().position(|d| d.surface == surface)?;
        self.items.remove(index)
    }

    pub fn clear(&mut self) -> Vec<Dispatch> {
        self.items.drain(..).collect()
    }
}
