//! Busy indicator broadcasts.

use serde::{Deserialize, Serialize};

use crate::subscription::{Emitter, Subscription};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyState {
    pub busy: bool,
}

/// Emits [`BusyState`] only when busyness actually flips.
#[derive(Debug, Default)]
pub struct BusyTracker {
    busy: bool,
    changes: Emitter<BusyState>,
}

impl BusyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn subscribe(&self, listener: impl FnMut(&BusyState) + 'static) -> Subscription {
        self.changes.subscribe(listener)
    }

    /// Record the current state. Returns the broadcast, if one was sent.
    pub fn set(&mut self, busy: bool) -> Option<BusyState> {
        if self.busy == busy {
            return None;
        }
        self.busy = busy;
        let state = BusyState { busy };
        tracing::trace!(target: "scribe::busy", busy, "busy state changed");
        self.changes.emit(&state);
        Some(state)
    }
}
