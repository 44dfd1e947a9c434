//! Structural change feed backed by a `MutationObserver`.

use std::cell::RefCell;
use std::rc::Rc;

use scribe_core::tracker::{StructuralChange, StructuralFeed};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::PlatformError;
use crate::node::{DomDocument, DomNode};

type Batches = Rc<RefCell<Vec<StructuralChange<DomNode>>>>;

/// Records added and removed subtrees below a root until drained.
pub struct MutationFeed {
    observer: web_sys::MutationObserver,
    document: DomDocument,
    batches: Batches,
    _callback: Closure<dyn FnMut(js_sys::Array, web_sys::MutationObserver)>,
}

impl MutationFeed {
    /// Observe `root`'s subtree. `notify` runs after each recorded batch so the
    /// host can schedule a sync.
    pub fn observe(
        document: &DomDocument,
        root: &DomNode,
        mut notify: impl FnMut() + 'static,
    ) -> Result<Self, PlatformError> {
        let batches: Batches = Rc::default();
        let sink = batches.clone();
        let doc = document.clone();
        let callback = Closure::<dyn FnMut(js_sys::Array, web_sys::MutationObserver)>::new(
            move |records: js_sys::Array, _observer: web_sys::MutationObserver| {
                let change = collect(&doc, &records);
                if change.added.is_empty() && change.removed.is_empty() {
                    return;
                }
                tracing::trace!(
                    target: "scribe::browser",
                    added = change.added.len(),
                    removed = change.removed.len(),
                    "structural batch"
                );
                sink.borrow_mut().push(change);
                notify();
            },
        );

        let observer = web_sys::MutationObserver::new(callback.as_ref().unchecked_ref())
            .map_err(|e| format!("MutationObserver failed: {:?}", e))?;
        let init = web_sys::MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        observer
            .observe_with_options(root.node(), &init)
            .map_err(|e| format!("observe failed: {:?}", e))?;

        Ok(Self {
            observer,
            document: document.clone(),
            batches,
            _callback: callback,
        })
    }

    pub fn disconnect(&self) {
        self.observer.disconnect();
    }
}

fn collect(document: &DomDocument, records: &js_sys::Array) -> StructuralChange<DomNode> {
    let mut change = StructuralChange::default();
    for record in records.iter() {
        let Ok(record) = record.dyn_into::<web_sys::MutationRecord>() else {
            continue;
        };
        let added = record.added_nodes();
        for i in 0..added.length() {
            if let Some(node) = added.item(i) {
                change.added.push(document.wrap(node));
            }
        }
        let removed = record.removed_nodes();
        for i in 0..removed.length() {
            if let Some(node) = removed.item(i) {
                change.removed.push(document.wrap(node));
            }
        }
    }
    change
}

impl StructuralFeed<DomNode> for MutationFeed {
    fn take_changes(&mut self) -> Vec<StructuralChange<DomNode>> {
        // Pick up records the observer has queued but not yet delivered.
        let pending = collect(&self.document, &self.observer.take_records());
        let mut batches = std::mem::take(&mut *self.batches.borrow_mut());
        if !pending.added.is_empty() || !pending.removed.is_empty() {
            batches.push(pending);
        }
        batches
    }
}

impl Drop for MutationFeed {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}
