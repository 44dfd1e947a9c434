//! Listener registration with explicit release handles.
//!
//! Every `subscribe`/`on_*` registration in the crate returns a [`Subscription`].
//! Releasing it is the only way to detach a listener; dropping a handle leaves
//! the listener attached, so owners keep their handles in a [`SubscriptionSet`]
//! and release it from their `destroy()`.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Listener<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

/// Single-threaded broadcast of `T` values to registered listeners.
pub struct Emitter<T> {
    listeners: Rc<RefCell<Listeners<T>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Rc::clone(&self.listeners),
        }
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.borrow().entries.len())
            .finish()
    }
}

impl<T: 'static> Emitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: impl FnMut(&T) + 'static) -> Subscription {
        let listener: Listener<T> = Rc::new(RefCell::new(listener));
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, listener));
            id
        };

        let weak: Weak<RefCell<Listeners<T>>> = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners.borrow_mut().entries.retain(|(i, _)| *i != id);
            }
        })
    }

    /// Deliver `value` to every listener registered at the time of the call.
    ///
    /// Listeners may subscribe or release during delivery. A listener that
    /// re-enters its own emitter is skipped for the nested emission.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in snapshot {
            if let Ok(mut f) = listener.try_borrow_mut() {
                f(value);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }
}

/// Handle for a registered listener or resource.
#[must_use = "a Subscription must be kept and released, dropping it leaves the listener attached"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish()
    }
}

impl Subscription {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Detach the listener. Idempotent.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

/// Owned collection of handles, released together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    handles: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: Subscription) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release every held handle, exactly once each.
    pub fn release_all(&mut self) {
        for mut handle in self.handles.drain(..) {
            handle.release();
        }
    }
}
