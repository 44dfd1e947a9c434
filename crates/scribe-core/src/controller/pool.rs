use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::error::ScribeError;
use crate::service::ProofreaderFactory;

struct PoolState<P> {
    cache: RefCell<HashMap<SmolStr, Rc<P>>>,
    active: Cell<usize>,
    teardown_pending: Cell<bool>,
}

impl<P> PoolState<P> {
    fn teardown(&self) {
        let released = self.cache.borrow_mut().drain().count();
        self.teardown_pending.set(false);
        tracing::debug!(target: "scribe::pool", released, "proofreader pool torn down");
    }
}

/// One proofreader per language, created on first use.
///
/// Operations hold an [`ActiveGuard`] while they use a proofreader; teardown
/// requested during an operation is deferred until the last guard drops.
pub struct ProofreaderPool<F: ProofreaderFactory> {
    factory: F,
    state: Rc<PoolState<F::Proofreader>>,
}

impl<F: ProofreaderFactory> fmt::Debug for ProofreaderPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofreaderPool")
            .field("languages", &self.state.cache.borrow().len())
            .field("active", &self.state.active.get())
            .finish()
    }
}

impl<F: ProofreaderFactory> ProofreaderPool<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            state: Rc::new(PoolState {
                cache: RefCell::new(HashMap::new()),
                active: Cell::new(0),
                teardown_pending: Cell::new(false),
            }),
        }
    }

    /// The cached proofreader for `language`, creating it if needed.
    pub fn get(&self, language: &str) -> Result<Rc<F::Proofreader>, ScribeError> {
        if let Some(existing) = self.state.cache.borrow().get(language) {
            return Ok(Rc::clone(existing));
        }
        let created = Rc::new(self.factory.create(language)?);
        tracing::debug!(target: "scribe::pool", %language, "created proofreader");
        self.state
            .cache
            .borrow_mut()
            .insert(SmolStr::new(language), Rc::clone(&created));
        Ok(created)
    }

    /// Mark an operation as in progress until the guard drops.
    pub fn acquire(&self) -> ActiveGuard<F::Proofreader> {
        self.state.active.set(self.state.active.get() + 1);
        ActiveGuard {
            state: Rc::clone(&self.state),
        }
    }

    pub fn active(&self) -> usize {
        self.state.active.get()
    }

    pub fn len(&self) -> usize {
        self.state.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every proofreader now, or fail with `PoolBusy` and release them
    /// once the active operations finish.
    pub fn try_teardown(&self) -> Result<(), ScribeError> {
        let active = self.state.active.get();
        if active > 0 {
            self.state.teardown_pending.set(true);
            return Err(ScribeError::PoolBusy { active });
        }
        self.state.teardown();
        Ok(())
    }
}

/// Keeps the pool's active count raised while alive.
#[must_use]
pub struct ActiveGuard<P> {
    state: Rc<PoolState<P>>,
}

impl<P> Drop for ActiveGuard<P> {
    fn drop(&mut self) {
        let remaining = self.state.active.get().saturating_sub(1);
        self.state.active.set(remaining);
        if remaining == 0 && self.state.teardown_pending.get() {
            self.state.teardown();
        }
    }
}
