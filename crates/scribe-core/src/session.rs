//! Single-threaded driver tying the components together.
//!
//! A [`Session`] owns the tracker, controller, queue, store and undo history
//! behind one `RefCell`. Borrows are scoped to synchronous sections and never
//! held across an `.await`, so hosts may call back into the session from
//! listeners and input handlers while a proofread is pending.
//!
//! Updates and busy broadcasts are emitted after the borrow is released.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use web_time::Instant;

use crate::busy::{BusyState, BusyTracker};
use crate::config::{PreferenceSource, Preferences, ScribeConfig};
use crate::controller::{
    Controller, Dispatch, InputKind, LanguageResolver, LanguageStatus, Phase,
    ProofreadQueue, ProofreaderPool, Scope,
};
use crate::correction::{Correction, Issue, IssueId};
use crate::error::{Result, ScribeError};
use crate::history::{Snapshot, UndoHistory};
use crate::mutation::{self, ApplyOutcome, EditableSurface};
use crate::service::{
    ErrorCode, LanguageDetector, ProofreadRequest, Proofreader, ProofreaderFactory, ServiceError,
};
use crate::shortcut::{HistoryAction, Key, Modifiers, history_action};
use crate::store::{CorrectionStore, IssueUpdate, MessageCode};
use crate::subscription::{Emitter, Subscription, SubscriptionSet};
use crate::text::{char_slice, splice_chars};
use crate::tracker::{StructuralFeed, SurfaceNode, Tracker};
use crate::types::{SurfaceId, SurfaceKind};

struct Inner<N> {
    tracker: Tracker<N>,
    controller: Controller,
    queue: ProofreadQueue,
    store: CorrectionStore,
    history: UndoHistory,
    busy: BusyTracker,
    known: BTreeSet<SurfaceId>,
}

impl<N: SurfaceNode> Inner<N> {
    /// Bring store and controller in line with what the tracker holds.
    fn reconcile(&mut self) {
        let current: BTreeSet<SurfaceId> = self.tracker.surfaces().map(|s| s.id).collect();

        for gone in self.known.difference(&current).copied().collect::<Vec<_>>() {
            if let Some(queued) = self.queue.drop_surface(gone) {
                self.controller.discard(queued.run_id);
            }
            self.controller.remove_surface(gone);
            self.store.remove_surface(gone);
            self.history.clear(gone);
            tracing::debug!(target: "scribe::session", surface = %gone, "surface dropped");
        }

        for surface in self.tracker.surfaces() {
            self.store.upsert_surface(surface.meta());
            if !self.known.contains(&surface.id) {
                let text = surface.node.current_text();
                self.controller.track(surface.id, &text, &mut self.store);
                tracing::debug!(target: "scribe::session", surface = %surface.id, "surface tracked");
            }
        }
        self.known = current;
    }

    fn enqueue(&mut self, dispatch: Dispatch) {
        if let Some(superseded) = self.queue.push(dispatch) {
            self.controller.discard(superseded.run_id);
        }
    }

    fn apply_preferences(&mut self, prefs: &Preferences) {
        self.store.set_enabled_types(Some(prefs.enabled_types.clone()));
        self.controller.set_live(prefs.live_proofreading);
    }
}

/// Resets the drain flag when the drain future completes or is dropped.
struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Proofreading session for one page.
pub struct Session<N, F: ProofreaderFactory, D> {
    inner: Rc<RefCell<Inner<N>>>,
    pool: ProofreaderPool<F>,
    detector: D,
    resolver: LanguageResolver,
    draining: Cell<bool>,
    updates: Emitter<IssueUpdate>,
    busy_changes: Emitter<BusyState>,
    subscriptions: RefCell<SubscriptionSet>,
}

impl<N, F, D> Session<N, F, D>
where
    N: SurfaceNode + 'static,
    F: ProofreaderFactory,
    D: LanguageDetector,
{
    pub fn new(config: ScribeConfig, factory: F, detector: D) -> Self {
        let inner = Inner {
            tracker: Tracker::new(),
            controller: Controller::new(config.debounce()),
            queue: ProofreadQueue::new(),
            store: CorrectionStore::new(config.page_id.clone()),
            history: UndoHistory::new(config.undo_depth),
            busy: BusyTracker::new(),
            known: BTreeSet::new(),
        };
        Self {
            inner: Rc::new(RefCell::new(inner)),
            pool: ProofreaderPool::new(factory),
            detector,
            resolver: LanguageResolver::new(
                config.min_detection_chars,
                config.detection_confidence,
                config.fallback_language.clone(),
            ),
            draining: Cell::new(false),
            updates: Emitter::new(),
            busy_changes: Emitter::new(),
            subscriptions: RefCell::new(SubscriptionSet::new()),
        }
    }

    // === Subscriptions ===

    pub fn subscribe_updates(&self, listener: impl FnMut(&IssueUpdate) + 'static) -> Subscription {
        self.updates.subscribe(listener)
    }

    pub fn subscribe_busy(&self, listener: impl FnMut(&BusyState) + 'static) -> Subscription {
        self.busy_changes.subscribe(listener)
    }

    /// Follow a preference source until [`destroy`](Self::destroy).
    pub fn bind_preferences<P: PreferenceSource>(&self, source: &P) {
        self.inner.borrow_mut().apply_preferences(&source.snapshot());
        self.flush();

        let weak = Rc::downgrade(&self.inner);
        let updates = self.updates.clone();
        let handle = source.subscribe(Box::new(move |prefs: &Preferences| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let update = match inner.try_borrow_mut() {
                Ok(mut inner) => {
                    inner.apply_preferences(prefs);
                    inner.store.flush()
                }
                Err(_) => {
                    tracing::warn!(target: "scribe::session", "preference change during session update, ignored");
                    None
                }
            };
            if let Some(update) = update {
                updates.emit(&update);
            }
        }));
        self.subscriptions.borrow_mut().push(handle);
    }

    // === Surfaces ===

    /// Scan `root` for surfaces and start following them.
    pub fn track(&self, root: &N) -> Vec<SurfaceId> {
        let found = {
            let mut inner = self.inner.borrow_mut();
            let found = inner.tracker.scan(root);
            inner.reconcile();
            found
        };
        self.flush();
        found
    }

    /// Apply pending structural changes from `feed`.
    pub fn sync<S: StructuralFeed<N>>(&self, feed: &mut S) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.tracker.sync(feed);
            inner.reconcile();
        }
        self.flush();
    }

    pub fn surface_for(&self, node: &N) -> Option<SurfaceId> {
        self.inner.borrow().tracker.surface_for(node)
    }

    pub fn focus(&self, node: &N) -> Option<SurfaceId> {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.tracker.focus(node)?;
            inner.store.set_active(Some(id));
            id
        };
        self.flush();
        Some(id)
    }

    pub fn blur(&self, node: &N) -> Option<SurfaceId> {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.tracker.blur(node)?;
            let active = inner.tracker.active_surface();
            inner.store.set_active(active);
            id
        };
        self.flush();
        Some(id)
    }

    /// Feed the surface's current text after an input event.
    pub fn on_input(&self, node: &N, text: &str, now: Instant) -> Option<InputKind> {
        let kind = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.tracker.input(node)?;
            let Inner { controller, store, .. } = &mut *inner;
            controller.on_input(id, text, now, store)
        };
        // Mediated changes are flushed by the operation that caused them,
        // once the store has been rebased.
        if kind != InputKind::Mediated {
            self.flush();
        }
        Some(kind)
    }

    // === Scheduling ===

    /// Earliest time [`poll`](Self::poll) has work to do.
    pub fn next_due(&self) -> Option<Instant> {
        self.inner.borrow().controller.next_due()
    }

    /// Queue every run whose debounce elapsed. Returns how many were queued.
    pub fn poll(&self, now: Instant) -> usize {
        let queued = {
            let mut inner = self.inner.borrow_mut();
            let due = inner.controller.poll(now);
            let count = due.len();
            for dispatch in due {
                inner.enqueue(dispatch);
            }
            count
        };
        if queued > 0 {
            self.refresh_busy();
        }
        queued
    }

    /// Queue a run right away, bypassing the debounce and the live toggle.
    pub fn request_now(&self, surface: SurfaceId, scope: Scope) -> Result<()> {
        {
            let mut inner = self.inner.borrow_mut();
            let dispatch = inner.controller.request_now(surface, scope)?;
            inner.enqueue(dispatch);
        }
        self.refresh_busy();
        Ok(())
    }

    pub fn cancel_all(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.controller.cancel_all();
            let dropped = inner.queue.clear();
            tracing::debug!(target: "scribe::session", dropped = dropped.len(), "queue cleared");
        }
        self.refresh_busy();
    }

    /// Serve the queue until it is empty. Returns the number of runs served.
    ///
    /// Only one drain runs at a time; a second concurrent call returns 0
    /// immediately and the active drain picks up whatever it queued.
    pub async fn drain(&self) -> usize {
        if self.draining.replace(true) {
            return 0;
        }
        let guard = DrainGuard(&self.draining);
        self.refresh_busy();

        let mut served = 0;
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                if inner.queue.is_empty() {
                    // Pick up retries of stale or cancelled runs.
                    for dispatch in inner.controller.poll(Instant::now()) {
                        inner.enqueue(dispatch);
                    }
                }
                inner.queue.pop()
            };
            let Some(dispatch) = next else {
                break;
            };
            self.run(dispatch).await;
            served += 1;
        }

        drop(guard);
        self.refresh_busy();
        served
    }

    async fn run(&self, dispatch: Dispatch) {
        let surface = dispatch.surface;
        let resolution = self.resolver.resolve(&self.detector, &dispatch.text).await;
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.known.contains(&surface) {
                tracing::debug!(target: "scribe::session", %surface, "surface removed during detection");
                return;
            }
            match resolution.advisory() {
                Some(message) => {
                    let stale: Vec<MessageCode> = MessageCode::LANGUAGE
                        .into_iter()
                        .filter(|c| *c != message.code)
                        .collect();
                    inner.store.clear_messages(surface, &stale);
                    inner.store.set_message(surface, message);
                }
                None if resolution.status == LanguageStatus::Confident => {
                    inner.store.clear_messages(surface, &MessageCode::LANGUAGE);
                }
                None => {}
            }
        }

        let outcome = match self.pool.get(&resolution.language) {
            Ok(proofreader) => {
                let _active = self.pool.acquire();
                let request = ProofreadRequest {
                    request_id: dispatch.run_id.0,
                    text: dispatch.text.clone(),
                    language: resolution.language.clone(),
                    fallback_language: self.resolver.fallback().clone(),
                };
                tracing::trace!(
                    target: "scribe::session",
                    %surface,
                    run = dispatch.run_id.0,
                    language = %request.language,
                    "proofreading"
                );
                proofreader.proofread(&request).await.into_outcome()
            }
            Err(ScribeError::Service { code, message }) => Err(ServiceError::new(code, message)),
            Err(e) => Err(ServiceError::new(ErrorCode::Unknown, e.to_string())),
        };

        let (completion, update) = {
            let mut inner = self.inner.borrow_mut();
            let Inner { controller, store, .. } = &mut *inner;
            let completion = controller.complete(dispatch.run_id, outcome, Instant::now(), store);
            (completion, store.flush())
        };
        tracing::debug!(target: "scribe::session", %surface, ?completion, "run completed");
        if let Some(update) = update {
            self.updates.emit(&update);
        }
    }

    // === Mutation ===

    /// Write one issue's replacement into `target` and rebase the rest.
    pub fn apply<S: EditableSurface>(
        &self,
        surface: SurfaceId,
        issue: &IssueId,
        target: &mut S,
    ) -> Result<ApplyOutcome> {
        let current = target.text();
        let found = {
            let mut inner = self.inner.borrow_mut();
            let found = inner
                .store
                .issue(surface, issue)
                .filter(|i| char_slice(&current, i.range()) == Some(i.original_text.as_str()))
                .ok_or_else(|| ScribeError::UnknownIssue {
                    surface,
                    issue: issue.clone(),
                })?;
            let expected = splice_chars(&current, found.range(), &found.correction.replacement_text)
                .ok_or(ScribeError::InvalidRange {
                    start: found.correction.start_index,
                    end: found.correction.end_index,
                    len: current.chars().count(),
                })?;
            let snapshot =
                Snapshot::new(current.clone(), target.selection()).with_metadata(issue.as_str());
            inner.history.save(surface, snapshot);
            inner.controller.mark_mediated(surface, expected);
            found
        };

        // The surface fires its input event in here; a host handler may call
        // `on_input` re-entrantly.
        let outcome = match mutation::apply(target, found.range(), &found.correction.replacement_text) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(target: "scribe::session", %surface, %issue, error = %e, "apply failed");
                self.inner.borrow_mut().controller.clear_mediated(surface);
                return Err(e);
            }
        };

        self.settle_mediated(surface, &target.text(), &found.correction);
        tracing::debug!(target: "scribe::session", %surface, %issue, ?outcome, "issue applied");
        Ok(outcome)
    }

    /// Undo the last applied change on `target`. Returns false when there was
    /// nothing to undo.
    pub fn undo<S: EditableSurface>(&self, surface: SurfaceId, target: &mut S) -> Result<bool> {
        self.step_history(surface, target, HistoryAction::Undo)
    }

    pub fn redo<S: EditableSurface>(&self, surface: SurfaceId, target: &mut S) -> Result<bool> {
        self.step_history(surface, target, HistoryAction::Redo)
    }

    /// Handle an undo/redo key combination. Returns whether it was consumed.
    pub fn handle_history_key<S: EditableSurface>(
        &self,
        surface: SurfaceId,
        target: &mut S,
        key: &Key,
        modifiers: Modifiers,
        is_mac: bool,
    ) -> Result<bool> {
        let Some(action) = history_action(key, modifiers, is_mac) else {
            return Ok(false);
        };
        if !self.can_step(surface, action) {
            // Let the surface's native history handle it.
            return Ok(false);
        }
        self.step_history(surface, target, action)
    }

    pub fn can_undo(&self, surface: SurfaceId) -> bool {
        self.can_step(surface, HistoryAction::Undo)
    }

    pub fn can_redo(&self, surface: SurfaceId) -> bool {
        self.can_step(surface, HistoryAction::Redo)
    }

    fn can_step(&self, surface: SurfaceId, action: HistoryAction) -> bool {
        let inner = self.inner.borrow();
        match action {
            HistoryAction::Undo => inner.history.can_undo(surface),
            HistoryAction::Redo => inner.history.can_redo(surface),
        }
    }

    fn step_history<S: EditableSurface>(
        &self,
        surface: SurfaceId,
        target: &mut S,
        action: HistoryAction,
    ) -> Result<bool> {
        let current = target.text();
        let restored = {
            let mut inner = self.inner.borrow_mut();
            let snapshot = Snapshot::new(current.clone(), target.selection());
            let mut restored = None;
            let stepped = match action {
                HistoryAction::Undo => inner.history.undo(surface, snapshot, |s| restored = Some(s.clone())),
                HistoryAction::Redo => inner.history.redo(surface, snapshot, |s| restored = Some(s.clone())),
            };
            match restored {
                Some(restored) if stepped => {
                    inner.controller.mark_mediated(surface, restored.text.clone());
                    restored
                }
                _ => return Ok(false),
            }
        };

        if let Err(e) = target.set_text(&restored.text) {
            self.inner.borrow_mut().controller.clear_mediated(surface);
            return Err(e.into());
        }
        if let Some(selection) = restored.selection {
            if let Err(e) = target.set_selection(selection) {
                tracing::debug!(target: "scribe::session", %surface, error = %e, "could not restore selection");
            }
        }
        target.dispatch_input();

        let edit = text_edit(&current, &restored.text);
        self.settle_mediated(surface, &restored.text, &edit);
        tracing::debug!(target: "scribe::session", %surface, ?action, "history step applied");
        Ok(true)
    }

    /// Record a mediated change: classify the input, rebase and publish.
    fn settle_mediated(&self, surface: SurfaceId, new_text: &str, edit: &Correction) {
        let update = {
            let mut inner = self.inner.borrow_mut();
            let Inner { controller, store, .. } = &mut *inner;
            // A no-op when the host already reported the input event.
            controller.on_input(surface, new_text, Instant::now(), store);
            controller.clear_mediated(surface);
            store.rebase_after_apply(surface, edit, new_text);
            store.flush()
        };
        if let Some(update) = update {
            self.updates.emit(&update);
        }
    }

    // === Queries ===

    pub fn snapshot(&self) -> IssueUpdate {
        self.inner.borrow().store.snapshot()
    }

    pub fn issues(&self, surface: SurfaceId) -> Vec<Issue> {
        self.inner.borrow().store.issues(surface)
    }

    /// The tracked element behind `surface` and its kind.
    pub fn node(&self, surface: SurfaceId) -> Option<(N, SurfaceKind)> {
        let inner = self.inner.borrow();
        let tracked = inner.tracker.by_id(surface)?;
        Some((tracked.node.clone(), tracked.kind))
    }

    pub fn phase(&self, surface: SurfaceId) -> Phase {
        self.inner.borrow().controller.phase(surface)
    }

    pub fn is_busy(&self) -> bool {
        self.inner.borrow().busy.is_busy()
    }

    pub fn surfaces(&self) -> Vec<SurfaceId> {
        self.inner.borrow().known.iter().copied().collect()
    }

    // === Teardown ===

    /// Cancel everything, release owned subscriptions and the proofreaders.
    /// Proofreaders still in use are released when their operation ends.
    pub fn destroy(&self) {
        self.cancel_all();
        self.subscriptions.borrow_mut().release_all();
        if let Err(e) = self.pool.try_teardown() {
            tracing::debug!(target: "scribe::session", error = %e, "proofreader teardown deferred");
        }
        self.inner.borrow_mut().history.clear_all();
    }

    fn flush(&self) {
        let update = self.inner.borrow_mut().store.flush();
        if let Some(update) = update {
            self.updates.emit(&update);
        }
    }

    fn refresh_busy(&self) {
        let change = {
            let mut inner = self.inner.borrow_mut();
            let busy = self.draining.get() || !inner.queue.is_empty();
            inner.busy.set(busy)
        };
        if let Some(state) = change {
            self.busy_changes.emit(&state);
        }
    }
}

/// The single replacement turning `from` into `to`, found by trimming the
/// common prefix and suffix.
fn text_edit(from: &str, to: &str) -> Correction {
    let a: Vec<char> = from.chars().collect();
    let b: Vec<char> = to.chars().collect();
    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let max_suffix = a.len().min(b.len()) - prefix;
    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();
    let replacement: String = b[prefix..b.len() - suffix].iter().collect();
    Correction::new(prefix, a.len() - suffix, replacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Range;
    use std::time::Duration;

    use tokio::sync::Notify;

    use crate::config::MemoryPreferences;
    use crate::correction::CorrectionType;
    use crate::error::PlatformError;
    use crate::memory::{MemoryDocument, MemoryFeed, MemoryNode, MemorySurface};
    use crate::service::{LanguageCandidate, NoDetector, ProofreadResponse, ProofreadResult};
    use crate::position::{NodePosition, TextNode};
    use crate::store::Severity;
    use crate::types::{Selection, SurfaceKind};

    const TYPOS: &[(&str, &str, CorrectionType)] = &[
        ("has", "have", CorrectionType::Grammar),
        ("radnom", "random", CorrectionType::Spelling),
        ("teh", "the", CorrectionType::Spelling),
    ];

    /// Flags known typos word by word.
    struct Dictionary {
        gate: Option<Rc<Notify>>,
        seen: Rc<RefCell<Vec<ProofreadRequest>>>,
    }

    impl Proofreader for Dictionary {
        async fn proofread(&self, request: &ProofreadRequest) -> ProofreadResponse {
            self.seen.borrow_mut().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let mut corrections = Vec::new();
            let mut offset = 0;
            for (i, word) in request.text.split(' ').enumerate() {
                if i > 0 {
                    offset += 1;
                }
                let len = word.chars().count();
                if let Some((_, fix, kind)) = TYPOS.iter().find(|(typo, _, _)| *typo == word) {
                    corrections.push(Correction::new(offset, offset + len, *fix).with_type(*kind));
                }
                offset += len;
            }
            let mut corrected = request.text.clone();
            for c in corrections.iter().rev() {
                if let Some(next) = splice_chars(&corrected, c.range(), &c.replacement_text) {
                    corrected = next;
                }
            }
            ProofreadResponse::success(
                request.request_id,
                ProofreadResult {
                    corrected_text: corrected,
                    corrections,
                },
            )
        }
    }

    #[derive(Default)]
    struct Factory {
        gate: Option<Rc<Notify>>,
        seen: Rc<RefCell<Vec<ProofreadRequest>>>,
    }

    impl ProofreaderFactory for Factory {
        type Proofreader = Dictionary;

        fn create(&self, language: &str) -> Result<Dictionary> {
            if language != "en" {
                return Err(ScribeError::Service {
                    code: ErrorCode::UnsupportedLanguage,
                    message: format!("no model for {language}"),
                });
            }
            Ok(Dictionary {
                gate: self.gate.clone(),
                seen: Rc::clone(&self.seen),
            })
        }
    }

    struct FixedDetector(&'static str, f32);

    impl LanguageDetector for FixedDetector {
        async fn detect(&self, _text: &str) -> Result<Vec<LanguageCandidate>> {
            Ok(vec![LanguageCandidate {
                language: self.0.into(),
                confidence: self.1,
            }])
        }
    }

    fn config() -> ScribeConfig {
        ScribeConfig {
            debounce_ms: 200,
            ..Default::default()
        }
    }

    struct Page {
        doc: MemoryDocument,
        field: MemoryNode,
    }

    fn page() -> Page {
        let doc = MemoryDocument::new();
        let field = doc.element("textarea", &[("id", "body"), ("aria-label", "Body")]);
        doc.root().append(&field);
        Page { doc, field }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn collect_updates<N, F, D>(session: &Session<N, F, D>) -> (Rc<RefCell<Vec<IssueUpdate>>>, Subscription)
    where
        N: SurfaceNode + 'static,
        F: ProofreaderFactory,
        D: LanguageDetector,
    {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = session.subscribe_updates(move |u: &IssueUpdate| sink.borrow_mut().push(u.clone()));
        (seen, sub)
    }

    #[tokio::test]
    async fn test_debounce_dispatches_latest_snapshot_once() {
        let page = page();
        let factory = Factory::default();
        let seen = Rc::clone(&factory.seen);
        let session = Session::new(config(), factory, NoDetector);
        let ids = session.track(&page.doc.root());
        assert_eq!(ids.len(), 1);

        let t0 = Instant::now();
        session.on_input(&page.field, "I has", t0);
        session.on_input(&page.field, "I has a radnom typo.", t0 + ms(50));
        assert_eq!(session.poll(t0 + ms(200)), 0);
        assert_eq!(session.next_due(), Some(t0 + ms(250)));
        assert_eq!(session.poll(t0 + ms(250)), 1);
        assert_eq!(session.drain().await, 1);

        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].text, "I has a radnom typo.");
        let issues = session.issues(ids[0]);
        let originals: Vec<&str> = issues.iter().map(|i| i.original_text.as_str()).collect();
        assert_eq!(originals, vec!["has", "radnom"]);
        assert_eq!(session.phase(ids[0]), Phase::Idle);
    }

    #[tokio::test]
    async fn test_apply_rebases_remaining_issue_and_schedules_rerun() {
        let page = page();
        let session = Session::new(config(), Factory::default(), NoDetector);
        let surface = session.track(&page.doc.root())[0];
        let text = "I has a radnom typo.";
        let t0 = Instant::now();
        session.on_input(&page.field, text, t0);
        session.poll(t0 + ms(200));
        session.drain().await;

        let mut target = MemorySurface::plain(SurfaceKind::PlainMultiline, text);
        let has = session.issues(surface)[0].id.clone();
        let outcome = session.apply(surface, &has, &mut target).unwrap();

        assert_eq!(outcome, ApplyOutcome::Native);
        assert_eq!(target.text(), "I have a radnom typo.");
        assert_eq!(target.input_events(), 1);
        let remaining = session.issues(surface);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].range(), 9..15);
        assert_eq!(remaining[0].original_text, "radnom");
        // Mediated: corrections kept, re-proofread scheduled.
        assert_eq!(session.phase(surface), Phase::Scheduled);
    }

    /// Reports its input event back into the session, like a DOM listener.
    struct Reporting<'a> {
        surface: MemorySurface,
        session: &'a Session<MemoryNode, Factory, NoDetector>,
        node: MemoryNode,
        kinds: Vec<Option<InputKind>>,
    }

    impl EditableSurface for Reporting<'_> {
        type Node = usize;

        fn kind(&self) -> SurfaceKind {
            self.surface.kind()
        }

        fn text(&self) -> String {
            self.surface.text()
        }

        fn selection(&self) -> Option<Selection> {
            self.surface.selection()
        }

        fn set_selection(&mut self, selection: Selection) -> Result<(), PlatformError> {
            self.surface.set_selection(selection)
        }

        fn replace_range(&mut self, range: Range<usize>, replacement: &str) -> Result<(), PlatformError> {
            self.surface.replace_range(range, replacement)
        }

        fn text_nodes(&self) -> Vec<TextNode<usize>> {
            self.surface.text_nodes()
        }

        fn replace_nodes(
            &mut self,
            start: &NodePosition<usize>,
            end: &NodePosition<usize>,
            replacement: &str,
        ) -> Result<(), PlatformError> {
            self.surface.replace_nodes(start, end, replacement)
        }

        fn set_text(&mut self, text: &str) -> Result<(), PlatformError> {
            self.surface.set_text(text)
        }

        fn dispatch_input(&mut self) {
            self.surface.dispatch_input();
            let text = self.surface.text();
            let kind = self.session.on_input(&self.node, &text, Instant::now());
            self.kinds.push(kind);
        }
    }

    #[tokio::test]
    async fn test_reentrant_input_during_apply_is_mediated() {
        let page = page();
        let session = Session::new(config(), Factory::default(), NoDetector);
        let surface = session.track(&page.doc.root())[0];
        let text = "teh cat";
        let t0 = Instant::now();
        session.on_input(&page.field, text, t0);
        session.poll(t0 + ms(200));
        session.drain().await;

        let mut target = Reporting {
            surface: MemorySurface::plain(SurfaceKind::PlainMultiline, text),
            session: &session,
            node: page.field.clone(),
            kinds: Vec::new(),
        };
        let id = session.issues(surface)[0].id.clone();
        session.apply(surface, &id, &mut target).unwrap();

        assert_eq!(target.kinds, vec![Some(InputKind::Mediated)]);
        assert_eq!(target.text(), "the cat");
        assert!(session.issues(surface).is_empty());
        assert_eq!(session.phase(surface), Phase::Scheduled);
    }

    #[tokio::test]
    async fn test_user_edit_clears_corrections() {
        let page = page();
        let session = Session::new(config(), Factory::default(), NoDetector);
        let surface = session.track(&page.doc.root())[0];
        let t0 = Instant::now();
        session.on_input(&page.field, "teh cat", t0);
        session.poll(t0 + ms(200));
        session.drain().await;
        assert_eq!(session.issues(surface).len(), 1);

        let kind = session.on_input(&page.field, "teh cats", t0 + ms(400));
        assert_eq!(kind, Some(InputKind::Unmediated));
        assert!(session.issues(surface).is_empty());

        let mut target = MemorySurface::plain(SurfaceKind::PlainMultiline, "teh cats");
        let stale = IssueId::derive(0, 3, 0);
        assert!(matches!(
            session.apply(surface, &stale, &mut target),
            Err(ScribeError::UnknownIssue { .. })
        ));
        assert_eq!(target.text(), "teh cats");
    }

    #[tokio::test]
    async fn test_unsupported_language_reports_once_without_retry() {
        let page = page();
        let session = Session::new(config(), Factory::default(), FixedDetector("xx", 0.99));
        let surface = session.track(&page.doc.root())[0];
        let (updates, mut sub) = collect_updates(&session);

        let t0 = Instant::now();
        session.on_input(&page.field, "Ceci est un texte assez long pour la detection.", t0);
        session.poll(t0 + ms(200));
        assert_eq!(session.drain().await, 1);

        let snapshot = session.snapshot();
        let messages = &snapshot.groups[0].messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].code, MessageCode::UnsupportedLanguage);
        assert_eq!(messages[0].severity, Severity::Error);
        assert_eq!(session.phase(surface), Phase::Idle);
        assert_eq!(session.next_due(), None);
        assert!(updates.borrow().last().is_some_and(|u| u.revision == snapshot.revision));
        sub.release();
    }

    #[tokio::test]
    async fn test_low_confidence_falls_back_with_advisory() {
        let page = page();
        let factory = Factory::default();
        let seen = Rc::clone(&factory.seen);
        let session = Session::new(config(), factory, FixedDetector("de", 0.2));
        let surface = session.track(&page.doc.root())[0];

        let t0 = Instant::now();
        session.on_input(&page.field, "this sentence has enough characters", t0);
        session.poll(t0 + ms(200));
        session.drain().await;

        assert_eq!(seen.borrow()[0].language, "en");
        let group = &session.snapshot().groups[0];
        assert_eq!(group.messages[0].code, MessageCode::LanguageLowConfidence);
        assert_eq!(group.messages[0].severity, Severity::Advisory);
        assert_eq!(session.issues(surface).len(), 1);
    }

    #[tokio::test]
    async fn test_stale_result_is_retried_not_committed() {
        let page = page();
        let gate = Rc::new(Notify::new());
        let factory = Factory {
            gate: Some(Rc::clone(&gate)),
            ..Default::default()
        };
        let seen = Rc::clone(&factory.seen);
        let session = Session::new(config(), factory, NoDetector);
        let surface = session.track(&page.doc.root())[0];

        let t0 = Instant::now();
        session.on_input(&page.field, "teh cat", t0);
        session.poll(t0 + ms(200));

        let edit = async {
            tokio::task::yield_now().await;
            // Typed while the first run is in flight.
            session.on_input(&page.field, "teh dog", t0 + ms(300));
            assert_eq!(session.drain().await, 0, "second drainer must not start");
            gate.notify_one();
        };
        let (served, ()) = tokio::join!(session.drain(), edit);
        assert_eq!(served, 1);
        assert!(session.issues(surface).is_empty());
        assert_eq!(session.phase(surface), Phase::Scheduled);

        session.poll(t0 + ms(500));
        gate.notify_one();
        session.drain().await;
        assert_eq!(seen.borrow().last().map(|r| r.text.as_str()), Some("teh dog"));
        assert_eq!(session.issues(surface)[0].original_text, "teh");
    }

    #[tokio::test]
    async fn test_busy_broadcasts_transitions() {
        let page = page();
        let session = Session::new(config(), Factory::default(), NoDetector);
        session.track(&page.doc.root());
        let states = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&states);
        let mut sub = session.subscribe_busy(move |s: &BusyState| sink.borrow_mut().push(s.busy));

        let t0 = Instant::now();
        session.on_input(&page.field, "teh cat", t0);
        session.poll(t0 + ms(200));
        assert!(session.is_busy());
        session.drain().await;
        assert_eq!(*states.borrow(), vec![true, false]);
        sub.release();
    }

    #[tokio::test]
    async fn test_undo_and_redo_restore_text_and_rebase() {
        let page = page();
        let session = Session::new(config(), Factory::default(), NoDetector);
        let surface = session.track(&page.doc.root())[0];
        let text = "I has a radnom typo.";
        let t0 = Instant::now();
        session.on_input(&page.field, text, t0);
        session.poll(t0 + ms(200));
        session.drain().await;

        let mut target = MemorySurface::plain(SurfaceKind::PlainMultiline, text);
        let has = session.issues(surface)[0].id.clone();
        session.apply(surface, &has, &mut target).unwrap();
        assert!(session.can_undo(surface));

        assert!(session.undo(surface, &mut target).unwrap());
        assert_eq!(target.text(), text);
        assert_eq!(session.issues(surface)[0].range(), 8..14);
        assert!(session.can_redo(surface));

        let redo = Key::character("Z");
        let handled = session
            .handle_history_key(surface, &mut target, &redo, Modifiers::CTRL.with_shift(), false)
            .unwrap();
        assert!(handled);
        assert_eq!(target.text(), "I have a radnom typo.");
        assert_eq!(session.issues(surface)[0].range(), 9..15);
        assert!(!session.can_redo(surface));
    }

    #[tokio::test]
    async fn test_removed_surface_drops_state() {
        let page = page();
        let mut feed = MemoryFeed::attach(&page.doc);
        let session = Session::new(config(), Factory::default(), NoDetector);
        let surface = session.track(&page.doc.root())[0];
        let t0 = Instant::now();
        session.on_input(&page.field, "teh cat", t0);
        session.poll(t0 + ms(200));
        session.drain().await;
        assert!(!session.snapshot().groups.is_empty());

        page.field.remove();
        session.sync(&mut feed);
        assert!(session.surfaces().is_empty());
        assert!(session.snapshot().groups.is_empty());
        assert!(matches!(
            session.request_now(surface, Scope::Full),
            Err(ScribeError::UnknownSurface(_))
        ));
    }

    /// Fails detection once released.
    struct GatedDetector(Rc<Notify>);

    impl LanguageDetector for GatedDetector {
        async fn detect(&self, _text: &str) -> Result<Vec<LanguageCandidate>> {
            self.0.notified().await;
            Err(ScribeError::Detection("model crashed".into()))
        }
    }

    #[tokio::test]
    async fn test_surface_removed_during_detection_leaves_no_group() {
        let page = page();
        let mut feed = MemoryFeed::attach(&page.doc);
        let gate = Rc::new(Notify::new());
        let factory = Factory::default();
        let seen = Rc::clone(&factory.seen);
        let session = Session::new(config(), factory, GatedDetector(Rc::clone(&gate)));
        session.track(&page.doc.root());

        let t0 = Instant::now();
        session.on_input(&page.field, "I has a radnom typo in here.", t0);
        session.poll(t0 + ms(200));

        let remove = async {
            tokio::task::yield_now().await;
            page.field.remove();
            session.sync(&mut feed);
            gate.notify_one();
        };
        let (served, ()) = tokio::join!(session.drain(), remove);
        assert_eq!(served, 1);
        assert!(session.surfaces().is_empty());
        assert!(session.snapshot().groups.is_empty());
        assert!(seen.borrow().is_empty(), "no request for a removed surface");
    }

    #[tokio::test]
    async fn test_live_toggle_gates_input_but_not_explicit_requests() {
        let page = page();
        let prefs = MemoryPreferences::default();
        let session = Session::new(config(), Factory::default(), NoDetector);
        let surface = session.track(&page.doc.root())[0];
        session.bind_preferences(&prefs);
        prefs.update(|p| p.live_proofreading = false);

        let t0 = Instant::now();
        session.on_input(&page.field, "teh cat", t0);
        assert_eq!(session.poll(t0 + ms(1000)), 0);

        session.request_now(surface, Scope::Selection(0..3)).unwrap();
        session.drain().await;
        assert_eq!(session.issues(surface)[0].correction.replacement_text, "the");

        prefs.update(|p| {
            p.enabled_types.remove(&CorrectionType::Spelling);
        });
        assert!(session.snapshot().groups.is_empty());

        // Released on destroy.
        session.destroy();
        prefs.update(|p| {
            p.enabled_types.insert(CorrectionType::Spelling);
        });
        assert!(session.snapshot().groups.is_empty());
    }

    #[test]
    fn test_text_edit_trims_common_affixes() {
        let edit = text_edit("I have a radnom typo.", "I has a radnom typo.");
        assert_eq!(edit.range(), 4..6);
        assert_eq!(edit.replacement_text, "s");
        let grow = text_edit("aaa", "aaaa");
        assert_eq!((grow.range(), grow.replacement_text.as_str()), (3..3, "a"));
    }
}
