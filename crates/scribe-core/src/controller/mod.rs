//! Per-surface proofreading lifecycle.
//!
//! [`Controller`] is a sans-IO state machine: callers feed it inputs, clock
//! readings and service results, and it answers with [`Dispatch`]es to send and
//! [`Completion`]s describing what happened to the store. Nothing here awaits.
//!
//! ```text
//! Idle --input--> Scheduled --poll(due)--> Running --result--> Settled -> Idle
//!                     ^                      |
//!                     +------ Stale / Cancelled (full runs)
//! ```
//!
//! `Settled`, `Stale` and `Cancelled` are not resting states: the surface
//! moves straight on to `Idle` or `Scheduled`, and how its last run ended is
//! kept as a [`RunEnd`].

mod language;
mod pool;
mod queue;

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::time::Duration;

use web_time::Instant;

pub use language::{LanguageResolution, LanguageResolver, LanguageStatus};
pub use pool::{ActiveGuard, ProofreaderPool};
pub use queue::ProofreadQueue;

use crate::correction::Correction;
use crate::error::{Result, ScribeError};
use crate::service::{ErrorCode, ProofreadResult, ServiceError};
use crate::store::{CorrectionStore, MessageCode, SurfaceMessage};
use crate::text::{char_len, char_slice, splice_chars};
use crate::types::SurfaceId;

/// Lifecycle phase of one surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scheduled,
    Running,
}

/// How a surface's most recent run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEnd {
    /// Results committed against an unchanged snapshot.
    Settled,
    /// The service cancelled the run.
    Cancelled,
    /// The text changed while the run was in flight.
    Stale,
}

/// Identity of one dispatched request. Also used as the wire `request_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

/// What part of the surface a run covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    Full,
    /// Char range of the surface text.
    Selection(Range<usize>),
}

impl Scope {
    pub fn is_selection(&self) -> bool {
        matches!(self, Self::Selection(_))
    }

    fn offset(&self) -> usize {
        match self {
            Self::Full => 0,
            Self::Selection(range) => range.start,
        }
    }
}

/// A request ready to be sent to a proofreader.
#[derive(Clone, Debug, PartialEq)]
pub struct Dispatch {
    pub run_id: RunId,
    pub surface: SurfaceId,
    /// The text to proofread (the selected slice for selection runs).
    pub text: String,
    pub scope: Scope,
    /// Full surface text at dispatch time.
    pub full_text: String,
}

/// Result of feeding a service outcome back in.
#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    /// Snapshot unchanged; corrections replaced (or merged for selections).
    Committed {
        surface: SurfaceId,
        corrected_text: String,
    },
    /// Selection run whose surface changed meanwhile; merged what still fits.
    Reported {
        surface: SurfaceId,
        corrected_text: String,
    },
    /// Full run that will be re-dispatched.
    Retrying { surface: SurfaceId },
    /// Superseded, cancelled, or for a surface that is gone.
    Dropped,
    /// Service error recorded as a surface message.
    Failed { surface: SurfaceId, code: ErrorCode },
}

/// How an input was classified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// Matched a pending apply/undo/redo; corrections are kept.
    Mediated,
    /// A user edit; corrections were cleared.
    Unmediated,
    /// Same text as already known.
    Unchanged,
    /// Surface emptied; corrections cleared and the surface idled.
    Emptied,
}

#[derive(Debug)]
struct SurfaceRun {
    phase: Phase,
    text: String,
    due: Option<Instant>,
    in_flight: Option<RunId>,
    mediated: Option<String>,
    last_end: Option<RunEnd>,
}

impl SurfaceRun {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            text: String::new(),
            due: None,
            in_flight: None,
            mediated: None,
            last_end: None,
        }
    }

    fn end(&mut self, surface: SurfaceId, end: RunEnd) {
        tracing::debug!(target: "scribe::controller", %surface, ?end, next = ?self.phase, "run ended");
        self.last_end = Some(end);
    }
}

#[derive(Debug)]
struct InFlight {
    surface: SurfaceId,
    scope: Scope,
    full_text: String,
}

/// Scheduling state for every surface.
#[derive(Debug)]
pub struct Controller {
    debounce: Duration,
    live: bool,
    next_run: u64,
    runs: BTreeMap<SurfaceId, SurfaceRun>,
    in_flight: HashMap<RunId, InFlight>,
}

impl Controller {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            live: true,
            next_run: 1,
            runs: BTreeMap::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn phase(&self, surface: SurfaceId) -> Phase {
        self.runs.get(&surface).map(|r| r.phase).unwrap_or(Phase::Idle)
    }

    /// How the last finished run on `surface` ended. Cleared on dispatch and
    /// left empty when the run failed with a service error.
    pub fn last_end(&self, surface: SurfaceId) -> Option<RunEnd> {
        self.runs.get(&surface).and_then(|r| r.last_end)
    }

    pub fn text(&self, surface: SurfaceId) -> Option<&str> {
        self.runs.get(&surface).map(|r| r.text.as_str())
    }

    /// Toggle input-driven scheduling. Explicit requests always run.
    pub fn set_live(&mut self, live: bool) {
        self.live = live;
        if !live {
            for run in self.runs.values_mut() {
                if run.phase == Phase::Scheduled {
                    run.phase = Phase::Idle;
                    run.due = None;
                }
            }
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Start following a surface with its initial text. Nothing is scheduled.
    pub fn track(&mut self, surface: SurfaceId, text: &str, store: &mut CorrectionStore) {
        let run = self.runs.entry(surface).or_insert_with(SurfaceRun::new);
        run.text.clear();
        run.text.push_str(text);
        store.set_text(surface, text);
    }

    /// Announce that the next input on `surface` will carry `expected` and was
    /// produced by the mutation layer.
    pub fn mark_mediated(&mut self, surface: SurfaceId, expected: String) {
        self.runs
            .entry(surface)
            .or_insert_with(SurfaceRun::new)
            .mediated = Some(expected);
    }

    pub fn clear_mediated(&mut self, surface: SurfaceId) {
        if let Some(run) = self.runs.get_mut(&surface) {
            run.mediated = None;
        }
    }

    /// Feed a text change.
    ///
    /// A change the mutation layer announced keeps the (already rebased)
    /// corrections. Any other change invalidates every offset, so the surface's
    /// corrections are cleared. Both schedule a debounced full run.
    pub fn on_input(
        &mut self,
        surface: SurfaceId,
        text: &str,
        now: Instant,
        store: &mut CorrectionStore,
    ) -> InputKind {
        let run = self.runs.entry(surface).or_insert_with(SurfaceRun::new);
        let mediated = run.mediated.take().is_some_and(|expected| expected == text);
        if !mediated && run.text == text {
            return InputKind::Unchanged;
        }
        run.text.clear();
        run.text.push_str(text);

        if text.trim().is_empty() {
            store.clear(surface);
            store.set_text(surface, text);
            run.phase = Phase::Idle;
            run.due = None;
            if let Some(id) = run.in_flight.take() {
                self.in_flight.remove(&id);
            }
            tracing::debug!(target: "scribe::controller", %surface, "surface emptied");
            return InputKind::Emptied;
        }

        let kind = if mediated {
            InputKind::Mediated
        } else {
            store.clear(surface);
            store.set_text(surface, text);
            InputKind::Unmediated
        };

        if self.live {
            let due = now + self.debounce;
            run.phase = Phase::Scheduled;
            run.due = Some(due);
            tracing::trace!(target: "scribe::controller", %surface, ?kind, "run scheduled");
        }
        kind
    }

    /// Earliest pending due time, for arming the host timer.
    pub fn next_due(&self) -> Option<Instant> {
        self.runs
            .values()
            .filter(|r| r.phase == Phase::Scheduled)
            .filter_map(|r| r.due)
            .min()
    }

    /// Promote every scheduled surface whose timer has elapsed.
    pub fn poll(&mut self, now: Instant) -> Vec<Dispatch> {
        let due: Vec<SurfaceId> = self
            .runs
            .iter()
            .filter(|(_, r)| r.phase == Phase::Scheduled && r.due.is_some_and(|d| d <= now))
            .map(|(id, _)| *id)
            .collect();
        due.into_iter()
            .filter_map(|surface| self.start(surface, Scope::Full).ok())
            .collect()
    }

    /// Run immediately, bypassing the debounce and the live toggle.
    pub fn request_now(&mut self, surface: SurfaceId, scope: Scope) -> Result<Dispatch> {
        if !self.runs.contains_key(&surface) {
            return Err(ScribeError::UnknownSurface(surface));
        }
        self.start(surface, scope)
    }

    fn start(&mut self, surface: SurfaceId, scope: Scope) -> Result<Dispatch> {
        let run = self
            .runs
            .get_mut(&surface)
            .ok_or(ScribeError::UnknownSurface(surface))?;
        let len = char_len(&run.text);
        let text = match &scope {
            Scope::Full if run.text.trim().is_empty() => {
                run.phase = Phase::Idle;
                run.due = None;
                return Err(ScribeError::InvalidRange { start: 0, end: 0, len });
            }
            Scope::Full => run.text.clone(),
            Scope::Selection(range) => char_slice(&run.text, range.clone())
                .filter(|s| !s.is_empty())
                .ok_or(ScribeError::InvalidRange {
                    start: range.start,
                    end: range.end,
                    len,
                })?
                .to_string(),
        };

        let run_id = RunId(self.next_run);
        self.next_run += 1;
        if let Some(previous) = run.in_flight.replace(run_id) {
            tracing::debug!(
                target: "scribe::controller",
                %surface,
                superseded = previous.0,
                "superseding in-flight run"
            );
            self.in_flight.remove(&previous);
        }
        run.phase = Phase::Running;
        run.last_end = None;
        run.due = None;
        self.in_flight.insert(
            run_id,
            InFlight {
                surface,
                scope: scope.clone(),
                full_text: run.text.clone(),
            },
        );
        tracing::debug!(target: "scribe::controller", %surface, run = run_id.0, ?scope, "dispatching");
        Ok(Dispatch {
            run_id,
            surface,
            text,
            scope,
            full_text: run.text.clone(),
        })
    }

    /// Drop a dispatch that never reached the service (superseded in the queue).
    pub fn discard(&mut self, run_id: RunId) {
        if let Some(flight) = self.in_flight.remove(&run_id) {
            if let Some(run) = self.runs.get_mut(&flight.surface) {
                if run.in_flight == Some(run_id) {
                    run.in_flight = None;
                }
            }
        }
    }

    /// Feed back a service outcome.
    pub fn complete(
        &mut self,
        run_id: RunId,
        outcome: std::result::Result<ProofreadResult, ServiceError>,
        now: Instant,
        store: &mut CorrectionStore,
    ) -> Completion {
        let Some(flight) = self.in_flight.remove(&run_id) else {
            tracing::debug!(target: "scribe::controller", run = run_id.0, "dropping result of cancelled or superseded run");
            return Completion::Dropped;
        };
        let surface = flight.surface;
        let Some(run) = self.runs.get_mut(&surface) else {
            return Completion::Dropped;
        };
        if run.in_flight != Some(run_id) {
            return Completion::Dropped;
        }
        run.in_flight = None;
        if run.phase == Phase::Running {
            run.phase = Phase::Idle;
        }

        let result = match outcome {
            Ok(result) => result,
            Err(error) => return Self::fail(run, surface, &flight, error, now, store),
        };

        store.clear_messages(surface, &MessageCode::SERVICE);
        let unchanged = run.text == flight.full_text;
        let offset = flight.scope.offset();
        let corrected_text = match &flight.scope {
            Scope::Full => result.corrected_text.clone(),
            Scope::Selection(range) => {
                splice_chars(&flight.full_text, range.clone(), &result.corrected_text)
                    .unwrap_or_else(|| flight.full_text.clone())
            }
        };

        match (&flight.scope, unchanged) {
            (Scope::Full, true) => {
                run.end(surface, RunEnd::Settled);
                store.set_text(surface, &run.text);
                store.set_corrections(surface, result.corrections);
                Completion::Committed {
                    surface,
                    corrected_text,
                }
            }
            (Scope::Full, false) => {
                Self::reschedule(run, now);
                run.end(surface, RunEnd::Stale);
                Completion::Retrying { surface }
            }
            (Scope::Selection(range), unchanged) => {
                let len = char_len(&run.text);
                let shifted: Vec<Correction> = result
                    .corrections
                    .into_iter()
                    .filter_map(|c| c.shifted(offset as isize))
                    .filter(|c| unchanged || c.end_index <= len)
                    .collect();
                let merge_range = range.start..range.end.min(len);
                store.set_text(surface, &run.text);
                store.merge_range(surface, merge_range, shifted);
                if unchanged {
                    run.end(surface, RunEnd::Settled);
                    Completion::Committed {
                        surface,
                        corrected_text,
                    }
                } else {
                    tracing::debug!(target: "scribe::controller", %surface, "reporting selection results against changed text");
                    Completion::Reported {
                        surface,
                        corrected_text,
                    }
                }
            }
        }
    }

    fn fail(
        run: &mut SurfaceRun,
        surface: SurfaceId,
        flight: &InFlight,
        error: ServiceError,
        now: Instant,
        store: &mut CorrectionStore,
    ) -> Completion {
        match error.code {
            ErrorCode::Cancelled if flight.scope.is_selection() => {
                run.end(surface, RunEnd::Cancelled);
                Completion::Dropped
            }
            ErrorCode::Cancelled => {
                Self::reschedule(run, now);
                run.end(surface, RunEnd::Cancelled);
                Completion::Retrying { surface }
            }
            code => {
                tracing::warn!(
                    target: "scribe::controller",
                    %surface,
                    %code,
                    message = %error.message,
                    "proofreading failed"
                );
                let tag = match code {
                    ErrorCode::UnsupportedLanguage => MessageCode::UnsupportedLanguage,
                    _ => MessageCode::Unknown,
                };
                store.set_message(surface, SurfaceMessage::new(tag, error.message));
                Completion::Failed { surface, code }
            }
        }
    }

    fn reschedule(run: &mut SurfaceRun, now: Instant) {
        run.phase = Phase::Scheduled;
        if run.due.is_none() {
            run.due = Some(now);
        }
    }

    /// Idle every surface and forget every in-flight run.
    pub fn cancel_all(&mut self) {
        for run in self.runs.values_mut() {
            run.phase = Phase::Idle;
            run.due = None;
            run.in_flight = None;
            run.mediated = None;
        }
        let dropped = self.in_flight.len();
        self.in_flight.clear();
        tracing::debug!(target: "scribe::controller", dropped, "cancelled all runs");
    }

    pub fn remove_surface(&mut self, surface: SurfaceId) {
        self.runs.remove(&surface);
        self.in_flight.retain(|_, f| f.surface != surface);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: SurfaceId = SurfaceId(1);
    const DEBOUNCE: Duration = Duration::from_millis(200);

    fn ms(base: Instant, n: u64) -> Instant {
        base + Duration::from_millis(n)
    }

    fn setup(text: &str) -> (Controller, CorrectionStore) {
        let mut controller = Controller::new(DEBOUNCE);
        let mut store = CorrectionStore::new("page");
        controller.track(S, text, &mut store);
        (controller, store)
    }

    fn ok(corrected: &str, corrections: Vec<Correction>) -> std::result::Result<ProofreadResult, ServiceError> {
        Ok(ProofreadResult {
            corrected_text: corrected.to_string(),
            corrections,
        })
    }

    #[test]
    fn test_debounce_dispatches_latest_snapshot_once() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("");
        controller.on_input(S, "Helo", t0, &mut store);
        controller.on_input(S, "Helo wrld", ms(t0, 50), &mut store);

        assert!(controller.poll(ms(t0, 200)).is_empty());
        assert_eq!(controller.next_due(), Some(ms(t0, 250)));

        let dispatches = controller.poll(ms(t0, 250));
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].text, "Helo wrld");
        assert_eq!(controller.phase(S), Phase::Running);
        assert!(controller.poll(ms(t0, 900)).is_empty());
    }

    #[test]
    fn test_unchanged_snapshot_commits() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("");
        controller.on_input(S, "I has a radnom typo.", t0, &mut store);
        let d = controller.poll(ms(t0, 200)).remove(0);
        let completion = controller.complete(
            d.run_id,
            ok("I have a random typo.", vec![Correction::new(2, 5, "have"), Correction::new(8, 14, "random")]),
            ms(t0, 300),
            &mut store,
        );
        assert!(matches!(completion, Completion::Committed { .. }));
        assert_eq!(store.corrections(S).len(), 2);
        assert_eq!(controller.phase(S), Phase::Idle);
    }

    #[test]
    fn test_changed_snapshot_goes_stale_and_retries() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("");
        controller.on_input(S, "teh cat", t0, &mut store);
        let d = controller.poll(ms(t0, 200)).remove(0);
        // Typing continues while the request is in flight.
        controller.on_input(S, "teh cat sat", ms(t0, 210), &mut store);

        let completion = controller.complete(d.run_id, ok("the cat", vec![Correction::new(0, 3, "the")]), ms(t0, 300), &mut store);
        assert_eq!(completion, Completion::Retrying { surface: S });
        assert!(store.corrections(S).is_empty());
        // Pending debounce from the newer input is kept.
        assert_eq!(controller.next_due(), Some(ms(t0, 410)));
    }

    #[test]
    fn test_stale_without_pending_timer_retries_immediately() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("");
        controller.set_live(false);
        controller.on_input(S, "teh cat", t0, &mut store);
        let d = controller.request_now(S, Scope::Full).unwrap();
        controller.on_input(S, "teh dog", ms(t0, 5), &mut store);
        controller.complete(d.run_id, ok("the cat", vec![]), ms(t0, 40), &mut store);
        assert_eq!(controller.next_due(), Some(ms(t0, 40)));
    }

    #[test]
    fn test_latest_dispatch_wins() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("teh cat");
        let first = controller.request_now(S, Scope::Full).unwrap();
        let second = controller.request_now(S, Scope::Full).unwrap();

        let late = controller.complete(first.run_id, ok("x", vec![Correction::new(0, 1, "X")]), t0, &mut store);
        assert_eq!(late, Completion::Dropped);
        let fresh = controller.complete(second.run_id, ok("the cat", vec![Correction::new(0, 3, "the")]), t0, &mut store);
        assert!(matches!(fresh, Completion::Committed { .. }));
        assert_eq!(store.corrections(S)[0].replacement_text, "the");
    }

    #[test]
    fn test_selection_run_shifts_and_merges() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("Fine. I has a radnom typo.");
        store.set_corrections(S, vec![Correction::new(0, 4, "Good")]);
        let d = controller.request_now(S, Scope::Selection(6..26)).unwrap();
        assert_eq!(d.text, "I has a radnom typo.");

        let completion = controller.complete(
            d.run_id,
            ok("I have a random typo.", vec![Correction::new(2, 5, "have")]),
            t0,
            &mut store,
        );
        assert_eq!(
            completion,
            Completion::Committed {
                surface: S,
                corrected_text: "Fine. I have a random typo.".into()
            }
        );
        let ranges: Vec<_> = store.corrections(S).iter().map(Correction::range).collect();
        assert_eq!(ranges, vec![0..4, 8..11]);
    }

    #[test]
    fn test_stale_selection_run_reports_what_fits() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("abc teh cat");
        let d = controller.request_now(S, Scope::Selection(4..11)).unwrap();
        controller.on_input(S, "abc teh", t0, &mut store);

        let completion = controller.complete(
            d.run_id,
            ok("the cot", vec![Correction::new(0, 3, "the"), Correction::new(4, 7, "cot")]),
            t0,
            &mut store,
        );
        assert!(matches!(completion, Completion::Reported { .. }));
        let ranges: Vec<_> = store.corrections(S).iter().map(Correction::range).collect();
        assert_eq!(ranges, vec![4..7]);
    }

    #[test]
    fn test_cancelled_full_run_retries_selection_dropped() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("some text here");
        let cancelled = || Err(ServiceError::new(ErrorCode::Cancelled, "aborted"));

        let full = controller.request_now(S, Scope::Full).unwrap();
        assert_eq!(
            controller.complete(full.run_id, cancelled(), t0, &mut store),
            Completion::Retrying { surface: S }
        );
        assert_eq!(controller.phase(S), Phase::Scheduled);

        let sel = controller.request_now(S, Scope::Selection(0..4)).unwrap();
        assert_eq!(controller.complete(sel.run_id, cancelled(), t0, &mut store), Completion::Dropped);
    }

    #[test]
    fn test_unsupported_language_sets_single_error_message() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("Ceci est un texte.");
        let d = controller.request_now(S, Scope::Full).unwrap();
        let completion = controller.complete(
            d.run_id,
            Err(ServiceError::new(ErrorCode::UnsupportedLanguage, "no model for fr")),
            t0,
            &mut store,
        );
        assert_eq!(
            completion,
            Completion::Failed {
                surface: S,
                code: ErrorCode::UnsupportedLanguage
            }
        );
        assert_eq!(store.messages(S).len(), 1);
        assert_eq!(store.messages(S)[0].code, MessageCode::UnsupportedLanguage);
        assert_eq!(controller.phase(S), Phase::Idle);
        assert!(controller.next_due().is_none());
    }

    #[test]
    fn test_unknown_service_error_is_fatal_for_the_run() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("teh cat");
        let d = controller.request_now(S, Scope::Full).unwrap();
        let completion = controller.complete(
            d.run_id,
            Err(ServiceError::new(ErrorCode::Unknown, "model crashed")),
            t0,
            &mut store,
        );
        assert_eq!(
            completion,
            Completion::Failed {
                surface: S,
                code: ErrorCode::Unknown
            }
        );
        assert_eq!(store.messages(S).len(), 1);
        assert_eq!(store.messages(S)[0].code, MessageCode::Unknown);
        assert_eq!(store.messages(S)[0].severity, crate::store::Severity::Error);
        assert_eq!(controller.phase(S), Phase::Idle);
        assert_eq!(controller.last_end(S), None);
        assert!(controller.next_due().is_none());
        assert!(controller.poll(ms(t0, 10_000)).is_empty());

        // A later successful run clears the error.
        let retry = controller.request_now(S, Scope::Full).unwrap();
        let completion = controller.complete(retry.run_id, ok("the cat", vec![Correction::new(0, 3, "the")]), t0, &mut store);
        assert!(matches!(completion, Completion::Committed { .. }));
        assert!(store.messages(S).is_empty());
        assert_eq!(store.corrections(S).len(), 1);
    }

    #[test]
    fn test_run_end_records_how_the_last_run_finished() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("teh cat");
        assert_eq!(controller.last_end(S), None);

        let d = controller.request_now(S, Scope::Full).unwrap();
        controller.complete(d.run_id, ok("the cat", vec![]), t0, &mut store);
        assert_eq!(controller.last_end(S), Some(RunEnd::Settled));
        assert_eq!(controller.phase(S), Phase::Idle);

        let d = controller.request_now(S, Scope::Full).unwrap();
        assert_eq!(controller.last_end(S), None);
        controller.on_input(S, "teh cat sat", t0, &mut store);
        controller.complete(d.run_id, ok("the cat", vec![]), t0, &mut store);
        assert_eq!(controller.last_end(S), Some(RunEnd::Stale));
        assert_eq!(controller.phase(S), Phase::Scheduled);

        let d = controller.request_now(S, Scope::Full).unwrap();
        controller.complete(d.run_id, Err(ServiceError::new(ErrorCode::Cancelled, "aborted")), t0, &mut store);
        assert_eq!(controller.last_end(S), Some(RunEnd::Cancelled));
        assert_eq!(controller.phase(S), Phase::Scheduled);
    }

    #[test]
    fn test_cancel_all_discards_in_flight() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("");
        controller.on_input(S, "teh", t0, &mut store);
        controller.on_input(SurfaceId(2), "cta", t0, &mut store);
        let dispatches = controller.poll(ms(t0, 200));
        assert_eq!(dispatches.len(), 2);

        controller.cancel_all();
        for d in dispatches {
            assert_eq!(controller.complete(d.run_id, ok("", vec![]), t0, &mut store), Completion::Dropped);
        }
        assert_eq!(controller.phase(S), Phase::Idle);
        assert!(controller.next_due().is_none());
    }

    #[test]
    fn test_mediated_input_keeps_corrections() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("I has a radnom typo.");
        store.set_corrections(S, vec![Correction::new(9, 15, "random")]);

        controller.mark_mediated(S, "I have a radnom typo.".into());
        let kind = controller.on_input(S, "I have a radnom typo.", t0, &mut store);
        assert_eq!(kind, InputKind::Mediated);
        assert_eq!(store.corrections(S).len(), 1);
        assert_eq!(controller.phase(S), Phase::Scheduled);

        let kind = controller.on_input(S, "I have a radnom typo!", t0, &mut store);
        assert_eq!(kind, InputKind::Unmediated);
        assert!(store.corrections(S).is_empty());
    }

    #[test]
    fn test_empty_text_idles_and_drops_in_flight() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("teh");
        store.set_corrections(S, vec![Correction::new(0, 3, "the")]);
        let d = controller.request_now(S, Scope::Full).unwrap();

        assert_eq!(controller.on_input(S, "", t0, &mut store), InputKind::Emptied);
        assert!(!store.has_any());
        assert_eq!(controller.complete(d.run_id, ok("the", vec![]), t0, &mut store), Completion::Dropped);
        assert!(controller.request_now(S, Scope::Full).is_err());
    }

    #[test]
    fn test_live_toggle_gates_input_scheduling_only() {
        let t0 = Instant::now();
        let (mut controller, mut store) = setup("");
        controller.set_live(false);
        controller.on_input(S, "teh", t0, &mut store);
        assert!(controller.poll(ms(t0, 10_000)).is_empty());
        assert!(controller.request_now(S, Scope::Full).is_ok());
        assert!(controller.request_now(SurfaceId(42), Scope::Full).is_err());
    }
}
