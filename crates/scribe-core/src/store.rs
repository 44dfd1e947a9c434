//! The canonical per-surface correction table.
//!
//! The store owns every surface's corrections, the text snapshot they address,
//! and any advisory/error messages. Mutations mark the store dirty; updates are
//! coalesced until [`CorrectionStore::flush`] (the host's "end of task" hook)
//! unless an immediate emission is requested.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::correction::{Correction, CorrectionType, Issue, IssueContext, IssueId, build_issues};
use crate::subscription::{Emitter, Subscription};
use crate::types::{SurfaceId, SurfaceKind};

/// Severity of a per-surface message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Advisory,
    Error,
}

/// Tag identifying a per-surface message. At most one message per tag is kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageCode {
    LanguageDetectionUnavailable,
    LanguageLowConfidence,
    LanguageDetectionFailed,
    UnsupportedLanguage,
    Unknown,
}

impl MessageCode {
    pub const LANGUAGE: [MessageCode; 3] = [
        Self::LanguageDetectionUnavailable,
        Self::LanguageLowConfidence,
        Self::LanguageDetectionFailed,
    ];

    pub const SERVICE: [MessageCode; 2] = [Self::UnsupportedLanguage, Self::Unknown];

    pub fn severity(&self) -> Severity {
        match self {
            Self::UnsupportedLanguage | Self::Unknown => Severity::Error,
            _ => Severity::Advisory,
        }
    }
}

/// Advisory or error attached to a surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceMessage {
    pub code: MessageCode,
    pub severity: Severity,
    pub text: String,
}

impl SurfaceMessage {
    pub fn new(code: MessageCode, text: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            text: text.into(),
        }
    }
}

/// Surface metadata the store needs for grouping and labels.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceMeta {
    pub id: SurfaceId,
    pub dom_id: Option<SmolStr>,
    pub kind: SurfaceKind,
    pub label: Option<SmolStr>,
    /// Document-order key used to sort groups.
    pub position: u64,
}

/// One surface's slice of an [`IssueUpdate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueGroup {
    pub surface_id: SurfaceId,
    pub dom_id: Option<SmolStr>,
    pub kind: SurfaceKind,
    pub label: Option<SmolStr>,
    pub issues: Vec<Issue>,
    pub messages: Vec<SurfaceMessage>,
}

/// Snapshot broadcast to the surrounding shell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueUpdate {
    pub page_id: SmolStr,
    pub active_surface_id: Option<SurfaceId>,
    pub active_surface_label: Option<SmolStr>,
    pub active_surface_kind: Option<SurfaceKind>,
    pub groups: Vec<IssueGroup>,
    pub revision: u64,
}

#[derive(Debug, Default)]
struct Entry {
    text: String,
    corrections: Vec<Correction>,
    messages: Vec<SurfaceMessage>,
}

/// Canonical correction table, keyed by surface.
#[derive(Debug)]
pub struct CorrectionStore {
    page_id: SmolStr,
    entries: BTreeMap<SurfaceId, Entry>,
    meta: HashMap<SurfaceId, SurfaceMeta>,
    active: Option<SurfaceId>,
    enabled_types: Option<BTreeSet<CorrectionType>>,
    revision: u64,
    dirty: bool,
    updates: Emitter<IssueUpdate>,
}

impl CorrectionStore {
    pub fn new(page_id: impl Into<SmolStr>) -> Self {
        Self {
            page_id: page_id.into(),
            entries: BTreeMap::new(),
            meta: HashMap::new(),
            active: None,
            enabled_types: None,
            revision: 0,
            dirty: false,
            updates: Emitter::new(),
        }
    }

    // === Surfaces ===

    pub fn upsert_surface(&mut self, meta: SurfaceMeta) {
        self.meta.insert(meta.id, meta);
    }

    /// Forget a surface entirely (it left the document).
    pub fn remove_surface(&mut self, surface: SurfaceId) {
        self.meta.remove(&surface);
        if self.entries.remove(&surface).is_some() {
            self.dirty = true;
        }
        if self.active == Some(surface) {
            self.active = None;
            self.dirty = true;
        }
    }

    pub fn set_active(&mut self, surface: Option<SurfaceId>) {
        if self.active != surface {
            self.active = surface;
            self.dirty = true;
        }
    }

    pub fn active(&self) -> Option<SurfaceId> {
        self.active
    }

    /// Restrict emitted issues to these types. `None` shows every type.
    pub fn set_enabled_types(&mut self, types: Option<BTreeSet<CorrectionType>>) {
        if self.enabled_types != types {
            self.enabled_types = types;
            self.dirty = true;
        }
    }

    // === Corrections ===

    /// Record the text snapshot the surface's corrections address.
    pub fn set_text(&mut self, surface: SurfaceId, text: &str) {
        let entry = self.entries.entry(surface).or_default();
        if entry.text != text {
            entry.text.clear();
            entry.text.push_str(text);
        }
    }

    pub fn text(&self, surface: SurfaceId) -> Option<&str> {
        self.entries.get(&surface).map(|e| e.text.as_str())
    }

    /// Replace the surface's corrections wholesale.
    pub fn set_corrections(&mut self, surface: SurfaceId, corrections: Vec<Correction>) {
        self.entries.entry(surface).or_default().corrections = corrections;
        self.dirty = true;
    }

    /// Replace the corrections intersecting `range` with `corrections`,
    /// keeping everything outside it. Used by selection-scoped runs.
    pub fn merge_range(&mut self, surface: SurfaceId, range: Range<usize>, corrections: Vec<Correction>) {
        let entry = self.entries.entry(surface).or_default();
        entry
            .corrections
            .retain(|c| !(c.is_renderable() && c.overlaps(&range)));
        entry.corrections.extend(corrections);
        entry.corrections.sort_by_key(|c| c.start_index);
        self.dirty = true;
    }

    pub fn corrections(&self, surface: SurfaceId) -> &[Correction] {
        self.entries
            .get(&surface)
            .map(|e| e.corrections.as_slice())
            .unwrap_or(&[])
    }

    /// Issues for the surface against its current text, before type filtering.
    pub fn issues(&self, surface: SurfaceId) -> Vec<Issue> {
        let Some(entry) = self.entries.get(&surface) else {
            return Vec::new();
        };
        let meta = self.meta.get(&surface);
        let ctx = IssueContext {
            surface_id: surface,
            surface_label: meta.and_then(|m| m.label.as_ref()),
            surface_kind: meta.map(|m| m.kind).unwrap_or(SurfaceKind::PlainInput),
        };
        build_issues(&entry.text, &entry.corrections, &ctx)
    }

    /// Look up one issue in the current snapshot.
    pub fn issue(&self, surface: SurfaceId, issue: &IssueId) -> Option<Issue> {
        self.issues(surface).into_iter().find(|i| &i.id == issue)
    }

    pub fn clear(&mut self, surface: SurfaceId) {
        if let Some(entry) = self.entries.get_mut(&surface) {
            if !entry.corrections.is_empty() {
                entry.corrections.clear();
                self.dirty = true;
            }
        }
    }

    pub fn has_corrections(&self, surface: SurfaceId) -> bool {
        self.entries
            .get(&surface)
            .is_some_and(|e| e.corrections.iter().any(Correction::is_renderable))
    }

    pub fn has_any(&self) -> bool {
        self.entries
            .values()
            .any(|e| e.corrections.iter().any(Correction::is_renderable))
    }

    /// Rebase after `applied` was written into the surface, producing `new_text`.
    ///
    /// The applied correction is removed. Corrections starting at or after its
    /// end shift by its length delta, corrections ending at or before its start
    /// are untouched, and anything overlapping it is dropped.
    pub fn rebase_after_apply(&mut self, surface: SurfaceId, applied: &Correction, new_text: &str) {
        let delta = applied.length_delta();
        let applied_range = applied.range();
        let entry = self.entries.entry(surface).or_default();

        let mut removed_applied = false;
        let before = entry.corrections.len();
        entry.corrections = std::mem::take(&mut entry.corrections)
            .into_iter()
            .filter_map(|c| {
                if !removed_applied && &c == applied {
                    removed_applied = true;
                    return None;
                }
                // Ends at or before the replacement, including empty entries at its start.
                if c.end_index <= applied_range.start {
                    return Some(c);
                }
                if c.start_index >= applied_range.end {
                    return c.shifted(delta);
                }
                tracing::trace!(
                    target: "scribe::store",
                    %surface,
                    dropped = ?c.range(),
                    "dropping correction overlapping applied range"
                );
                None
            })
            .collect();

        entry.text.clear();
        entry.text.push_str(new_text);
        tracing::debug!(
            target: "scribe::store",
            %surface,
            delta,
            remaining = entry.corrections.len(),
            removed = before - entry.corrections.len(),
            "rebased corrections after apply"
        );
        self.dirty = true;
    }

    // === Messages ===

    /// Set a message, replacing any existing message with the same code.
    pub fn set_message(&mut self, surface: SurfaceId, message: SurfaceMessage) {
        let entry = self.entries.entry(surface).or_default();
        if let Some(existing) = entry.messages.iter_mut().find(|m| m.code == message.code) {
            if *existing == message {
                return;
            }
            *existing = message;
        } else {
            entry.messages.push(message);
        }
        self.dirty = true;
    }

    pub fn clear_message(&mut self, surface: SurfaceId, code: MessageCode) {
        if let Some(entry) = self.entries.get_mut(&surface) {
            let before = entry.messages.len();
            entry.messages.retain(|m| m.code != code);
            if entry.messages.len() != before {
                self.dirty = true;
            }
        }
    }

    pub fn clear_messages(&mut self, surface: SurfaceId, codes: &[MessageCode]) {
        for code in codes {
            self.clear_message(surface, *code);
        }
    }

    pub fn messages(&self, surface: SurfaceId) -> &[SurfaceMessage] {
        self.entries
            .get(&surface)
            .map(|e| e.messages.as_slice())
            .unwrap_or(&[])
    }

    // === Updates ===

    pub fn subscribe(&self, listener: impl FnMut(&IssueUpdate) + 'static) -> Subscription {
        self.updates.subscribe(listener)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark an update as due. With `immediate`, emit synchronously; otherwise
    /// it goes out with the next [`flush`](Self::flush).
    pub fn schedule_update(&mut self, immediate: bool) -> Option<IssueUpdate> {
        self.dirty = true;
        if immediate {
            return Some(self.emit_update());
        }
        None
    }

    /// Emit the coalesced update if anything changed since the last emission.
    pub fn flush(&mut self) -> Option<IssueUpdate> {
        if self.dirty {
            return Some(self.emit_update());
        }
        None
    }

    /// Build and broadcast a snapshot unconditionally.
    pub fn emit_update(&mut self) -> IssueUpdate {
        self.revision += 1;
        self.dirty = false;
        let update = self.snapshot();
        tracing::trace!(
            target: "scribe::store",
            revision = update.revision,
            groups = update.groups.len(),
            "emitting issue update"
        );
        self.updates.emit(&update);
        update
    }

    /// Build the update payload for the current revision.
    pub fn snapshot(&self) -> IssueUpdate {
        let mut groups: Vec<(u64, IssueGroup)> = self
            .entries
            .keys()
            .filter_map(|&surface| {
                let issues: Vec<Issue> = self
                    .issues(surface)
                    .into_iter()
                    .filter(|i| self.type_enabled(i.kind()))
                    .collect();
                let messages = self.messages(surface).to_vec();
                if issues.is_empty() && messages.is_empty() {
                    return None;
                }
                let meta = self.meta.get(&surface);
                let group = IssueGroup {
                    surface_id: surface,
                    dom_id: meta.and_then(|m| m.dom_id.clone()),
                    kind: meta.map(|m| m.kind).unwrap_or(SurfaceKind::PlainInput),
                    label: meta.and_then(|m| m.label.clone()),
                    issues,
                    messages,
                };
                Some((meta.map(|m| m.position).unwrap_or(u64::MAX), group))
            })
            .collect();
        groups.sort_by_key(|(position, group)| (*position, group.surface_id));

        let active_meta = self.active.and_then(|id| self.meta.get(&id));
        IssueUpdate {
            page_id: self.page_id.clone(),
            active_surface_id: self.active,
            active_surface_label: active_meta.and_then(|m| m.label.clone()),
            active_surface_kind: active_meta.map(|m| m.kind),
            groups: groups.into_iter().map(|(_, g)| g).collect(),
            revision: self.revision,
        }
    }

    fn type_enabled(&self, correction_type: CorrectionType) -> bool {
        self.enabled_types
            .as_ref()
            .is_none_or(|types| types.contains(&correction_type))
    }
}

/// Consumer-side guard against out-of-order or duplicate update delivery.
#[derive(Debug, Default)]
pub struct RevisionGuard {
    seen: HashMap<SmolStr, u64>,
}

impl RevisionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `revision` is newer than anything observed for `context`.
    pub fn accept(&mut self, context: &str, revision: u64) -> bool {
        match self.seen.get_mut(context) {
            Some(last) if *last >= revision => false,
            Some(last) => {
                *last = revision;
                true
            }
            None => {
                self.seen.insert(SmolStr::new(context), revision);
                true
            }
        }
    }
}
