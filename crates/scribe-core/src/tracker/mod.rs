//! Discovery and identity of editable surfaces.
//!
//! The tracker classifies host elements, hands out stable [`SurfaceId`]s and
//! follows focus. Structural changes (elements added or removed) arrive through
//! a [`StructuralFeed`]; the host reports focus, blur and input directly.

mod label;

use std::collections::{BTreeMap, HashMap};

use smol_str::SmolStr;

pub use label::resolve_label;

use crate::store::SurfaceMeta;
use crate::subscription::{Emitter, Subscription};
use crate::types::{NodeKey, SurfaceId, SurfaceKind};

/// `<input type>` values that carry prose.
pub const TEXT_INPUT_TYPES: &[&str] = &["text", "search", "email", "url", "tel"];

/// Minimal element interface the tracker needs from a host document.
pub trait SurfaceNode: Clone {
    /// Stable identity, preserved when the element is moved.
    fn key(&self) -> NodeKey;

    /// Lower-case tag name; text nodes report `"#text"`.
    fn tag_name(&self) -> SmolStr;

    fn attribute(&self, name: &str) -> Option<String>;

    fn is_content_editable(&self) -> bool;

    fn is_connected(&self) -> bool;

    fn parent(&self) -> Option<Self>;

    fn children(&self) -> Vec<Self>;

    fn text_content(&self) -> String;

    /// Editable text: the value of form controls, text content otherwise.
    fn current_text(&self) -> String {
        self.text_content()
    }

    /// Ordering key following document order.
    fn document_position(&self) -> u64;

    fn element_by_id(&self, id: &str) -> Option<Self>;

    /// The `<label>` whose `for` attribute names `id`.
    fn label_for(&self, id: &str) -> Option<Self>;
}

/// A batch of structural changes.
#[derive(Clone, Debug)]
pub struct StructuralChange<N> {
    pub added: Vec<N>,
    pub removed: Vec<N>,
}

impl<N> Default for StructuralChange<N> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Source of structural change batches (a mutation observer in browsers).
pub trait StructuralFeed<N> {
    /// Drain every batch recorded since the last call.
    fn take_changes(&mut self) -> Vec<StructuralChange<N>>;
}

/// Tracker lifecycle events.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackerEvent {
    Added(SurfaceMeta),
    Removed(SurfaceId),
    Focused(SurfaceId),
    Blurred(SurfaceId),
    Input(SurfaceId),
}

/// A surface currently being tracked.
#[derive(Clone, Debug)]
pub struct TrackedSurface<N> {
    pub id: SurfaceId,
    pub node: N,
    pub kind: SurfaceKind,
    pub label: Option<SmolStr>,
    pub dom_id: Option<SmolStr>,
    pub position: u64,
}

impl<N> TrackedSurface<N> {
    pub fn meta(&self) -> SurfaceMeta {
        SurfaceMeta {
            id: self.id,
            dom_id: self.dom_id.clone(),
            kind: self.kind,
            label: self.label.clone(),
            position: self.position,
        }
    }
}

/// Decide whether `node` is a proofreadable surface and of which kind.
pub fn classify<N: SurfaceNode>(node: &N) -> Option<SurfaceKind> {
    if is_opted_out(node) {
        return None;
    }
    let inert = node.attribute("disabled").is_some() || node.attribute("readonly").is_some();
    match node.tag_name().as_str() {
        "input" => {
            let text_like = match node.attribute("type") {
                None => true,
                Some(t) => {
                    let t = t.trim().to_ascii_lowercase();
                    t.is_empty() || TEXT_INPUT_TYPES.contains(&t.as_str())
                }
            };
            (text_like && !inert).then_some(SurfaceKind::PlainInput)
        }
        "textarea" => (!inert).then_some(SurfaceKind::PlainMultiline),
        _ if node.is_content_editable() => Some(SurfaceKind::RichEditable),
        _ => None,
    }
}

fn is_opted_out<N: SurfaceNode>(node: &N) -> bool {
    let marker = |name: &str, value: &str| {
        node.attribute(name)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(value))
    };
    marker("spellcheck", "false")
        || marker("autocorrect", "off")
        || marker("writingsuggestions", "false")
        || marker("data-scribe", "off")
}

/// Registry of editable surfaces.
#[derive(Debug)]
pub struct Tracker<N> {
    ids: HashMap<NodeKey, SurfaceId>,
    next_id: u32,
    tracked: BTreeMap<SurfaceId, TrackedSurface<N>>,
    active: Option<SurfaceId>,
    events: Emitter<TrackerEvent>,
}

impl<N: SurfaceNode> Default for Tracker<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: SurfaceNode> Tracker<N> {
    pub fn new() -> Self {
        Self {
            ids: HashMap::new(),
            next_id: 1,
            tracked: BTreeMap::new(),
            active: None,
            events: Emitter::new(),
        }
    }

    pub fn subscribe(&self, listener: impl FnMut(&TrackerEvent) + 'static) -> Subscription {
        self.events.subscribe(listener)
    }

    /// Id for `node`, assigned on first request and kept for the node's lifetime,
    /// including across unregister/register cycles.
    pub fn id_for(&mut self, node: &N) -> SurfaceId {
        let key = node.key();
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }
        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        self.ids.insert(key, id);
        id
    }

    pub fn by_id(&self, id: SurfaceId) -> Option<&TrackedSurface<N>> {
        self.tracked.get(&id)
    }

    pub fn active_surface(&self) -> Option<SurfaceId> {
        self.active
    }

    pub fn surfaces(&self) -> impl Iterator<Item = &TrackedSurface<N>> {
        self.tracked.values()
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Track `node` if it is a surface. Returns the id when tracked (already or now).
    pub fn register(&mut self, node: &N) -> Option<SurfaceId> {
        let kind = classify(node)?;
        if self.inside_rich_surface(node) {
            return None;
        }
        let id = self.id_for(node);
        if self.tracked.contains_key(&id) {
            return Some(id);
        }

        let surface = TrackedSurface {
            id,
            node: node.clone(),
            kind,
            label: resolve_label(node),
            dom_id: node.attribute("id").filter(|v| !v.is_empty()).map(SmolStr::from),
            position: node.document_position(),
        };
        let meta = surface.meta();
        self.tracked.insert(id, surface);
        tracing::debug!(
            target: "scribe::tracker",
            surface = %id,
            kind = kind.as_str(),
            label = ?meta.label,
            "surface registered"
        );
        self.events.emit(&TrackerEvent::Added(meta));
        Some(id)
    }

    /// Stop tracking `node`. Its id stays reserved for it.
    pub fn unregister(&mut self, node: &N) -> Option<SurfaceId> {
        let id = *self.ids.get(&node.key())?;
        self.tracked.remove(&id)?;
        if self.active == Some(id) {
            self.active = None;
        }
        tracing::debug!(target: "scribe::tracker", surface = %id, "surface unregistered");
        self.events.emit(&TrackerEvent::Removed(id));
        Some(id)
    }

    /// Register every surface in the subtree rooted at `root`. Rich surfaces
    /// are not descended into.
    pub fn scan(&mut self, root: &N) -> Vec<SurfaceId> {
        let mut found = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            if let Some(id) = self.register(&node) {
                found.push(id);
                if self.tracked.get(&id).is_some_and(|s| s.kind == SurfaceKind::RichEditable) {
                    continue;
                }
            }
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
        }
        found
    }

    /// Apply one structural batch. Removals are processed before additions so
    /// that a moved element keeps its registration.
    pub fn apply_change(&mut self, change: StructuralChange<N>) {
        for node in &change.removed {
            if node.is_connected() {
                // Moved within the document; the matching addition re-scans it.
                continue;
            }
            self.unregister_subtree(node);
        }
        for node in &change.added {
            if node.is_connected() {
                self.scan(node);
            }
        }
    }

    /// Drain `feed` and apply every pending batch.
    pub fn sync<F: StructuralFeed<N>>(&mut self, feed: &mut F) {
        for change in feed.take_changes() {
            self.apply_change(change);
        }
    }

    /// The tracked surface containing `node` (itself or an ancestor).
    pub fn surface_for(&self, node: &N) -> Option<SurfaceId> {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if let Some(id) = self.ids.get(&n.key()) {
                if self.tracked.contains_key(id) {
                    return Some(*id);
                }
            }
            current = n.parent();
        }
        None
    }

    pub fn focus(&mut self, node: &N) -> Option<SurfaceId> {
        let id = self.surface_for(node)?;
        if self.active != Some(id) {
            self.active = Some(id);
            self.events.emit(&TrackerEvent::Focused(id));
        }
        Some(id)
    }

    pub fn blur(&mut self, node: &N) -> Option<SurfaceId> {
        let id = self.surface_for(node)?;
        if self.active == Some(id) {
            self.active = None;
            self.events.emit(&TrackerEvent::Blurred(id));
        }
        Some(id)
    }

    pub fn input(&mut self, node: &N) -> Option<SurfaceId> {
        let id = self.surface_for(node)?;
        self.events.emit(&TrackerEvent::Input(id));
        Some(id)
    }

    /// Re-read a surface's label (after its labelling elements changed).
    pub fn refresh_label(&mut self, id: SurfaceId) -> Option<SmolStr> {
        let surface = self.tracked.get_mut(&id)?;
        surface.label = resolve_label(&surface.node);
        surface.label.clone()
    }

    fn inside_rich_surface(&self, node: &N) -> bool {
        let mut current = node.parent();
        while let Some(ancestor) = current {
            let tracked_rich = self
                .ids
                .get(&ancestor.key())
                .and_then(|id| self.tracked.get(id))
                .is_some_and(|s| s.kind == SurfaceKind::RichEditable);
            if tracked_rich {
                return true;
            }
            current = ancestor.parent();
        }
        false
    }

    fn unregister_subtree(&mut self, root: &N) {
        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            self.unregister(&node);
            stack.extend(node.children());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocument, MemoryFeed};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_classification() {
        let doc = MemoryDocument::new();
        let cases = [
            (doc.element("input", &[]), Some(SurfaceKind::PlainInput)),
            (doc.element("input", &[("type", "Email")]), Some(SurfaceKind::PlainInput)),
            (doc.element("input", &[("type", "password")]), None),
            (doc.element("input", &[("type", "text"), ("readonly", "")]), None),
            (doc.element("textarea", &[]), Some(SurfaceKind::PlainMultiline)),
            (doc.element("textarea", &[("disabled", "")]), None),
            (doc.element("textarea", &[("spellcheck", "false")]), None),
            (doc.element("textarea", &[("autocorrect", "off")]), None),
            (doc.element("div", &[("writingsuggestions", "false"), ("contenteditable", "true")]), None),
            (doc.element("div", &[("data-scribe", "off"), ("contenteditable", "")]), None),
            (doc.element("div", &[("contenteditable", "true")]), Some(SurfaceKind::RichEditable)),
            (doc.element("div", &[]), None),
        ];
        for (node, expected) in cases {
            assert_eq!(classify(&node), expected, "{}", node.tag_name());
        }
    }

    #[test]
    fn test_scan_skips_descendants_of_rich_surfaces() {
        let doc = MemoryDocument::new();
        let root = doc.root();
        let editor = doc.element("div", &[("contenteditable", "true")]);
        let nested = doc.element("div", &[("contenteditable", "true")]);
        editor.append(&nested);
        let field = doc.element("textarea", &[]);
        root.append(&editor);
        root.append(&field);

        let mut tracker = Tracker::new();
        let found = tracker.scan(&root);
        assert_eq!(found.len(), 2);
        assert!(tracker.register(&nested).is_none());
        assert_eq!(tracker.surface_for(&nested), tracker.ids.get(&editor.key()).copied());
    }

    #[test]
    fn test_ids_stable_across_moves_and_reregistration() {
        let doc = MemoryDocument::new();
        let root = doc.root();
        let a = doc.element("section", &[]);
        let b = doc.element("section", &[]);
        let field = doc.element("textarea", &[]);
        root.append(&a);
        root.append(&b);
        a.append(&field);

        let mut feed = MemoryFeed::attach(&doc);
        let mut tracker = Tracker::new();
        let id = tracker.scan(&root)[0];

        b.append(&field);
        tracker.sync(&mut feed);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.id_for(&field), id);

        field.remove();
        tracker.sync(&mut feed);
        assert!(tracker.is_empty());

        root.append(&field);
        tracker.sync(&mut feed);
        assert_eq!(tracker.register(&field), Some(id));
    }

    #[test]
    fn test_removed_subtree_unregisters_descendants() {
        let doc = MemoryDocument::new();
        let root = doc.root();
        let form = doc.element("form", &[]);
        let first = doc.element("input", &[]);
        let second = doc.element("textarea", &[]);
        form.append(&first);
        form.append(&second);
        root.append(&form);

        let mut feed = MemoryFeed::attach(&doc);
        let mut tracker = Tracker::new();
        tracker.scan(&root);
        tracker.focus(&second);

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let mut sub = tracker.subscribe(move |e: &TrackerEvent| sink.borrow_mut().push(e.clone()));

        form.remove();
        tracker.sync(&mut feed);
        assert!(tracker.is_empty());
        assert_eq!(tracker.active_surface(), None);
        assert_eq!(
            events
                .borrow()
                .iter()
                .filter(|e| matches!(e, TrackerEvent::Removed(_)))
                .count(),
            2
        );
        sub.release();
    }

    #[test]
    fn test_focus_blur_and_input_events() {
        let doc = MemoryDocument::new();
        let root = doc.root();
        let editor = doc.element("div", &[("contenteditable", "true")]);
        let para = doc.element("p", &[]);
        let text = doc.text("hello");
        para.append(&text);
        editor.append(&para);
        root.append(&editor);

        let mut tracker = Tracker::new();
        tracker.scan(&root);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let mut sub = tracker.subscribe(move |e: &TrackerEvent| sink.borrow_mut().push(e.clone()));

        let id = tracker.focus(&text).unwrap();
        assert_eq!(tracker.active_surface(), Some(id));
        tracker.focus(&para);
        tracker.input(&text);
        tracker.blur(&para);

        assert_eq!(
            *events.borrow(),
            vec![
                TrackerEvent::Focused(id),
                TrackerEvent::Input(id),
                TrackerEvent::Blurred(id),
            ]
        );
        sub.release();
    }

    #[test]
    fn test_group_metadata_follows_document_order() {
        let doc = MemoryDocument::new();
        let root = doc.root();
        let late = doc.element("textarea", &[("id", "late"), ("aria-label", "Notes")]);
        let early = doc.element("input", &[]);
        root.append(&late);
        root.append(&early);

        let mut tracker = Tracker::new();
        tracker.scan(&root);
        let late_id = tracker.id_for(&late);
        let early_id = tracker.id_for(&early);
        let late_meta = tracker.by_id(late_id).unwrap().meta();
        let early_meta = tracker.by_id(early_id).unwrap().meta();
        assert!(late_meta.position < early_meta.position);
        assert_eq!(late_meta.dom_id.as_deref(), Some("late"));
        assert_eq!(late_meta.label.as_deref(), Some("Notes"));
    }
}
