//! In-memory host implementations.
//!
//! `MemoryDocument` is a tiny element tree with mutation recording, enough to
//! drive the tracker without a browser. `MemorySurface` is an editable surface
//! backed by a rope (plain kinds) or a list of text nodes (rich kind).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::error::PlatformError;
use crate::mutation::EditableSurface;
use crate::position::{NodePosition, TextNode};
use crate::text::{EditorRope, TextBuffer, char_len, char_slice};
use crate::tracker::{StructuralChange, StructuralFeed, SurfaceNode};
use crate::types::{NodeKey, Selection, SurfaceKind};

const ROOT: usize = 0;
const TEXT_TAG: &str = "#text";

#[derive(Debug)]
struct NodeData {
    tag: SmolStr,
    attrs: BTreeMap<SmolStr, String>,
    text: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug, Default)]
struct DocInner {
    nodes: Vec<NodeData>,
    observed: bool,
    pending: Vec<(bool, usize)>,
}

impl DocInner {
    fn connected(&self, mut index: usize) -> bool {
        loop {
            if index == ROOT {
                return true;
            }
            match self.nodes[index].parent {
                Some(parent) => index = parent,
                None => return false,
            }
        }
    }

    fn text_content(&self, index: usize, out: &mut String) {
        let node = &self.nodes[index];
        if node.tag == TEXT_TAG {
            out.push_str(&node.text);
            return;
        }
        for &child in &node.children {
            self.text_content(child, out);
        }
    }

    fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![ROOT];
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.nodes[index].children.iter().rev());
        }
        order
    }

    fn find(&self, predicate: impl Fn(&NodeData) -> bool) -> Option<usize> {
        self.preorder().into_iter().find(|&i| predicate(&self.nodes[i]))
    }

    fn record(&mut self, added: bool, index: usize, parent: usize) {
        if self.observed && self.connected(parent) {
            self.pending.push((added, index));
        }
    }

    fn detach(&mut self, index: usize) {
        if let Some(parent) = self.nodes[index].parent.take() {
            self.nodes[parent].children.retain(|&c| c != index);
            self.record(false, index, parent);
        }
    }
}

/// Element tree with a `body` root.
#[derive(Clone, Debug)]
pub struct MemoryDocument {
    inner: Rc<RefCell<DocInner>>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let doc = Self {
            inner: Rc::new(RefCell::new(DocInner::default())),
        };
        doc.create("body", &[], String::new());
        doc
    }

    pub fn root(&self) -> MemoryNode {
        self.node(ROOT)
    }

    /// Create a detached element.
    pub fn element(&self, tag: &str, attrs: &[(&str, &str)]) -> MemoryNode {
        self.create(tag, attrs, String::new())
    }

    /// Create a detached text node.
    pub fn text(&self, text: &str) -> MemoryNode {
        self.create(TEXT_TAG, &[], text.to_string())
    }

    fn create(&self, tag: &str, attrs: &[(&str, &str)], text: String) -> MemoryNode {
        let mut inner = self.inner.borrow_mut();
        let index = inner.nodes.len();
        inner.nodes.push(NodeData {
            tag: SmolStr::new(tag.to_ascii_lowercase()),
            attrs: attrs
                .iter()
                .map(|(k, v)| (SmolStr::new(k), v.to_string()))
                .collect(),
            text,
            parent: None,
            children: Vec::new(),
        });
        drop(inner);
        self.node(index)
    }

    fn node(&self, index: usize) -> MemoryNode {
        MemoryNode {
            doc: Rc::clone(&self.inner),
            index,
        }
    }
}

/// Handle to a node in a [`MemoryDocument`].
#[derive(Clone)]
pub struct MemoryNode {
    doc: Rc<RefCell<DocInner>>,
    index: usize,
}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.doc.borrow();
        f.debug_struct("MemoryNode")
            .field("index", &self.index)
            .field("tag", &inner.nodes[self.index].tag)
            .finish()
    }
}

impl PartialEq for MemoryNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.doc, &other.doc) && self.index == other.index
    }
}

impl MemoryNode {
    fn at(&self, index: usize) -> MemoryNode {
        MemoryNode {
            doc: Rc::clone(&self.doc),
            index,
        }
    }

    /// Append `child`, moving it if it already has a parent.
    pub fn append(&self, child: &MemoryNode) {
        let mut inner = self.doc.borrow_mut();
        inner.detach(child.index);
        inner.nodes[child.index].parent = Some(self.index);
        inner.nodes[self.index].children.push(child.index);
        inner.record(true, child.index, self.index);
    }

    /// Detach from the parent.
    pub fn remove(&self) {
        self.doc.borrow_mut().detach(self.index);
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.doc.borrow_mut().nodes[self.index]
            .attrs
            .insert(SmolStr::new(name), value.to_string());
    }

    pub fn remove_attribute(&self, name: &str) {
        self.doc.borrow_mut().nodes[self.index].attrs.remove(name);
    }

    /// Replace a text node's data.
    pub fn set_text(&self, text: &str) {
        let mut inner = self.doc.borrow_mut();
        let node = &mut inner.nodes[self.index];
        node.text.clear();
        node.text.push_str(text);
    }
}

impl SurfaceNode for MemoryNode {
    fn key(&self) -> NodeKey {
        NodeKey(self.index as u64)
    }

    fn tag_name(&self) -> SmolStr {
        self.doc.borrow().nodes[self.index].tag.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.doc.borrow().nodes[self.index].attrs.get(name).cloned()
    }

    fn is_content_editable(&self) -> bool {
        let inner = self.doc.borrow();
        if inner.nodes[self.index].tag == TEXT_TAG {
            return false;
        }
        let mut index = Some(self.index);
        while let Some(i) = index {
            let node = &inner.nodes[i];
            if let Some(value) = node.attrs.get("contenteditable") {
                return !value.eq_ignore_ascii_case("false");
            }
            index = node.parent;
        }
        false
    }

    fn is_connected(&self) -> bool {
        self.doc.borrow().connected(self.index)
    }

    fn parent(&self) -> Option<Self> {
        let parent = self.doc.borrow().nodes[self.index].parent?;
        Some(self.at(parent))
    }

    fn children(&self) -> Vec<Self> {
        let children = self.doc.borrow().nodes[self.index].children.clone();
        children.into_iter().map(|c| self.at(c)).collect()
    }

    fn text_content(&self) -> String {
        let mut out = String::new();
        self.doc.borrow().text_content(self.index, &mut out);
        out
    }

    fn current_text(&self) -> String {
        match self.tag_name().as_str() {
            "input" | "textarea" => self.attribute("value").unwrap_or_default(),
            _ => self.text_content(),
        }
    }

    fn document_position(&self) -> u64 {
        let inner = self.doc.borrow();
        if !inner.connected(self.index) {
            return u64::MAX;
        }
        inner
            .preorder()
            .iter()
            .position(|&i| i == self.index)
            .map(|p| p as u64)
            .unwrap_or(u64::MAX)
    }

    fn element_by_id(&self, id: &str) -> Option<Self> {
        let found = self
            .doc
            .borrow()
            .find(|n| n.attrs.get("id").is_some_and(|v| v == id))?;
        Some(self.at(found))
    }

    fn label_for(&self, id: &str) -> Option<Self> {
        let found = self
            .doc
            .borrow()
            .find(|n| n.tag == "label" && n.attrs.get("for").is_some_and(|v| v == id))?;
        Some(self.at(found))
    }
}

/// Structural feed over a [`MemoryDocument`], recording from attach time on.
#[derive(Debug)]
pub struct MemoryFeed {
    doc: Rc<RefCell<DocInner>>,
}

impl MemoryFeed {
    pub fn attach(doc: &MemoryDocument) -> Self {
        let mut inner = doc.inner.borrow_mut();
        inner.observed = true;
        inner.pending.clear();
        drop(inner);
        Self {
            doc: Rc::clone(&doc.inner),
        }
    }
}

impl StructuralFeed<MemoryNode> for MemoryFeed {
    fn take_changes(&mut self) -> Vec<StructuralChange<MemoryNode>> {
        let pending = std::mem::take(&mut self.doc.borrow_mut().pending);
        pending
            .into_iter()
            .map(|(added, index)| {
                let node = MemoryNode {
                    doc: Rc::clone(&self.doc),
                    index,
                };
                if added {
                    StructuralChange {
                        added: vec![node],
                        removed: Vec::new(),
                    }
                } else {
                    StructuralChange {
                        added: Vec::new(),
                        removed: vec![node],
                    }
                }
            })
            .collect()
    }
}

impl Drop for MemoryFeed {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.doc.try_borrow_mut() {
            inner.observed = false;
            inner.pending.clear();
        }
    }
}

#[derive(Debug)]
enum Content {
    Linear(EditorRope),
    Nodes(Vec<String>),
}

/// Editable surface held entirely in memory.
#[derive(Debug)]
pub struct MemorySurface {
    kind: SurfaceKind,
    content: Content,
    selection: Option<Selection>,
    input_events: usize,
    native_broken: bool,
}

impl MemorySurface {
    /// An `<input>`/`<textarea>`-like surface.
    pub fn plain(kind: SurfaceKind, text: &str) -> Self {
        Self {
            kind,
            content: Content::Linear(EditorRope::from_str(text)),
            selection: None,
            input_events: 0,
            native_broken: false,
        }
    }

    /// A rich surface whose text is split across the given text nodes.
    pub fn rich(nodes: &[&str]) -> Self {
        Self {
            kind: SurfaceKind::RichEditable,
            content: Content::Nodes(nodes.iter().map(|s| s.to_string()).collect()),
            selection: None,
            input_events: 0,
            native_broken: false,
        }
    }

    /// Make native range editing fail, forcing the degraded path.
    pub fn with_broken_native(mut self) -> Self {
        self.native_broken = true;
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Number of input events dispatched so far.
    pub fn input_events(&self) -> usize {
        self.input_events
    }

    /// Text node contents, for rich surfaces.
    pub fn node_texts(&self) -> Vec<String> {
        match &self.content {
            Content::Linear(rope) => vec![rope.to_string()],
            Content::Nodes(nodes) => nodes.clone(),
        }
    }

    /// Simulate user typing that replaces everything, bypassing the mutation layer.
    pub fn type_text(&mut self, text: &str) {
        match &mut self.content {
            Content::Linear(rope) => rope.set(text),
            Content::Nodes(nodes) => *nodes = vec![text.to_string()],
        }
        self.selection = Some(Selection::collapsed(char_len(text)));
    }
}

impl EditableSurface for MemorySurface {
    type Node = usize;

    fn kind(&self) -> SurfaceKind {
        self.kind
    }

    fn text(&self) -> String {
        match &self.content {
            Content::Linear(rope) => rope.to_string(),
            Content::Nodes(nodes) => nodes.concat(),
        }
    }

    fn selection(&self) -> Option<Selection> {
        self.selection
    }

    fn set_selection(&mut self, selection: Selection) -> Result<(), PlatformError> {
        self.selection = Some(selection);
        Ok(())
    }

    fn replace_range(&mut self, range: Range<usize>, replacement: &str) -> Result<(), PlatformError> {
        if self.native_broken {
            return Err(PlatformError::from("native range editing unavailable"));
        }
        match &mut self.content {
            Content::Linear(rope) => {
                if range.end > rope.len_chars() {
                    return Err(PlatformError::from("range past end of text"));
                }
                rope.replace(range, replacement);
                Ok(())
            }
            Content::Nodes(_) => Err(PlatformError::from("surface has no linear text")),
        }
    }

    fn text_nodes(&self) -> Vec<TextNode<usize>> {
        match &self.content {
            Content::Linear(_) => Vec::new(),
            Content::Nodes(nodes) => nodes
                .iter()
                .enumerate()
                .map(|(i, s)| TextNode::new(i, char_len(s)))
                .collect(),
        }
    }

    fn replace_nodes(
        &mut self,
        start: &NodePosition<usize>,
        end: &NodePosition<usize>,
        replacement: &str,
    ) -> Result<(), PlatformError> {
        if self.native_broken {
            return Err(PlatformError::from("native range editing unavailable"));
        }
        let Content::Nodes(nodes) = &mut self.content else {
            return Err(PlatformError::from("surface has no text nodes"));
        };
        if start.node > end.node || end.node >= nodes.len() {
            return Err(PlatformError::from("range boundaries out of order"));
        }
        let head = char_slice(&nodes[start.node], 0..start.offset)
            .ok_or_else(|| PlatformError::from("start offset outside node"))?;
        let end_text = &nodes[end.node];
        let tail = char_slice(end_text, end.offset..char_len(end_text))
            .ok_or_else(|| PlatformError::from("end offset outside node"))?;
        let merged = format!("{head}{replacement}{tail}");
        nodes[start.node] = merged;
        nodes.drain(start.node + 1..=end.node);
        Ok(())
    }

    fn set_text(&mut self, text: &str) -> Result<(), PlatformError> {
        match &mut self.content {
            Content::Linear(rope) => rope.set(text),
            Content::Nodes(nodes) => *nodes = vec![text.to_string()],
        }
        Ok(())
    }

    fn dispatch_input(&mut self) {
        self.input_events += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_records_moves_as_remove_then_add() {
        let doc = MemoryDocument::new();
        let root = doc.root();
        let a = doc.element("div", &[]);
        let b = doc.element("div", &[]);
        let leaf = doc.element("input", &[]);
        root.append(&a);
        root.append(&b);
        a.append(&leaf);

        let mut feed = MemoryFeed::attach(&doc);
        b.append(&leaf);
        let changes = feed.take_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].removed, vec![leaf.clone()]);
        assert_eq!(changes[1].added, vec![leaf.clone()]);
        assert!(feed.take_changes().is_empty());
    }

    #[test]
    fn test_detached_mutations_are_not_recorded() {
        let doc = MemoryDocument::new();
        let mut feed = MemoryFeed::attach(&doc);
        let form = doc.element("form", &[]);
        form.append(&doc.element("input", &[]));
        assert!(feed.take_changes().is_empty());
    }

    #[test]
    fn test_rich_surface_replace_across_nodes() {
        let mut surface = MemorySurface::rich(&["I has ", "a radnom", " typo."]);
        let start = NodePosition { node: 0, offset: 2 };
        let end = NodePosition { node: 1, offset: 1 };
        surface.replace_nodes(&start, &end, "have a").unwrap();
        assert_eq!(surface.node_texts(), vec!["I have a radnom", " typo."]);
    }
}
