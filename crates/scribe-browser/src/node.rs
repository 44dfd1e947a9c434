//! DOM elements as tracker nodes.
//!
//! Node identity lives in a `WeakMap` owned by the [`DomDocument`], so an
//! element keeps its key when it is moved and the key dies with the element.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use js_sys::WeakMap;
use scribe_core::tracker::SurfaceNode;
use scribe_core::types::NodeKey;
use smol_str::SmolStr;
use wasm_bindgen::{JsCast, JsValue};

use crate::PlatformError;

/// `NodeFilter.SHOW_ELEMENT`
pub(crate) const SHOW_ELEMENT: u32 = 0x1;
/// `NodeFilter.SHOW_TEXT`
pub(crate) const SHOW_TEXT: u32 = 0x4;

struct Keys {
    map: WeakMap,
    next: Cell<u64>,
}

impl Keys {
    fn key_for(&self, node: &web_sys::Node) -> NodeKey {
        if let Some(existing) = self.map.get(node).as_f64() {
            return NodeKey(existing as u64);
        }
        let key = self.next.get();
        self.next.set(key + 1);
        self.map.set(node, &JsValue::from_f64(key as f64));
        NodeKey(key)
    }
}

/// A document plus the identity map shared by its nodes.
#[derive(Clone)]
pub struct DomDocument {
    document: web_sys::Document,
    keys: Rc<Keys>,
}

impl DomDocument {
    pub fn new(document: web_sys::Document) -> Self {
        Self {
            document,
            keys: Rc::new(Keys {
                map: WeakMap::new(),
                next: Cell::new(1),
            }),
        }
    }

    /// The window's document.
    pub fn current() -> Result<Self, PlatformError> {
        let document = web_sys::window()
            .ok_or("no window")?
            .document()
            .ok_or("no document")?;
        Ok(Self::new(document))
    }

    pub fn document(&self) -> &web_sys::Document {
        &self.document
    }

    /// Wrap any node of this document.
    pub fn wrap(&self, node: web_sys::Node) -> DomNode {
        DomNode {
            node,
            keys: self.keys.clone(),
            document: self.document.clone(),
        }
    }

    /// The `<body>`, or the document element when there is none.
    pub fn root(&self) -> Result<DomNode, PlatformError> {
        let root: web_sys::Node = match self.document.body() {
            Some(body) => body.into(),
            None => self
                .document
                .document_element()
                .ok_or("no document element")?
                .into(),
        };
        Ok(self.wrap(root))
    }
}

/// One DOM node seen through [`SurfaceNode`].
#[derive(Clone)]
pub struct DomNode {
    node: web_sys::Node,
    keys: Rc<Keys>,
    document: web_sys::Document,
}

impl fmt::Debug for DomNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomNode")
            .field("name", &self.node.node_name())
            .finish()
    }
}

impl PartialEq for DomNode {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl DomNode {
    pub fn node(&self) -> &web_sys::Node {
        &self.node
    }

    pub fn element(&self) -> Option<&web_sys::Element> {
        self.node.dyn_ref::<web_sys::Element>()
    }

    pub fn html_element(&self) -> Option<web_sys::HtmlElement> {
        self.node.dyn_ref::<web_sys::HtmlElement>().cloned()
    }

    fn wrap(&self, node: web_sys::Node) -> Self {
        Self {
            node,
            keys: self.keys.clone(),
            document: self.document.clone(),
        }
    }
}

impl SurfaceNode for DomNode {
    fn key(&self) -> NodeKey {
        self.keys.key_for(&self.node)
    }

    fn tag_name(&self) -> SmolStr {
        match self.element() {
            Some(element) => SmolStr::new(element.tag_name().to_ascii_lowercase()),
            None if self.node.node_type() == web_sys::Node::TEXT_NODE => SmolStr::new_static("#text"),
            None => SmolStr::new(self.node.node_name().to_ascii_lowercase()),
        }
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.element()?.get_attribute(name)
    }

    fn is_content_editable(&self) -> bool {
        self.node
            .dyn_ref::<web_sys::HtmlElement>()
            .is_some_and(|el| el.is_content_editable())
    }

    fn is_connected(&self) -> bool {
        self.node.is_connected()
    }

    fn parent(&self) -> Option<Self> {
        self.node.parent_node().map(|p| self.wrap(p))
    }

    fn children(&self) -> Vec<Self> {
        let list = self.node.child_nodes();
        (0..list.length())
            .filter_map(|i| list.item(i))
            .map(|n| self.wrap(n))
            .collect()
    }

    fn text_content(&self) -> String {
        self.node.text_content().unwrap_or_default()
    }

    fn current_text(&self) -> String {
        if let Some(input) = self.node.dyn_ref::<web_sys::HtmlInputElement>() {
            return input.value();
        }
        if let Some(area) = self.node.dyn_ref::<web_sys::HtmlTextAreaElement>() {
            return area.value();
        }
        self.text_content()
    }

    fn document_position(&self) -> u64 {
        if !self.node.is_connected() {
            return u64::MAX;
        }
        let Some(root) = self.document.document_element() else {
            return u64::MAX;
        };
        let Ok(walker) = self
            .document
            .create_tree_walker_with_what_to_show(&root, SHOW_ELEMENT)
        else {
            return u64::MAX;
        };
        let mut position = 0u64;
        let mut current: Option<web_sys::Node> = Some(root.into());
        while let Some(node) = current {
            if node == self.node {
                return position;
            }
            position += 1;
            current = walker.next_node().ok().flatten();
        }
        u64::MAX
    }

    fn element_by_id(&self, id: &str) -> Option<Self> {
        let element = self.document.get_element_by_id(id)?;
        Some(self.wrap(element.into()))
    }

    fn label_for(&self, id: &str) -> Option<Self> {
        let escaped = id.replace('\\', "\\\\").replace('"', "\\\"");
        let selector = format!("label[for=\"{escaped}\"]");
        let element = self.document.query_selector(&selector).ok().flatten()?;
        Some(self.wrap(element.into()))
    }
}

/// Resolve an event target to a node of `document`.
pub fn event_node(document: &DomDocument, event: &web_sys::Event) -> Option<DomNode> {
    let target = event.target()?;
    let node = target.dyn_into::<web_sys::Node>().ok()?;
    Some(document.wrap(node))
}
