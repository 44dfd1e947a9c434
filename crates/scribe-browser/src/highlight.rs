//! CSS Custom Highlight registry (`CSS.highlights`).
//!
//! One `Highlight` object exists per correction type and is shared by every
//! rich surface on the page; each surface adds and removes only its own
//! ranges. web-sys does not expose the API on stable, so it is reached
//! through `Reflect`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use js_sys::{Array, Function, Reflect};
use scribe_core::config::UnderlineStyle;
use scribe_core::position::{NodePosition, TextNode};
use scribe_core::render::HighlightRegistry;
use scribe_core::text::{char_len, char_to_utf16};
use smol_str::SmolStr;
use wasm_bindgen::{JsCast, JsValue};

use crate::PlatformError;
use crate::node::SHOW_TEXT;

fn get(target: &JsValue, key: &str) -> Result<JsValue, PlatformError> {
    Reflect::get(target, &JsValue::from_str(key)).map_err(|e| format!("reading {key} failed: {:?}", e).into())
}

fn call(target: &JsValue, method: &str, args: &[&JsValue]) -> Result<JsValue, PlatformError> {
    let function: Function = get(target, method)?
        .dyn_into()
        .map_err(|_| format!("{method} is not a function"))?;
    let list: Array = args.iter().copied().collect();
    function
        .apply(target, &list)
        .map_err(|e| format!("{method} failed: {:?}", e).into())
}

/// Declarations drawing one decoration.
pub fn decoration_css(color: &str, underline: UnderlineStyle) -> String {
    let decoration = match underline {
        UnderlineStyle::Wavy => format!("text-decoration: underline wavy {color};"),
        UnderlineStyle::Solid => format!("text-decoration: underline solid {color};"),
        UnderlineStyle::Dotted => format!("text-decoration: underline dotted {color};"),
        UnderlineStyle::Dashed => format!("text-decoration: underline dashed {color};"),
        UnderlineStyle::Highlight => {
            format!("background-color: color-mix(in srgb, {color} 25%, transparent);")
        }
    };
    format!("{decoration} text-decoration-skip-ink: none;")
}

/// Style rule for a registered highlight.
pub fn highlight_css(name: &str, color: &str, underline: UnderlineStyle) -> String {
    format!("::highlight({name}) {{ {} }}", decoration_css(color, underline))
}

struct Entry {
    highlight: JsValue,
    style: web_sys::Element,
    users: usize,
}

/// Page-wide registry handle shared by the per-surface registries.
pub struct HighlightSheet {
    document: web_sys::Document,
    registry: JsValue,
    constructor: Function,
    entries: RefCell<HashMap<SmolStr, Entry>>,
}

impl HighlightSheet {
    /// `None` when the browser has no custom highlight support.
    pub fn new(document: web_sys::Document) -> Option<Rc<Self>> {
        let global: JsValue = js_sys::global().into();
        let css = get(&global, "CSS").ok().filter(|v| !v.is_undefined())?;
        let registry = get(&css, "highlights").ok().filter(|v| !v.is_undefined())?;
        let constructor: Function = get(&global, "Highlight").ok()?.dyn_into().ok()?;
        Some(Rc::new(Self {
            document,
            registry,
            constructor,
            entries: RefCell::new(HashMap::new()),
        }))
    }

    fn highlight(&self, name: &str) -> Result<JsValue, PlatformError> {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(name) {
            entry.users += 1;
            return Ok(entry.highlight.clone());
        }
        let highlight = Reflect::construct(&self.constructor, &Array::new())
            .map_err(|e| format!("new Highlight failed: {:?}", e))?;
        call(&self.registry, "set", &[&JsValue::from_str(name), &highlight])?;
        let style = self
            .document
            .create_element("style")
            .map_err(|e| format!("create_element failed: {:?}", e))?;
        style
            .set_attribute("data-scribe-highlight", name)
            .map_err(|e| format!("set_attribute failed: {:?}", e))?;
        if let Some(head) = self.document.head() {
            head.append_child(&style)
                .map_err(|e| format!("append_child failed: {:?}", e))?;
        }
        entries.insert(
            SmolStr::new(name),
            Entry {
                highlight: highlight.clone(),
                style,
                users: 1,
            },
        );
        Ok(highlight)
    }

    fn release(&self, name: &str) {
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.get_mut(name) else {
            return;
        };
        entry.users = entry.users.saturating_sub(1);
        if entry.users > 0 {
            return;
        }
        if let Some(entry) = entries.remove(name) {
            if let Err(e) = call(&self.registry, "delete", &[&JsValue::from_str(name)]) {
                tracing::debug!(target: "scribe::browser", %name, error = %e, "highlight delete failed");
            }
            entry.style.remove();
        }
    }

    fn style(&self, name: &str, color: &str, underline: UnderlineStyle) {
        if let Some(entry) = self.entries.borrow().get(name) {
            entry
                .style
                .set_text_content(Some(&highlight_css(name, color, underline)));
        }
    }
}

/// The highlight registry as seen by one rich surface.
pub struct CssHighlights {
    sheet: Rc<HighlightSheet>,
    root: web_sys::HtmlElement,
    owned: HashMap<SmolStr, Vec<web_sys::Range>>,
}

impl CssHighlights {
    pub fn new(sheet: Rc<HighlightSheet>, root: web_sys::HtmlElement) -> Self {
        Self {
            sheet,
            root,
            owned: HashMap::new(),
        }
    }

    fn drop_ranges(&mut self, name: &str) -> bool {
        let Some(ranges) = self.owned.remove(name) else {
            return false;
        };
        if let Some(entry) = self.sheet.entries.borrow().get(name) {
            for range in &ranges {
                let _ = call(&entry.highlight, "delete", &[range.unchecked_ref::<JsValue>()]);
            }
        }
        true
    }
}

impl HighlightRegistry for CssHighlights {
    type Node = web_sys::Node;
    type Range = web_sys::Range;

    fn text_nodes(&self) -> Vec<TextNode<web_sys::Node>> {
        let Ok(walker) = self
            .sheet
            .document
            .create_tree_walker_with_what_to_show(&self.root, SHOW_TEXT)
        else {
            return Vec::new();
        };
        let mut nodes = Vec::new();
        while let Ok(Some(node)) = walker.next_node() {
            let len = char_len(&node.text_content().unwrap_or_default());
            nodes.push(TextNode::new(node, len));
        }
        nodes
    }

    fn create_range(
        &self,
        start: &NodePosition<web_sys::Node>,
        end: &NodePosition<web_sys::Node>,
    ) -> Result<web_sys::Range, PlatformError> {
        let utf16 = |p: &NodePosition<web_sys::Node>| {
            let text = p.node.text_content().unwrap_or_default();
            char_to_utf16(&text, p.offset) as u32
        };
        let range = self
            .sheet
            .document
            .create_range()
            .map_err(|e| format!("create_range failed: {:?}", e))?;
        range
            .set_start(&start.node, utf16(start))
            .map_err(|e| format!("set_start failed: {:?}", e))?;
        range
            .set_end(&end.node, utf16(end))
            .map_err(|e| format!("set_end failed: {:?}", e))?;
        Ok(range)
    }

    fn set(&mut self, name: &str, ranges: Vec<web_sys::Range>) -> Result<(), PlatformError> {
        let had = self.drop_ranges(name);
        let highlight = if had {
            // Still counted as a user from the previous set.
            match self.sheet.entries.borrow().get(name) {
                Some(entry) => entry.highlight.clone(),
                None => return Err(format!("highlight {name} vanished").into()),
            }
        } else {
            self.sheet.highlight(name)?
        };
        for range in &ranges {
            call(&highlight, "add", &[range.unchecked_ref::<JsValue>()])?;
        }
        self.owned.insert(SmolStr::new(name), ranges);
        Ok(())
    }

    fn remove(&mut self, name: &str) {
        if self.drop_ranges(name) {
            self.sheet.release(name);
        }
    }

    fn apply_style(&mut self, name: &str, color: &str, underline: UnderlineStyle) {
        self.sheet.style(name, color, underline);
    }
}

impl Drop for CssHighlights {
    fn drop(&mut self) {
        let names: Vec<SmolStr> = self.owned.keys().cloned().collect();
        for name in names {
            self.remove(&name);
        }
    }
}
