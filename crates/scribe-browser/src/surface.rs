//! Editable DOM elements as mutation targets.
//!
//! The DOM counts offsets in UTF-16 code units; everything crossing into the
//! core is converted to char offsets here.

use std::ops::Range;

use scribe_core::mutation::EditableSurface;
use scribe_core::position::{NodePosition, TextNode, resolve_offset};
use scribe_core::text::{char_len, char_to_utf16, utf16_to_char};
use scribe_core::types::{Selection, SurfaceKind};
use wasm_bindgen::JsCast;

use crate::PlatformError;
use crate::node::SHOW_TEXT;

#[derive(Clone, Debug)]
enum Control {
    Input(web_sys::HtmlInputElement),
    TextArea(web_sys::HtmlTextAreaElement),
    Rich(web_sys::HtmlElement),
}

/// An `<input>`, `<textarea>` or editable element.
#[derive(Clone, Debug)]
pub struct DomSurface {
    control: Control,
    kind: SurfaceKind,
}

impl DomSurface {
    pub fn new(element: web_sys::HtmlElement, kind: SurfaceKind) -> Result<Self, PlatformError> {
        let control = match kind {
            SurfaceKind::PlainInput => Control::Input(
                element
                    .dyn_into()
                    .map_err(|_| "surface is not an input element")?,
            ),
            SurfaceKind::PlainMultiline => Control::TextArea(
                element
                    .dyn_into()
                    .map_err(|_| "surface is not a textarea element")?,
            ),
            SurfaceKind::RichEditable => Control::Rich(element),
        };
        Ok(Self { control, kind })
    }

    pub fn element(&self) -> &web_sys::HtmlElement {
        match &self.control {
            Control::Input(el) => el,
            Control::TextArea(el) => el,
            Control::Rich(el) => el,
        }
    }

    fn document(&self) -> Result<web_sys::Document, PlatformError> {
        Ok(self.element().owner_document().ok_or("no document")?)
    }

    fn linear_selection(&self) -> Option<(u32, u32, String)> {
        let (start, end, direction) = match &self.control {
            Control::Input(el) => (
                el.selection_start().ok()??,
                el.selection_end().ok()??,
                el.selection_direction().ok().flatten(),
            ),
            Control::TextArea(el) => (
                el.selection_start().ok()??,
                el.selection_end().ok()??,
                el.selection_direction().ok().flatten(),
            ),
            Control::Rich(_) => return None,
        };
        Some((start, end, direction.unwrap_or_default()))
    }

    /// Char offset of a DOM boundary point inside a rich surface.
    fn offset_of(&self, nodes: &[TextNode<web_sys::Node>], node: &web_sys::Node, local: u32) -> Option<usize> {
        let mut accumulated = 0;
        for text_node in nodes {
            if &text_node.node == node {
                let text = text_node.node.text_content().unwrap_or_default();
                return Some(accumulated + utf16_to_char(&text, local as usize));
            }
            accumulated += text_node.len;
        }
        None
    }

    fn boundary(&self, nodes: &[TextNode<web_sys::Node>], offset: usize) -> Result<(web_sys::Node, u32), PlatformError> {
        let position = resolve_offset(nodes, offset)
            .ok_or_else(|| format!("offset {offset} is outside the surface text"))?;
        Ok(utf16_position(&position))
    }
}

fn utf16_position(position: &NodePosition<web_sys::Node>) -> (web_sys::Node, u32) {
    let text = position.node.text_content().unwrap_or_default();
    (position.node.clone(), char_to_utf16(&text, position.offset) as u32)
}

impl EditableSurface for DomSurface {
    type Node = web_sys::Node;

    fn kind(&self) -> SurfaceKind {
        self.kind
    }

    fn text(&self) -> String {
        match &self.control {
            Control::Input(el) => el.value(),
            Control::TextArea(el) => el.value(),
            Control::Rich(el) => el.text_content().unwrap_or_default(),
        }
    }

    fn selection(&self) -> Option<Selection> {
        if self.kind.is_linear() {
            let (start, end, direction) = self.linear_selection()?;
            let text = self.text();
            let start = utf16_to_char(&text, start as usize);
            let end = utf16_to_char(&text, end as usize);
            return Some(if direction == "backward" {
                Selection::new(end, start)
            } else {
                Selection::new(start, end)
            });
        }

        let selection = web_sys::window()?.get_selection().ok()??;
        let anchor = selection.anchor_node()?;
        let focus = selection.focus_node()?;
        let nodes = self.text_nodes();
        let anchor = self.offset_of(&nodes, &anchor, selection.anchor_offset())?;
        let head = self.offset_of(&nodes, &focus, selection.focus_offset())?;
        Some(Selection::new(anchor, head))
    }

    fn set_selection(&mut self, selection: Selection) -> Result<(), PlatformError> {
        if self.kind.is_linear() {
            let text = self.text();
            let start = char_to_utf16(&text, selection.start()) as u32;
            let end = char_to_utf16(&text, selection.end()) as u32;
            let direction = if selection.anchor > selection.head {
                "backward"
            } else {
                "forward"
            };
            let result = match &self.control {
                Control::Input(el) => el.set_selection_range_with_direction(start, end, direction),
                Control::TextArea(el) => el.set_selection_range_with_direction(start, end, direction),
                Control::Rich(_) => Ok(()),
            };
            return result.map_err(|e| format!("set_selection_range failed: {:?}", e).into());
        }

        let nodes = self.text_nodes();
        let (anchor_node, anchor_offset) = self.boundary(&nodes, selection.anchor)?;
        let (focus_node, focus_offset) = self.boundary(&nodes, selection.head)?;
        let dom_selection = web_sys::window()
            .ok_or("no window")?
            .get_selection()
            .map_err(|e| format!("get_selection failed: {:?}", e))?
            .ok_or("no selection object")?;
        dom_selection
            .set_base_and_extent(&anchor_node, anchor_offset, &focus_node, focus_offset)
            .map_err(|e| format!("set_base_and_extent failed: {:?}", e))?;
        Ok(())
    }

    fn replace_range(&mut self, range: Range<usize>, replacement: &str) -> Result<(), PlatformError> {
        let text = self.text();
        let start = char_to_utf16(&text, range.start) as u32;
        let end = char_to_utf16(&text, range.end) as u32;
        let result = match &self.control {
            Control::Input(el) => el.set_range_text_with_start_and_end(replacement, start, end),
            Control::TextArea(el) => el.set_range_text_with_start_and_end(replacement, start, end),
            Control::Rich(_) => return Err("rich surface has no linear range editing".into()),
        };
        result.map_err(|e| format!("set_range_text failed: {:?}", e).into())
    }

    fn text_nodes(&self) -> Vec<TextNode<web_sys::Node>> {
        let Control::Rich(root) = &self.control else {
            return Vec::new();
        };
        let Ok(document) = self.document() else {
            return Vec::new();
        };
        let Ok(walker) = document.create_tree_walker_with_what_to_show(root, SHOW_TEXT) else {
            return Vec::new();
        };
        let mut nodes = Vec::new();
        while let Ok(Some(node)) = walker.next_node() {
            let len = char_len(&node.text_content().unwrap_or_default());
            nodes.push(TextNode::new(node, len));
        }
        nodes
    }

    fn replace_nodes(
        &mut self,
        start: &NodePosition<web_sys::Node>,
        end: &NodePosition<web_sys::Node>,
        replacement: &str,
    ) -> Result<(), PlatformError> {
        let document = self.document()?;
        let (start_node, start_offset) = utf16_position(start);
        let (end_node, end_offset) = utf16_position(end);

        // Selecting the range and inserting through the editing command keeps
        // the change on the element's native undo stack.
        let selection = web_sys::window()
            .ok_or("no window")?
            .get_selection()
            .map_err(|e| format!("get_selection failed: {:?}", e))?
            .ok_or("no selection object")?;
        selection
            .set_base_and_extent(&start_node, start_offset, &end_node, end_offset)
            .map_err(|e| format!("set_base_and_extent failed: {:?}", e))?;
        if let Some(html) = document.dyn_ref::<web_sys::HtmlDocument>() {
            let inserted = html
                .exec_command_with_show_ui_and_value("insertText", false, replacement)
                .unwrap_or(false);
            if inserted {
                return Ok(());
            }
        }

        tracing::debug!(target: "scribe::browser", "insertText unavailable, editing range directly");
        let range = document
            .create_range()
            .map_err(|e| format!("create_range failed: {:?}", e))?;
        range
            .set_start(&start_node, start_offset)
            .map_err(|e| format!("set_start failed: {:?}", e))?;
        range
            .set_end(&end_node, end_offset)
            .map_err(|e| format!("set_end failed: {:?}", e))?;
        range
            .delete_contents()
            .map_err(|e| format!("delete_contents failed: {:?}", e))?;
        let text = document.create_text_node(replacement);
        range
            .insert_node(&text)
            .map_err(|e| format!("insert_node failed: {:?}", e))?;
        Ok(())
    }

    fn set_text(&mut self, text: &str) -> Result<(), PlatformError> {
        match &self.control {
            Control::Input(el) => el.set_value(text),
            Control::TextArea(el) => el.set_value(text),
            Control::Rich(el) => el.set_text_content(Some(text)),
        }
        Ok(())
    }

    fn dispatch_input(&mut self) {
        let init = web_sys::EventInit::new();
        init.set_bubbles(true);
        let event = match web_sys::Event::new_with_event_init_dict("input", &init) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(target: "scribe::browser", error = ?e, "could not create input event");
                return;
            }
        };
        if let Err(e) = self.element().dispatch_event(&event) {
            tracing::warn!(target: "scribe::browser", error = ?e, "input event dispatch failed");
        }
    }
}
