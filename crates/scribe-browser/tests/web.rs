//! WASM browser tests for scribe-browser.
//!
//! Run with: `wasm-pack test --headless --firefox` or `--chrome`

use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

use scribe_browser::highlight::{HighlightSheet, highlight_css};
use scribe_browser::style::px;
use scribe_browser::{DomDocument, DomSurface, Platform};
use scribe_core::config::UnderlineStyle;
use scribe_core::mutation::{self, ApplyOutcome, EditableSurface};
use scribe_core::tracker::{SurfaceNode, Tracker};
use scribe_core::types::{Selection, SurfaceKind};

fn document() -> web_sys::Document {
    web_sys::window().unwrap().document().unwrap()
}

fn mount(html: &str) -> web_sys::HtmlElement {
    let doc = document();
    let host = doc
        .create_element("div")
        .unwrap()
        .dyn_into::<web_sys::HtmlElement>()
        .unwrap();
    host.set_inner_html(html);
    doc.body().unwrap().append_child(&host).unwrap();
    host
}

fn by_id(id: &str) -> web_sys::HtmlElement {
    document()
        .get_element_by_id(id)
        .unwrap()
        .dyn_into::<web_sys::HtmlElement>()
        .unwrap()
}

// === Platform ===

#[wasm_bindgen_test]
fn test_platform_detection_is_cached() {
    let first: &Platform = scribe_browser::platform();
    let second = scribe_browser::platform();
    assert!(std::ptr::eq(first, second));
}

// === Tracker over the DOM ===

#[wasm_bindgen_test]
fn test_tracker_classifies_dom_surfaces() {
    let host = mount(
        r#"<label for="t1">Title</label><input id="t1" type="text">
           <input id="pw" type="password">
           <textarea id="body" aria-label="Body"></textarea>
           <div id="rich" contenteditable="true"><p>Rich <b>text</b></p></div>
           <textarea id="off" spellcheck="false"></textarea>"#,
    );
    let doc = DomDocument::current().unwrap();
    let mut tracker = Tracker::new();
    let found = tracker.scan(&doc.wrap(host.clone().into()));
    assert_eq!(found.len(), 3);

    let labels: Vec<_> = tracker.surfaces().map(|s| (s.kind, s.label.clone())).collect();
    assert_eq!(labels[0], (SurfaceKind::PlainInput, Some("Title".into())));
    assert_eq!(labels[1], (SurfaceKind::PlainMultiline, Some("Body".into())));
    assert_eq!(labels[2].0, SurfaceKind::RichEditable);
    host.remove();
}

#[wasm_bindgen_test]
fn test_node_keys_survive_moves() {
    let host = mount(r#"<textarea id="moving"></textarea><div id="elsewhere"></div>"#);
    let doc = DomDocument::current().unwrap();
    let area = doc.wrap(by_id("moving").into());
    let key = area.key();
    by_id("elsewhere").append_child(area.node()).unwrap();
    assert_eq!(doc.wrap(by_id("moving").into()).key(), key);
    host.remove();
}

#[wasm_bindgen_test]
fn test_current_text_reads_control_value() {
    let host = mount(r#"<textarea id="valued">initial</textarea>"#);
    let area = by_id("valued")
        .dyn_into::<web_sys::HtmlTextAreaElement>()
        .unwrap();
    area.set_value("typed since");
    let doc = DomDocument::current().unwrap();
    assert_eq!(doc.wrap(area.into()).current_text(), "typed since");
    host.remove();
}

// === Mutation ===

#[wasm_bindgen_test]
fn test_textarea_apply_converts_utf16_offsets() {
    let host = mount(r#"<textarea id="emoji"></textarea>"#);
    let element = by_id("emoji");
    let area = element.clone().dyn_into::<web_sys::HtmlTextAreaElement>().unwrap();
    // The emoji is two UTF-16 units but one char.
    area.set_value("😀 I has a cat");
    let mut surface = DomSurface::new(element, SurfaceKind::PlainMultiline).unwrap();
    surface.set_selection(Selection::collapsed(13)).unwrap();

    let outcome = mutation::apply(&mut surface, 4..7, "have").unwrap();
    assert_eq!(outcome, ApplyOutcome::Native);
    assert_eq!(surface.text(), "😀 I have a cat");
    assert_eq!(surface.selection(), Some(Selection::collapsed(14)));
    host.remove();
}

#[wasm_bindgen_test]
fn test_rich_apply_spans_text_nodes() {
    let host = mount(r#"<div id="richapply" contenteditable="true">I <b>has</b> a cat</div>"#);
    let mut surface = DomSurface::new(by_id("richapply"), SurfaceKind::RichEditable).unwrap();
    assert_eq!(surface.text_nodes().len(), 3);

    mutation::apply(&mut surface, 2..5, "have").unwrap();
    assert_eq!(surface.text(), "I have a cat");
    host.remove();
}

#[wasm_bindgen_test]
fn test_apply_fires_bubbling_input_event() {
    use std::cell::Cell;
    use std::rc::Rc;

    let host = mount(r#"<input id="evented" type="text" value="teh cat">"#);
    let fired = Rc::new(Cell::new(0));
    let counter = fired.clone();
    let _listener = gloo_events::EventListener::new(&host, "input", move |_| {
        counter.set(counter.get() + 1);
    });
    let mut surface = DomSurface::new(by_id("evented"), SurfaceKind::PlainInput).unwrap();
    mutation::apply(&mut surface, 0..3, "the").unwrap();
    assert_eq!(fired.get(), 1);
    host.remove();
}

// === Overlays ===

#[wasm_bindgen_test]
fn test_highlight_rule_text() {
    assert_eq!(
        highlight_css("scribe-spelling", "#e53935", UnderlineStyle::Wavy),
        "::highlight(scribe-spelling) { text-decoration: underline wavy #e53935; text-decoration-skip-ink: none; }"
    );
}

#[wasm_bindgen_test]
fn test_highlight_sheet_matches_feature_support() {
    let supported = js_sys::Reflect::get(&js_sys::global(), &"Highlight".into())
        .map(|v| !v.is_undefined())
        .unwrap_or(false);
    assert_eq!(HighlightSheet::new(document()).is_some(), supported);
}

#[wasm_bindgen_test]
fn test_box_metrics_read_padding_and_border() {
    let host = mount(
        r#"<textarea id="boxed" style="padding: 4px; border: 1px solid black; width: 200px; box-sizing: border-box"></textarea>"#,
    );
    let metrics = scribe_browser::style::box_metrics(&by_id("boxed"));
    assert_eq!(metrics.padding.left, 4.0);
    assert_eq!(metrics.border.top, 1.0);
    assert_eq!(metrics.width, 200.0);
    assert_eq!(px("4px"), 4.0);
    host.remove();
}
