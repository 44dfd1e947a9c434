//! Mirror overlay: an invisible typographic clone of a plain-text surface.

use scribe_core::correction::IssueId;
use scribe_core::render::{BoxMetrics, DecorationStyle, MirrorHost, MirrorSegment, Rect};
use scribe_core::types::SurfaceKind;
use smol_str::SmolStr;
use wasm_bindgen::JsCast;

use crate::PlatformError;
use crate::highlight::decoration_css;
use crate::style::{box_metrics, computed_style, place_over};

/// Properties copied from the surface so text wraps identically.
const TYPOGRAPHY: &[&str] = &[
    "box-sizing",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "font-variant",
    "font-stretch",
    "font-kerning",
    "letter-spacing",
    "word-spacing",
    "line-height",
    "text-align",
    "text-indent",
    "text-transform",
    "text-rendering",
    "tab-size",
    "direction",
    "overflow-wrap",
    "word-break",
    "padding-top",
    "padding-right",
    "padding-bottom",
    "padding-left",
    "border-top-width",
    "border-right-width",
    "border-bottom-width",
    "border-left-width",
];

pub struct DomMirrorHost {
    surface: web_sys::HtmlElement,
    kind: SurfaceKind,
    mirror: web_sys::HtmlElement,
    content: web_sys::HtmlElement,
    document: web_sys::Document,
}

fn create_div(document: &web_sys::Document) -> Result<web_sys::HtmlElement, PlatformError> {
    let div = document
        .create_element("div")
        .map_err(|e| format!("create_element failed: {:?}", e))?
        .dyn_into::<web_sys::HtmlElement>()
        .map_err(|_| "div is not HtmlElement")?;
    Ok(div)
}

fn set(style: &web_sys::CssStyleDeclaration, name: &str, value: &str) {
    if let Err(e) = style.set_property(name, value) {
        tracing::trace!(target: "scribe::browser", %name, error = ?e, "set_property failed");
    }
}

impl DomMirrorHost {
    pub fn new(surface: web_sys::HtmlElement, kind: SurfaceKind) -> Result<Self, PlatformError> {
        let document = surface.owner_document().ok_or("no document")?;
        let mirror = create_div(&document)?;
        let content = create_div(&document)?;
        mirror
            .set_attribute("aria-hidden", "true")
            .map_err(|e| format!("set_attribute failed: {:?}", e))?;
        mirror
            .set_attribute("data-scribe-overlay", "mirror")
            .map_err(|e| format!("set_attribute failed: {:?}", e))?;
        mirror
            .append_child(&content)
            .map_err(|e| format!("append_child failed: {:?}", e))?;
        surface
            .after_with_node_1(&mirror)
            .map_err(|e| format!("inserting mirror failed: {:?}", e))?;

        let style = mirror.style();
        set(&style, "overflow", "hidden");
        set(&style, "color", "transparent");
        set(&style, "border-style", "solid");
        set(&style, "border-color", "transparent");
        set(&style, "background", "transparent");
        set(&style, "margin", "0");
        place_over(&mirror, &surface)?;

        Ok(Self {
            surface,
            kind,
            mirror,
            content,
            document,
        })
    }
}

impl MirrorHost for DomMirrorHost {
    fn measure(&self) -> BoxMetrics {
        box_metrics(&self.surface)
    }

    fn copy_typography(&mut self) {
        let source = match computed_style(&self.surface) {
            Ok(style) => style,
            Err(e) => {
                tracing::debug!(target: "scribe::browser", error = %e, "cannot copy typography");
                return;
            }
        };
        let target = self.mirror.style();
        for name in TYPOGRAPHY {
            let value = source.get_property_value(name).unwrap_or_default();
            set(&target, name, &value);
        }
        let white_space = match self.kind {
            SurfaceKind::PlainInput => "pre",
            _ => "pre-wrap",
        };
        set(&target, "white-space", white_space);
        if let Err(e) = place_over(&self.mirror, &self.surface) {
            tracing::debug!(target: "scribe::browser", error = %e, "could not reposition mirror");
        }
    }

    fn write_segments(&mut self, segments: &[MirrorSegment], style: &DecorationStyle) {
        self.content.set_text_content(None);
        for segment in segments {
            let appended = match segment {
                MirrorSegment::Text(text) => {
                    let node = self.document.create_text_node(text);
                    self.content.append_child(&node)
                }
                MirrorSegment::Mark { text, issue, kind } => {
                    let mark = match self.document.create_element("span") {
                        Ok(mark) => mark,
                        Err(e) => {
                            tracing::debug!(target: "scribe::browser", error = ?e, "create_element failed");
                            continue;
                        }
                    };
                    mark.set_text_content(Some(text));
                    let _ = mark.set_attribute("data-issue", issue.as_str());
                    let _ = mark.set_attribute("class", &format!("scribe-mark scribe-{}", kind.as_str()));
                    let _ = mark.set_attribute("style", &decoration_css(style.color(*kind), style.underline));
                    self.content.append_child(&mark)
                }
            };
            if let Err(e) = appended {
                tracing::debug!(target: "scribe::browser", error = ?e, "append_child failed");
            }
        }
        // A trailing newline needs content after it to take up a line.
        if segments.last().is_some_and(|s| match s {
            MirrorSegment::Text(t) | MirrorSegment::Mark { text: t, .. } => t.ends_with('\n'),
        }) {
            let _ = self.content.append_child(&self.document.create_text_node("\u{200b}"));
        }
    }

    fn set_geometry(&mut self, width: f64, height: f64, transform: &str) {
        let style = self.mirror.style();
        set(&style, "width", &format!("{width}px"));
        set(&style, "height", &format!("{height}px"));
        set(&self.content.style(), "transform", transform);
    }

    fn segment_rects(&self) -> Vec<(IssueId, Rect)> {
        let Ok(marks) = self.content.query_selector_all("[data-issue]") else {
            return Vec::new();
        };
        let origin = self.mirror.get_bounding_client_rect();
        let metrics = self.measure();
        let dx = origin.left() + metrics.border.left - metrics.scroll_left;
        let dy = origin.top() + metrics.border.top - metrics.scroll_top;

        let mut rects = Vec::new();
        for i in 0..marks.length() {
            let Some(mark) = marks.item(i).and_then(|n| n.dyn_into::<web_sys::Element>().ok()) else {
                continue;
            };
            let Some(id) = mark.get_attribute("data-issue") else {
                continue;
            };
            let id = IssueId(SmolStr::new(&id));
            let client_rects = mark.get_client_rects();
            for j in 0..client_rects.length() {
                if let Some(r) = client_rects.get(j) {
                    rects.push((id.clone(), Rect::new(r.left() - dx, r.top() - dy, r.width(), r.height())));
                }
            }
        }
        rects
    }

    fn clear(&mut self) {
        self.content.set_text_content(None);
    }

    fn remove(&mut self) {
        self.mirror.remove();
    }
}
