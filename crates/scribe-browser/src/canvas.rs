//! Canvas-backed text measurement and paint overlay.

use scribe_core::config::UnderlineStyle;
use scribe_core::render::{BoxMetrics, Decoration, PaintSurface, TextMeasurer};
use wasm_bindgen::JsCast;

use crate::PlatformError;
use crate::style::{box_metrics, computed_style, line_height, place_over};

fn context_2d(canvas: &web_sys::HtmlCanvasElement) -> Result<web_sys::CanvasRenderingContext2d, PlatformError> {
    let context = canvas
        .get_context("2d")
        .map_err(|e| format!("get_context failed: {:?}", e))?
        .ok_or("no 2d context")?
        .dyn_into::<web_sys::CanvasRenderingContext2d>()
        .map_err(|_| "context is not 2d")?;
    Ok(context)
}

fn create_canvas(document: &web_sys::Document) -> Result<web_sys::HtmlCanvasElement, PlatformError> {
    let canvas = document
        .create_element("canvas")
        .map_err(|e| format!("create_element failed: {:?}", e))?
        .dyn_into::<web_sys::HtmlCanvasElement>()
        .map_err(|_| "element is not a canvas")?;
    Ok(canvas)
}

/// Whether a 2D context can be created at all.
pub fn paint_supported(document: &web_sys::Document) -> bool {
    create_canvas(document).and_then(|c| context_2d(&c)).is_ok()
}

/// Measures text with the surface's computed font.
pub struct CanvasMeasurer {
    context: web_sys::CanvasRenderingContext2d,
    line_height: f64,
}

impl CanvasMeasurer {
    pub fn for_surface(surface: &web_sys::HtmlElement) -> Result<Self, PlatformError> {
        let document = surface.owner_document().ok_or("no document")?;
        let context = context_2d(&create_canvas(&document)?)?;
        let style = computed_style(surface)?;
        let font = style.get_property_value("font").unwrap_or_default();
        if font.is_empty() {
            // Shorthand is empty in some engines; assemble it.
            let part = |name: &str| style.get_property_value(name).unwrap_or_default();
            context.set_font(&format!(
                "{} {} {} {}",
                part("font-style"),
                part("font-weight"),
                part("font-size"),
                part("font-family")
            ));
        } else {
            context.set_font(&font);
        }
        Ok(Self {
            context,
            line_height: line_height(&style),
        })
    }
}

impl TextMeasurer for CanvasMeasurer {
    fn measure(&self, text: &str) -> f64 {
        match self.context.measure_text(text) {
            Ok(metrics) => metrics.width(),
            Err(e) => {
                tracing::trace!(target: "scribe::browser", error = ?e, "measure_text failed");
                0.0
            }
        }
    }

    fn line_height(&self) -> f64 {
        self.line_height
    }
}

/// Absolutely positioned canvas layered over a surface.
pub struct CanvasSurface {
    surface: web_sys::HtmlElement,
    canvas: web_sys::HtmlCanvasElement,
    context: Option<web_sys::CanvasRenderingContext2d>,
}

impl CanvasSurface {
    pub fn new(surface: web_sys::HtmlElement) -> Result<Self, PlatformError> {
        let document = surface.owner_document().ok_or("no document")?;
        let canvas = create_canvas(&document)?;
        canvas
            .set_attribute("aria-hidden", "true")
            .map_err(|e| format!("set_attribute failed: {:?}", e))?;
        canvas
            .set_attribute("data-scribe-overlay", "paint")
            .map_err(|e| format!("set_attribute failed: {:?}", e))?;
        Ok(Self {
            surface,
            canvas,
            context: None,
        })
    }

    fn underline(&self, context: &web_sys::CanvasRenderingContext2d, decoration: &Decoration) {
        let rect = decoration.rect;
        let baseline = rect.y + rect.height - 1.5;
        context.set_stroke_style_str(&decoration.color);
        context.set_line_width(1.5);
        context.begin_path();
        match decoration.style {
            UnderlineStyle::Wavy => {
                let step = 2.0;
                let mut x = rect.x;
                let mut up = true;
                context.move_to(x, baseline);
                while x < rect.x + rect.width {
                    x = (x + step).min(rect.x + rect.width);
                    let y = if up { baseline - 1.5 } else { baseline };
                    context.line_to(x, y);
                    up = !up;
                }
            }
            _ => {
                context.move_to(rect.x, baseline);
                context.line_to(rect.x + rect.width, baseline);
            }
        }
        context.stroke();
    }
}

impl PaintSurface for CanvasSurface {
    fn prepare(&mut self) -> Result<(), PlatformError> {
        let context = context_2d(&self.canvas)?;
        self.surface
            .after_with_node_1(&self.canvas)
            .map_err(|e| format!("inserting canvas failed: {:?}", e))?;
        place_over(&self.canvas, &self.surface)?;
        self.context = Some(context);
        Ok(())
    }

    fn metrics(&self) -> BoxMetrics {
        box_metrics(&self.surface)
    }

    fn resize(&mut self, width: f64, height: f64) {
        let (w, h) = (width.max(0.0) as u32, height.max(0.0) as u32);
        if self.canvas.width() != w {
            self.canvas.set_width(w);
        }
        if self.canvas.height() != h {
            self.canvas.set_height(h);
        }
        if let Err(e) = place_over(&self.canvas, &self.surface) {
            tracing::debug!(target: "scribe::browser", error = %e, "could not reposition canvas");
        }
    }

    fn clear(&mut self) {
        if let Some(context) = &self.context {
            context.clear_rect(0.0, 0.0, self.canvas.width() as f64, self.canvas.height() as f64);
        }
    }

    fn draw(&mut self, decoration: &Decoration) {
        let Some(context) = &self.context else {
            return;
        };
        // Clip to the surface's padding box so scrolled-out text stays hidden.
        let metrics = self.metrics();
        context.save();
        context.begin_path();
        context.rect(
            metrics.border.left,
            metrics.border.top,
            metrics.client_width,
            metrics.client_height,
        );
        context.clip();
        match decoration.style {
            UnderlineStyle::Highlight => {
                context.set_global_alpha(0.25);
                context.set_fill_style_str(&decoration.color);
                let r = decoration.rect;
                context.fill_rect(r.x, r.y, r.width, r.height);
            }
            UnderlineStyle::Dotted | UnderlineStyle::Dashed => {
                let pattern: &[f64] = if decoration.style == UnderlineStyle::Dotted {
                    &[1.5, 2.0]
                } else {
                    &[4.0, 3.0]
                };
                let dash = pattern
                    .iter()
                    .map(|v| wasm_bindgen::JsValue::from_f64(*v))
                    .collect::<js_sys::Array>();
                let _ = context.set_line_dash(&dash);
                self.underline(context, decoration);
            }
            _ => self.underline(context, decoration),
        }
        context.restore();
    }

    fn remove(&mut self) {
        self.context = None;
        self.canvas.remove();
    }
}
