//! Highlighter construction for DOM surfaces.

use std::rc::Rc;

use scribe_core::error::RenderError;
use scribe_core::render::{
    Capabilities, Highlighter, HighlighterFactory, MirrorHighlighter, NativeRangeHighlighter,
    PaintHighlighter, Strategy,
};
use scribe_core::types::{SurfaceId, SurfaceKind};

use crate::canvas::{CanvasMeasurer, CanvasSurface, paint_supported};
use crate::highlight::{CssHighlights, HighlightSheet};
use crate::mirror::DomMirrorHost;

/// Builds highlighters over live elements. `lookup` maps a surface to its
/// element at construction time.
pub struct DomHighlighterFactory<L> {
    lookup: L,
    sheet: Option<Rc<HighlightSheet>>,
    paint: bool,
}

impl<L> DomHighlighterFactory<L>
where
    L: Fn(SurfaceId) -> Option<web_sys::HtmlElement>,
{
    pub fn new(document: &web_sys::Document, lookup: L) -> Self {
        let sheet = HighlightSheet::new(document.clone());
        let paint = paint_supported(document);
        tracing::debug!(
            target: "scribe::browser",
            native_highlights = sheet.is_some(),
            paint,
            "overlay capabilities"
        );
        Self { lookup, sheet, paint }
    }
}

impl<L> HighlighterFactory for DomHighlighterFactory<L>
where
    L: Fn(SurfaceId) -> Option<web_sys::HtmlElement>,
{
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_highlights: self.sheet.is_some(),
            paint: self.paint,
        }
    }

    fn create(
        &mut self,
        surface: SurfaceId,
        kind: SurfaceKind,
        strategy: Strategy,
    ) -> Result<Box<dyn Highlighter>, RenderError> {
        let element = (self.lookup)(surface)
            .ok_or_else(|| RenderError::ContextUnavailable(format!("{surface} has no element")))?;
        let unavailable = |e: crate::PlatformError| RenderError::ContextUnavailable(e.0);
        Ok(match strategy {
            Strategy::NativeRange => {
                let sheet = self
                    .sheet
                    .clone()
                    .ok_or_else(|| RenderError::ContextUnavailable("no highlight registry".into()))?;
                Box::new(NativeRangeHighlighter::new(CssHighlights::new(sheet, element)))
            }
            Strategy::Mirror => {
                let host = DomMirrorHost::new(element, kind).map_err(unavailable)?;
                Box::new(MirrorHighlighter::new(host))
            }
            Strategy::Paint => {
                let measurer = CanvasMeasurer::for_surface(&element).map_err(unavailable)?;
                let canvas = CanvasSurface::new(element).map_err(unavailable)?;
                Box::new(PaintHighlighter::new(measurer, canvas, kind)?)
            }
        })
    }
}
