use smol_str::SmolStr;

use super::layout::{TextMeasurer, VisualLine, wrap_lines};
use super::mirror::BoxMetrics;
use super::{DecorationStyle, HitTarget, Highlighter, Point, Rect, Strategy};
use crate::config::UnderlineStyle;
use crate::correction::{Issue, IssueId};
use crate::error::{PlatformError, RenderError};
use crate::text::char_slice;
use crate::types::SurfaceKind;

/// One underline to paint, in the paint surface's own coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoration {
    pub rect: Rect,
    pub color: SmolStr,
    pub style: UnderlineStyle,
}

/// A 2D paint target layered over a surface.
pub trait PaintSurface {
    /// Acquire the drawing context.
    fn prepare(&mut self) -> Result<(), PlatformError>;

    fn metrics(&self) -> BoxMetrics;

    /// Match the overlay to the surface's border box.
    fn resize(&mut self, width: f64, height: f64);

    fn clear(&mut self);

    fn draw(&mut self, decoration: &Decoration);

    fn remove(&mut self) {}
}

struct Span {
    issue: IssueId,
    /// Content coordinates (origin at the padding box, unscrolled).
    rects: Vec<Rect>,
    color: SmolStr,
}

/// Paints decorations for plain-text surfaces by re-running their layout.
pub struct PaintHighlighter<M: TextMeasurer, S: PaintSurface> {
    measurer: M,
    canvas: S,
    kind: SurfaceKind,
    style: DecorationStyle,
    metrics: BoxMetrics,
    spans: Vec<Span>,
}

impl<M: TextMeasurer, S: PaintSurface> PaintHighlighter<M, S> {
    pub fn new(measurer: M, mut canvas: S, kind: SurfaceKind) -> Result<Self, RenderError> {
        canvas
            .prepare()
            .map_err(|e| RenderError::ContextUnavailable(e.0))?;
        let metrics = canvas.metrics();
        Ok(Self {
            measurer,
            canvas,
            kind,
            style: DecorationStyle::default(),
            metrics,
            spans: Vec::new(),
        })
    }

    fn content_width(&self) -> f64 {
        match self.kind {
            SurfaceKind::PlainInput => f64::INFINITY,
            _ => self.metrics.content_width(),
        }
    }

    /// Rects covering `range` on each visual line it touches.
    fn rects_for(&self, lines: &[VisualLine], range: std::ops::Range<usize>) -> Vec<Rect> {
        let line_height = self.measurer.line_height();
        let origin_x = self.metrics.padding.left;
        let origin_y = self.metrics.padding.top;
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.range.start < range.end && range.start < line.range.end)
            .filter_map(|(row, line)| {
                let from = range.start.max(line.range.start) - line.range.start;
                let to = range.end.min(line.range.end) - line.range.start;
                let before = char_slice(&line.text, 0..from)?;
                let covered = char_slice(&line.text, from..to)?;
                let x = self.measurer.measure(before);
                let width = self.measurer.measure(covered);
                Some(Rect::new(
                    origin_x + x,
                    origin_y + row as f64 * line_height,
                    width,
                    line_height,
                ))
            })
            .collect()
    }

    /// Repaint from the cached layout, following the surface's scroll offset.
    pub fn repaint(&mut self) {
        self.metrics = self.canvas.metrics();
        self.canvas.resize(self.metrics.width, self.metrics.height);
        self.canvas.clear();
        let dx = self.metrics.border.left - self.metrics.scroll_left;
        let dy = self.metrics.border.top - self.metrics.scroll_top;
        for span in &self.spans {
            for rect in &span.rects {
                self.canvas.draw(&Decoration {
                    rect: rect.translate(dx, dy),
                    color: span.color.clone(),
                    style: self.style.underline,
                });
            }
        }
    }

    pub fn canvas(&self) -> &S {
        &self.canvas
    }
}

impl<M: TextMeasurer, S: PaintSurface> Highlighter for PaintHighlighter<M, S> {
    fn strategy(&self) -> Strategy {
        Strategy::Paint
    }

    fn render(&mut self, text: &str, issues: &[Issue]) {
        self.metrics = self.canvas.metrics();
        let lines = wrap_lines(text, self.content_width(), &self.measurer);
        let spans = issues
            .iter()
            .filter_map(|issue| {
                let rects = self.rects_for(&lines, issue.range());
                if rects.is_empty() {
                    tracing::trace!(target: "scribe::render", issue = %issue.id, "issue lies outside the laid out text");
                    return None;
                }
                Some(Span {
                    issue: issue.id.clone(),
                    rects,
                    color: SmolStr::new(self.style.color(issue.kind())),
                })
            })
            .collect();
        self.spans = spans;
        self.repaint();
    }

    fn clear(&mut self) {
        self.spans.clear();
        self.canvas.clear();
    }

    fn issue_at(&self, target: HitTarget) -> Option<IssueId> {
        let HitTarget::Point(p) = target else {
            return None;
        };
        let content: Point = self.metrics.to_content(p);
        self.spans
            .iter()
            .find(|span| span.rects.iter().any(|r| r.contains(content)))
            .map(|span| span.issue.clone())
    }

    fn set_style(&mut self, style: &DecorationStyle) {
        self.style = style.clone();
    }

    fn destroy(&mut self) {
        self.spans.clear();
        self.canvas.clear();
        self.canvas.remove();
    }
}
