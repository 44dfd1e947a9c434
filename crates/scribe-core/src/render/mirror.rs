use smol_str::{SmolStr, format_smolstr};

use super::{DecorationStyle, HitTarget, Highlighter, Point, Rect, Strategy};
use crate::correction::{CorrectionType, Issue, IssueId};
use crate::text::{char_len, char_slice};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Insets {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Insets {
    pub fn uniform(v: f64) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }
}

/// Box model and scroll state of a surface.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxMetrics {
    /// Border-box size.
    pub width: f64,
    pub height: f64,
    pub padding: Insets,
    pub border: Insets,
    pub scroll_left: f64,
    pub scroll_top: f64,
    /// Padding-box width, excluding any scrollbar.
    pub client_width: f64,
    pub client_height: f64,
}

impl BoxMetrics {
    /// Width available to text.
    pub fn content_width(&self) -> f64 {
        (self.client_width - self.padding.left - self.padding.right).max(0.0)
    }

    /// Map a border-box point into scrolled content coordinates, with the
    /// origin at the padding box's top-left.
    pub fn to_content(&self, p: Point) -> Point {
        Point::new(
            p.x - self.border.left + self.scroll_left,
            p.y - self.border.top + self.scroll_top,
        )
    }
}

/// Size and scroll transform of the mirror element.
///
/// Dimensions are taken from the first measurement and then kept, so the
/// mirror cannot feed back into the layout it is copying.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MirrorGeometry {
    pub width: f64,
    pub height: f64,
    locked: bool,
    pub scroll_left: f64,
    pub scroll_top: f64,
}

impl MirrorGeometry {
    pub fn update(&mut self, metrics: &BoxMetrics) {
        if !self.locked {
            self.width = metrics.width;
            self.height = metrics.height;
            self.locked = true;
        }
        self.scroll_left = metrics.scroll_left;
        self.scroll_top = metrics.scroll_top;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Release the lock, e.g. after the viewport was resized.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// CSS transform that scrolls the mirror content in step with the surface.
    pub fn transform(&self) -> SmolStr {
        format_smolstr!("translate({}px, {}px)", -self.scroll_left, -self.scroll_top)
    }
}

/// A run of mirror content: plain text or a marked issue.
#[derive(Clone, Debug, PartialEq)]
pub enum MirrorSegment {
    Text(String),
    Mark {
        text: String,
        issue: IssueId,
        kind: CorrectionType,
    },
}

/// Split `text` into plain and marked runs.
///
/// `issues` must be ordered by start. Issues overlapping an earlier mark or
/// falling outside the text are left unmarked.
pub fn build_segments(text: &str, issues: &[Issue]) -> Vec<MirrorSegment> {
    let len = char_len(text);
    let mut segments = Vec::new();
    let mut cursor = 0;
    for issue in issues {
        let range = issue.range();
        if range.start < cursor || range.end > len || range.start >= range.end {
            tracing::trace!(target: "scribe::render", issue = %issue.id, ?range, "issue cannot be marked in mirror");
            continue;
        }
        if range.start > cursor {
            if let Some(plain) = char_slice(text, cursor..range.start) {
                segments.push(MirrorSegment::Text(plain.to_string()));
            }
        }
        if let Some(marked) = char_slice(text, range.clone()) {
            segments.push(MirrorSegment::Mark {
                text: marked.to_string(),
                issue: issue.id.clone(),
                kind: issue.kind(),
            });
        }
        cursor = range.end;
    }
    if cursor < len {
        if let Some(rest) = char_slice(text, cursor..len) {
            segments.push(MirrorSegment::Text(rest.to_string()));
        }
    }
    segments
}

/// Host side of the mirror overlay.
pub trait MirrorHost {
    fn measure(&self) -> BoxMetrics;

    /// Copy font, spacing, wrapping and box properties from the surface.
    fn copy_typography(&mut self);

    fn write_segments(&mut self, segments: &[MirrorSegment], style: &DecorationStyle);

    fn set_geometry(&mut self, width: f64, height: f64, transform: &str);

    /// Client rects of each mark, in unscrolled content coordinates.
    fn segment_rects(&self) -> Vec<(IssueId, Rect)>;

    fn clear(&mut self);

    fn remove(&mut self);
}

/// Invisible typographic clone of a plain-text surface.
pub struct MirrorHighlighter<H: MirrorHost> {
    host: H,
    geometry: MirrorGeometry,
    style: DecorationStyle,
    metrics: BoxMetrics,
    rects: Vec<(IssueId, Rect)>,
}

impl<H: MirrorHost> MirrorHighlighter<H> {
    pub fn new(mut host: H) -> Self {
        host.copy_typography();
        Self {
            host,
            geometry: MirrorGeometry::default(),
            style: DecorationStyle::default(),
            metrics: BoxMetrics::default(),
            rects: Vec::new(),
        }
    }

    /// Follow the surface's scroll position (on scroll, input, and viewport
    /// changes).
    pub fn sync(&mut self) {
        self.metrics = self.host.measure();
        self.geometry.update(&self.metrics);
        let transform = self.geometry.transform();
        self.host
            .set_geometry(self.geometry.width, self.geometry.height, &transform);
    }

    /// Re-measure from scratch after the viewport changed size.
    pub fn relayout(&mut self) {
        self.geometry.unlock();
        self.host.copy_typography();
        self.sync();
        self.rects = self.host.segment_rects();
    }

    pub fn geometry(&self) -> &MirrorGeometry {
        &self.geometry
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<H: MirrorHost> Highlighter for MirrorHighlighter<H> {
    fn strategy(&self) -> Strategy {
        Strategy::Mirror
    }

    fn render(&mut self, text: &str, issues: &[Issue]) {
        let segments = build_segments(text, issues);
        self.host.write_segments(&segments, &self.style);
        self.sync();
        self.rects = self.host.segment_rects();
    }

    fn clear(&mut self) {
        self.host.clear();
        self.rects.clear();
    }

    fn issue_at(&self, target: HitTarget) -> Option<IssueId> {
        let HitTarget::Point(p) = target else {
            return None;
        };
        let content = self.metrics.to_content(p);
        self.rects
            .iter()
            .find(|(_, rect)| rect.contains(content))
            .map(|(id, _)| id.clone())
    }

    fn set_style(&mut self, style: &DecorationStyle) {
        self.style = style.clone();
    }

    fn destroy(&mut self) {
        self.rects.clear();
        self.host.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::{Correction, IssueContext, build_issues};
    use crate::types::{SurfaceId, SurfaceKind};
    use insta::assert_snapshot;

    fn issues(text: &str, corrections: Vec<Correction>) -> Vec<Issue> {
        let ctx = IssueContext {
            surface_id: SurfaceId(1),
            surface_label: None,
            surface_kind: SurfaceKind::PlainMultiline,
        };
        build_issues(text, &corrections, &ctx)
    }

    #[derive(Default)]
    struct FakeHost {
        metrics: BoxMetrics,
        geometry: Vec<(f64, f64, String)>,
        segments: Vec<MirrorSegment>,
        removed: bool,
    }

    impl MirrorHost for FakeHost {
        fn measure(&self) -> BoxMetrics {
            self.metrics
        }

        fn copy_typography(&mut self) {}

        fn write_segments(&mut self, segments: &[MirrorSegment], _style: &DecorationStyle) {
            self.segments = segments.to_vec();
        }

        fn set_geometry(&mut self, width: f64, height: f64, transform: &str) {
            self.geometry.push((width, height, transform.to_string()));
        }

        fn segment_rects(&self) -> Vec<(IssueId, Rect)> {
            // Monospace 10px, single line at y = padding.top.
            let mut x = self.metrics.padding.left;
            let mut rects = Vec::new();
            for segment in &self.segments {
                let (text, id) = match segment {
                    MirrorSegment::Text(t) => (t, None),
                    MirrorSegment::Mark { text, issue, .. } => (text, Some(issue)),
                };
                let w = text.chars().count() as f64 * 10.0;
                if let Some(id) = id {
                    rects.push((id.clone(), Rect::new(x, self.metrics.padding.top, w, 20.0)));
                }
                x += w;
            }
            rects
        }

        fn clear(&mut self) {
            self.segments.clear();
        }

        fn remove(&mut self) {
            self.removed = true;
        }
    }

    fn dump(segments: &[MirrorSegment]) -> String {
        segments
            .iter()
            .map(|s| match s {
                MirrorSegment::Text(t) => format!("text {t:?}"),
                MirrorSegment::Mark { text, issue, kind } => {
                    format!("mark {text:?} {issue} {}", kind.as_str())
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_segments_split_plain_and_marked_runs() {
        let text = "I has a radnom typo.";
        let list = issues(
            text,
            vec![
                Correction::new(2, 5, "have").with_type(CorrectionType::Grammar),
                Correction::new(3, 6, "overlap"),
                Correction::new(8, 14, "random").with_type(CorrectionType::Spelling),
            ],
        );
        assert_snapshot!(dump(&build_segments(text, &list)), @r#"
        text "I "
        mark "has" 2:5:0 grammar
        text " a "
        mark "radnom" 8:14:2 spelling
        text " typo."
        "#);
    }

    #[test]
    fn test_dimensions_lock_after_first_measurement() {
        let mut geometry = MirrorGeometry::default();
        let mut metrics = BoxMetrics {
            width: 300.0,
            height: 80.0,
            ..Default::default()
        };
        geometry.update(&metrics);
        metrics.width = 310.0;
        metrics.scroll_top = 24.0;
        geometry.update(&metrics);
        assert_eq!(geometry.width, 300.0);
        assert_eq!(geometry.transform(), "translate(-0px, -24px)");

        geometry.unlock();
        geometry.update(&metrics);
        assert_eq!(geometry.width, 310.0);
    }

    #[test]
    fn test_hit_testing_reconciles_scroll_border_and_padding() {
        let host = FakeHost {
            metrics: BoxMetrics {
                width: 200.0,
                height: 40.0,
                padding: Insets::uniform(4.0),
                border: Insets::uniform(1.0),
                scroll_left: 30.0,
                client_width: 198.0,
                client_height: 38.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut highlighter = MirrorHighlighter::new(host);
        let text = "I has a radnom typo.";
        let list = issues(text, vec![Correction::new(8, 14, "random")]);
        highlighter.render(text, &list);

        // "radnom" spans content x 84..144; scrolled by 30 and offset by the
        // 1px border it shows at border-box x 55..115.
        let hit = |x| highlighter.issue_at(HitTarget::Point(Point::new(x, 10.0)));
        assert_eq!(hit(56.0), Some(list[0].id.clone()));
        assert_eq!(hit(50.0), None);
        assert_eq!(hit(116.0), None);
        assert_eq!(highlighter.host().geometry[0].2, "translate(-30px, -0px)");

        highlighter.destroy();
        assert!(highlighter.host().removed);
    }
}
