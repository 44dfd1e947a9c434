//! Overlay rendering of issues.
//!
//! Each surface gets one [`Highlighter`], chosen once at registration by
//! [`select_strategy`] and built by the host's [`HighlighterFactory`]:
//!
//! - [`NativeRangeHighlighter`] registers native text ranges (rich surfaces).
//! - [`MirrorHighlighter`] drives an invisible typographic clone.
//! - [`PaintHighlighter`] re-implements wrapping and paints decorations.
//!
//! [`RenderEngine`] owns the highlighters, filters issues by the enabled types
//! and turns pointer activations into apply requests.

mod layout;
mod mirror;
mod native;
mod paint;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use smol_str::SmolStr;

pub use layout::{TextMeasurer, VisualLine, wrap_lines};
pub use mirror::{BoxMetrics, Insets, MirrorGeometry, MirrorHighlighter, MirrorHost, MirrorSegment, build_segments};
pub use native::{HighlightRegistry, NativeRangeHighlighter, highlight_name};
pub use paint::{Decoration, PaintHighlighter, PaintSurface};

use crate::config::{OverlayKind, Preferences, UnderlineStyle};
use crate::correction::{CorrectionType, Issue, IssueId};
use crate::error::RenderError;
use crate::store::IssueUpdate;
use crate::subscription::{Emitter, Subscription};
use crate::types::{SurfaceId, SurfaceKind};

/// Rendering mechanism for one surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    NativeRange,
    Mirror,
    Paint,
}

/// What the host can do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Native highlight registry (CSS Custom Highlights).
    pub native_highlights: bool,
    /// A 2D paint context can be created.
    pub paint: bool,
}

/// Pick a strategy for a newly registered surface.
pub fn select_strategy(kind: SurfaceKind, caps: Capabilities, overlay: OverlayKind) -> Strategy {
    match kind {
        SurfaceKind::RichEditable if caps.native_highlights => Strategy::NativeRange,
        SurfaceKind::RichEditable => Strategy::Mirror,
        _ if overlay == OverlayKind::Paint && caps.paint => Strategy::Paint,
        _ => Strategy::Mirror,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// What the user pointed at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HitTarget {
    /// A char offset into the surface text (from caret-from-point).
    Offset(usize),
    /// Coordinates relative to the surface's border box.
    Point(Point),
}

/// Colours and underline style derived from preferences.
#[derive(Clone, Debug, PartialEq)]
pub struct DecorationStyle {
    pub underline: UnderlineStyle,
    pub colors: BTreeMap<CorrectionType, SmolStr>,
}

impl Default for DecorationStyle {
    fn default() -> Self {
        Self::from(&Preferences::default())
    }
}

impl From<&Preferences> for DecorationStyle {
    fn from(prefs: &Preferences) -> Self {
        Self {
            underline: prefs.underline_style,
            colors: CorrectionType::ALL
                .into_iter()
                .map(|t| (t, prefs.color_for(t)))
                .collect(),
        }
    }
}

impl DecorationStyle {
    pub fn color(&self, correction_type: CorrectionType) -> &str {
        self.colors
            .get(&correction_type)
            .map(SmolStr::as_str)
            .unwrap_or("#e53935")
    }
}

/// A per-surface overlay.
pub trait Highlighter {
    fn strategy(&self) -> Strategy;

    /// Replace whatever is drawn with `issues` against `text`. Issues that do
    /// not fit the text are skipped.
    fn render(&mut self, text: &str, issues: &[Issue]);

    fn clear(&mut self);

    fn issue_at(&self, target: HitTarget) -> Option<IssueId>;

    fn set_style(&mut self, style: &DecorationStyle);

    /// Release host resources. The highlighter is unusable afterwards.
    fn destroy(&mut self);
}

/// Builds highlighters for the host.
pub trait HighlighterFactory {
    fn capabilities(&self) -> Capabilities;

    fn create(
        &mut self,
        surface: SurfaceId,
        kind: SurfaceKind,
        strategy: Strategy,
    ) -> Result<Box<dyn Highlighter>, RenderError>;
}

/// Keep issues ordered by start and drop any that overlap an earlier issue of
/// the same type.
pub fn prepare_issues<'a>(issues: &'a [Issue], enabled: &BTreeSet<CorrectionType>) -> Vec<&'a Issue> {
    let mut sorted: Vec<&Issue> = issues
        .iter()
        .filter(|i| i.correction.is_renderable() && enabled.contains(&i.kind()))
        .collect();
    sorted.sort_by_key(|i| (i.correction.start_index, i.correction.end_index));

    let mut last_end: HashMap<CorrectionType, usize> = HashMap::new();
    sorted.retain(|i| {
        let end = last_end.entry(i.kind()).or_insert(0);
        if i.correction.start_index < *end {
            return false;
        }
        *end = i.correction.end_index;
        true
    });
    sorted
}

/// How the user activated an overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Click,
    DoubleClick,
}

/// Result of an activation that hit an issue.
#[derive(Clone, Debug, PartialEq)]
pub enum Activated {
    /// Show the issue's details (popover etc.).
    Selected(Issue),
    /// Apply was requested through the apply callback.
    Applied(Issue),
}

/// Request to apply one issue, delivered to apply subscribers.
#[derive(Clone, Debug, PartialEq)]
pub struct ApplyRequest {
    pub surface: SurfaceId,
    pub issue: IssueId,
}

struct Rendered {
    text: String,
    issues: Vec<Issue>,
}

/// Owns one highlighter per surface.
pub struct RenderEngine<F: HighlighterFactory> {
    factory: F,
    overlay: OverlayKind,
    highlighters: BTreeMap<SurfaceId, Box<dyn Highlighter>>,
    rendered: HashMap<SurfaceId, Rendered>,
    enabled: BTreeSet<CorrectionType>,
    style: DecorationStyle,
    double_click_autofix: bool,
    apply: Emitter<ApplyRequest>,
}

impl<F: HighlighterFactory> RenderEngine<F> {
    pub fn new(factory: F, overlay: OverlayKind, prefs: &Preferences) -> Self {
        Self {
            factory,
            overlay,
            highlighters: BTreeMap::new(),
            rendered: HashMap::new(),
            enabled: prefs.enabled_types.clone(),
            style: DecorationStyle::from(prefs),
            double_click_autofix: prefs.double_click_autofix,
            apply: Emitter::new(),
        }
    }

    /// Create the surface's highlighter. Construction failures only affect
    /// this surface, which then renders nothing.
    pub fn attach(&mut self, surface: SurfaceId, kind: SurfaceKind) -> Result<Strategy, RenderError> {
        if let Some(existing) = self.highlighters.get(&surface) {
            return Ok(existing.strategy());
        }
        let strategy = select_strategy(kind, self.factory.capabilities(), self.overlay);
        let mut highlighter = self.factory.create(surface, kind, strategy).inspect_err(|e| {
            tracing::warn!(target: "scribe::render", %surface, ?strategy, error = %e, "highlighter construction failed");
        })?;
        highlighter.set_style(&self.style);
        tracing::debug!(target: "scribe::render", %surface, ?strategy, "highlighter attached");
        self.highlighters.insert(surface, highlighter);
        Ok(strategy)
    }

    pub fn detach(&mut self, surface: SurfaceId) {
        if let Some(mut highlighter) = self.highlighters.remove(&surface) {
            highlighter.destroy();
        }
        self.rendered.remove(&surface);
    }

    pub fn strategy(&self, surface: SurfaceId) -> Option<Strategy> {
        self.highlighters.get(&surface).map(|h| h.strategy())
    }

    /// Draw `issues` for one surface.
    pub fn render(&mut self, surface: SurfaceId, text: &str, issues: &[Issue]) {
        self.rendered.insert(
            surface,
            Rendered {
                text: text.to_string(),
                issues: issues.to_vec(),
            },
        );
        self.redraw(surface);
    }

    /// Render every group of an update and clear surfaces it no longer lists.
    pub fn apply_update(&mut self, update: &IssueUpdate, mut text_for: impl FnMut(SurfaceId) -> Option<String>) {
        let listed: BTreeSet<SurfaceId> = update.groups.iter().map(|g| g.surface_id).collect();
        let stale: Vec<SurfaceId> = self
            .rendered
            .keys()
            .copied()
            .filter(|id| !listed.contains(id))
            .collect();
        for surface in stale {
            self.rendered.remove(&surface);
            if let Some(h) = self.highlighters.get_mut(&surface) {
                h.clear();
            }
        }
        for group in &update.groups {
            let Some(text) = text_for(group.surface_id) else {
                continue;
            };
            self.render(group.surface_id, &text, &group.issues);
        }
    }

    /// Re-style and re-filter after a preference change.
    pub fn set_preferences(&mut self, prefs: &Preferences) {
        self.enabled = prefs.enabled_types.clone();
        self.style = DecorationStyle::from(prefs);
        self.double_click_autofix = prefs.double_click_autofix;
        for highlighter in self.highlighters.values_mut() {
            highlighter.set_style(&self.style);
        }
        let surfaces: Vec<SurfaceId> = self.rendered.keys().copied().collect();
        for surface in surfaces {
            self.redraw(surface);
        }
    }

    fn redraw(&mut self, surface: SurfaceId) {
        let (Some(highlighter), Some(rendered)) =
            (self.highlighters.get_mut(&surface), self.rendered.get(&surface))
        else {
            return;
        };
        let visible: Vec<Issue> = prepare_issues(&rendered.issues, &self.enabled)
            .into_iter()
            .cloned()
            .collect();
        highlighter.render(&rendered.text, &visible);
    }

    /// Resolve a pointer activation. A double click applies the issue when
    /// autofix is on.
    pub fn activate(&mut self, surface: SurfaceId, target: HitTarget, activation: Activation) -> Option<Activated> {
        let id = self.highlighters.get(&surface)?.issue_at(target)?;
        let issue = self
            .rendered
            .get(&surface)?
            .issues
            .iter()
            .find(|i| i.id == id)?
            .clone();
        if activation == Activation::DoubleClick && self.double_click_autofix {
            self.apply.emit(&ApplyRequest {
                surface,
                issue: issue.id.clone(),
            });
            return Some(Activated::Applied(issue));
        }
        Some(Activated::Selected(issue))
    }

    /// Request application of an issue, e.g. from a popover button.
    pub fn request_apply(&self, surface: SurfaceId, issue: IssueId) {
        self.apply.emit(&ApplyRequest { surface, issue });
    }

    pub fn on_apply(&self, listener: impl FnMut(&ApplyRequest) + 'static) -> Subscription {
        self.apply.subscribe(listener)
    }

    pub fn destroy(&mut self) {
        for (_, mut highlighter) in std::mem::take(&mut self.highlighters) {
            highlighter.destroy();
        }
        self.rendered.clear();
    }
}
