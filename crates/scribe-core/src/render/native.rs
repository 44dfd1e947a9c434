use std::collections::BTreeMap;
use std::ops::Range;

use smol_str::{SmolStr, format_smolstr};

use super::{DecorationStyle, HitTarget, Highlighter, Strategy};
use crate::config::UnderlineStyle;
use crate::correction::{CorrectionType, Issue, IssueId};
use crate::error::PlatformError;
use crate::position::{NodePosition, TextNode, resolve_range};

/// Registry name for a correction type.
pub fn highlight_name(correction_type: CorrectionType) -> SmolStr {
    format_smolstr!("scribe-{}", correction_type.as_str())
}

/// Host side of the native highlighter: a type-keyed highlight registry plus
/// the surface's text nodes.
pub trait HighlightRegistry {
    type Node: Clone;
    type Range;

    fn text_nodes(&self) -> Vec<TextNode<Self::Node>>;

    fn create_range(
        &self,
        start: &NodePosition<Self::Node>,
        end: &NodePosition<Self::Node>,
    ) -> Result<Self::Range, PlatformError>;

    /// Register `ranges` under `name`, replacing this surface's previous set.
    fn set(&mut self, name: &str, ranges: Vec<Self::Range>) -> Result<(), PlatformError>;

    fn remove(&mut self, name: &str);

    fn apply_style(&mut self, name: &str, color: &str, underline: UnderlineStyle);
}

/// Paints issues as native text ranges, without touching the surface's DOM.
pub struct NativeRangeHighlighter<R: HighlightRegistry> {
    registry: R,
    registered: Vec<SmolStr>,
    spans: Vec<(Range<usize>, IssueId)>,
    style: DecorationStyle,
}

impl<R: HighlightRegistry> NativeRangeHighlighter<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            registered: Vec::new(),
            spans: Vec::new(),
            style: DecorationStyle::default(),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }
}

impl<R: HighlightRegistry> Highlighter for NativeRangeHighlighter<R> {
    fn strategy(&self) -> Strategy {
        Strategy::NativeRange
    }

    fn render(&mut self, _text: &str, issues: &[Issue]) {
        // Ranges from the previous render may point into removed nodes.
        self.clear();

        let nodes = self.registry.text_nodes();
        let mut groups: BTreeMap<CorrectionType, Vec<R::Range>> = BTreeMap::new();
        for issue in issues {
            let range = issue.range();
            let Some((start, end)) = resolve_range(&nodes, range.start, range.end) else {
                tracing::warn!(target: "scribe::render", issue = %issue.id, ?range, "issue does not resolve against text nodes, skipping");
                continue;
            };
            match self.registry.create_range(&start, &end) {
                Ok(native) => {
                    groups.entry(issue.kind()).or_default().push(native);
                    self.spans.push((range, issue.id.clone()));
                }
                Err(e) => {
                    tracing::warn!(target: "scribe::render", issue = %issue.id, error = %e, "range creation failed, skipping");
                }
            }
        }

        for (kind, ranges) in groups {
            let name = highlight_name(kind);
            if let Err(e) = self.registry.set(&name, ranges) {
                tracing::warn!(target: "scribe::render", %name, error = %e, "highlight registration failed");
                continue;
            }
            self.registry
                .apply_style(&name, self.style.color(kind), self.style.underline);
            self.registered.push(name);
        }
    }

    fn clear(&mut self) {
        for name in self.registered.drain(..) {
            self.registry.remove(&name);
        }
        self.spans.clear();
    }

    fn issue_at(&self, target: HitTarget) -> Option<IssueId> {
        let HitTarget::Offset(offset) = target else {
            return None;
        };
        self.spans
            .iter()
            .find(|(range, _)| range.contains(&offset))
            .map(|(_, id)| id.clone())
    }

    fn set_style(&mut self, style: &DecorationStyle) {
        self.style = style.clone();
        for name in &self.registered {
            let kind = CorrectionType::ALL
                .into_iter()
                .find(|t| highlight_name(*t) == *name);
            if let Some(kind) = kind {
                self.registry
                    .apply_style(name, self.style.color(kind), self.style.underline);
            }
        }
    }

    fn destroy(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::{Correction, IssueContext, build_issues};
    use crate::types::{SurfaceId, SurfaceKind};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeRegistry {
        nodes: Vec<String>,
        live: HashMap<String, Vec<(usize, usize, usize, usize)>>,
        removed: Vec<String>,
        styles: HashMap<String, String>,
    }

    impl HighlightRegistry for FakeRegistry {
        type Node = usize;
        type Range = (usize, usize, usize, usize);

        fn text_nodes(&self) -> Vec<TextNode<usize>> {
            self.nodes
                .iter()
                .enumerate()
                .map(|(i, s)| TextNode::new(i, s.chars().count()))
                .collect()
        }

        fn create_range(
            &self,
            start: &NodePosition<usize>,
            end: &NodePosition<usize>,
        ) -> Result<Self::Range, PlatformError> {
            Ok((start.node, start.offset, end.node, end.offset))
        }

        fn set(&mut self, name: &str, ranges: Vec<Self::Range>) -> Result<(), PlatformError> {
            self.live.insert(name.to_string(), ranges);
            Ok(())
        }

        fn remove(&mut self, name: &str) {
            self.live.remove(name);
            self.removed.push(name.to_string());
        }

        fn apply_style(&mut self, name: &str, color: &str, _underline: UnderlineStyle) {
            self.styles.insert(name.to_string(), color.to_string());
        }
    }

    fn issues(text: &str, corrections: Vec<Correction>) -> Vec<Issue> {
        let ctx = IssueContext {
            surface_id: SurfaceId(1),
            surface_label: None,
            surface_kind: SurfaceKind::RichEditable,
        };
        build_issues(text, &corrections, &ctx)
    }

    #[test]
    fn test_ranges_grouped_by_type_across_nodes() {
        let registry = FakeRegistry {
            nodes: vec!["I has ".into(), "a radnom".into(), " typo.".into()],
            ..Default::default()
        };
        let mut highlighter = NativeRangeHighlighter::new(registry);
        let text = "I has a radnom typo.";
        let list = issues(
            text,
            vec![
                Correction::new(2, 5, "have").with_type(CorrectionType::Grammar),
                Correction::new(8, 14, "random").with_type(CorrectionType::Spelling),
            ],
        );
        highlighter.render(text, &list);

        let live = &highlighter.registry().live;
        assert_eq!(live["scribe-grammar"], vec![(0, 2, 0, 5)]);
        assert_eq!(live["scribe-spelling"], vec![(1, 2, 1, 8)]);
        assert_eq!(highlighter.registry().styles["scribe-grammar"], "#1e88e5");
        assert_eq!(highlighter.issue_at(HitTarget::Offset(9)), Some(list[1].id.clone()));
        assert_eq!(highlighter.issue_at(HitTarget::Offset(14)), None);
    }

    #[test]
    fn test_rerender_clears_prior_registrations_first() {
        let registry = FakeRegistry {
            nodes: vec!["teh cat".into()],
            ..Default::default()
        };
        let mut highlighter = NativeRangeHighlighter::new(registry);
        let list = issues("teh cat", vec![Correction::new(0, 3, "the").with_type(CorrectionType::Spelling)]);
        highlighter.render("teh cat", &list);
        highlighter.render("teh cat", &[]);

        assert!(highlighter.registry().live.is_empty());
        assert_eq!(highlighter.registry().removed, vec!["scribe-spelling"]);
    }

    #[test]
    fn test_out_of_range_issue_is_skipped() {
        let registry = FakeRegistry {
            nodes: vec!["short".into()],
            ..Default::default()
        };
        let mut highlighter = NativeRangeHighlighter::new(registry);
        // Built against a longer text than the nodes now hold.
        let list = issues(
            "short and long",
            vec![Correction::new(0, 5, "Short"), Correction::new(6, 9, "AND")],
        );
        highlighter.render("short", &list);
        assert_eq!(highlighter.registry().live["scribe-other"].len(), 1);
    }
}
