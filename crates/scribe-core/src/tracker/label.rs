//! Human-readable labels for tracked surfaces.

use smol_str::SmolStr;

use super::SurfaceNode;

/// Resolve a surface's label.
///
/// Sources in priority order: a `<label for>` pointing at the element's id,
/// the text of the elements named by `aria-labelledby`, `aria-label`, and the
/// text of the nearest ancestor `<label>`. Whitespace is collapsed and empty
/// candidates are skipped.
pub fn resolve_label<N: SurfaceNode>(node: &N) -> Option<SmolStr> {
    label_for_id(node)
        .or_else(|| labelled_by(node))
        .or_else(|| node.attribute("aria-label").and_then(|l| collapse(&l)))
        .or_else(|| ancestor_label(node))
}

fn label_for_id<N: SurfaceNode>(node: &N) -> Option<SmolStr> {
    let id = node.attribute("id")?;
    if id.is_empty() {
        return None;
    }
    let label = node.label_for(&id)?;
    collapse(&label.text_content())
}

fn labelled_by<N: SurfaceNode>(node: &N) -> Option<SmolStr> {
    let ids = node.attribute("aria-labelledby")?;
    let text: Vec<String> = ids
        .split_whitespace()
        .filter_map(|id| node.element_by_id(id))
        .map(|el| el.text_content())
        .collect();
    collapse(&text.join(" "))
}

fn ancestor_label<N: SurfaceNode>(node: &N) -> Option<SmolStr> {
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if ancestor.tag_name() == "label" {
            return collapse(&ancestor.text_content());
        }
        current = ancestor.parent();
    }
    None
}

fn collapse(text: &str) -> Option<SmolStr> {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        None
    } else {
        Some(SmolStr::new(out))
    }
}
