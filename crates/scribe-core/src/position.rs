//! Mapping linear text offsets onto a rich surface's text nodes.

/// One text node of a rich surface, in document order.
#[derive(Clone, Debug, PartialEq)]
pub struct TextNode<N> {
    pub node: N,
    /// Length of the node's text in chars.
    pub len: usize,
}

impl<N> TextNode<N> {
    pub fn new(node: N, len: usize) -> Self {
        Self { node, len }
    }
}

/// A position inside one text node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodePosition<N> {
    pub node: N,
    pub offset: usize,
}

/// Walk text nodes in order, accumulating lengths, and return the first node
/// where `accumulated + len >= offset` together with the local offset.
///
/// An offset sitting exactly on a boundary resolves to the end of the earlier
/// node. Returns `None` when the nodes run out before `offset` is reached.
pub fn resolve_offset<N: Clone>(nodes: &[TextNode<N>], offset: usize) -> Option<NodePosition<N>> {
    let mut accumulated = 0;
    for text_node in nodes {
        if accumulated + text_node.len >= offset {
            return Some(NodePosition {
                node: text_node.node.clone(),
                offset: offset - accumulated,
            });
        }
        accumulated += text_node.len;
    }
    None
}

/// Resolve both ends of a range. Fails if either end is unresolvable.
pub fn resolve_range<N: Clone>(
    nodes: &[TextNode<N>],
    start: usize,
    end: usize,
) -> Option<(NodePosition<N>, NodePosition<N>)> {
    Some((resolve_offset(nodes, start)?, resolve_offset(nodes, end)?))
}

/// Total length in chars across all nodes.
pub fn total_len<N>(nodes: &[TextNode<N>]) -> usize {
    nodes.iter().map(|n| n.len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<TextNode<&'static str>> {
        // "I has a " | "radnom" | " typo."
        vec![
            TextNode::new("a", 8),
            TextNode::new("b", 6),
            TextNode::new("c", 6),
        ]
    }

    #[test]
    fn test_resolve_inside_nodes() {
        let nodes = nodes();
        assert_eq!(
            resolve_offset(&nodes, 2),
            Some(NodePosition { node: "a", offset: 2 })
        );
        assert_eq!(
            resolve_offset(&nodes, 10),
            Some(NodePosition { node: "b", offset: 2 })
        );
    }

    #[test]
    fn test_boundary_resolves_to_earlier_node_end() {
        let nodes = nodes();
        assert_eq!(
            resolve_offset(&nodes, 8),
            Some(NodePosition { node: "a", offset: 8 })
        );
        assert_eq!(
            resolve_offset(&nodes, 20),
            Some(NodePosition { node: "c", offset: 6 })
        );
    }

    #[test]
    fn test_out_of_bounds_fails() {
        let nodes = nodes();
        assert_eq!(resolve_offset(&nodes, 21), None);
        assert!(resolve_range(&nodes, 3, 25).is_none());
        assert_eq!(resolve_offset::<&str>(&[], 1), None);
    }

    #[test]
    fn test_empty_node_list_never_resolves() {
        // Zero offset against no nodes has nowhere to land.
        assert_eq!(resolve_offset::<&str>(&[], 0), None);
        assert_eq!(total_len(&nodes()), 20);
    }
}
