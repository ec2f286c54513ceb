#![forbid(unsafe_code)]

//! Node sets for document-subset canonicalization.
//!
//! A `NodeSet` is a set of nodes from one parsed document, identified by
//! their `roxmltree::NodeId`.  Canonicalization only emits nodes the set
//! contains; everything else is processed transparently.

use std::collections::HashSet;

/// A set of XML document nodes identified by `roxmltree::NodeId`.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: HashSet<usize>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All nodes of the document.
    pub fn all(doc: &roxmltree::Document<'_>) -> Self {
        let nodes = doc.descendants().map(node_index).collect();
        Self { nodes }
    }

    /// All nodes of the document except comments.
    pub fn all_without_comments(doc: &roxmltree::Document<'_>) -> Self {
        let nodes = doc
            .descendants()
            .filter(|n| !n.is_comment())
            .map(node_index)
            .collect();
        Self { nodes }
    }

    /// The subtree rooted at the given node, excluding comment nodes.
    pub fn tree_without_comments(root: roxmltree::Node<'_, '_>) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(root, &mut nodes, false);
        Self { nodes }
    }

    /// The subtree rooted at the given node, including comment nodes.
    pub fn tree_with_comments(root: roxmltree::Node<'_, '_>) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(root, &mut nodes, true);
        Self { nodes }
    }

    pub fn contains(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        self.nodes.contains(&node_index(*node))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Stable numeric index for a roxmltree node.
///
/// `roxmltree::NodeId` does not implement `Hash` and keeps its inner value
/// private, but its derived `Debug` form is `NodeId(N)`.
pub fn node_index(node: roxmltree::Node<'_, '_>) -> usize {
    let debug = format!("{:?}", node.id());
    debug
        .strip_prefix("NodeId(")
        .and_then(|s| s.strip_suffix(')'))
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0)
}

fn collect_subtree(
    node: roxmltree::Node<'_, '_>,
    set: &mut HashSet<usize>,
    include_comments: bool,
) {
    if !include_comments && node.is_comment() {
        return;
    }
    set.insert(node_index(node));
    for child in node.children() {
        collect_subtree(child, set, include_comments);
    }
}
