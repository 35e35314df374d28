//! Idempotent merging of graph expansions
//!
//! Nodes and edges are keyed by id. Anything already present wins, so
//! re-merging an expansion never moves or rewrites placed nodes.

use super::view::{GraphEdge, GraphNode, GraphView};
use std::collections::HashSet;

/// Union of an existing graph and an expansion, keeping existing entries.
///
/// Existing order is preserved and new entries are appended in their
/// incoming order. Duplicate ids inside `new_*` are collapsed to the first.
pub fn merge(
    existing_nodes: &[GraphNode],
    existing_edges: &[GraphEdge],
    new_nodes: &[GraphNode],
    new_edges: &[GraphEdge],
) -> GraphView {
    let mut node_ids: HashSet<&str> = HashSet::new();
    let nodes = existing_nodes
        .iter()
        .chain(new_nodes)
        .filter(|n| node_ids.insert(n.id.as_str()))
        .cloned()
        .collect();

    let mut edge_ids: HashSet<&str> = HashSet::new();
    let edges = existing_edges
        .iter()
        .chain(new_edges)
        .filter(|e| edge_ids.insert(e.id.as_str()))
        .cloned()
        .collect();

    GraphView { nodes, edges }
}

impl GraphView {
    /// `merge(self, expansion)`
    pub fn merged_with(&self, expansion: &GraphView) -> GraphView {
        merge(&self.nodes, &self.edges, &expansion.nodes, &expansion.edges)
    }
}
