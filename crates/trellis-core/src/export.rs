//! Stable JSON export of the dependency graph
//!
//! Node order is by id and edge order is by `(source, kind, target)`, so
//! exports of the same graph are byte-identical and safe to diff. Import
//! rebuilds the id index and adjacency from the flat sequences.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::graph::{DependencyGraph, GraphEdge, GraphNode};

/// Format version stamped into every export.
pub const EXPORT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Serialized graph: `{version, exportedAt, nodes, edges}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphExport {
    pub version: String,
    /// Unix timestamp in milliseconds.
    pub exported_at: i64,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Snapshot a graph into its exportable form.
pub fn export_graph(graph: &DependencyGraph) -> GraphExport {
    GraphExport {
        version: EXPORT_VERSION.to_string(),
        exported_at: Utc::now().timestamp_millis(),
        nodes: graph.nodes().into_iter().cloned().collect(),
        edges: graph.edges().into_iter().cloned().collect(),
    }
}

/// Rebuild a graph (including both adjacency indices) from an export.
///
/// Edges whose endpoints are missing from `nodes` are skipped; the export
/// format never contains them, but hand-edited files might.
pub fn import_graph(export: &GraphExport) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for node in &export.nodes {
        if !graph.add_node(node.clone()) {
            tracing::warn!(id = %node.id, "duplicate node id in import, keeping first");
        }
    }
    let mut dropped = 0usize;
    for edge in &export.edges {
        if !graph.add_edge(&edge.source, &edge.target, edge.kind) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::warn!(dropped, "import skipped edges with unknown endpoints");
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, NodeKind, NodeMetadata};

    fn node(id: &str, kind: NodeKind) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            kind,
            name: id.rsplit(':').next().unwrap_or(id).to_string(),
            file: id.split(':').next().unwrap_or(id).to_string(),
            line: Some(3),
            exported: false,
            metadata: NodeMetadata::default(),
        }
    }

    #[test]
    fn export_import_round_trip_preserves_structure() {
        let mut graph = DependencyGraph::new();
        graph.add_node(node("b.ts", NodeKind::File));
        graph.add_node(node("b.ts:run", NodeKind::Function));
        graph.add_node(node("a.ts", NodeKind::File));
        graph.add_edge("b.ts", "b.ts:run", EdgeKind::Contains);
        graph.add_edge("a.ts", "b.ts", EdgeKind::Imports);

        let export = export_graph(&graph);
        let rebuilt = import_graph(&export);

        assert_eq!(rebuilt.node_count(), graph.node_count());
        assert_eq!(rebuilt.edge_count(), graph.edge_count());
        assert_eq!(rebuilt.edges_to("b.ts").len(), graph.edges_to("b.ts").len());
        assert_eq!(export_graph(&rebuilt).nodes, export.nodes);
        assert_eq!(export_graph(&rebuilt).edges, export.edges);
    }

    #[test]
    fn export_orders_nodes_by_id() {
        let mut graph = DependencyGraph::new();
        graph.add_node(node("z.ts", NodeKind::File));
        graph.add_node(node("a.ts", NodeKind::File));
        let export = export_graph(&graph);
        assert_eq!(export.nodes[0].id, "a.ts");
        assert_eq!(export.nodes[1].id, "z.ts");
    }

    #[test]
    fn import_drops_dangling_edges() {
        let export = GraphExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: 0,
            nodes: vec![node("a.ts", NodeKind::File)],
            edges: vec![GraphEdge {
                source: "a.ts".to_string(),
                target: "ghost.ts".to_string(),
                kind: EdgeKind::Imports,
            }],
        };
        let graph = import_graph(&export);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn export_serializes_with_camel_case_keys() {
        let graph = DependencyGraph::new();
        let json = serde_json::to_value(export_graph(&graph)).unwrap();
        assert!(json.get("exportedAt").is_some());
        assert!(json.get("version").is_some());
    }
}
