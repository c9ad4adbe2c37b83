//! Typed dependency graph over `petgraph::StableDiGraph`
//!
//! Node ids are strings in the `"<file>:<name>"` form (file nodes use the
//! path alone); the facade keeps a string-id index alongside the arena so
//! nodes are addressed by id everywhere above this module. Adjacency is
//! petgraph's, so the by-source and by-target views can never drift out of
//! lockstep with the edge sequence.

use std::collections::{BTreeMap, HashMap};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use serde::{Deserialize, Serialize};

use crate::model::{ElementKind, Parameter};

/// Discriminates element nodes from file nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Function,
    Class,
    Method,
    Hook,
    Constant,
    Interface,
    Enum,
    #[serde(rename = "type")]
    TypeAlias,
    Component,
    Unknown,
}

impl From<ElementKind> for NodeKind {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Function => NodeKind::Function,
            ElementKind::Class => NodeKind::Class,
            ElementKind::Method => NodeKind::Method,
            ElementKind::Hook => NodeKind::Hook,
            ElementKind::Constant => NodeKind::Constant,
            ElementKind::Interface => NodeKind::Interface,
            ElementKind::Enum => NodeKind::Enum,
            ElementKind::TypeAlias => NodeKind::TypeAlias,
            ElementKind::Component => NodeKind::Component,
            ElementKind::Unknown => NodeKind::Unknown,
        }
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    Calls,
    Imports,
    Exports,
    Contains,
    DependsOn,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Calls => "calls",
            EdgeKind::Imports => "imports",
            EdgeKind::Exports => "exports",
            EdgeKind::Contains => "contains",
            EdgeKind::DependsOn => "depends-on",
        }
    }
}

/// Extra element facts carried on a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f32>,
}

impl NodeMetadata {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.complexity.is_none()
    }
}

/// A single node: one element, or one scanned file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub exported: bool,
    #[serde(default, skip_serializing_if = "NodeMetadata::is_empty")]
    pub metadata: NodeMetadata,
}

/// A directed, typed edge between two node ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

/// Aggregate statistics derived from a built graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub edges_by_type: BTreeMap<String, usize>,
    /// `edges / (nodes * (nodes - 1))`, zero when under two nodes.
    pub density_ratio: f64,
}

/// The dependency graph: an arena of nodes addressed by string id.
///
/// Treated as immutable by every consumer once built; rebuilding means
/// constructing a new graph.
pub struct DependencyGraph {
    inner: StableDiGraph<GraphNode, GraphEdge>,
    ids: HashMap<String, NodeIndex>,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            inner: StableDiGraph::new(),
            ids: HashMap::new(),
        }
    }

    /// Insert a node. Returns false (and leaves the graph unchanged) when
    /// the id is already present.
    pub fn add_node(&mut self, node: GraphNode) -> bool {
        if self.ids.contains_key(&node.id) {
            return false;
        }
        let id = node.id.clone();
        let idx = self.inner.add_node(node);
        self.ids.insert(id, idx);
        true
    }

    /// Insert an edge between two existing nodes. Returns false when either
    /// endpoint is unknown, so unresolved targets never become edges.
    pub fn add_edge(&mut self, source: &str, target: &str, kind: EdgeKind) -> bool {
        let (Some(&s), Some(&t)) = (self.ids.get(source), self.ids.get(target)) else {
            return false;
        };
        let edge = GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind,
        };
        self.inner.add_edge(s, t, edge);
        true
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.ids.get(id).and_then(|&idx| self.inner.node_weight(idx))
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// All node ids, sorted for deterministic iteration.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.ids.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> Vec<&GraphNode> {
        let mut nodes: Vec<&GraphNode> = self
            .inner
            .node_indices()
            .filter_map(|idx| self.inner.node_weight(idx))
            .collect();
        nodes.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// All edges, ordered by `(source, kind, target)`.
    pub fn edges(&self) -> Vec<&GraphEdge> {
        let mut edges: Vec<&GraphEdge> = self
            .inner
            .edge_indices()
            .filter_map(|idx| self.inner.edge_weight(idx))
            .collect();
        sort_edges(&mut edges);
        edges
    }

    /// Outgoing edges of `id` (the by-source index view), sorted.
    pub fn edges_from(&self, id: &str) -> Vec<&GraphEdge> {
        self.directed_edges(id, Direction::Outgoing)
    }

    /// Incoming edges of `id` (the by-target index view), sorted.
    pub fn edges_to(&self, id: &str) -> Vec<&GraphEdge> {
        self.directed_edges(id, Direction::Incoming)
    }

    fn directed_edges(&self, id: &str, direction: Direction) -> Vec<&GraphEdge> {
        let Some(&idx) = self.ids.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&GraphEdge> = self
            .inner
            .edges_directed(idx, direction)
            .map(|edge_ref| edge_ref.weight())
            .collect();
        sort_edges(&mut edges);
        edges
    }

    /// Edge counts keyed by kind name.
    pub fn edges_by_type(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for idx in self.inner.edge_indices() {
            if let Some(edge) = self.inner.edge_weight(idx) {
                *counts.entry(edge.kind.as_str().to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Nodes with no edges in either direction, across all edge kinds.
    pub fn isolated_nodes(&self) -> Vec<String> {
        let mut isolated: Vec<String> = self
            .inner
            .node_indices()
            .filter(|&idx| {
                self.inner.edges_directed(idx, Direction::Outgoing).next().is_none()
                    && self.inner.edges_directed(idx, Direction::Incoming).next().is_none()
            })
            .filter_map(|idx| self.inner.node_weight(idx).map(|n| n.id.clone()))
            .collect();
        isolated.sort_unstable();
        isolated
    }

    /// `edges / (nodes * (nodes - 1))` with a zero guard.
    pub fn density_ratio(&self) -> f64 {
        let n = self.inner.node_count();
        if n < 2 {
            return 0.0;
        }
        self.inner.edge_count() as f64 / (n as f64 * (n as f64 - 1.0))
    }

    /// Strongly connected components of size >= 2 over the subgraph whose
    /// edges match `kinds`. Members and components are sorted.
    pub fn cycles_over(&self, kinds: &[EdgeKind]) -> Vec<Vec<String>> {
        let filtered =
            EdgeFiltered::from_fn(&self.inner, |edge| kinds.contains(&edge.weight().kind));
        let mut cycles: Vec<Vec<String>> = petgraph::algo::tarjan_scc(&filtered)
            .into_iter()
            .filter(|component| component.len() >= 2)
            .map(|component| {
                let mut ids: Vec<String> = component
                    .into_iter()
                    .filter_map(|idx| self.inner.node_weight(idx).map(|n| n.id.clone()))
                    .collect();
                ids.sort_unstable();
                ids
            })
            .collect();
        cycles.sort_unstable();
        cycles
    }

    /// Snapshot of the derived statistics.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            edges_by_type: self.edges_by_type(),
            density_ratio: self.density_ratio(),
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable `(source, kind, target)` ordering used by every edge view.
fn sort_edges(edges: &mut [&GraphEdge]) {
    edges.sort_unstable_by(|a, b| {
        a.source
            .cmp(&b.source)
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.target.cmp(&b.target))
    });
}
