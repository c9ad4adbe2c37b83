//! Graph queries
//!
//! Bounded BFS traversals over an immutable graph, with results cached per
//! engine. An engine is bound to one analysis; rebuilding the graph means
//! building a new engine, which is what invalidates the cache.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use trellis_core::error::Result;
use trellis_core::graph::{DependencyGraph, EdgeKind};

use crate::builder::{AnalysisResult, DEPENDENCY_KINDS};

pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryType {
    WhatCallsMe,
    WhatDependsOn,
    Centrality,
    ShortestPath,
    Neighborhood,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::WhatCallsMe => "what-calls-me",
            QueryType::WhatDependsOn => "what-depends-on",
            QueryType::Centrality => "centrality",
            QueryType::ShortestPath => "shortest-path",
            QueryType::Neighborhood => "neighborhood",
        }
    }
}

/// One query. `secondary` is the destination for `shortest-path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query_type: QueryType,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    pub max_depth: usize,
}

impl QueryRequest {
    pub fn new(query_type: QueryType, target: impl Into<String>) -> Self {
        QueryRequest {
            query_type,
            target: target.into(),
            secondary: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn to_node(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }
}

/// A reached node and the hop count at which it was first reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub query_type: QueryType,
    pub target: String,
    pub results: Vec<QueryHit>,
    pub count: usize,
    /// Only for `centrality`: incoming edges over total nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub execution_time_ms: f64,
    pub cached: bool,
}

/// Read-only query engine over one built graph. Safe to share across
/// threads; the result cache is keyed by `(type, target, maxDepth)`.
pub struct QueryEngine {
    graph: Arc<DependencyGraph>,
    cache: DashMap<(QueryType, String, usize), Arc<QueryResult>>,
}

impl QueryEngine {
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        QueryEngine {
            graph,
            cache: DashMap::new(),
        }
    }

    pub fn for_analysis(analysis: &AnalysisResult) -> Self {
        Self::new(Arc::clone(&analysis.graph))
    }

    /// Execute a query. An unknown target yields an empty result rather
    /// than an error.
    pub fn run(&self, request: &QueryRequest) -> Result<QueryResult> {
        let cache_key = (
            request.query_type,
            cache_target(request),
            request.max_depth,
        );
        if let Some(hit) = self.cache.get(&cache_key) {
            let mut result = QueryResult::clone(hit.value());
            result.cached = true;
            return Ok(result);
        }

        let started = Instant::now();
        let (results, score) = self.execute(request);
        let result = QueryResult {
            query_type: request.query_type,
            target: request.target.clone(),
            count: results.len(),
            results,
            score,
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            cached: false,
        };
        self.cache.insert(cache_key, Arc::new(result.clone()));
        Ok(result)
    }

    fn execute(&self, request: &QueryRequest) -> (Vec<QueryHit>, Option<f64>) {
        if !self.graph.contains_node(&request.target) {
            tracing::debug!(target = %request.target, "query target not in graph");
            return (Vec::new(), None);
        }
        match request.query_type {
            QueryType::WhatCallsMe => (
                self.bfs(&request.target, request.max_depth, Direction::Incoming, &[EdgeKind::Calls]),
                None,
            ),
            QueryType::WhatDependsOn => (
                self.bfs(
                    &request.target,
                    request.max_depth,
                    Direction::Outgoing,
                    DEPENDENCY_KINDS,
                ),
                None,
            ),
            QueryType::Centrality => {
                let incoming = self.graph.edges_to(&request.target).len();
                let nodes = self.graph.node_count();
                let score = if nodes == 0 {
                    0.0
                } else {
                    incoming as f64 / nodes as f64
                };
                (Vec::new(), Some(score))
            }
            QueryType::ShortestPath => {
                let Some(goal) = &request.secondary else {
                    return (Vec::new(), None);
                };
                (self.shortest_path(&request.target, goal, request.max_depth), None)
            }
            QueryType::Neighborhood => {
                let mut hits = self.bfs(
                    &request.target,
                    request.max_depth,
                    Direction::Both,
                    DEPENDENCY_KINDS,
                );
                hits.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.id.cmp(&b.id)));
                hits.dedup_by(|a, b| a.id == b.id);
                (hits, None)
            }
        }
    }

    /// Level-synchronous BFS from `start`, excluding it from the results.
    /// Each level is sorted before it is emitted, so ties within a depth
    /// break lexicographically by id.
    fn bfs(
        &self,
        start: &str,
        max_depth: usize,
        direction: Direction,
        kinds: &[EdgeKind],
    ) -> Vec<QueryHit> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.to_string());
        let mut frontier: Vec<String> = vec![start.to_string()];
        let mut hits = Vec::new();

        for depth in 1..=max_depth {
            let mut next: Vec<String> = frontier
                .iter()
                .flat_map(|id| self.neighbors(id, direction, kinds))
                .filter(|n| !visited.contains(n))
                .collect();
            next.sort_unstable();
            next.dedup();
            if next.is_empty() {
                break;
            }
            for neighbor in &next {
                visited.insert(neighbor.clone());
                hits.push(QueryHit {
                    id: neighbor.clone(),
                    depth,
                });
            }
            frontier = next;
        }
        hits
    }

    fn neighbors(&self, id: &str, direction: Direction, kinds: &[EdgeKind]) -> Vec<String> {
        let mut out = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            out.extend(
                self.graph
                    .edges_from(id)
                    .into_iter()
                    .filter(|e| kinds.contains(&e.kind))
                    .map(|e| e.target.clone()),
            );
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            out.extend(
                self.graph
                    .edges_to(id)
                    .into_iter()
                    .filter(|e| kinds.contains(&e.kind))
                    .map(|e| e.source.clone()),
            );
        }
        out
    }

    /// BFS with parent tracking; the result is the path from `start` to
    /// `goal` (exclusive of `start`), depths being path positions.
    fn shortest_path(&self, start: &str, goal: &str, max_depth: usize) -> Vec<QueryHit> {
        if !self.graph.contains_node(goal) {
            return Vec::new();
        }
        let mut parent: std::collections::HashMap<String, String> =
            std::collections::HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.to_string());
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((start.to_string(), 0));

        while let Some((id, depth)) = queue.pop_front() {
            if id == goal {
                let mut path = Vec::new();
                let mut current = goal.to_string();
                while current != start {
                    path.push(current.clone());
                    current = parent[&current].clone();
                }
                path.reverse();
                return path
                    .into_iter()
                    .enumerate()
                    .map(|(i, id)| QueryHit { id, depth: i + 1 })
                    .collect();
            }
            if depth >= max_depth {
                continue;
            }
            let mut next: Vec<String> = self
                .neighbors(&id, Direction::Outgoing, DEPENDENCY_KINDS)
                .into_iter()
                .filter(|n| !visited.contains(n))
                .collect();
            next.sort_unstable();
            next.dedup();
            for neighbor in next {
                visited.insert(neighbor.clone());
                parent.insert(neighbor.clone(), id.clone());
                queue.push_back((neighbor, depth + 1));
            }
        }
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Incoming,
    Outgoing,
    Both,
}

fn cache_target(request: &QueryRequest) -> String {
    match &request.secondary {
        Some(secondary) => format!("{}\u{0}{}", request.target, secondary),
        None => request.target.clone(),
    }
}
