//! Cascading-impact simulation
//!
//! Computes the blast radius of changing one element: a BFS over incoming
//! dependency edges, bucketed into depth tiers, with a severity grade and
//! a bounded risk score. Severity reflects the full transitive dependent
//! set; the tier lists respect the requested depth.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use trellis_core::error::{Error, Result};
use trellis_core::graph::DependencyGraph;

use crate::builder::{AnalysisResult, DEPENDENCY_KINDS};

pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Depth tier of one impacted node: one hop, hops 2..=3, or deeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Direct,
    Transitive,
    Secondary,
}

impl ImpactLevel {
    fn for_depth(depth: usize) -> Self {
        match depth {
            1 => ImpactLevel::Direct,
            2..=3 => ImpactLevel::Transitive,
            _ => ImpactLevel::Secondary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn for_impacted_count(count: usize) -> Self {
        match count {
            n if n >= 50 => Severity::Critical,
            n if n >= 20 => Severity::High,
            n if n >= 5 => Severity::Medium,
            _ => Severity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// One node reached by the cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactedElement {
    pub element_id: String,
    pub impact_level: ImpactLevel,
    /// `1 / (1 + depth)`, monotonically decreasing with distance.
    pub impact_score: f64,
    /// Direct dependents of this node.
    pub dependent_count: usize,
    pub cascade_depth: usize,
    /// Transitive dependents of this node within the remaining depth
    /// budget.
    pub affected_elements: Vec<String>,
}

/// The full simulation report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlastRadius {
    pub target: String,
    pub direct: Vec<ImpactedElement>,
    pub transitive: Vec<ImpactedElement>,
    pub secondary: Vec<ImpactedElement>,
    pub total_impacted: usize,
    pub severity: Severity,
    /// 0..=100.
    pub risk_score: f64,
    pub mitigations: Vec<String>,
    /// `START: <id> -> N direct -> N transitive -> N secondary -> END`.
    pub cascade_chain: String,
    pub simulation_time_ms: f64,
}

/// Read-only simulator over one built graph, with a per-engine result
/// cache keyed by `(elementId, maxDepth)`.
pub struct ImpactSimulator {
    graph: Arc<DependencyGraph>,
    cache: DashMap<(String, usize), Arc<BlastRadius>>,
}

impl ImpactSimulator {
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        ImpactSimulator {
            graph,
            cache: DashMap::new(),
        }
    }

    pub fn for_analysis(analysis: &AnalysisResult) -> Self {
        Self::new(Arc::clone(&analysis.graph))
    }

    /// Simulate changing `element_id`. Unknown ids are an error, unlike
    /// queries: an impact report on nothing is meaningless.
    pub fn simulate(&self, element_id: &str, max_depth: usize) -> Result<Arc<BlastRadius>> {
        if !self.graph.contains_node(element_id) {
            return Err(Error::UnknownElement(element_id.to_string()));
        }
        let cache_key = (element_id.to_string(), max_depth);
        if let Some(hit) = self.cache.get(&cache_key) {
            return Ok(Arc::clone(hit.value()));
        }

        let started = Instant::now();
        let reached = dependents_bfs(&self.graph, element_id, max_depth);

        let mut direct = Vec::new();
        let mut transitive = Vec::new();
        let mut secondary = Vec::new();

        for (id, depth) in &reached {
            let impacted = ImpactedElement {
                element_id: id.clone(),
                impact_level: ImpactLevel::for_depth(*depth),
                impact_score: 1.0 / (1.0 + *depth as f64),
                dependent_count: incoming_dependents(&self.graph, id).len(),
                cascade_depth: *depth,
                affected_elements: dependents_bfs(&self.graph, id, max_depth.saturating_sub(*depth))
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect(),
            };
            match impacted.impact_level {
                ImpactLevel::Direct => direct.push(impacted),
                ImpactLevel::Transitive => transitive.push(impacted),
                ImpactLevel::Secondary => secondary.push(impacted),
            }
        }

        // Severity grades the full dependent closure, so a shallow request
        // still surfaces a widely-depended-on element as critical.
        let full_closure = dependents_bfs(&self.graph, element_id, usize::MAX).len();
        let severity = Severity::for_impacted_count(full_closure);

        let risk_score = ((10.0 * direct.len() as f64).min(60.0)
            + (2.0 * transitive.len() as f64).min(30.0)
            + (0.5 * secondary.len() as f64).min(10.0))
        .min(100.0);

        let total_impacted = reached.len();
        let cascade_chain = format!(
            "START: {element_id} -> {} direct -> {} transitive -> {} secondary -> END: {total_impacted} impacted",
            direct.len(),
            transitive.len(),
            secondary.len(),
        );

        let report = Arc::new(BlastRadius {
            target: element_id.to_string(),
            mitigations: mitigations_for(severity),
            direct,
            transitive,
            secondary,
            total_impacted,
            severity,
            risk_score,
            cascade_chain,
            simulation_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        });
        self.cache.insert(cache_key, Arc::clone(&report));
        Ok(report)
    }
}

/// Level-synchronous BFS over incoming dependency edges; returns each
/// reached node with its first-reach depth, lexicographic within a level.
fn dependents_bfs(
    graph: &DependencyGraph,
    start: &str,
    max_depth: usize,
) -> Vec<(String, usize)> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.to_string());
    let mut frontier: Vec<String> = vec![start.to_string()];
    let mut reached = Vec::new();
    let mut depth = 0usize;

    while !frontier.is_empty() && depth < max_depth {
        depth += 1;
        let mut next: Vec<String> = frontier
            .iter()
            .flat_map(|id| incoming_dependents(graph, id))
            .filter(|n| !visited.contains(n))
            .collect();
        next.sort_unstable();
        next.dedup();
        for id in &next {
            visited.insert(id.clone());
            reached.push((id.clone(), depth));
        }
        frontier = next;
    }
    reached
}

fn incoming_dependents(graph: &DependencyGraph, id: &str) -> Vec<String> {
    graph
        .edges_to(id)
        .into_iter()
        .filter(|e| DEPENDENCY_KINDS.contains(&e.kind))
        .map(|e| e.source.clone())
        .collect()
}

fn mitigations_for(severity: Severity) -> Vec<String> {
    let lines: &[&str] = match severity {
        Severity::Critical => &[
            "run the full test suite plus extensive integration coverage before merging",
            "roll the change out incrementally behind a flag",
            "notify owners of every directly impacted module",
        ],
        Severity::High => &[
            "require a second reviewer familiar with the dependent modules",
            "coordinate the change with downstream owners",
        ],
        Severity::Medium => &["standard code review with attention to the direct dependents"],
        Severity::Low => &["routine review"],
    };
    lines.iter().map(|s| s.to_string()).collect()
}
