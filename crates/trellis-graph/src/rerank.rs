//! Graph-aware re-ranking plug
//!
//! Consumers (typically a retrieval layer) hand in semantically scored
//! candidates; the plug blends the semantic score with graph-derived
//! factors under a normalized weight vector, applies a query-strategy
//! boost capped at `max_boost`, filters below `min_score`, and returns the
//! reordered list with a per-item breakdown.

use serde::{Deserialize, Serialize};
use trellis_core::graph::NodeKind;

use crate::builder::AnalysisResult;
use crate::scoring::{ElementMetrics, score_element};

/// What the consumer's query is optimizing for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryStrategy {
    Centrality,
    Quality,
    Usage,
    Public,
    #[default]
    General,
}

/// Re-rank configuration. Weights are normalized to sum to 1 before
/// combining, so callers may pass any magnitudes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankWeights {
    pub semantic_weight: f64,
    pub dependency_weight: f64,
    pub dependent_weight: f64,
    pub coverage_weight: f64,
    pub complexity_weight: f64,
    #[serde(default)]
    pub query_strategy: QueryStrategy,
    #[serde(default = "RerankWeights::default_max_boost")]
    pub max_boost: f64,
    #[serde(default = "RerankWeights::default_min_score")]
    pub min_score: f64,
}

impl RerankWeights {
    fn default_max_boost() -> f64 {
        1.5
    }

    fn default_min_score() -> f64 {
        0.0
    }

    /// Weight magnitudes scaled to sum to 1. A zero vector falls back to
    /// pure semantic ordering.
    fn normalized(&self) -> [f64; 5] {
        let raw = [
            self.semantic_weight,
            self.dependency_weight,
            self.dependent_weight,
            self.coverage_weight,
            self.complexity_weight,
        ];
        let sum: f64 = raw.iter().map(|w| w.abs()).sum();
        if sum == 0.0 {
            return [1.0, 0.0, 0.0, 0.0, 0.0];
        }
        raw.map(|w| w.abs() / sum)
    }
}

impl Default for RerankWeights {
    fn default() -> Self {
        RerankWeights {
            semantic_weight: 0.5,
            dependency_weight: 0.15,
            dependent_weight: 0.15,
            coverage_weight: 0.1,
            complexity_weight: 0.1,
            query_strategy: QueryStrategy::General,
            max_boost: Self::default_max_boost(),
            min_score: Self::default_min_score(),
        }
    }
}

/// One candidate from the consumer, identified by graph node id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankCandidate {
    pub id: String,
    /// In 0..=1.
    pub semantic_score: f64,
    /// Consumer-supplied coverage estimate in 0..=1, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
}

/// Per-item contribution breakdown, for explainability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankBreakdown {
    pub semantic: f64,
    pub dependencies: f64,
    pub dependents: f64,
    pub coverage: f64,
    pub complexity_penalty: f64,
    pub strategy_boost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankedResult {
    pub id: String,
    pub combined_score: f64,
    pub semantic_score: f64,
    pub breakdown: RerankBreakdown,
}

/// Re-rank `candidates` against the analysis graph. Ids not present in the
/// graph keep their semantic score with neutral graph factors.
pub fn rerank(
    analysis: &AnalysisResult,
    candidates: &[RerankCandidate],
    weights: &RerankWeights,
) -> Vec<RerankedResult> {
    let [w_sem, w_dep, w_dependent, w_cov, w_cplx] = weights.normalized();

    let mut results: Vec<RerankedResult> = candidates
        .iter()
        .map(|candidate| {
            let metrics = analysis
                .graph
                .node(&candidate.id)
                .filter(|n| n.kind != NodeKind::File)
                .map(|n| score_element(&analysis.graph, n));

            let dependency_factor = factor(metrics.as_ref().map(|m| m.fan_out), 10.0);
            let dependent_factor = factor(metrics.as_ref().map(|m| m.dependent_count), 20.0);
            let complexity_factor = metrics
                .as_ref()
                .map(|m| m.complexity_score / 10.0)
                .unwrap_or(0.0);
            let coverage = candidate.coverage.unwrap_or(0.0).clamp(0.0, 1.0);
            let exported = analysis
                .graph
                .node(&candidate.id)
                .map(|n| n.exported)
                .unwrap_or(false);

            let base = w_sem * candidate.semantic_score.clamp(0.0, 1.0)
                + w_dep * dependency_factor
                + w_dependent * dependent_factor
                + w_cov * coverage
                - w_cplx * complexity_factor;

            let boost = strategy_boost(
                weights.query_strategy,
                dependent_factor,
                dependency_factor,
                coverage,
                complexity_factor,
                exported,
            )
            .min(weights.max_boost);

            let combined = (base * boost).max(0.0);
            RerankedResult {
                id: candidate.id.clone(),
                combined_score: combined,
                semantic_score: candidate.semantic_score,
                breakdown: RerankBreakdown {
                    semantic: w_sem * candidate.semantic_score,
                    dependencies: w_dep * dependency_factor,
                    dependents: w_dependent * dependent_factor,
                    coverage: w_cov * coverage,
                    complexity_penalty: w_cplx * complexity_factor,
                    strategy_boost: boost,
                },
            }
        })
        .filter(|r| r.combined_score >= weights.min_score)
        .collect();

    results.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results
}

fn factor(value: Option<usize>, scale: f64) -> f64 {
    value.map(|v| (v as f64 / scale).min(1.0)).unwrap_or(0.0)
}

fn strategy_boost(
    strategy: QueryStrategy,
    dependent_factor: f64,
    dependency_factor: f64,
    coverage: f64,
    complexity_factor: f64,
    exported: bool,
) -> f64 {
    match strategy {
        QueryStrategy::Centrality => 1.0 + dependent_factor + dependency_factor * 0.5,
        QueryStrategy::Quality => (1.0 + coverage - complexity_factor * 0.5).max(0.5),
        QueryStrategy::Usage => 1.0 + dependent_factor,
        QueryStrategy::Public => {
            if exported {
                1.25
            } else {
                0.9
            }
        }
        QueryStrategy::General => 1.0,
    }
}

/// Metrics for one candidate id, when it is an element in the graph.
/// Exposed so consumers can show the underlying bundle next to results.
pub fn candidate_metrics(analysis: &AnalysisResult, id: &str) -> Option<ElementMetrics> {
    analysis
        .graph
        .node(id)
        .filter(|n| n.kind != NodeKind::File)
        .map(|n| score_element(&analysis.graph, n))
}
