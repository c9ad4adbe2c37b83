//! Per-element complexity metrics and risk tiers
//!
//! Bundles the structural facts the re-ranker weighs: normalized
//! complexity, parameter count, call fan-out, dependent count, and an
//! optional coverage estimate. The combined structural score maps to a
//! risk tier at the fixed cutoffs 2 / 4 / 7.

use serde::{Deserialize, Serialize};
use trellis_core::graph::{DependencyGraph, EdgeKind, GraphNode, NodeKind};

use crate::builder::AnalysisResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// Cutoffs on the 0..=10 structural score.
    pub fn for_score(score: f64) -> Self {
        if score <= 2.0 {
            RiskTier::Low
        } else if score <= 4.0 {
            RiskTier::Medium
        } else if score <= 7.0 {
            RiskTier::High
        } else {
            RiskTier::Critical
        }
    }
}

/// The bounded metrics bundle for one element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMetrics {
    pub element_id: String,
    /// Cyclomatic complexity clamped to 0..=10.
    pub complexity_score: f64,
    pub parameter_count: usize,
    /// Outgoing call edges.
    pub fan_out: usize,
    /// Incoming call edges.
    pub dependent_count: usize,
    /// Test-coverage estimate in 0..=1, when a provider supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    /// Combined structural score, 0..=10.
    pub structural_score: f64,
    pub risk_tier: RiskTier,
}

/// Score one element node against its graph context.
pub fn score_element(graph: &DependencyGraph, node: &GraphNode) -> ElementMetrics {
    let complexity_score = node
        .metadata
        .complexity
        .map(|c| f64::from(c).clamp(0.0, 10.0))
        .unwrap_or(0.0);
    let parameter_count = node.metadata.parameters.len();
    let fan_out = graph
        .edges_from(&node.id)
        .iter()
        .filter(|e| e.kind == EdgeKind::Calls)
        .count();
    let dependent_count = graph
        .edges_to(&node.id)
        .iter()
        .filter(|e| e.kind == EdgeKind::Calls)
        .count();

    let structural_score = combined_score(complexity_score, parameter_count, fan_out, dependent_count);

    ElementMetrics {
        element_id: node.id.clone(),
        complexity_score,
        parameter_count,
        fan_out,
        dependent_count,
        coverage: None,
        structural_score,
        risk_tier: RiskTier::for_score(structural_score),
    }
}

/// Metrics for every element node, ordered by id.
pub fn score_all(analysis: &AnalysisResult) -> Vec<ElementMetrics> {
    analysis
        .graph
        .nodes()
        .into_iter()
        .filter(|n| n.kind != NodeKind::File)
        .map(|n| score_element(&analysis.graph, n))
        .collect()
}

/// Complexity dominates; wide signatures, heavy fan-out, and a large
/// dependent set each push the score up, capped to the 0..=10 band.
fn combined_score(complexity: f64, parameters: usize, fan_out: usize, dependents: usize) -> f64 {
    let parameter_pressure = (parameters as f64).min(10.0);
    let fan_out_pressure = (fan_out as f64).min(10.0);
    let dependent_pressure = (dependents as f64).min(10.0);
    (complexity * 0.6
        + parameter_pressure * 0.1
        + fan_out_pressure * 0.15
        + dependent_pressure * 0.15)
        .clamp(0.0, 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use std::sync::Arc;
    use trellis_core::model::{CallInfo, CallType, Element, ElementKind, FileAnalysis, Parameter};

    fn fixture() -> AnalysisResult {
        let mut analysis = FileAnalysis::empty("m.ts");
        analysis.elements.push(Element {
            kind: ElementKind::Function,
            name: "simple".to_string(),
            file: "m.ts".to_string(),
            line: 1,
            exported: false,
            parameters: Vec::new(),
            calls: Vec::new(),
            complexity: Some(1.0),
        });
        analysis.elements.push(Element {
            kind: ElementKind::Function,
            name: "gnarly".to_string(),
            file: "m.ts".to_string(),
            line: 10,
            exported: false,
            parameters: vec![
                Parameter::plain("a"),
                Parameter::plain("b"),
                Parameter::plain("c"),
            ],
            calls: Vec::new(),
            complexity: Some(14.0),
        });
        analysis.calls.push(CallInfo {
            callee_function: "simple".to_string(),
            callee_object: None,
            call_type: CallType::Function,
            caller_function: Some("gnarly".to_string()),
            caller_class: None,
            line: 11,
        });
        GraphBuilder::new().build_from_analyses(&[Arc::new(analysis)], Vec::new())
    }

    #[test]
    fn complexity_is_clamped_to_ten() {
        let analysis = fixture();
        let metrics = score_all(&analysis);
        let gnarly = metrics.iter().find(|m| m.element_id == "m.ts:gnarly").unwrap();
        assert_eq!(gnarly.complexity_score, 10.0);
        assert_eq!(gnarly.parameter_count, 3);
        assert_eq!(gnarly.fan_out, 1);
    }

    #[test]
    fn tiers_follow_the_cutoffs() {
        assert_eq!(RiskTier::for_score(0.0), RiskTier::Low);
        assert_eq!(RiskTier::for_score(2.0), RiskTier::Low);
        assert_eq!(RiskTier::for_score(3.5), RiskTier::Medium);
        assert_eq!(RiskTier::for_score(4.0), RiskTier::Medium);
        assert_eq!(RiskTier::for_score(6.9), RiskTier::High);
        assert_eq!(RiskTier::for_score(9.0), RiskTier::Critical);
    }

    #[test]
    fn simple_function_scores_low_and_gnarly_scores_high() {
        let analysis = fixture();
        let metrics = score_all(&analysis);
        let simple = metrics.iter().find(|m| m.element_id == "m.ts:simple").unwrap();
        let gnarly = metrics.iter().find(|m| m.element_id == "m.ts:gnarly").unwrap();
        assert_eq!(simple.risk_tier, RiskTier::Low);
        assert!(gnarly.structural_score > simple.structural_score);
        assert!(matches!(gnarly.risk_tier, RiskTier::High | RiskTier::Critical));
        assert_eq!(simple.dependent_count, 1);
    }

    #[test]
    fn file_nodes_are_not_scored() {
        let analysis = fixture();
        let metrics = score_all(&analysis);
        assert!(metrics.iter().all(|m| m.element_id.contains(':')));
        assert_eq!(metrics.len(), 2);
    }
}
