//! Trellis Graph — graph assembly, queries, impact simulation, scoring,
//! and the re-ranker plug.

pub mod builder;
pub mod impact;
pub mod query;
pub mod rerank;
pub mod scoring;

pub use builder::{AnalysisResult, DEPENDENCY_KINDS, GraphBuilder, analyze};
pub use impact::{BlastRadius, ImpactLevel, ImpactSimulator, ImpactedElement, Severity};
pub use query::{QueryEngine, QueryHit, QueryRequest, QueryResult, QueryType};
pub use rerank::{
    QueryStrategy, RerankCandidate, RerankWeights, RerankedResult, candidate_metrics, rerank,
};
pub use scoring::{ElementMetrics, RiskTier, score_all, score_element};
