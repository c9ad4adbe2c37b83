//! CLI command implementations
//!
//! Thin shims over the library crates: argument plumbing in, JSON out.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use trellis_drift::{DriftOptions, detect_drift, parse_index};
use trellis_graph::{
    GraphBuilder, ImpactSimulator, QueryEngine, QueryRequest, QueryType, analyze as build_analysis,
};
use trellis_scanner::{ScanOptions, Scanner};

pub async fn scan(
    root: PathBuf,
    extensions: Option<String>,
    exclude: Vec<String>,
    tags: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let options = ScanOptions {
        extensions: extensions
            .map(|e| e.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default(),
        exclude,
        include_comments: tags,
        verbose,
        ..Default::default()
    };

    let scanner = Arc::new(Scanner::new());
    let outcome = scanner.scan_async(root, options).await?;

    tracing::info!(
        files = outcome.files_processed,
        elements = outcome.element_count(),
        diagnostics = outcome.diagnostics.len(),
        "scan complete"
    );
    let report = json!({
        "filesProcessed": outcome.files_processed,
        "totalFiles": outcome.total_files,
        "cancelled": outcome.cancelled,
        "durationMs": outcome.duration_ms,
        "elements": outcome.elements(),
        "diagnostics": outcome.diagnostics,
        "tags": outcome.tags,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn analyze(root: PathBuf) -> anyhow::Result<()> {
    let analysis = build_analysis(&root, &ScanOptions::default())?;
    tracing::info!(
        nodes = analysis.stats.node_count,
        edges = analysis.stats.edge_count,
        "analysis complete"
    );
    let report = json!({
        "stats": analysis.stats,
        "circularDependencies": analysis.circular_dependencies,
        "isolatedNodes": analysis.isolated_nodes,
        "diagnostics": analysis.diagnostics,
        "analysisTimeMs": analysis.analysis_time_ms,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn query(
    root: PathBuf,
    query_type: String,
    target: String,
    to: Option<String>,
    max_depth: usize,
    format: String,
) -> anyhow::Result<()> {
    let query_type = parse_query_type(&query_type)?;
    let analysis = build_analysis(&root, &ScanOptions::default())?;
    let engine = QueryEngine::for_analysis(&analysis);

    let mut request = QueryRequest::new(query_type, target).with_depth(max_depth);
    if let Some(to) = to {
        request = request.to_node(to);
    }
    let result = engine.run(&request)?;

    match format.as_str() {
        "text" => {
            println!("{} {} ({} results)", result.query_type.as_str(), result.target, result.count);
            if let Some(score) = result.score {
                println!("  score: {score:.4}");
            }
            for hit in &result.results {
                println!("  [{}] {}", hit.depth, hit.id);
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

pub async fn impact(root: PathBuf, element: String, max_depth: usize) -> anyhow::Result<()> {
    let analysis = build_analysis(&root, &ScanOptions::default())?;
    let simulator = ImpactSimulator::for_analysis(&analysis);
    let report = simulator
        .simulate(&element, max_depth)
        .with_context(|| format!("impact simulation failed for {element}"))?;
    println!("{}", serde_json::to_string_pretty(&*report)?);
    Ok(())
}

pub async fn drift(
    root: PathBuf,
    index: PathBuf,
    similarity_threshold: f64,
) -> anyhow::Result<()> {
    let blob = std::fs::read_to_string(&index)
        .with_context(|| format!("cannot read index file {}", index.display()))?;
    let recorded = parse_index(&blob, &index.to_string_lossy());

    let analysis = build_analysis(&root, &ScanOptions::default())?;
    let options = DriftOptions {
        similarity_threshold,
        ..Default::default()
    };
    let reports = detect_drift(&recorded, &analysis, &options);

    let drifted = reports
        .iter()
        .filter(|r| r.status != trellis_drift::DriftStatus::Unchanged)
        .count();
    tracing::info!(total = reports.len(), drifted, "drift detection complete");
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

pub async fn export(root: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let scanner = Scanner::new();
    let outcome = scanner.scan(&root, &ScanOptions::default())?;
    let analysis = GraphBuilder::new().build(&outcome)?;
    let export = trellis_core::export_graph(&analysis.graph);
    let body = serde_json::to_string_pretty(&export)?;
    match output {
        Some(path) => {
            std::fs::write(&path, body)
                .with_context(|| format!("cannot write {}", path.display()))?;
            tracing::info!(path = %path.display(), nodes = export.nodes.len(), "graph exported");
        }
        None => println!("{body}"),
    }
    Ok(())
}

pub fn tag(tag: String) -> anyhow::Result<()> {
    let reference = trellis_core::parse_tag(&tag)?;
    let formatted = trellis_core::format_tag(&reference)?;
    let report = json!({
        "parsed": reference,
        "formatted": formatted,
        "roundTrips": formatted == tag.trim(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_query_type(raw: &str) -> anyhow::Result<QueryType> {
    match raw {
        "what-calls-me" => Ok(QueryType::WhatCallsMe),
        "what-depends-on" => Ok(QueryType::WhatDependsOn),
        "centrality" => Ok(QueryType::Centrality),
        "shortest-path" => Ok(QueryType::ShortestPath),
        "neighborhood" => Ok(QueryType::Neighborhood),
        other => anyhow::bail!(
            "unknown query type {other:?}; expected one of what-calls-me, what-depends-on, centrality, shortest-path, neighborhood"
        ),
    }
}
