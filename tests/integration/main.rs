//! Integration tests for Trellis
//!
//! These tests drive the full pipeline over a real temp tree: scan,
//! analyze, query, impact, export round-trip, and drift.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use trellis_core::{EdgeKind, export_graph, import_graph};
use trellis_drift::{DriftOptions, DriftStatus, detect_drift, index_references, parse_index};
use trellis_graph::{
    GraphBuilder, ImpactSimulator, QueryEngine, QueryRequest, QueryType, Severity, analyze,
};
use trellis_scanner::{CancelToken, ScanOptions, Scanner};

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A small app: an entry point calling into a service, which calls into a
/// util module; plus a hook, a component, and an orphan constant.
fn sample_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "src/main.ts",
        r#"import { runService } from './service';

export function main() {
    runService();
}
"#,
    );
    write(
        dir.path(),
        "src/service.ts",
        r#"import { formatValue } from './util';

export function runService() {
    return formatValue(42);
}

export class ServiceHost {
    start() {
        runService();
    }
}
"#,
    );
    write(
        dir.path(),
        "src/util.ts",
        r#"export function formatValue(value) {
    if (value > 10) {
        return String(value);
    }
    return '0';
}

export const MAX_VALUE = 100;
"#,
    );
    write(
        dir.path(),
        "src/Widget.tsx",
        r#"export function Widget(props) {
    return <div>{props.label}</div>;
}

export const useWidgetState = () => { return null; };
"#,
    );
    dir
}

/// Scan, then walk the whole pipeline over the result.
#[test]
fn end_to_end_scan_analyze_query_impact() {
    let dir = sample_project();
    let analysis = analyze(dir.path(), &ScanOptions::default()).unwrap();

    // All four files and their elements became nodes.
    assert!(analysis.graph.contains_node("src/main.ts:main"));
    assert!(analysis.graph.contains_node("src/service.ts:ServiceHost.start"));
    assert!(analysis.graph.contains_node("src/util.ts:MAX_VALUE"));
    assert!(analysis.graph.contains_node("src/Widget.tsx:Widget"));
    assert!(analysis.graph.contains_node("src/Widget.tsx:useWidgetState"));

    // Imports resolved to files, calls to elements.
    assert!(analysis
        .graph
        .edges_from("src/main.ts")
        .iter()
        .any(|e| e.kind == EdgeKind::Imports && e.target == "src/service.ts"));
    assert!(analysis
        .graph
        .edges_from("src/main.ts:main")
        .iter()
        .any(|e| e.kind == EdgeKind::Calls && e.target == "src/service.ts:runService"));

    // Query: who calls formatValue, transitively.
    let engine = QueryEngine::for_analysis(&analysis);
    let callers = engine
        .run(&QueryRequest::new(QueryType::WhatCallsMe, "src/util.ts:formatValue").with_depth(5))
        .unwrap();
    let ids: Vec<&str> = callers.results.iter().map(|h| h.id.as_str()).collect();
    assert!(ids.contains(&"src/service.ts:runService"));
    assert!(ids.contains(&"src/main.ts:main"));

    // Impact: changing formatValue reaches its callers.
    let simulator = ImpactSimulator::for_analysis(&analysis);
    let report = simulator.simulate("src/util.ts:formatValue", 5).unwrap();
    assert!(report.total_impacted >= 2);
    assert_eq!(report.severity, Severity::Low);
    assert!(report.risk_score > 0.0 && report.risk_score <= 100.0);
}

/// The exported graph reimports into an equivalent structure.
#[test]
fn export_round_trip_preserves_the_graph() {
    let dir = sample_project();
    let analysis = analyze(dir.path(), &ScanOptions::default()).unwrap();

    let export = export_graph(&analysis.graph);
    let rebuilt = import_graph(&export);

    assert_eq!(rebuilt.node_count(), analysis.graph.node_count());
    assert_eq!(rebuilt.edge_count(), analysis.graph.edge_count());
    let re_export = export_graph(&rebuilt);
    assert_eq!(re_export.nodes, export.nodes);
    assert_eq!(re_export.edges, export.edges);
}

/// Progress arrives once per file, monotonic, ending at 100 percent.
#[test]
fn progress_contract_holds_over_a_real_tree() {
    let dir = sample_project();
    let reports: Arc<Mutex<Vec<(usize, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);

    let options = ScanOptions {
        on_progress: Some(Box::new(move |p| {
            sink.lock().unwrap().push((p.files_processed, p.percent_complete));
        })),
        ..Default::default()
    };
    Scanner::new().scan(dir.path(), &options).unwrap();

    let seen = reports.lock().unwrap();
    let processed: Vec<usize> = seen.iter().map(|(n, _)| *n).collect();
    assert_eq!(processed, (1..=seen.len()).collect::<Vec<_>>());
    assert_eq!(seen.last().unwrap().1, 100);
}

/// A cancelled scan yields a partial outcome the builder refuses by
/// default.
#[test]
fn cancelled_scan_is_partial_and_builder_refuses_it() {
    let dir = sample_project();
    let token = CancelToken::new();
    token.cancel();
    let options = ScanOptions {
        cancel: Some(token),
        ..Default::default()
    };
    let outcome = Scanner::new().scan(dir.path(), &options).unwrap();
    assert!(outcome.cancelled);

    assert!(GraphBuilder::new().build(&outcome).is_err());
    assert!(GraphBuilder::new().allow_partial().build(&outcome).is_ok());
}

/// Drift: unchanged, moved, renamed, and missing all fall out of editing
/// the tree between two scans.
#[test]
fn drift_detection_across_an_edit() {
    let dir = sample_project();

    // Record references against the initial tree.
    write(
        dir.path(),
        "src/service.ts",
        r#"// refs: @Fn/src/service#runService:3
import { formatValue } from './util';

export function runService() {
    return formatValue(42);
}
"#,
    );
    let harvested = index_references(dir.path(), &ScanOptions::default()).unwrap();
    assert!(harvested.iter().any(|t| t.reference.element.as_deref() == Some("runService")));

    // Edit: push runService down two lines and rename formatValue.
    write(
        dir.path(),
        "src/service.ts",
        r#"// refs: @Fn/src/service#runService:3


import { formatValues } from './util';

export function runService() {
    return formatValues(42);
}
"#,
    );
    write(
        dir.path(),
        "src/util.ts",
        r#"export function formatValues(value) {
    return String(value);
}
"#,
    );

    let index = "\
@Fn/src/service#runService:5
@Fn/src/util#formatValue:1
@Fn/src/util#vanishedEntirely:40
@Fn/src/main#main:3
garbage line
";
    let recorded = parse_index(index, "refs.txt");
    let analysis = analyze(dir.path(), &ScanOptions::default()).unwrap();
    let reports = detect_drift(&recorded, &analysis, &DriftOptions::default());

    let status_of = |element: &str| {
        reports
            .iter()
            .find(|r| r.indexed.reference.element.as_deref() == Some(element))
            .map(|r| r.status)
            .unwrap()
    };
    assert_eq!(status_of("runService"), DriftStatus::Moved);
    assert_eq!(status_of("formatValue"), DriftStatus::Renamed);
    assert_eq!(status_of("vanishedEntirely"), DriftStatus::Missing);
    assert_eq!(status_of("main"), DriftStatus::Unchanged);
    assert_eq!(
        reports.last().unwrap().status,
        DriftStatus::Unknown,
        "unparseable line is reported, not dropped"
    );

    let moved = reports
        .iter()
        .find(|r| r.status == DriftStatus::Moved)
        .unwrap();
    assert_eq!(moved.suggested_fix.as_deref(), Some("@Fn/src/service#runService:6"));
}

/// Incremental rescans reuse cached analyses until a file changes.
#[test]
fn rescan_after_edit_reparses_only_the_changed_file() {
    let dir = sample_project();
    let scanner = Scanner::new();
    let first = scanner.scan(dir.path(), &ScanOptions::default()).unwrap();

    // Ensure a different mtime even on coarse filesystems.
    std::thread::sleep(std::time::Duration::from_millis(20));
    write(dir.path(), "src/util.ts", "export function formatValue(v) { return v; }\n");

    let second = scanner.scan(dir.path(), &ScanOptions::default()).unwrap();
    let find = |outcome: &trellis_scanner::ScanOutcome, file: &str| {
        outcome
            .analyses
            .iter()
            .find(|a| a.file == file)
            .cloned()
            .unwrap()
    };
    // Unchanged files come back as the same Arc; the edited one does not.
    assert!(Arc::ptr_eq(
        &find(&first, "src/main.ts"),
        &find(&second, "src/main.ts")
    ));
    assert!(!Arc::ptr_eq(
        &find(&first, "src/util.ts"),
        &find(&second, "src/util.ts")
    ));
}
