//! Graph assembly
//!
//! Joins the per-file analyses of a scan into one typed graph: a file node
//! per scanned file, an element node per element, `contains`/`calls`/
//! `imports`/`exports` edges, and a derived file-level `depends-on`
//! summary. Call targets resolve same-file first, then same-directory,
//! then globally (lexicographically first for determinism); unresolved
//! callees are dropped so the by-target index only ever points at real
//! nodes.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use trellis_core::error::{Error, Result};
use trellis_core::graph::{
    DependencyGraph, EdgeKind, GraphNode, GraphStats, NodeKind, NodeMetadata,
};
use trellis_core::model::{FileAnalysis, element_node_id};
use trellis_scanner::orchestrator::{ScanDiagnostic, ScanOutcome};

/// Edge kinds that participate in cycle detection and dependency queries.
pub const DEPENDENCY_KINDS: &[EdgeKind] = &[EdgeKind::Calls, EdgeKind::Imports, EdgeKind::DependsOn];

const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

/// A built graph plus its derived statistics. Owns the graph; query and
/// impact engines hold the `Arc` and die with their caches when the
/// analysis is dropped.
#[derive(Debug)]
pub struct AnalysisResult {
    pub graph: Arc<DependencyGraph>,
    pub stats: GraphStats,
    /// Strongly connected components of size >= 2 over the dependency
    /// subgraph.
    pub circular_dependencies: Vec<Vec<String>>,
    /// Nodes with no edges in either direction.
    pub isolated_nodes: Vec<String>,
    /// Scan-level diagnostics carried through for consumers.
    pub diagnostics: Vec<ScanDiagnostic>,
    pub analysis_time_ms: u64,
}

/// Assembles an [`AnalysisResult`] from scan output.
pub struct GraphBuilder {
    allow_partial: bool,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder {
            allow_partial: false,
        }
    }

    /// Accept cancelled scans and build from whatever they produced.
    pub fn allow_partial(mut self) -> Self {
        self.allow_partial = true;
        self
    }

    /// Build from a scan outcome. A cancelled scan is refused unless
    /// [`Self::allow_partial`] was set.
    pub fn build(&self, outcome: &ScanOutcome) -> Result<AnalysisResult> {
        if outcome.cancelled && !self.allow_partial {
            return Err(Error::Cancelled);
        }
        Ok(self.build_from_analyses(&outcome.analyses, outcome.diagnostics.clone()))
    }

    pub fn build_from_analyses(
        &self,
        analyses: &[Arc<FileAnalysis>],
        diagnostics: Vec<ScanDiagnostic>,
    ) -> AnalysisResult {
        let started = Instant::now();
        let mut graph = DependencyGraph::new();

        // Nodes: one per file, one per element, plus a name index for call
        // resolution.
        let mut files: HashSet<&str> = HashSet::new();
        let mut by_name: HashMap<&str, Vec<(&str, String)>> = HashMap::new();

        for analysis in analyses {
            files.insert(analysis.file.as_str());
            graph.add_node(GraphNode {
                id: analysis.file.clone(),
                kind: NodeKind::File,
                name: analysis.file.clone(),
                file: analysis.file.clone(),
                line: None,
                exported: false,
                metadata: NodeMetadata::default(),
            });
        }

        for analysis in analyses {
            for element in &analysis.elements {
                let id = element.node_id();
                let added = graph.add_node(GraphNode {
                    id: id.clone(),
                    kind: element.kind.into(),
                    name: element.name.clone(),
                    file: element.file.clone(),
                    line: Some(element.line),
                    exported: element.exported,
                    metadata: NodeMetadata {
                        parameters: element.parameters.clone(),
                        complexity: element.complexity,
                    },
                });
                if !added {
                    tracing::debug!(id, "duplicate element node id, keeping first");
                    continue;
                }
                by_name
                    .entry(element.name.as_str())
                    .or_default()
                    .push((analysis.file.as_str(), id.clone()));
                graph.add_edge(&analysis.file, &id, EdgeKind::Contains);
                if element.exported {
                    graph.add_edge(&id, &analysis.file, EdgeKind::Exports);
                }
            }
        }

        // Deterministic global resolution: candidate lists sorted by id.
        for candidates in by_name.values_mut() {
            candidates.sort_by(|a, b| a.1.cmp(&b.1));
        }

        let mut seen_edges: HashSet<(String, String, EdgeKind)> = HashSet::new();
        let mut depends_on: BTreeSet<(String, String)> = BTreeSet::new();

        // Call edges.
        for analysis in analyses {
            for call in &analysis.calls {
                let Some(caller_id) = caller_element_id(analysis, call) else {
                    continue;
                };
                let Some(callee_id) =
                    resolve_callee(&analysis.file, call, &by_name)
                else {
                    continue;
                };
                if callee_id == caller_id {
                    continue;
                }
                let callee_file = trellis_core::split_node_id(&callee_id).0.to_string();
                if callee_file != analysis.file {
                    depends_on.insert((analysis.file.clone(), callee_file));
                }
                if seen_edges.insert((caller_id.clone(), callee_id.clone(), EdgeKind::Calls)) {
                    graph.add_edge(&caller_id, &callee_id, EdgeKind::Calls);
                }
            }
        }

        // Import edges, file to file, only when the specifier resolves to a
        // scanned file.
        for analysis in analyses {
            for import in &analysis.imports {
                let Some(target) = resolve_import(&analysis.file, &import.source, &files) else {
                    continue;
                };
                if target == analysis.file {
                    continue;
                }
                depends_on.insert((analysis.file.clone(), target.clone()));
                if seen_edges.insert((analysis.file.clone(), target.clone(), EdgeKind::Imports)) {
                    graph.add_edge(&analysis.file, &target, EdgeKind::Imports);
                }
            }
        }

        // Derived file-level dependency summary.
        for (source, target) in &depends_on {
            graph.add_edge(source, target, EdgeKind::DependsOn);
        }

        let stats = graph.stats();
        let circular_dependencies = graph.cycles_over(DEPENDENCY_KINDS);
        let isolated_nodes = graph.isolated_nodes();

        AnalysisResult {
            graph: Arc::new(graph),
            stats,
            circular_dependencies,
            isolated_nodes,
            diagnostics,
            analysis_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Node id of the element a call was made from, when attribution found one.
fn caller_element_id(analysis: &FileAnalysis, call: &trellis_core::CallInfo) -> Option<String> {
    let caller = call.caller_function.as_ref()?;
    let name = match &call.caller_class {
        Some(class) => format!("{class}.{caller}"),
        None => caller.clone(),
    };
    analysis
        .elements
        .iter()
        .any(|e| e.name == name)
        .then(|| element_node_id(&analysis.file, &name))
}

/// Same-file, then same-directory, then global; within each bucket the
/// lexicographically first id wins.
fn resolve_callee(
    caller_file: &str,
    call: &trellis_core::CallInfo,
    by_name: &HashMap<&str, Vec<(&str, String)>>,
) -> Option<String> {
    // `this.method()` resolves against the caller's own class first.
    if call.callee_object.as_deref() == Some("this") {
        if let Some(class) = &call.caller_class {
            let qualified = format!("{class}.{}", call.callee_function);
            if let Some(candidates) = by_name.get(qualified.as_str()) {
                if let Some((_, id)) = candidates.iter().find(|(file, _)| *file == caller_file) {
                    return Some(id.clone());
                }
            }
        }
    }

    let candidates = by_name.get(call.callee_function.as_str())?;
    if let Some((_, id)) = candidates.iter().find(|(file, _)| *file == caller_file) {
        return Some(id.clone());
    }
    let caller_dir = parent_dir(caller_file);
    if let Some((_, id)) = candidates
        .iter()
        .find(|(file, _)| parent_dir(file) == caller_dir)
    {
        return Some(id.clone());
    }
    candidates.first().map(|(_, id)| id.clone())
}

fn parent_dir(file: &str) -> &str {
    file.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve a relative import specifier against the set of scanned files,
/// trying the bare path, the recognized extensions, and `index.*`.
/// External (non-relative) imports do not resolve.
fn resolve_import(importer: &str, specifier: &str, files: &HashSet<&str>) -> Option<String> {
    if !specifier.starts_with("./") && !specifier.starts_with("../") {
        return None;
    }
    let base = parent_dir(importer);
    let joined = join_normalized(base, specifier);

    if files.contains(joined.as_str()) {
        return Some(joined);
    }
    for ext in RESOLVE_EXTENSIONS {
        let with_ext = format!("{joined}.{ext}");
        if files.contains(with_ext.as_str()) {
            return Some(with_ext);
        }
    }
    for ext in RESOLVE_EXTENSIONS {
        let index = if joined.is_empty() {
            format!("index.{ext}")
        } else {
            format!("{joined}/index.{ext}")
        };
        if files.contains(index.as_str()) {
            return Some(index);
        }
    }
    None
}

/// Join and collapse `.` / `..` segments without touching the filesystem.
fn join_normalized(base: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = if base.is_empty() {
        Vec::new()
    } else {
        base.split('/').collect()
    };
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Scan a root and build its analysis in one step.
pub fn analyze(root: &Path, options: &trellis_scanner::ScanOptions) -> Result<AnalysisResult> {
    let scanner = trellis_scanner::Scanner::new();
    let outcome = scanner.scan(root, options)?;
    GraphBuilder::new().build(&outcome)
}
