//! Drift detection
//!
//! Reconciles previously recorded references against a freshly built
//! analysis. Every reference is assigned exactly one status; `moved` and
//! `renamed` reports carry a suggested replacement tag so callers can
//! repair their index mechanically.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use trellis_core::graph::{GraphNode, NodeKind};
use trellis_core::tags::{IndexedReference, Reference, format_tag};
use trellis_graph::AnalysisResult;

use crate::index::next_available_id;

/// What happened to one indexed reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftStatus {
    Unchanged,
    Moved,
    Renamed,
    Missing,
    Ambiguous,
    Error,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct DriftOptions {
    /// Maximum edit distance for a rename, as a fraction of the shorter
    /// name's length.
    pub similarity_threshold: f64,
    pub verbose: bool,
}

impl Default for DriftOptions {
    fn default() -> Self {
        DriftOptions {
            similarity_threshold: 0.7,
            verbose: false,
        }
    }
}

/// One reconciled reference.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    /// Gap-filled `drift_NNN` identifier, unique within the batch.
    pub id: String,
    pub indexed: IndexedReference,
    pub status: DriftStatus,
    /// Node id the reference resolves to now, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_element: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Replacement tag for `moved` and `renamed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    /// 0..=1.
    pub confidence: f64,
}

/// Classify every indexed reference against the current graph.
pub fn detect_drift(
    indexed: &[IndexedReference],
    analysis: &AnalysisResult,
    options: &DriftOptions,
) -> Vec<DriftReport> {
    let detector = Detector::new(analysis, options);
    let mut used_ids: HashSet<String> = HashSet::new();
    indexed
        .iter()
        .map(|reference| {
            let id = next_available_id("drift", &used_ids);
            used_ids.insert(id.clone());
            let report = detector.classify(id, reference);
            if options.verbose {
                tracing::debug!(
                    tag = %reference.original_tag,
                    status = ?report.status,
                    "classified reference"
                );
            }
            report
        })
        .collect()
}

struct Detector<'a> {
    options: &'a DriftOptions,
    /// Element nodes by bare name, each bucket sorted by id.
    elements_by_name: HashMap<&'a str, Vec<&'a GraphNode>>,
    /// Scanned file node ids.
    files: Vec<&'a str>,
    /// Files whose scan failed; references into them are `error`.
    failed_files: HashSet<&'a str>,
}

impl<'a> Detector<'a> {
    fn new(analysis: &'a AnalysisResult, options: &'a DriftOptions) -> Self {
        let mut elements_by_name: HashMap<&str, Vec<&GraphNode>> = HashMap::new();
        let mut files = Vec::new();
        for node in analysis.graph.nodes() {
            if node.kind == NodeKind::File {
                files.push(node.id.as_str());
            } else {
                elements_by_name.entry(node.name.as_str()).or_default().push(node);
            }
        }
        for bucket in elements_by_name.values_mut() {
            bucket.sort_by(|a, b| a.id.cmp(&b.id));
        }
        let failed_files = analysis
            .diagnostics
            .iter()
            .map(|d| d.file.as_str())
            .collect();
        Detector {
            options,
            elements_by_name,
            files,
            failed_files,
        }
    }

    fn classify(&self, id: String, indexed: &IndexedReference) -> DriftReport {
        let reference = &indexed.reference;

        if reference.kind.is_empty() {
            return self.report(
                id,
                indexed,
                DriftStatus::Unknown,
                None,
                Some("indexed tag does not parse".to_string()),
                None,
                0.0,
            );
        }

        if self
            .failed_files
            .iter()
            .any(|f| file_matches(f, &reference.path))
        {
            return self.report(
                id,
                indexed,
                DriftStatus::Error,
                None,
                Some(format!("scan failed for {}", reference.path)),
                None,
                0.0,
            );
        }

        let matching_files: Vec<&str> = self
            .files
            .iter()
            .copied()
            .filter(|f| file_matches(f, &reference.path))
            .collect();

        let Some(name) = reference.element.as_deref() else {
            // File-level reference: present or not.
            return match matching_files.first() {
                Some(file) => self.report(
                    id,
                    indexed,
                    DriftStatus::Unchanged,
                    Some(file.to_string()),
                    None,
                    None,
                    1.0,
                ),
                None => self.report(
                    id,
                    indexed,
                    DriftStatus::Missing,
                    None,
                    Some(format!("file {} is not in the scan", reference.path)),
                    None,
                    0.0,
                ),
            };
        };

        let candidates: &[&GraphNode] = self
            .elements_by_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let in_file: Vec<&&GraphNode> = candidates
            .iter()
            .filter(|n| file_matches(&n.file, &reference.path))
            .collect();

        if let Some(first) = in_file.first() {
            let line_matches = reference.line.is_none()
                || in_file.iter().any(|n| n.line == reference.line);
            if line_matches {
                let current = in_file
                    .iter()
                    .find(|n| reference.line.is_none() || n.line == reference.line)
                    .unwrap_or(first);
                return self.report(
                    id,
                    indexed,
                    DriftStatus::Unchanged,
                    Some(current.id.clone()),
                    None,
                    None,
                    1.0,
                );
            }
            // Same file and name, different line.
            let fix = retarget(reference, None, first.line);
            return self.report(
                id,
                indexed,
                DriftStatus::Moved,
                Some(first.id.clone()),
                Some(format!(
                    "line changed from {} to {}",
                    reference.line.map_or_else(|| "?".to_string(), |l| l.to_string()),
                    first.line.map_or_else(|| "?".to_string(), |l| l.to_string()),
                )),
                fix,
                1.0,
            );
        }

        match candidates {
            [] => self.classify_renamed_or_missing(id, indexed, name, &matching_files),
            [only] => {
                // The name lives in exactly one other file now.
                let fix = retarget(reference, Some(&only.file), only.line);
                self.report(
                    id,
                    indexed,
                    DriftStatus::Moved,
                    Some(only.id.clone()),
                    Some(format!("moved from {} to {}", reference.path, only.file)),
                    fix,
                    1.0,
                )
            }
            many => {
                let ids: Vec<&str> = many.iter().map(|n| n.id.as_str()).collect();
                self.report(
                    id,
                    indexed,
                    DriftStatus::Ambiguous,
                    None,
                    Some(format!("{} candidates: {}", ids.len(), ids.join(", "))),
                    None,
                    0.0,
                )
            }
        }
    }

    /// The name is gone everywhere. If another element now occupies the
    /// indexed line of the indexed file and its name is close enough, call
    /// it a rename; otherwise the reference is missing.
    fn classify_renamed_or_missing(
        &self,
        id: String,
        indexed: &IndexedReference,
        name: &str,
        matching_files: &[&str],
    ) -> DriftReport {
        let reference = &indexed.reference;
        if let (Some(_), Some(line)) = (matching_files.first(), reference.line) {
            // All elements now occupying the indexed line of that file,
            // ranked by name similarity (ties by id, for determinism).
            let mut occupants: Vec<&GraphNode> = self
                .elements_by_name
                .values()
                .flatten()
                .copied()
                .filter(|n| file_matches(&n.file, &reference.path))
                .filter(|n| n.line == Some(line) && n.name != name)
                .collect();
            occupants.sort_by(|a, b| {
                strsim::normalized_levenshtein(name, &b.name)
                    .partial_cmp(&strsim::normalized_levenshtein(name, &a.name))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            if let Some(found) = occupants.first() {
                let shorter = name.len().min(found.name.len()) as f64;
                let distance = strsim::levenshtein(name, &found.name) as f64;
                if shorter > 0.0 && distance <= self.options.similarity_threshold * shorter {
                    let confidence = strsim::normalized_levenshtein(name, &found.name);
                    let mut renamed = reference.clone();
                    renamed.element = Some(found.name.clone());
                    renamed.line = found.line;
                    let fix = format_tag(&renamed).ok();
                    return self.report(
                        id,
                        indexed,
                        DriftStatus::Renamed,
                        Some(found.id.clone()),
                        Some(format!("{name} appears renamed to {}", found.name)),
                        fix,
                        confidence,
                    );
                }
            }
        }
        self.report(
            id,
            indexed,
            DriftStatus::Missing,
            None,
            Some(format!("{name} is not in the current graph")),
            None,
            0.0,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        id: String,
        indexed: &IndexedReference,
        status: DriftStatus,
        current_element: Option<String>,
        message: Option<String>,
        suggested_fix: Option<String>,
        confidence: f64,
    ) -> DriftReport {
        DriftReport {
            id,
            indexed: indexed.clone(),
            status,
            current_element,
            message,
            suggested_fix,
            confidence,
        }
    }
}

/// A scanned file matches an indexed path either exactly or with its
/// extension stripped (tags usually omit extensions).
fn file_matches(scanned: &str, path: &str) -> bool {
    if scanned == path {
        return true;
    }
    scanned
        .rsplit_once('.')
        .is_some_and(|(stem, _)| stem == path)
}

/// Build the replacement tag for a moved reference.
fn retarget(reference: &Reference, new_file: Option<&str>, new_line: Option<u32>) -> Option<String> {
    let mut fixed = reference.clone();
    if let Some(file) = new_file {
        fixed.path = file
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| file.to_string());
    }
    fixed.line = new_line;
    format_tag(&fixed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::parse_index_line;
    use std::sync::Arc;
    use trellis_core::model::{Element, ElementKind, FileAnalysis};
    use trellis_core::tags::parse_tag;
    use trellis_graph::GraphBuilder;
    use trellis_scanner::orchestrator::{DiagnosticKind, ScanDiagnostic};

    fn element(file: &str, name: &str, line: u32) -> Element {
        Element {
            kind: ElementKind::Function,
            name: name.to_string(),
            file: file.to_string(),
            line,
            exported: false,
            parameters: Vec::new(),
            calls: Vec::new(),
            complexity: None,
        }
    }

    fn analysis_with(
        analyses: Vec<FileAnalysis>,
        diagnostics: Vec<ScanDiagnostic>,
    ) -> trellis_graph::AnalysisResult {
        let wrapped: Vec<Arc<FileAnalysis>> = analyses.into_iter().map(Arc::new).collect();
        GraphBuilder::new().build_from_analyses(&wrapped, diagnostics)
    }

    fn indexed(tag: &str) -> IndexedReference {
        parse_index_line(tag, "refs.txt", 1)
    }

    fn current() -> trellis_graph::AnalysisResult {
        let mut svc = FileAnalysis::empty("analyzer/service.ts");
        svc.elements.push(element("analyzer/service.ts", "analyze", 96));
        svc.elements.push(element("analyzer/service.ts", "reportDrift", 120));
        let mut util = FileAnalysis::empty("shared/util.ts");
        util.elements.push(element("shared/util.ts", "relocated", 8));
        let mut dup_a = FileAnalysis::empty("a/dup.ts");
        dup_a.elements.push(element("a/dup.ts", "everywhere", 3));
        let mut dup_b = FileAnalysis::empty("b/dup.ts");
        dup_b.elements.push(element("b/dup.ts", "everywhere", 9));
        analysis_with(vec![svc, util, dup_a, dup_b], Vec::new())
    }

    #[test]
    fn unchanged_when_file_line_and_name_agree() {
        let analysis = current();
        let reports = detect_drift(
            &[indexed("@Fn/analyzer/service#analyze:96")],
            &analysis,
            &DriftOptions::default(),
        );
        assert_eq!(reports[0].status, DriftStatus::Unchanged);
        assert_eq!(
            reports[0].current_element.as_deref(),
            Some("analyzer/service.ts:analyze")
        );
        assert_eq!(reports[0].confidence, 1.0);
    }

    #[test]
    fn moved_when_only_the_line_changed() {
        let analysis = current();
        let reports = detect_drift(
            &[indexed("@Fn/analyzer/service#analyze:12")],
            &analysis,
            &DriftOptions::default(),
        );
        let report = &reports[0];
        assert_eq!(report.status, DriftStatus::Moved);
        assert_eq!(report.confidence, 1.0);
        let fix = report.suggested_fix.as_deref().unwrap();
        assert_eq!(fix, "@Fn/analyzer/service#analyze:96");
        assert!(parse_tag(fix).is_ok());
    }

    #[test]
    fn moved_when_the_name_lives_in_one_other_file() {
        let analysis = current();
        let reports = detect_drift(
            &[indexed("@Fn/analyzer/service#relocated:5")],
            &analysis,
            &DriftOptions::default(),
        );
        let report = &reports[0];
        assert_eq!(report.status, DriftStatus::Moved);
        assert_eq!(report.current_element.as_deref(), Some("shared/util.ts:relocated"));
        assert_eq!(
            report.suggested_fix.as_deref(),
            Some("@Fn/shared/util#relocated:8")
        );
    }

    #[test]
    fn renamed_when_a_similar_name_occupies_the_line() {
        let analysis = current();
        // `reportDrift` sits at line 120; the index remembers `reportDrif`.
        let reports = detect_drift(
            &[indexed("@Fn/analyzer/service#reportDrif:120")],
            &analysis,
            &DriftOptions::default(),
        );
        let report = &reports[0];
        assert_eq!(report.status, DriftStatus::Renamed);
        assert!(report.confidence > 0.8 && report.confidence < 1.0);
        assert_eq!(
            report.suggested_fix.as_deref(),
            Some("@Fn/analyzer/service#reportDrift:120")
        );
    }

    #[test]
    fn dissimilar_occupant_is_missing_not_renamed() {
        let analysis = current();
        let reports = detect_drift(
            &[indexed("@Fn/analyzer/service#zzz:120")],
            &analysis,
            &DriftOptions::default(),
        );
        assert_eq!(reports[0].status, DriftStatus::Missing);
    }

    #[test]
    fn missing_when_the_name_is_gone() {
        let analysis = current();
        let reports = detect_drift(
            &[indexed("@Fn/analyzer/service#deletedLongAgo:4")],
            &analysis,
            &DriftOptions::default(),
        );
        assert_eq!(reports[0].status, DriftStatus::Missing);
        assert!(reports[0].suggested_fix.is_none());
    }

    #[test]
    fn ambiguous_when_many_files_claim_the_name() {
        let analysis = current();
        let reports = detect_drift(
            &[indexed("@Fn/gone/file#everywhere:3")],
            &analysis,
            &DriftOptions::default(),
        );
        let report = &reports[0];
        assert_eq!(report.status, DriftStatus::Ambiguous);
        assert!(report.message.as_deref().unwrap().contains("a/dup.ts:everywhere"));
        assert!(report.message.as_deref().unwrap().contains("b/dup.ts:everywhere"));
    }

    #[test]
    fn error_when_the_indexed_file_failed_to_scan() {
        let analysis = analysis_with(
            Vec::new(),
            vec![ScanDiagnostic {
                file: "broken/widget.ts".to_string(),
                kind: DiagnosticKind::Parse,
                message: "syntax error".to_string(),
            }],
        );
        let reports = detect_drift(
            &[indexed("@Fn/broken/widget#spin:4")],
            &analysis,
            &DriftOptions::default(),
        );
        assert_eq!(reports[0].status, DriftStatus::Error);
    }

    #[test]
    fn unknown_when_the_recorded_tag_never_parsed() {
        let analysis = current();
        let reports = detect_drift(&[indexed("not a tag at all")], &analysis, &DriftOptions::default());
        assert_eq!(reports[0].status, DriftStatus::Unknown);
    }

    #[test]
    fn file_level_references_check_presence_only() {
        let analysis = current();
        let reports = detect_drift(
            &[
                indexed("@File/analyzer/service"),
                indexed("@File/gone/forever"),
            ],
            &analysis,
            &DriftOptions::default(),
        );
        assert_eq!(reports[0].status, DriftStatus::Unchanged);
        assert_eq!(reports[1].status, DriftStatus::Missing);
    }

    #[test]
    fn every_reference_gets_exactly_one_status_and_a_gap_filled_id() {
        let analysis = current();
        let batch = vec![
            indexed("@Fn/analyzer/service#analyze:96"),
            indexed("@Fn/analyzer/service#analyze:1"),
            indexed("@Fn/analyzer/service#deletedLongAgo:4"),
            indexed("@Fn/gone/file#everywhere:3"),
            indexed("garbage"),
        ];
        let reports = detect_drift(&batch, &analysis, &DriftOptions::default());
        assert_eq!(reports.len(), batch.len());
        let ids: Vec<&str> = reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["drift_001", "drift_002", "drift_003", "drift_004", "drift_005"]);
        for report in &reports {
            assert!((0.0..=1.0).contains(&report.confidence));
        }
    }
}
