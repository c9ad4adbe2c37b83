//! Scan orchestration
//!
//! The orchestrator owns all blocking I/O of a scan: it walks the tree,
//! stats and reads files, consults the shared scan cache, dispatches
//! per-file parsing to worker threads in bounded batches, and joins the
//! immutable per-file results back in walk order. Progress callbacks fire
//! on the orchestrator thread, once per file including cache hits, with
//! `files_processed` strictly monotonic; cancellation is checked between
//! files and before each callback.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use trellis_core::cache::{BoundedCache, CacheStats, EstimateSize};
use trellis_core::error::{Error, Result};
use trellis_core::model::{Element, FileAnalysis};
use trellis_core::tags::{IndexedReference, extract_tags_detailed};

use crate::detector::FileDetector;
use crate::language::SourceLanguage;
use crate::walker::{DEFAULT_EXTENSIONS, DiscoveredFile, build_exclude_set, discover_files};

/// Default scan cache budget: 50 MB of estimated analysis bytes.
pub const DEFAULT_SCAN_CACHE_BYTES: usize = 50 * 1024 * 1024;

/// Cooperative cancellation signal, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One progress report, delivered in walk order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub current_file: String,
    /// Strictly monotonic, `1..=total_files`.
    pub files_processed: usize,
    pub total_files: usize,
    /// Cumulative elements seen so far.
    pub elements_found: usize,
    /// `round(100 * files_processed / total_files)`; the final report is
    /// always 100.
    pub percent_complete: u32,
}

pub type ProgressCallback = Box<dyn Fn(&ScanProgress) + Send + Sync>;

/// Scan configuration. Empty `extensions`/`exclude` select the defaults.
pub struct ScanOptions {
    pub recursive: bool,
    pub extensions: Vec<String>,
    pub exclude: Vec<String>,
    /// Also harvest reference tags from file text (typically comments).
    pub include_comments: bool,
    pub verbose: bool,
    pub on_progress: Option<ProgressCallback>,
    pub cancel: Option<CancelToken>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            recursive: true,
            extensions: Vec::new(),
            exclude: Vec::new(),
            include_comments: false,
            verbose: false,
            on_progress: None,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Parse,
    Io,
    Tag,
}

/// A per-file problem that did not abort the scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDiagnostic {
    pub file: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Everything a scan produced.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Per-file analyses in walk order. Files that failed are absent.
    pub analyses: Vec<Arc<FileAnalysis>>,
    pub diagnostics: Vec<ScanDiagnostic>,
    /// Harvested reference tags, when `include_comments` was set.
    pub tags: Vec<IndexedReference>,
    /// True when the scan stopped at a cancellation check; `analyses` holds
    /// the partial result assembled so far.
    pub cancelled: bool,
    pub total_files: usize,
    pub files_processed: usize,
    pub duration_ms: u64,
}

impl ScanOutcome {
    /// Concatenated elements across all files, in walk order.
    pub fn elements(&self) -> Vec<Element> {
        self.analyses
            .iter()
            .flat_map(|a| a.elements.iter().cloned())
            .collect()
    }

    pub fn element_count(&self) -> usize {
        self.analyses.iter().map(|a| a.elements.len()).sum()
    }
}

/// A scan-cache entry: the analysis plus the mtime it was computed at.
#[derive(Clone)]
struct CachedScan {
    analysis: Arc<FileAnalysis>,
    mtime_ms: u64,
}

impl EstimateSize for CachedScan {
    fn estimate_size(&self) -> usize {
        self.analysis.estimate_size() + 8
    }
}

/// The scan entry point. One scanner may serve many scans of the same
/// root; the scan cache is shared across them and keyed by absolute path
/// plus mtime equality.
pub struct Scanner {
    detector: FileDetector,
    scan_cache: Mutex<BoundedCache<String, CachedScan>>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_SCAN_CACHE_BYTES)
    }

    pub fn with_cache_size(max_bytes: usize) -> Self {
        Scanner {
            detector: FileDetector::new(),
            scan_cache: Mutex::new(BoundedCache::new(max_bytes)),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.scan_cache.lock().expect("scan cache lock").stats()
    }

    /// Drop both caches.
    pub fn clear_caches(&self) {
        self.scan_cache.lock().expect("scan cache lock").clear();
        self.detector.clear();
    }

    /// Walk `root` and analyze every matching file. Per-file failures are
    /// diagnostics, not errors; a bad root or a poisoned walk is an error.
    pub fn scan(&self, root: &Path, options: &ScanOptions) -> Result<ScanOutcome> {
        let started = Instant::now();
        let extensions: Vec<String> = if options.extensions.is_empty() {
            DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
        } else {
            options.extensions.clone()
        };
        let excludes = build_exclude_set(&options.exclude);
        let files = discover_files(root, &extensions, &excludes, options.recursive)?;
        let total_files = files.len();
        if options.verbose {
            tracing::debug!(total_files, root = %root.display(), "scan starting");
        }

        let mut outcome = ScanOutcome {
            analyses: Vec::with_capacity(total_files),
            diagnostics: Vec::new(),
            tags: Vec::new(),
            cancelled: false,
            total_files,
            files_processed: 0,
            duration_ms: 0,
        };
        let mut elements_found = 0usize;

        let batch = std::thread::available_parallelism()
            .map(|n| n.get().max(2))
            .unwrap_or(2);

        'scan: for chunk in files.chunks(batch) {
            if self.check_cancelled(options) {
                outcome.cancelled = true;
                break 'scan;
            }

            let mut items: Vec<WorkItem> = chunk.iter().map(|f| self.prepare(f, options)).collect();
            self.analyze_batch(&mut items);

            for item in items {
                if self.check_cancelled(options) {
                    outcome.cancelled = true;
                    break 'scan;
                }
                self.finish_item(item, options, &mut outcome, &mut elements_found);
            }
        }

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        if options.verbose {
            tracing::debug!(
                files = outcome.files_processed,
                elements = elements_found,
                cancelled = outcome.cancelled,
                "scan finished"
            );
        }
        Ok(outcome)
    }

    /// [`Self::scan`] on a blocking task, for hosts on an async runtime.
    pub async fn scan_async(self: Arc<Self>, root: PathBuf, options: ScanOptions) -> Result<ScanOutcome> {
        tokio::task::spawn_blocking(move || self.scan(&root, &options))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(format!("scan task failed: {e}"))))?
    }

    fn check_cancelled(&self, options: &ScanOptions) -> bool {
        options.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Serial phase: stat, consult the scan cache, and read source for
    /// misses (and for hits when tag harvesting needs the text).
    fn prepare(&self, file: &DiscoveredFile, options: &ScanOptions) -> WorkItem {
        let key = file.absolute.to_string_lossy().to_string();
        let mtime_ms = file_mtime_ms(&file.absolute);

        let cached = {
            let mut cache = self.scan_cache.lock().expect("scan cache lock");
            match cache.get(&key) {
                Some(entry) if entry.mtime_ms == mtime_ms => Some(Arc::clone(&entry.analysis)),
                _ => None,
            }
        };

        if let Some(analysis) = cached {
            let source = options
                .include_comments
                .then(|| std::fs::read_to_string(&file.absolute).ok())
                .flatten();
            return WorkItem {
                relative: file.relative.clone(),
                language: file.language,
                key,
                mtime_ms,
                source,
                cached: Some(analysis),
                parsed: None,
                error: None,
            };
        }

        // The file changed (or was never seen): any detector entry for it
        // is stale now.
        self.detector.invalidate(&key);

        match std::fs::read_to_string(&file.absolute) {
            Ok(source) => WorkItem {
                relative: file.relative.clone(),
                language: file.language,
                key,
                mtime_ms,
                source: Some(source),
                cached: None,
                parsed: None,
                error: None,
            },
            Err(e) => WorkItem {
                relative: file.relative.clone(),
                language: file.language,
                key,
                mtime_ms,
                source: None,
                cached: None,
                parsed: None,
                error: Some(Error::Io(e)),
            },
        }
    }

    /// Parallel phase: per-file parse and extraction on scoped threads,
    /// each feeding the shared parser pool. Results land back on the items
    /// so the serial phase can consume them in walk order.
    fn analyze_batch(&self, items: &mut [WorkItem]) {
        let detector = &self.detector;
        let pending: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.cached.is_none() && item.error.is_none())
            .map(|(i, _)| i)
            .collect();

        let results: Vec<(usize, Result<Arc<FileAnalysis>>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = pending
                .iter()
                .map(|&i| {
                    let item = &items[i];
                    let source = item.source.clone().unwrap_or_default();
                    let key = item.key.clone();
                    let relative = item.relative.clone();
                    let language = item.language;
                    (
                        i,
                        scope.spawn(move || detector.analyze(&key, &source, &relative, language)),
                    )
                })
                .collect();
            handles
                .into_iter()
                .map(|(i, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(Error::Parse {
                            file: items_label(i),
                            message: "analysis worker panicked".to_string(),
                        })
                    });
                    (i, result)
                })
                .collect()
        });

        for (i, result) in results {
            match result {
                Ok(analysis) => items[i].parsed = Some(analysis),
                Err(e) => items[i].error = Some(e),
            }
        }
    }

    /// Serial phase: cache update, diagnostics, tag harvest, and the
    /// progress callback for one file.
    fn finish_item(
        &self,
        item: WorkItem,
        options: &ScanOptions,
        outcome: &mut ScanOutcome,
        elements_found: &mut usize,
    ) {
        let analysis = match (&item.cached, &item.parsed, item.error) {
            (Some(analysis), _, _) => Some(Arc::clone(analysis)),
            (_, Some(analysis), _) => {
                let mut cache = self.scan_cache.lock().expect("scan cache lock");
                cache.set(
                    item.key.clone(),
                    CachedScan {
                        analysis: Arc::clone(analysis),
                        mtime_ms: item.mtime_ms,
                    },
                    None,
                );
                Some(Arc::clone(analysis))
            }
            (_, _, Some(error)) => {
                let kind = match &error {
                    Error::Io(_) => DiagnosticKind::Io,
                    _ => DiagnosticKind::Parse,
                };
                outcome.diagnostics.push(ScanDiagnostic {
                    file: item.relative.clone(),
                    kind,
                    message: error.to_string(),
                });
                None
            }
            _ => None,
        };

        if options.include_comments {
            if let Some(source) = &item.source {
                harvest_tags(source, &item.relative, &mut outcome.tags, &mut outcome.diagnostics);
            }
        }

        if let Some(analysis) = analysis {
            *elements_found += analysis.elements.len();
            outcome.analyses.push(analysis);
        }

        outcome.files_processed += 1;
        if let Some(callback) = &options.on_progress {
            let percent = if outcome.total_files == 0 {
                100
            } else {
                ((outcome.files_processed as f64 / outcome.total_files as f64) * 100.0).round()
                    as u32
            };
            callback(&ScanProgress {
                current_file: item.relative,
                files_processed: outcome.files_processed,
                total_files: outcome.total_files,
                elements_found: *elements_found,
                percent_complete: percent,
            });
        }
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

struct WorkItem {
    relative: String,
    language: SourceLanguage,
    key: String,
    mtime_ms: u64,
    source: Option<String>,
    cached: Option<Arc<FileAnalysis>>,
    parsed: Option<Arc<FileAnalysis>>,
    error: Option<Error>,
}

fn items_label(index: usize) -> String {
    format!("batch item {index}")
}

/// Convenience wrapper: one-shot scan with a fresh scanner.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<ScanOutcome> {
    Scanner::new().scan(root, options)
}

fn file_mtime_ms(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Pull reference tags out of file text, line by line, keeping provenance.
fn harvest_tags(
    source: &str,
    relative: &str,
    tags: &mut Vec<IndexedReference>,
    diagnostics: &mut Vec<ScanDiagnostic>,
) {
    for (i, line_text) in source.lines().enumerate() {
        if !line_text.contains('@') {
            continue;
        }
        let (found, warnings) = extract_tags_detailed(line_text);
        for tag in found {
            tags.push(IndexedReference {
                reference: tag.reference,
                file: relative.to_string(),
                index_line: i as u32 + 1,
                original_tag: tag.text,
            });
        }
        for warning in warnings {
            diagnostics.push(ScanDiagnostic {
                file: relative.to_string(),
                kind: DiagnosticKind::Tag,
                message: warning,
            });
        }
    }
}
