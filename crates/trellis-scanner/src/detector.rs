//! Per-file analysis facade
//!
//! Parses once and runs both extractors over the same tree, then folds the
//! observed call sites back onto their caller elements. Results are cached
//! by path in a map owned by this detector; the cache is cleared explicitly
//! or invalidated per key by the orchestrator when it observes an mtime
//! change. This cache is deliberately separate from the scan cache, which
//! governs incremental scans.

use std::sync::Arc;

use dashmap::DashMap;
use trellis_core::error::{Error, Result};
use trellis_core::model::{CallInfo, Element, FileAnalysis};

use crate::language::SourceLanguage;
use crate::parser_pool::{ParseJob, ParserPool, create_parser_pool};

pub struct FileDetector {
    pool: ParserPool,
    cache: DashMap<String, Arc<FileAnalysis>>,
}

impl FileDetector {
    pub fn new() -> Self {
        FileDetector {
            pool: create_parser_pool(),
            cache: DashMap::new(),
        }
    }

    pub fn with_pool(pool: ParserPool) -> Self {
        FileDetector {
            pool,
            cache: DashMap::new(),
        }
    }

    /// Analyze `source` as `rel_path`, caching under `cache_key` (the
    /// absolute path). Repeated calls for the same key return the cached
    /// analysis without reparsing.
    pub fn analyze(
        &self,
        cache_key: &str,
        source: &str,
        rel_path: &str,
        language: SourceLanguage,
    ) -> Result<Arc<FileAnalysis>> {
        if let Some(hit) = self.cache.get(cache_key) {
            return Ok(Arc::clone(hit.value()));
        }
        let analysis = Arc::new(self.analyze_source(source, rel_path, language)?);
        self.cache.insert(cache_key.to_string(), Arc::clone(&analysis));
        Ok(analysis)
    }

    /// Uncached single-file analysis. Unsupported extensions yield an empty
    /// analysis, not an error; a file the parser cannot make sense of is a
    /// `Parse` error and emits no elements at all.
    pub fn analyze_source(
        &self,
        source: &str,
        rel_path: &str,
        language: SourceLanguage,
    ) -> Result<FileAnalysis> {
        let Some(backend) = language.backend() else {
            return Ok(FileAnalysis::empty(rel_path));
        };

        let tree = self.pool.parse_blocking(ParseJob {
            language,
            source: source.to_string(),
            path: rel_path.to_string(),
        })?;

        if tree.root_node().has_error() {
            return Err(Error::Parse {
                file: rel_path.to_string(),
                message: "syntax error".to_string(),
            });
        }

        let mut elements = backend.extract_elements(&tree, source, rel_path);
        let streams = backend.extract_edges(&tree, source);
        attach_calls(&mut elements, &streams.calls);

        Ok(FileAnalysis {
            file: rel_path.to_string(),
            elements,
            calls: streams.calls,
            imports: streams.imports,
            exports: streams.exports,
        })
    }

    /// Drop one cached entry (the orchestrator saw its mtime change).
    pub fn invalidate(&self, cache_key: &str) {
        self.cache.remove(cache_key);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for FileDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Record each call on its caller element's `calls` list. Method callers
/// are matched by their qualified `Class.method` name.
fn attach_calls(elements: &mut [Element], calls: &[CallInfo]) {
    for call in calls {
        let Some(caller) = &call.caller_function else {
            continue;
        };
        let wanted = match &call.caller_class {
            Some(class) => format!("{class}.{caller}"),
            None => caller.clone(),
        };
        if let Some(element) = elements.iter_mut().find(|e| e.name == wanted) {
            element.calls.push(call.callee_function.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::model::ElementKind;

    fn detector() -> FileDetector {
        FileDetector::new()
    }

    #[test]
    fn attaches_calls_to_caller_elements() {
        let d = detector();
        let analysis = d
            .analyze_source(
                "function a() { b(); c(); }\nfunction b() {}\nfunction c() {}",
                "attach.ts",
                SourceLanguage::Ts,
            )
            .unwrap();
        let a = analysis.elements.iter().find(|e| e.name == "a").unwrap();
        assert_eq!(a.calls, vec!["b", "c"]);
    }

    #[test]
    fn method_calls_attach_to_qualified_method() {
        let d = detector();
        let analysis = d
            .analyze_source(
                "class Svc { run() { this.step(); } step() {} }",
                "svc.ts",
                SourceLanguage::Ts,
            )
            .unwrap();
        let run = analysis
            .elements
            .iter()
            .find(|e| e.name == "Svc.run")
            .unwrap();
        assert_eq!(run.calls, vec!["step"]);
    }

    #[test]
    fn unsupported_extension_yields_empty_analysis() {
        let d = detector();
        let analysis = d
            .analyze_source("# not js", "notes.md", SourceLanguage::Other)
            .unwrap();
        assert!(analysis.elements.is_empty());
        assert!(analysis.calls.is_empty());
    }

    #[test]
    fn syntax_error_is_a_parse_error_with_no_elements() {
        let d = detector();
        let err = d
            .analyze_source("function ((((", "broken.ts", SourceLanguage::Ts)
            .unwrap_err();
        assert!(matches!(err, Error::Parse { ref file, .. } if file == "broken.ts"));
    }

    #[test]
    fn cache_serves_repeat_analyses_and_invalidates_per_key() {
        let d = detector();
        let first = d
            .analyze("/abs/x.ts", "function f() {}", "x.ts", SourceLanguage::Ts)
            .unwrap();
        let second = d
            .analyze("/abs/x.ts", "ignored on cache hit", "x.ts", SourceLanguage::Ts)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(d.cached_len(), 1);

        d.invalidate("/abs/x.ts");
        assert_eq!(d.cached_len(), 0);
        let third = d
            .analyze("/abs/x.ts", "function g() {}", "x.ts", SourceLanguage::Ts)
            .unwrap();
        assert_eq!(third.elements[0].name, "g");
        d.clear();
        assert_eq!(d.cached_len(), 0);
    }

    #[test]
    fn hooks_classified_through_full_pipeline() {
        let d = detector();
        let analysis = d
            .analyze_source(
                "export function useThing() { return useState(0); }",
                "useThing.ts",
                SourceLanguage::Ts,
            )
            .unwrap();
        let hook = &analysis.elements[0];
        assert_eq!(hook.kind, ElementKind::Hook);
        assert!(hook.exported);
        assert_eq!(hook.calls, vec!["useState"]);
    }
}
