//! Trellis Scanner — tree-sitter element extraction, per-file edge
//! detection, and the scan orchestrator.

pub mod ast;
pub mod detector;
pub mod edges;
pub mod extract;
pub mod language;
pub mod orchestrator;
pub mod parser_pool;
pub mod walker;

pub use detector::FileDetector;
pub use edges::EdgeStreams;
pub use language::{LanguageBackend, SourceLanguage};
pub use orchestrator::{
    CancelToken, DEFAULT_SCAN_CACHE_BYTES, DiagnosticKind, ProgressCallback, ScanDiagnostic,
    ScanOptions, ScanOutcome, ScanProgress, Scanner, scan,
};
pub use parser_pool::{ParseJob, ParserPool, create_parser_pool};
pub use walker::{DEFAULT_EXCLUDES, DEFAULT_EXTENSIONS, DiscoveredFile, discover_files};
