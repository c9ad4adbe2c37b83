//! Source language dispatch
//!
//! The recognized extensions map to a tagged variant; each variant that the
//! engine can parse exposes a backend implementing the extraction
//! capabilities. Unrecognized extensions are `Other` and scan to an empty
//! analysis rather than an error.

use std::path::Path;

use tree_sitter::Tree;
use trellis_core::model::Element;

use crate::edges::EdgeStreams;
use crate::extract;

/// The recognized source languages, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLanguage {
    Ts,
    Tsx,
    Js,
    Jsx,
    Other,
}

impl SourceLanguage {
    /// Detect language from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts") => SourceLanguage::Ts,
            Some("tsx") => SourceLanguage::Tsx,
            Some("js") | Some("mjs") | Some("cjs") => SourceLanguage::Js,
            Some("jsx") => SourceLanguage::Jsx,
            _ => SourceLanguage::Other,
        }
    }

    /// The tree-sitter grammar for this language, when parseable.
    pub fn grammar(&self) -> Option<tree_sitter::Language> {
        match self {
            SourceLanguage::Ts => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            SourceLanguage::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            SourceLanguage::Js | SourceLanguage::Jsx => {
                Some(tree_sitter_javascript::LANGUAGE.into())
            }
            SourceLanguage::Other => None,
        }
    }

    /// True for the JSX-flavored extensions, which allow component
    /// classification by name.
    pub fn jsx(&self) -> bool {
        matches!(self, SourceLanguage::Tsx | SourceLanguage::Jsx)
    }

    /// The extraction backend for this language, when supported.
    pub fn backend(&self) -> Option<&'static dyn LanguageBackend> {
        static PLAIN: JsTsBackend = JsTsBackend { jsx: false };
        static JSX: JsTsBackend = JsTsBackend { jsx: true };
        match self {
            SourceLanguage::Ts | SourceLanguage::Js => Some(&PLAIN),
            SourceLanguage::Tsx | SourceLanguage::Jsx => Some(&JSX),
            SourceLanguage::Other => None,
        }
    }
}

/// Extraction capabilities of a parseable language.
///
/// The orchestrator holds a [`SourceLanguage`] and resolves the backend per
/// file; backends are stateless and shared.
pub trait LanguageBackend: Send + Sync {
    /// Elements declared in the file, in source order.
    fn extract_elements(&self, tree: &Tree, source: &str, file: &str) -> Vec<Element>;

    /// The call, import, and export streams of the file.
    fn extract_edges(&self, tree: &Tree, source: &str) -> EdgeStreams;
}

/// Shared backend for the TypeScript/JavaScript grammar family.
struct JsTsBackend {
    jsx: bool,
}

impl LanguageBackend for JsTsBackend {
    fn extract_elements(&self, tree: &Tree, source: &str, file: &str) -> Vec<Element> {
        extract::extract_elements(tree, source, file, self.jsx)
    }

    fn extract_edges(&self, tree: &Tree, source: &str) -> EdgeStreams {
        crate::edges::extract_edges(tree, source)
    }
}
