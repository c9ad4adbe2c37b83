//! Core data structures for extracted elements and per-file analyses

use serde::{Deserialize, Serialize};

/// Discriminates what kind of code entity an element represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Function,
    Class,
    /// A class-body member. Method names are qualified as `Class.method`.
    Method,
    /// A function whose name matches `^use[A-Z]`.
    Hook,
    Constant,
    Interface,
    Enum,
    #[serde(rename = "type")]
    TypeAlias,
    Component,
    Unknown,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Function => "function",
            ElementKind::Class => "class",
            ElementKind::Method => "method",
            ElementKind::Hook => "hook",
            ElementKind::Constant => "constant",
            ElementKind::Interface => "interface",
            ElementKind::Enum => "enum",
            ElementKind::TypeAlias => "type",
            ElementKind::Component => "component",
            ElementKind::Unknown => "unknown",
        }
    }
}

/// One declared parameter of a function or method.
///
/// Destructured parameters are recorded by the identifiers they bind, joined
/// with `,` in `name`, not by the binding pattern text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub has_default: bool,
    pub is_rest: bool,
    pub is_destructured: bool,
}

impl Parameter {
    pub fn plain(name: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            has_default: false,
            is_rest: false,
            is_destructured: false,
        }
    }
}

/// An extracted code entity.
///
/// `(kind, file, line, name)` uniquely identifies an element within one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub kind: ElementKind,
    /// Class methods are qualified as `ClassName.methodName`.
    pub name: String,
    /// Normalized forward-slash path, relative to the scan root.
    pub file: String,
    /// 1-based line of the declaration start.
    pub line: u32,
    /// True when the element is reachable through any export path.
    pub exported: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    /// Callee names observed in the body, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<String>,
    /// Cyclomatic complexity (1 + decision points), for scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f32>,
}

impl Element {
    /// Graph node id for this element: `"<file>:<name>"`.
    pub fn node_id(&self) -> String {
        element_node_id(&self.file, &self.name)
    }
}

/// How a call site invokes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Function,
    Method,
    Constructor,
}

/// One observed call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInfo {
    pub callee_function: String,
    /// Receiver expression for method calls (`this`, an identifier, `super`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callee_object: Option<String>,
    pub call_type: CallType,
    /// Nearest enclosing function, method, or bound arrow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_class: Option<String>,
    pub line: u32,
}

/// Module system a binding statement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleSystem {
    Esm,
    CommonJs,
}

/// Sentinel specifier for namespace and `require` imports.
pub const NAMESPACE_SPECIFIER: &str = "*";

/// One import statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportInfo {
    pub source: String,
    pub specifiers: Vec<String>,
    pub is_default: bool,
    pub import_type: ModuleSystem,
}

/// One export statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportInfo {
    pub specifiers: Vec<String>,
    pub is_default: bool,
    pub export_type: ModuleSystem,
}

/// Everything the scanner extracts from one source file.
///
/// Immutable once produced; the graph builder is the single consumer that
/// joins these across files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    /// Normalized forward-slash path, relative to the scan root.
    pub file: String,
    pub elements: Vec<Element>,
    pub calls: Vec<CallInfo>,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
}

impl FileAnalysis {
    pub fn empty(file: impl Into<String>) -> Self {
        FileAnalysis {
            file: file.into(),
            elements: Vec::new(),
            calls: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }
}

/// Build an element node id. File nodes use the path alone.
pub fn element_node_id(file: &str, name: &str) -> String {
    format!("{file}:{name}")
}

/// Split a node id into `(file, element_name)`.
///
/// Splits on the *last* `:` so drive-letter-style paths (`C:/src/a.ts`)
/// survive. Ids without a `:` are file nodes.
pub fn split_node_id(id: &str) -> (&str, Option<&str>) {
    match id.rsplit_once(':') {
        Some((file, name)) => (file, Some(name)),
        None => (id, None),
    }
}

/// Normalize a path to forward slashes with no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let p = path.replace('\\', "/");
    match p.strip_prefix("./") {
        Some(stripped) => stripped.to_string(),
        None => p,
    }
}
