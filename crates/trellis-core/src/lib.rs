//! Trellis Core — element model, dependency graph, reference tag codec,
//! and the bounded scan cache shared by the engine crates.

pub mod cache;
pub mod error;
pub mod export;
pub mod graph;
pub mod model;
pub mod tags;

pub use cache::{BoundedCache, CacheStats, EstimateSize};
pub use error::{Error, Result};
pub use export::{EXPORT_VERSION, GraphExport, export_graph, import_graph};
pub use graph::{
    DependencyGraph, EdgeKind, GraphEdge, GraphNode, GraphStats, NodeKind, NodeMetadata,
};
pub use model::{
    CallInfo, CallType, Element, ElementKind, ExportInfo, FileAnalysis, ImportInfo, ModuleSystem,
    NAMESPACE_SPECIFIER, Parameter, element_node_id, normalize_path, split_node_id,
};
pub use tags::{
    ExtractedTag, IndexedReference, Reference, extract_tags, extract_tags_detailed, format_tag,
    is_valid, parse_tag,
};
