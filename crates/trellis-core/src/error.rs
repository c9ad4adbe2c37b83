//! Error taxonomy shared across the engine crates

use thiserror::Error;

/// Engine-wide error type.
///
/// Per-file failures (`Parse`, `Io`) are aggregated as scan diagnostics and
/// never abort a scan; the remaining variants surface to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The parser rejected a source file. Carries the file and diagnostic.
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// A reference tag did not match the wire grammar.
    #[error("invalid reference tag format: {0}")]
    InvalidFormat(String),

    /// A reference tag's line group was present but not a positive integer.
    #[error("invalid line number in reference tag: {0}")]
    InvalidLine(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A query or impact target is not a node in the graph.
    #[error("unknown element: {0}")]
    UnknownElement(String),

    /// A scan was cancelled cooperatively. The scanner itself returns the
    /// partial result with a flag; this surfaces when a consumer (the
    /// graph builder, unless told `allow_partial`) refuses that partial
    /// result.
    #[error("scan was cancelled before completion")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
