//! Trellis Drift — reference index harvesting and drift detection against
//! a freshly built analysis.

pub mod detector;
pub mod index;

pub use detector::{DriftOptions, DriftReport, DriftStatus, detect_drift};
pub use index::{index_references, next_available_id, parse_index, parse_index_line};
