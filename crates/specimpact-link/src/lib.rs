//! SpecImpact Link - Edge inference and incremental updates
//!
//! This crate discovers relationships between artifacts and keeps the
//! graph current as artifacts change. [`LinkInference`] proposes edges
//! from declared links, naming conventions, textual references, and the
//! similarity oracle; it never writes the graph itself. The
//! [`IncrementalUpdater`] is the sole writer: it re-infers only the
//! neighborhood of changed artifacts, diffs against existing edges, and
//! applies the result atomically per artifact.

mod infer;
mod update;

pub use infer::{InferenceConfig, LinkCandidate, LinkInference};
pub use update::{IncrementalUpdater, LinkConflict, UpdateError, UpdateReport};
