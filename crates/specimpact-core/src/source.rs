//! Capability traits implemented by external collaborators.
//!
//! The graph core never reads files, runs embeddings, or parses spec
//! formats. Anything that does lives behind one of these traits.

use crate::Artifact;
use thiserror::Error;

/// Failure of the similarity oracle.
///
/// Oracle failures never fail an update: link inference degrades to the
/// non-oracle strategies and logs a warning.
#[derive(Error, Debug)]
#[error("similarity oracle unavailable: {0}")]
pub struct OracleError(pub String);

/// Delivers resolved artifacts to the incremental updater.
///
/// `since` is an opaque marker the source hands out; `None` means "from
/// the beginning", i.e. every known artifact.
pub trait ArtifactSource {
    fn list_changed(&self, since: Option<&str>) -> Vec<Artifact>;
}

/// Scores semantic similarity between two artifacts.
///
/// Implementations typically sit on top of a vector store; the core only
/// sees scores in `[0, 1]` and candidate id lists.
pub trait SimilarityOracle {
    /// Similarity score in `[0.0, 1.0]`.
    fn score(&self, a: &Artifact, b: &Artifact) -> Result<f64, OracleError>;

    /// Candidate related specification ids for an artifact.
    ///
    /// Default: no candidates. Oracles backed by an index can narrow the
    /// inference neighborhood with this.
    fn candidates(&self, _artifact: &Artifact) -> Vec<String> {
        Vec::new()
    }
}

/// Supplies explicitly authored links for an artifact.
pub trait DeclaredLinkSource {
    /// Target artifact ids the given artifact declares links to.
    fn declared(&self, artifact_id: &str) -> Vec<String>;
}

/// A declared-link source with no declarations. Useful for builds that
/// rely purely on inference.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDeclaredLinks;

impl DeclaredLinkSource for NoDeclaredLinks {
    fn declared(&self, _artifact_id: &str) -> Vec<String> {
        Vec::new()
    }
}
