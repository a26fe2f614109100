//! SpecImpact Core - Artifact model and collaborator interfaces
//!
//! This crate defines the vocabulary shared by every SpecImpact component:
//! artifacts (specs, code files, tests), the registry that is the source of
//! truth for their existence, and the capability traits implemented by
//! external collaborators (artifact sources, declared-link sources, and the
//! similarity oracle).
//!
//! The core deliberately has no I/O of its own. Parsing spec formats,
//! watching files, and computing embeddings all happen outside; what arrives
//! here is an already-resolved artifact list.

mod artifact;
mod error;
mod registry;
mod source;

pub use artifact::{base_name_of, Artifact, ArtifactKind};
pub use error::CoreError;
pub use registry::ArtifactRegistry;
pub use source::{
    ArtifactSource, DeclaredLinkSource, NoDeclaredLinks, OracleError, SimilarityOracle,
};
