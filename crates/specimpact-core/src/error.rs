use crate::ArtifactKind;
use thiserror::Error;

/// Errors from the artifact registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// An id was re-registered with a different kind. The existing
    /// record is left unchanged.
    #[error("duplicate id conflict: {id} is already registered as {existing}, got {incoming}")]
    DuplicateIdConflict {
        id: String,
        existing: ArtifactKind,
        incoming: ArtifactKind,
    },
}
