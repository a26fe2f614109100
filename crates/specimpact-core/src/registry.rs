//! Canonical record of every known artifact.
//!
//! The registry is the source of truth for artifact existence and
//! metadata. The graph store mirrors it as nodes; link inference draws
//! candidate pools from its indexes.

use crate::{Artifact, ArtifactKind, CoreError};
use std::collections::HashMap;

/// Id-keyed artifact records with base-name and path indexes.
#[derive(Debug, Default, Clone)]
pub struct ArtifactRegistry {
    by_id: HashMap<String, Artifact>,

    /// Maps convention base names to artifact ids (for naming matches).
    name_index: HashMap<String, Vec<String>>,

    /// Maps file paths to artifact ids (for resolving changed files).
    path_index: HashMap<String, Vec<String>>,
}

impl ArtifactRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an artifact, or refreshes its metadata if already known.
    ///
    /// Idempotent for identical records. Fails with
    /// `DuplicateIdConflict` if the id is reused with a different kind;
    /// the existing record is left unchanged.
    pub fn register(&mut self, artifact: Artifact) -> Result<(), CoreError> {
        if let Some(existing) = self.by_id.get(&artifact.id) {
            if existing.kind != artifact.kind {
                return Err(CoreError::DuplicateIdConflict {
                    id: artifact.id.clone(),
                    existing: existing.kind,
                    incoming: artifact.kind,
                });
            }
            if *existing == artifact {
                return Ok(());
            }
            // Metadata refresh: unindex the old record first.
            let old = existing.clone();
            self.unindex(&old);
        }

        self.index(&artifact);
        self.by_id.insert(artifact.id.clone(), artifact);
        Ok(())
    }

    /// Removes an artifact. No-op if the id is unknown.
    ///
    /// Only the caller decides when to prune; nothing in the core removes
    /// artifacts implicitly.
    pub fn prune(&mut self, id: &str) -> Option<Artifact> {
        let artifact = self.by_id.remove(id)?;
        self.unindex(&artifact);
        Some(artifact)
    }

    /// Looks up an artifact by id.
    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.by_id.get(id)
    }

    /// True if the id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Finds artifacts sharing a convention base name.
    pub fn find_by_base_name(&self, base: &str) -> Vec<&Artifact> {
        self.name_index
            .get(base)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// Finds artifacts backed by a file path.
    pub fn find_by_path(&self, path: &str) -> Vec<&Artifact> {
        self.path_index
            .get(path)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// All artifacts of a given kind.
    pub fn of_kind(&self, kind: ArtifactKind) -> Vec<&Artifact> {
        self.by_id.values().filter(|a| a.kind == kind).collect()
    }

    /// Iterates over all artifacts.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.by_id.values()
    }

    /// Number of registered artifacts.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True if no artifacts are registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn index(&mut self, artifact: &Artifact) {
        self.name_index
            .entry(artifact.base_name())
            .or_default()
            .push(artifact.id.clone());
        self.path_index
            .entry(artifact.path.clone())
            .or_default()
            .push(artifact.id.clone());
    }

    fn unindex(&mut self, artifact: &Artifact) {
        if let Some(ids) = self.name_index.get_mut(&artifact.base_name()) {
            ids.retain(|id| *id != artifact.id);
            if ids.is_empty() {
                self.name_index.remove(&artifact.base_name());
            }
        }
        if let Some(ids) = self.path_index.get_mut(&artifact.path) {
            ids.retain(|id| *id != artifact.id);
            if ids.is_empty() {
                self.path_index.remove(&artifact.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ArtifactRegistry::new();
        registry
            .register(Artifact::new("spec:auth", ArtifactKind::Spec, "specs/auth.md"))
            .unwrap();

        assert!(registry.contains("spec:auth"));
        assert_eq!(registry.find_by_path("specs/auth.md").len(), 1);
        assert_eq!(registry.find_by_base_name("auth").len(), 1);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = ArtifactRegistry::new();
        let artifact = Artifact::new("spec:auth", ArtifactKind::Spec, "specs/auth.md");

        registry.register(artifact.clone()).unwrap();
        registry.register(artifact).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_by_base_name("auth").len(), 1);
    }

    #[test]
    fn test_kind_conflict_rejected() {
        let mut registry = ArtifactRegistry::new();
        registry
            .register(Artifact::new("auth", ArtifactKind::Spec, "specs/auth.md"))
            .unwrap();

        let err = registry
            .register(Artifact::new("auth", ArtifactKind::Code, "src/auth.rs"))
            .unwrap_err();

        assert!(matches!(err, CoreError::DuplicateIdConflict { .. }));
        // Existing record unchanged.
        assert_eq!(registry.get("auth").unwrap().kind, ArtifactKind::Spec);
        assert_eq!(registry.get("auth").unwrap().path, "specs/auth.md");
    }

    #[test]
    fn test_metadata_refresh_reindexes_path() {
        let mut registry = ArtifactRegistry::new();
        registry
            .register(Artifact::new("code:auth_service", ArtifactKind::Code, "src/auth.rs"))
            .unwrap();
        registry
            .register(Artifact::new(
                "code:auth_service",
                ArtifactKind::Code,
                "src/auth/service.rs",
            ))
            .unwrap();

        assert!(registry.find_by_path("src/auth.rs").is_empty());
        assert_eq!(registry.find_by_path("src/auth/service.rs").len(), 1);
    }

    #[test]
    fn test_prune() {
        let mut registry = ArtifactRegistry::new();
        registry
            .register(Artifact::new("spec:auth", ArtifactKind::Spec, "specs/auth.md"))
            .unwrap();

        assert!(registry.prune("spec:auth").is_some());
        assert!(registry.prune("spec:auth").is_none());
        assert!(registry.find_by_base_name("auth").is_empty());
    }
}
