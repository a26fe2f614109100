//! The artifact manifest.
//!
//! `specimpact.json` at the project root lists every tracked spec, code
//! file, and test, along with declared links and textual references.
//! The manifest is the CLI's artifact source and declared-link source;
//! nothing else on disk is scanned.

use serde::{Deserialize, Serialize};
use specimpact_core::{Artifact, ArtifactKind, ArtifactSource, DeclaredLinkSource};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const MANIFEST_FILE: &str = "specimpact.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed manifest: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One tracked artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub kind: ArtifactKind,
    pub path: String,

    /// Artifact ids or file paths this artifact mentions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    /// Explicitly authored link targets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// The parsed manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub artifacts: Vec<ManifestEntry>,
}

impl Manifest {
    /// Loads `specimpact.json` from the project root.
    pub fn load(root: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(root.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn exists(root: &Path) -> bool {
        root.join(MANIFEST_FILE).exists()
    }

    /// Ids of every artifact, in manifest order.
    pub fn artifact_ids(&self) -> Vec<String> {
        self.artifacts.iter().map(|entry| entry.id.clone()).collect()
    }
}

impl From<&ManifestEntry> for Artifact {
    fn from(entry: &ManifestEntry) -> Self {
        let mut artifact = Artifact::new(entry.id.clone(), entry.kind, entry.path.clone())
            .with_references(entry.references.clone());
        artifact.metadata = entry.metadata.clone();
        artifact
    }
}

impl ArtifactSource for Manifest {
    // The manifest carries no change markers, so any `since` yields the
    // full artifact list.
    fn list_changed(&self, _since: Option<&str>) -> Vec<Artifact> {
        self.artifacts.iter().map(Artifact::from).collect()
    }
}

impl DeclaredLinkSource for Manifest {
    fn declared(&self, artifact_id: &str) -> Vec<String> {
        self.artifacts
            .iter()
            .find(|entry| entry.id == artifact_id)
            .map(|entry| entry.links.clone())
            .unwrap_or_default()
    }
}
