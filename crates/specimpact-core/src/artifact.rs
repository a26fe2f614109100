//! Artifact types tracked by the graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of artifact a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A specification block (requirement, design, decision).
    Spec,

    /// A source file.
    Code,

    /// A test file.
    Test,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Spec => "spec",
            Self::Code => "code",
            Self::Test => "test",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spec" => Ok(Self::Spec),
            "code" => Ok(Self::Code),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown artifact kind: {}", other)),
        }
    }
}

/// A resolved artifact as delivered by a collaborator.
///
/// The `references` list carries textual mentions extracted by whatever
/// adapter produced the artifact (spec ids cited in code comments, file
/// paths named in a spec). The core never re-scans file contents itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Stable unique identifier, e.g. "spec:auth" or "code:auth_service".
    pub id: String,

    /// What kind of artifact this is.
    pub kind: ArtifactKind,

    /// Path of the backing file, relative to the repository root.
    pub path: String,

    /// Opaque metadata supplied by the adapter. BTreeMap keeps
    /// serialization order stable for diffable exports.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    /// Ids or names this artifact textually references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl Artifact {
    /// Creates a new artifact.
    pub fn new(id: impl Into<String>, kind: ArtifactKind, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            path: path.into(),
            metadata: BTreeMap::new(),
            references: Vec::new(),
        }
    }

    /// Attaches textual references.
    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The base name used for naming-convention matching.
    ///
    /// Strips the id prefix ("spec:", "code:", "test:"), any file
    /// extension, and the conventional decorations that vary across
    /// artifact kinds: "test_auth", "auth_service" and "auth.spec" all
    /// reduce to "auth".
    pub fn base_name(&self) -> String {
        base_name_of(&self.id)
    }
}

const PREFIXES: &[&str] = &["test_", "spec_"];
const SUFFIXES: &[&str] = &[
    "_test", "_tests", "_spec", "_service", "_impl", "_handler", "_controller",
];

/// Reduces an artifact id or file stem to its convention base name.
pub fn base_name_of(id: &str) -> String {
    // Drop a kind prefix like "spec:" and any directory components.
    let name = id.rsplit(&[':', '/'][..]).next().unwrap_or(id);

    // Drop the file extension, if any.
    let stem = name.split('.').next().unwrap_or(name);
    let mut base = stem.to_lowercase();

    for prefix in PREFIXES {
        if let Some(rest) = base.strip_prefix(prefix) {
            if !rest.is_empty() {
                base = rest.to_string();
            }
            break;
        }
    }

    for suffix in SUFFIXES {
        if let Some(rest) = base.strip_suffix(suffix) {
            if !rest.is_empty() {
                base = rest.to_string();
            }
            break;
        }
    }

    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_strips_decorations() {
        assert_eq!(base_name_of("spec:auth"), "auth");
        assert_eq!(base_name_of("code:auth_service"), "auth");
        assert_eq!(base_name_of("test:test_auth"), "auth");
        assert_eq!(base_name_of("code:src/billing_handler.rs"), "billing");
        assert_eq!(base_name_of("test:billing_test"), "billing");
    }

    #[test]
    fn test_base_name_leaves_plain_names() {
        assert_eq!(base_name_of("auth"), "auth");
        assert_eq!(base_name_of("spec:checkout"), "checkout");
    }

    #[test]
    fn test_base_name_never_empties() {
        // A name that IS a decoration keeps itself.
        assert_eq!(base_name_of("test:test_"), "test_");
        assert_eq!(base_name_of("code:_service"), "_service");
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [ArtifactKind::Spec, ArtifactKind::Code, ArtifactKind::Test] {
            let parsed: ArtifactKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
