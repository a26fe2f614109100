//! Edge types for the spec impact graph.
//!
//! Edges represent relationships between artifacts. The set of
//! relationship kinds is deliberately small: it covers how code and
//! tests relate to specifications, plus soft similarity links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type of relationship between two artifacts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// Code artifact implements a specification.
    Implements,

    /// Test artifact exercises a specification or code artifact.
    TestedBy,

    /// Artifact textually references another artifact.
    References,

    /// Soft link proposed by the similarity oracle.
    Suggests,
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Implements => "implements",
            Self::TestedBy => "tested_by",
            Self::References => "references",
            Self::Suggests => "suggests",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Relationship {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "implements" => Ok(Self::Implements),
            "tested_by" => Ok(Self::TestedBy),
            "references" => Ok(Self::References),
            "suggests" => Ok(Self::Suggests),
            other => Err(format!("unknown relationship: {}", other)),
        }
    }
}

/// Whether a link was explicitly authored or heuristically discovered.
///
/// Declared links dominate: an `Inferred` write never replaces a
/// `Declared` edge for the same key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LinkOrigin {
    Declared,
    Inferred,
}

impl std::fmt::Display for LinkOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declared => write!(f, "declared"),
            Self::Inferred => write!(f, "inferred"),
        }
    }
}

/// An edge in the impact graph.
///
/// Source and target are implicit in the graph structure; see
/// [`EdgeRecord`] for the standalone form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// The kind of relationship.
    pub relationship: Relationship,

    /// Certainty in `[0.0, 1.0]`. Constructors clamp out-of-range input.
    pub confidence: f64,

    /// Declared or inferred.
    pub origin: LinkOrigin,

    /// When this edge was last written.
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    /// Creates a new edge stamped with the current time.
    pub fn new(relationship: Relationship, confidence: f64, origin: LinkOrigin) -> Self {
        Self {
            relationship,
            confidence: confidence.clamp(0.0, 1.0),
            origin,
            updated_at: Utc::now(),
        }
    }

    /// Creates a declared edge at full confidence.
    pub fn declared(relationship: Relationship) -> Self {
        Self::new(relationship, 1.0, LinkOrigin::Declared)
    }

    /// True if the edges carry the same payload, ignoring the timestamp.
    pub fn same_payload(&self, other: &Edge) -> bool {
        self.relationship == other.relationship
            && self.origin == other.origin
            && (self.confidence - other.confidence).abs() < f64::EPSILON
    }
}

/// Unique key of an edge: multiple edges between the same ordered pair
/// are allowed only if their relationship differs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub relationship: Relationship,
}

impl EdgeKey {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relationship: Relationship,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relationship,
        }
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} --{}--> {}", self.source, self.relationship, self.target)
    }
}

/// A standalone edge with endpoint ids, used for export, persistence,
/// and query responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    pub relationship: Relationship,
    pub confidence: f64,
    pub origin: LinkOrigin,
    pub updated_at: DateTime<Utc>,
}

impl EdgeRecord {
    /// The unique key of this edge.
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone(), self.relationship)
    }

    /// The graph-internal edge payload.
    pub fn edge(&self) -> Edge {
        Edge {
            relationship: self.relationship,
            confidence: self.confidence,
            origin: self.origin,
            updated_at: self.updated_at,
        }
    }
}

/// Outcome of an edge upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWrite {
    /// No edge existed for the key; one was inserted.
    Inserted,

    /// An edge existed and was replaced with a different payload.
    Replaced,

    /// An identical edge already existed; nothing was written.
    Unchanged,

    /// The existing edge is `Declared` and the write was `Inferred`;
    /// the declared edge was kept.
    KeptDeclared,
}
