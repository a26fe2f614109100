//! Link inference strategies.
//!
//! Four strategies run in priority order; the first match wins for each
//! candidate pair:
//!
//! 1. Explicitly declared link → confidence 1.0, origin `Declared`
//! 2. Naming-convention match (shared base name) → 0.9
//! 3. Textual reference between the artifacts → 0.75
//! 4. Similarity-oracle score at or above the threshold → the score
//!    itself, truncated to two decimals, as a `Suggests` edge
//!
//! Below-threshold oracle pairs are simply not linked; low-confidence
//! edges are never emitted. If the oracle fails, inference degrades to
//! strategies 1–3 for that call and logs a warning.

use specimpact_core::{base_name_of, Artifact, ArtifactKind, DeclaredLinkSource, SimilarityOracle};
use specimpact_graph::{Edge, EdgeKey, LinkOrigin, Relationship};
use std::collections::HashSet;
use tracing::warn;

/// Tunables for inference.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Oracle scores below this produce no edge at all.
    pub similarity_threshold: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
        }
    }
}

/// A proposed edge. Inference only proposes; the updater writes.
#[derive(Debug, Clone)]
pub struct LinkCandidate {
    pub source: String,
    pub target: String,
    pub edge: Edge,
}

impl LinkCandidate {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone(), self.edge.relationship)
    }
}

/// Proposes edges between an artifact and a candidate pool.
pub struct LinkInference {
    declared: Box<dyn DeclaredLinkSource + Send + Sync>,
    oracle: Option<Box<dyn SimilarityOracle + Send + Sync>>,
    config: InferenceConfig,
}

impl LinkInference {
    /// Creates an inference engine without a similarity oracle.
    pub fn new(declared: Box<dyn DeclaredLinkSource + Send + Sync>) -> Self {
        Self {
            declared,
            oracle: None,
            config: InferenceConfig::default(),
        }
    }

    /// Attaches a similarity oracle.
    pub fn with_oracle(mut self, oracle: Box<dyn SimilarityOracle + Send + Sync>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Overrides the default configuration.
    pub fn with_config(mut self, config: InferenceConfig) -> Self {
        self.config = config;
        self
    }

    /// Target ids the artifact declares links to.
    pub fn declared_targets(&self, artifact_id: &str) -> Vec<String> {
        self.declared.declared(artifact_id)
    }

    /// Candidate related ids from the oracle's index, if any.
    pub fn oracle_candidates(&self, artifact: &Artifact) -> Vec<String> {
        self.oracle
            .as_ref()
            .map(|oracle| oracle.candidates(artifact))
            .unwrap_or_default()
    }

    /// Proposes edges between `artifact` and every pool candidate.
    ///
    /// At most one edge per candidate pair; strategy priority breaks
    /// confidence ties by construction since evaluation stops at the
    /// first match.
    pub fn infer(&self, artifact: &Artifact, pool: &[&Artifact]) -> Vec<LinkCandidate> {
        let declared: HashSet<String> = self.declared.declared(&artifact.id).into_iter().collect();
        let base = artifact.base_name();

        // One oracle failure disables strategy 4 for the rest of this call.
        let mut oracle_down = false;
        let mut candidates = Vec::new();

        for other in pool {
            if other.id == artifact.id {
                continue;
            }

            if declared.contains(&other.id) {
                let (source, target, relationship) = orient(artifact, other);
                candidates.push(LinkCandidate {
                    source,
                    target,
                    edge: Edge::declared(relationship),
                });
                continue;
            }

            if other.base_name() == base {
                let (source, target, relationship) = orient(artifact, other);
                candidates.push(LinkCandidate {
                    source,
                    target,
                    edge: Edge::new(relationship, 0.9, LinkOrigin::Inferred),
                });
                continue;
            }

            if let Some((source, target)) = reference_between(artifact, other) {
                candidates.push(LinkCandidate {
                    source,
                    target,
                    edge: Edge::new(Relationship::References, 0.75, LinkOrigin::Inferred),
                });
                continue;
            }

            if oracle_down {
                continue;
            }
            if let Some(oracle) = &self.oracle {
                match oracle.score(artifact, other) {
                    Ok(score) if score >= self.config.similarity_threshold => {
                        // Cap to two decimals, never exceeding the
                        // reported score.
                        let confidence = (score * 100.0).floor() / 100.0;
                        let (source, target) = suggest_orient(artifact, other);
                        candidates.push(LinkCandidate {
                            source,
                            target,
                            edge: Edge::new(Relationship::Suggests, confidence, LinkOrigin::Inferred),
                        });
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(
                            "similarity oracle failed for {}: {}; degrading to declared/naming/reference strategies",
                            artifact.id, err
                        );
                        oracle_down = true;
                    }
                }
            }
        }

        candidates
    }
}

/// Decides edge direction and relationship from endpoint kinds.
///
/// Edges point from the derived artifact to its source of truth: code
/// and tests point at specs, tests point at the code they exercise.
/// Same-kind pairs fall back to a `References` edge from `a` to `b`.
fn orient(a: &Artifact, b: &Artifact) -> (String, String, Relationship) {
    use ArtifactKind::*;

    match (a.kind, b.kind) {
        (Code, Spec) => (a.id.clone(), b.id.clone(), Relationship::Implements),
        (Spec, Code) => (b.id.clone(), a.id.clone(), Relationship::Implements),
        (Test, Spec) | (Test, Code) => (a.id.clone(), b.id.clone(), Relationship::TestedBy),
        (Spec, Test) | (Code, Test) => (b.id.clone(), a.id.clone(), Relationship::TestedBy),
        (Spec, Spec) | (Code, Code) | (Test, Test) => {
            (a.id.clone(), b.id.clone(), Relationship::References)
        }
    }
}

/// Canonical orientation for a suggested pair.
///
/// Inferring from either endpoint must derive the same edge key, or
/// repeated updates would churn between the two orientations. Mixed
/// kinds follow the usual direction rules; same-kind pairs order by id.
fn suggest_orient(a: &Artifact, b: &Artifact) -> (String, String) {
    if a.kind == b.kind {
        if a.id <= b.id {
            (a.id.clone(), b.id.clone())
        } else {
            (b.id.clone(), a.id.clone())
        }
    } else {
        let (source, target, _) = orient(a, b);
        (source, target)
    }
}

/// Checks for a textual reference in either direction. The edge runs
/// from the referencing artifact to the referenced one.
fn reference_between(a: &Artifact, b: &Artifact) -> Option<(String, String)> {
    if mentions(a, b) {
        return Some((a.id.clone(), b.id.clone()));
    }
    if mentions(b, a) {
        return Some((b.id.clone(), a.id.clone()));
    }
    None
}

fn mentions(from: &Artifact, to: &Artifact) -> bool {
    from.references.iter().any(|reference| {
        reference == &to.id || reference == &to.path || base_name_of(reference) == to.base_name()
    })
}
