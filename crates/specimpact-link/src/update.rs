//! Incremental graph updates.
//!
//! The updater owns the registry and the graph and is the only writer.
//! For each changed artifact it re-infers links against that artifact's
//! neighborhood, diffs against the edges currently touching it, and
//! applies the difference. Edges with neither endpoint in the changed
//! set are never touched; there is no full rebuild on update.

use crate::infer::{LinkCandidate, LinkInference};
use serde::Serialize;
use specimpact_core::{Artifact, ArtifactRegistry, ArtifactSource, CoreError};
use specimpact_graph::{
    ArtifactNode, Edge, EdgeKey, EdgeRecord, EdgeWrite, GraphError, GraphSnapshot, ImpactGraph,
    LinkOrigin,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Errors from registration and update application.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A declared edge the fresh inference tried to downgrade.
///
/// Not an error: the declared edge is kept and the attempt is surfaced
/// here so declared knowledge is never silently lost.
#[derive(Debug, Clone, Serialize)]
pub struct LinkConflict {
    pub key: EdgeKey,
    pub existing_confidence: f64,
    pub proposed_confidence: f64,
}

/// Outcome of one update batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateReport {
    pub edges_added: usize,
    pub edges_removed: usize,
    pub edges_unchanged: usize,
    pub conflicts: Vec<LinkConflict>,

    /// Artifacts whose edge changes were rolled back after a mid-batch
    /// failure. The batch continues with the next artifact.
    pub failed_artifacts: Vec<String>,

    /// True if the batch stopped early at a cancellation point.
    pub cancelled: bool,
}

enum EdgeOp {
    Upsert(LinkCandidate),
    Remove(EdgeKey),
}

/// The sole writer of the impact graph.
///
/// `update` takes `&mut self`, so one batch completes before the next
/// starts; shared callers put the updater behind a lock (the server
/// does), which queues concurrent updates rather than interleaving
/// them. Readers obtain [`GraphSnapshot`]s and are never blocked by a
/// pending batch.
pub struct IncrementalUpdater {
    registry: ArtifactRegistry,
    graph: ImpactGraph,
    inference: LinkInference,
    cancel: Arc<AtomicBool>,
}

impl IncrementalUpdater {
    /// Creates an updater with an empty registry and graph.
    pub fn new(inference: LinkInference) -> Self {
        Self {
            registry: ArtifactRegistry::new(),
            graph: ImpactGraph::new(),
            inference,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates an updater over a previously persisted graph.
    ///
    /// The registry is rebuilt from the graph nodes; textual references
    /// reappear as artifacts are re-registered by their source.
    pub fn with_graph(inference: LinkInference, graph: ImpactGraph) -> Result<Self, UpdateError> {
        let mut registry = ArtifactRegistry::new();
        for node in graph.sorted_nodes() {
            let mut artifact = Artifact::new(node.id.clone(), node.kind, node.path.clone());
            artifact.metadata = node.metadata.clone();
            registry.register(artifact)?;
        }
        Ok(Self {
            registry,
            graph,
            inference,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A flag that cancels a running batch at the next artifact
    /// boundary. Cancellation is cooperative and never splits one
    /// artifact's atomic edge application.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Registers an artifact as both registry record and graph node.
    ///
    /// Nodes must exist before edges reference them, so callers
    /// register artifacts and then run `update`.
    pub fn register(&mut self, artifact: Artifact) -> Result<(), UpdateError> {
        self.registry.register(artifact.clone())?;
        self.graph.upsert_node(ArtifactNode::from(&artifact))?;
        Ok(())
    }

    /// Explicitly removes an artifact and every edge touching it.
    pub fn prune(&mut self, id: &str) -> bool {
        self.registry.prune(id);
        self.graph.remove_node(id)
    }

    /// Read access to the registry.
    pub fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    /// An immutable snapshot of the current graph for readers.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    /// Pulls changed artifacts from a source, registers them, and runs
    /// an update batch over them.
    pub fn refresh_from(
        &mut self,
        source: &dyn ArtifactSource,
        since: Option<&str>,
    ) -> Result<UpdateReport, UpdateError> {
        let changed = source.list_changed(since);
        let mut ids = Vec::with_capacity(changed.len());
        for artifact in changed {
            ids.push(artifact.id.clone());
            self.register(artifact)?;
        }
        Ok(self.update(&ids))
    }

    /// Rebuilds every edge from scratch while keeping all nodes.
    pub fn rebuild(&mut self) -> UpdateReport {
        let ids: Vec<String> = self
            .registry
            .artifacts()
            .map(|artifact| artifact.id.clone())
            .collect();

        // Drop all edges; nodes stay, update re-derives the links.
        for record in self.graph.edge_records() {
            self.graph.remove_edge(&record.key());
        }
        self.update(&ids)
    }

    /// Recomputes the edges touching the changed artifacts.
    ///
    /// Each artifact is applied atomically: either all of its edge
    /// changes land or none do. Unknown ids are logged and skipped.
    pub fn update(&mut self, changed_ids: &[String]) -> UpdateReport {
        let mut report = UpdateReport::default();

        for id in changed_ids {
            if self.cancel.load(Ordering::Relaxed) {
                debug!("update batch cancelled before {}", id);
                report.cancelled = true;
                break;
            }

            let Some(artifact) = self.registry.get(id).cloned() else {
                warn!("update requested for unregistered artifact {}; skipping", id);
                continue;
            };

            self.update_one(&artifact, &mut report);
        }

        report
    }

    fn update_one(&mut self, artifact: &Artifact, report: &mut UpdateReport) {
        let neighborhood = self.neighborhood(artifact);
        let pool: Vec<&Artifact> = neighborhood.iter().collect();
        let fresh = self.inference.infer(artifact, &pool);

        let existing: HashMap<EdgeKey, EdgeRecord> = self
            .graph
            .forward_edges(&artifact.id, None)
            .into_iter()
            .chain(self.graph.reverse_edges(&artifact.id, None))
            .map(|record| (record.key(), record))
            .collect();

        let mut ops: Vec<EdgeOp> = Vec::new();
        let mut fresh_keys: BTreeSet<EdgeKey> = BTreeSet::new();

        for candidate in fresh {
            let key = candidate.key();
            fresh_keys.insert(key.clone());

            match existing.get(&key) {
                Some(current) => {
                    if current.origin == LinkOrigin::Declared
                        && candidate.edge.origin == LinkOrigin::Inferred
                    {
                        warn!(
                            "inference would downgrade declared edge {} (confidence {} -> {}); keeping declared",
                            key, current.confidence, candidate.edge.confidence
                        );
                        report.conflicts.push(LinkConflict {
                            key,
                            existing_confidence: current.confidence,
                            proposed_confidence: candidate.edge.confidence,
                        });
                    } else if current.edge().same_payload(&candidate.edge) {
                        report.edges_unchanged += 1;
                    } else {
                        ops.push(EdgeOp::Upsert(candidate));
                    }
                }
                None => ops.push(EdgeOp::Upsert(candidate)),
            }
        }

        for (key, current) in &existing {
            if fresh_keys.contains(key) {
                continue;
            }
            match current.origin {
                // Stale inference: the heuristics no longer derive it.
                LinkOrigin::Inferred => ops.push(EdgeOp::Remove(key.clone())),
                // Declared edges are never implicitly removed.
                LinkOrigin::Declared => report.edges_unchanged += 1,
            }
        }

        if let Err(err) = self.apply(&artifact.id, ops, report) {
            error!("update for {} failed and was rolled back: {}", artifact.id, err);
            report.failed_artifacts.push(artifact.id.clone());
        }
    }

    /// Applies one artifact's edge operations, rolling back on failure.
    fn apply(
        &mut self,
        artifact_id: &str,
        ops: Vec<EdgeOp>,
        report: &mut UpdateReport,
    ) -> Result<(), UpdateError> {
        // Undo log: key plus the edge it previously held, if any.
        let mut undo: Vec<(EdgeKey, Option<Edge>)> = Vec::new();
        let mut added = 0usize;
        let mut removed = 0usize;
        let mut unchanged = 0usize;

        let mut perform = |graph: &mut ImpactGraph| -> Result<(), UpdateError> {
            for op in &ops {
                match op {
                    EdgeOp::Upsert(candidate) => {
                        let key = candidate.key();
                        let prior = graph.get_edge(&key).map(|record| record.edge());
                        let write =
                            graph.upsert_edge(&key.source, &key.target, candidate.edge.clone())?;
                        match write {
                            EdgeWrite::Inserted | EdgeWrite::Replaced => {
                                undo.push((key, prior));
                                added += 1;
                            }
                            EdgeWrite::Unchanged | EdgeWrite::KeptDeclared => unchanged += 1,
                        }
                    }
                    EdgeOp::Remove(key) => {
                        let prior = graph.get_edge(key).map(|record| record.edge());
                        if graph.remove_edge(key) {
                            undo.push((key.clone(), prior));
                            removed += 1;
                        }
                    }
                }
            }
            Ok(())
        };

        match perform(&mut self.graph) {
            Ok(()) => {
                report.edges_added += added;
                report.edges_removed += removed;
                report.edges_unchanged += unchanged;
                debug!(
                    "applied update for {}: +{} -{} ={}",
                    artifact_id, added, removed, unchanged
                );
                Ok(())
            }
            Err(err) => {
                // Restore prior state in reverse order.
                for (key, prior) in undo.into_iter().rev() {
                    match prior {
                        Some(edge) => {
                            let _ = self.graph.upsert_edge(&key.source, &key.target, edge);
                        }
                        None => {
                            self.graph.remove_edge(&key);
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /// Artifacts plausibly related to the given one: current graph
    /// neighbors, shared base names, declared targets, textual
    /// references in either role, and oracle candidates.
    fn neighborhood(&self, artifact: &Artifact) -> Vec<Artifact> {
        let mut ids: BTreeSet<String> = BTreeSet::new();

        ids.extend(self.graph.neighbor_ids(&artifact.id));

        for related in self.registry.find_by_base_name(&artifact.base_name()) {
            ids.insert(related.id.clone());
        }

        for reference in &artifact.references {
            if self.registry.contains(reference) {
                ids.insert(reference.clone());
            }
            for related in self.registry.find_by_path(reference) {
                ids.insert(related.id.clone());
            }
            for related in self
                .registry
                .find_by_base_name(&specimpact_core::base_name_of(reference))
            {
                ids.insert(related.id.clone());
            }
        }

        // Artifacts that mention this one.
        for other in self.registry.artifacts() {
            if other
                .references
                .iter()
                .any(|r| r == &artifact.id || r == &artifact.path)
            {
                ids.insert(other.id.clone());
            }
        }

        ids.extend(self.inference.declared_targets(&artifact.id));
        ids.extend(self.inference.oracle_candidates(artifact));

        ids.remove(&artifact.id);
        ids.into_iter()
            .filter_map(|id| self.registry.get(&id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::InferenceConfig;
    use specimpact_core::{ArtifactKind, DeclaredLinkSource, NoDeclaredLinks};
    use specimpact_graph::Relationship;
    use std::collections::HashMap;

    struct MapDeclared(HashMap<String, Vec<String>>);

    impl DeclaredLinkSource for MapDeclared {
        fn declared(&self, artifact_id: &str) -> Vec<String> {
            self.0.get(artifact_id).cloned().unwrap_or_default()
        }
    }

    fn spec(id: &str) -> Artifact {
        Artifact::new(
            id,
            ArtifactKind::Spec,
            format!("specs/{}.md", specimpact_core::base_name_of(id)),
        )
    }

    fn code(id: &str) -> Artifact {
        Artifact::new(
            id,
            ArtifactKind::Code,
            format!("src/{}.rs", specimpact_core::base_name_of(id)),
        )
    }

    fn test_artifact(id: &str) -> Artifact {
        Artifact::new(
            id,
            ArtifactKind::Test,
            format!("tests/{}.rs", specimpact_core::base_name_of(id)),
        )
    }

    fn auth_updater() -> IncrementalUpdater {
        let mut updater = IncrementalUpdater::new(LinkInference::new(Box::new(NoDeclaredLinks)));
        updater.register(spec("spec:auth")).unwrap();
        updater.register(code("code:auth_service")).unwrap();
        updater.register(test_artifact("test:test_auth")).unwrap();
        updater
    }

    #[test]
    fn test_update_builds_naming_edges() {
        let mut updater = auth_updater();
        let report = updater.update(&[
            "spec:auth".to_string(),
            "code:auth_service".to_string(),
            "test:test_auth".to_string(),
        ]);

        assert_eq!(report.edges_added, 3);
        assert_eq!(report.edges_removed, 0);
        assert!(report.conflicts.is_empty());

        let snapshot = updater.snapshot();
        let key = EdgeKey::new("code:auth_service", "spec:auth", Relationship::Implements);
        assert_eq!(snapshot.get_edge(&key).unwrap().confidence, 0.9);
        let key = EdgeKey::new("test:test_auth", "spec:auth", Relationship::TestedBy);
        assert_eq!(snapshot.get_edge(&key).unwrap().confidence, 0.9);
        let key = EdgeKey::new("test:test_auth", "code:auth_service", Relationship::TestedBy);
        assert_eq!(snapshot.get_edge(&key).unwrap().confidence, 0.9);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut updater = auth_updater();
        let ids = vec!["spec:auth".to_string(), "code:auth_service".to_string()];

        let first = updater.update(&ids);
        assert!(first.edges_added > 0);

        let second = updater.update(&ids);
        assert_eq!(second.edges_added, 0);
        assert_eq!(second.edges_removed, 0);
        assert!(second.edges_unchanged > 0);
    }

    #[test]
    fn test_update_idempotent_with_oracle_suggestions() {
        use specimpact_core::{OracleError, SimilarityOracle};

        // An index-backed oracle that pairs billing code with the
        // invoices spec from either endpoint. Both endpoints in one
        // changed set must settle on a single suggested edge, not churn
        // between orientations on every run.
        struct PairOracle;

        impl SimilarityOracle for PairOracle {
            fn score(&self, _a: &Artifact, _b: &Artifact) -> Result<f64, OracleError> {
                Ok(0.7)
            }

            fn candidates(&self, artifact: &Artifact) -> Vec<String> {
                match artifact.id.as_str() {
                    "code:billing" => vec!["spec:invoices".to_string()],
                    "spec:invoices" => vec!["code:billing".to_string()],
                    _ => Vec::new(),
                }
            }
        }

        let inference =
            LinkInference::new(Box::new(NoDeclaredLinks)).with_oracle(Box::new(PairOracle));
        let mut updater = IncrementalUpdater::new(inference);
        updater.register(spec("spec:invoices")).unwrap();
        updater.register(code("code:billing")).unwrap();

        let ids = vec!["code:billing".to_string(), "spec:invoices".to_string()];
        let first = updater.update(&ids);
        assert_eq!(first.edges_added, 1);
        assert_eq!(first.edges_removed, 0);

        let second = updater.update(&ids);
        assert_eq!(second.edges_added, 0);
        assert_eq!(second.edges_removed, 0);
        assert!(second.edges_unchanged > 0);

        let key = EdgeKey::new("code:billing", "spec:invoices", Relationship::Suggests);
        assert!(updater.snapshot().get_edge(&key).is_some());
    }

    #[test]
    fn test_declared_edge_survives_update_with_conflict_recorded() {
        // A declared edge exists; fresh inference derives the same key
        // at 0.9 Inferred. The edge must stay declared at 1.0 and the
        // attempt must be recorded.
        let mut declared = HashMap::new();
        declared.insert("code:auth_service".to_string(), vec!["spec:auth".to_string()]);
        let inference = LinkInference::new(Box::new(MapDeclared(declared)));

        let mut updater = IncrementalUpdater::new(inference);
        updater.register(spec("spec:auth")).unwrap();
        updater.register(code("code:auth_service")).unwrap();
        updater.update(&["code:auth_service".to_string()]);

        // Swap in a declared source that forgot the link; naming-based
        // inference now proposes an Inferred downgrade.
        let mut updater = IncrementalUpdater::with_graph(
            LinkInference::new(Box::new(NoDeclaredLinks)),
            (*updater.snapshot()).clone(),
        )
        .unwrap();
        let report = updater.update(&["code:auth_service".to_string()]);

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.edges_added, 0);
        assert_eq!(report.edges_removed, 0);

        let key = EdgeKey::new("code:auth_service", "spec:auth", Relationship::Implements);
        let edge = updater.snapshot().get_edge(&key).unwrap();
        assert_eq!(edge.origin, LinkOrigin::Declared);
        assert_eq!(edge.confidence, 1.0);
    }

    #[test]
    fn test_stale_inferred_edge_removed() {
        // An inferred edge built from a reference disappears once the
        // reference does.
        let mut updater = IncrementalUpdater::new(LinkInference::new(Box::new(NoDeclaredLinks)));
        updater.register(spec("spec:invoices")).unwrap();
        updater
            .register(code("code:billing").with_references(vec!["spec:invoices".to_string()]))
            .unwrap();

        let report = updater.update(&["code:billing".to_string()]);
        assert_eq!(report.edges_added, 1);

        // The reference is dropped on the next change.
        updater.register(code("code:billing")).unwrap();
        let report = updater.update(&["code:billing".to_string()]);
        assert_eq!(report.edges_added, 0);
        assert_eq!(report.edges_removed, 1);
        assert_eq!(updater.snapshot().edge_count(), 0);
    }

    #[test]
    fn test_unaffected_edges_left_alone() {
        let mut updater = auth_updater();
        updater.register(spec("spec:billing")).unwrap();
        updater.register(code("code:billing")).unwrap();
        updater.update(&[
            "spec:auth".to_string(),
            "code:auth_service".to_string(),
            "spec:billing".to_string(),
            "code:billing".to_string(),
        ]);

        let before = updater.snapshot().get_edge(&EdgeKey::new(
            "code:billing",
            "spec:billing",
            Relationship::Implements,
        ));
        assert!(before.is_some());

        // Updating only the auth artifacts must not rewrite billing.
        let report = updater.update(&["code:auth_service".to_string()]);
        assert_eq!(report.edges_added, 0);
        let after = updater.snapshot().get_edge(&EdgeKey::new(
            "code:billing",
            "spec:billing",
            Relationship::Implements,
        ));
        assert_eq!(
            before.unwrap().updated_at,
            after.unwrap().updated_at,
            "unaffected edge was rewritten"
        );
    }

    #[test]
    fn test_unknown_changed_id_skipped() {
        let mut updater = auth_updater();
        let report = updater.update(&["code:ghost".to_string()]);
        assert_eq!(report.edges_added, 0);
        assert!(report.failed_artifacts.is_empty());
    }

    #[test]
    fn test_cancellation_between_artifacts() {
        let mut updater = auth_updater();
        updater.cancel_flag().store(true, Ordering::Relaxed);

        let report = updater.update(&["code:auth_service".to_string()]);
        assert!(report.cancelled);
        assert_eq!(report.edges_added, 0);
        assert_eq!(updater.snapshot().edge_count(), 0);
    }

    #[test]
    fn test_rebuild_rederives_edges() {
        let mut updater = auth_updater();
        updater.update(&["code:auth_service".to_string(), "test:test_auth".to_string()]);
        assert_eq!(updater.snapshot().edge_count(), 3);

        let report = updater.rebuild();
        assert_eq!(updater.snapshot().edge_count(), 3);
        assert_eq!(report.edges_added, 3);
    }

    #[test]
    fn test_refresh_from_source() {
        struct FixedSource(Vec<Artifact>);

        impl ArtifactSource for FixedSource {
            fn list_changed(&self, _since: Option<&str>) -> Vec<Artifact> {
                self.0.clone()
            }
        }

        let source = FixedSource(vec![spec("spec:auth"), code("code:auth_service")]);
        let mut updater = IncrementalUpdater::new(
            LinkInference::new(Box::new(NoDeclaredLinks))
                .with_config(InferenceConfig::default()),
        );

        let report = updater.refresh_from(&source, None).unwrap();
        assert_eq!(report.edges_added, 1);
        assert_eq!(updater.snapshot().node_count(), 2);
    }
}
