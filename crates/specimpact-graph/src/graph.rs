//! Core graph data structure.
//!
//! The ImpactGraph wraps petgraph and adds indexes for fast lookups.
//! It exclusively owns node and edge lifetime: link inference only
//! proposes edges, and the incremental updater is the sole writer after
//! the initial build.

use crate::edge::{Edge, EdgeKey, EdgeRecord, EdgeWrite, LinkOrigin, Relationship};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use specimpact_core::{Artifact, ArtifactKind};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

/// Errors from graph store writes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// An id was reused with a different kind. The existing node is
    /// left unchanged.
    #[error("duplicate id conflict: {id} is already present as {existing}, got {incoming}")]
    DuplicateIdConflict {
        id: String,
        existing: ArtifactKind,
        incoming: ArtifactKind,
    },

    /// An edge referenced a node that is not in the graph. Nodes must
    /// be registered before edges referencing them.
    #[error("dangling edge {source_id} --{relationship}--> {target_id}: unknown node {missing}")]
    DanglingEdge {
        source_id: String,
        target_id: String,
        relationship: Relationship,
        missing: String,
    },
}

/// A graph node: one tracked artifact.
///
/// Mirrors the registry record minus the inference-only fields
/// (textual references never enter the graph).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactNode {
    pub id: String,
    pub kind: ArtifactKind,
    pub path: String,
    // No serde skip attributes here: nodes go through bincode, which
    // cannot tolerate optionally-present fields.
    pub metadata: std::collections::BTreeMap<String, String>,
}

impl ArtifactNode {
    /// Creates a new node.
    pub fn new(id: impl Into<String>, kind: ArtifactKind, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            path: path.into(),
            metadata: Default::default(),
        }
    }
}

impl From<&Artifact> for ArtifactNode {
    fn from(artifact: &Artifact) -> Self {
        Self {
            id: artifact.id.clone(),
            kind: artifact.kind,
            path: artifact.path.clone(),
            metadata: artifact.metadata.clone(),
        }
    }
}

/// The spec impact graph.
///
/// Stores artifacts as nodes and their typed relationships as edges,
/// with indexes for id and path lookup. Multiple edges between the same
/// ordered pair are allowed only if their relationship differs.
#[derive(Debug, Default, Clone)]
pub struct ImpactGraph {
    /// The underlying petgraph graph.
    pub(crate) graph: DiGraph<ArtifactNode, Edge>,

    /// Maps string ids to graph node indexes.
    id_index: HashMap<String, NodeIndex>,

    /// Maps file paths to node ids (for resolving changed files).
    path_index: HashMap<String, Vec<String>>,
}

impl ImpactGraph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes a node.
    ///
    /// Idempotent: a no-op if an identical node is already present.
    /// Fails with `DuplicateIdConflict` if the id is reused with a
    /// different kind; the existing node is left unchanged.
    pub fn upsert_node(&mut self, node: ArtifactNode) -> Result<(), GraphError> {
        if let Some(&index) = self.id_index.get(&node.id) {
            let old_path = match self.graph.node_weight(index) {
                Some(existing) => {
                    if existing.kind != node.kind {
                        return Err(GraphError::DuplicateIdConflict {
                            id: node.id,
                            existing: existing.kind,
                            incoming: node.kind,
                        });
                    }
                    if *existing == node {
                        return Ok(());
                    }
                    existing.path.clone()
                }
                None => return Ok(()),
            };

            // Metadata refresh: keep the path index in step.
            if old_path != node.path {
                self.unindex_path(&old_path, &node.id);
                self.path_index
                    .entry(node.path.clone())
                    .or_default()
                    .push(node.id.clone());
            }
            if let Some(existing) = self.graph.node_weight_mut(index) {
                *existing = node;
            }
            return Ok(());
        }

        let id = node.id.clone();
        let path = node.path.clone();
        let index = self.graph.add_node(node);
        self.id_index.insert(id.clone(), index);
        self.path_index.entry(path).or_default().push(id);
        Ok(())
    }

    /// Inserts or replaces an edge, applying the dominance rule.
    ///
    /// A `Declared` edge is never overwritten by an `Inferred` write for
    /// the same (source, target, relationship) key; the outcome reports
    /// what happened. Fails with `DanglingEdge` if either endpoint is
    /// absent.
    pub fn upsert_edge(
        &mut self,
        source: &str,
        target: &str,
        edge: Edge,
    ) -> Result<EdgeWrite, GraphError> {
        let dangling = |missing: &str| GraphError::DanglingEdge {
            source_id: source.to_string(),
            target_id: target.to_string(),
            relationship: edge.relationship,
            missing: missing.to_string(),
        };

        let s = *self.id_index.get(source).ok_or_else(|| dangling(source))?;
        let t = *self.id_index.get(target).ok_or_else(|| dangling(target))?;

        let existing = self
            .graph
            .edges_connecting(s, t)
            .find(|e| e.weight().relationship == edge.relationship)
            .map(|e| e.id());

        match existing {
            Some(edge_index) => {
                let Some(current) = self.graph.edge_weight_mut(edge_index) else {
                    return Ok(EdgeWrite::Unchanged);
                };
                if current.origin == LinkOrigin::Declared && edge.origin == LinkOrigin::Inferred {
                    tracing::debug!(
                        "keeping declared edge {} --{}--> {} over inferred write",
                        source,
                        edge.relationship,
                        target
                    );
                    return Ok(EdgeWrite::KeptDeclared);
                }
                if current.same_payload(&edge) {
                    return Ok(EdgeWrite::Unchanged);
                }
                *current = edge;
                Ok(EdgeWrite::Replaced)
            }
            None => {
                self.graph.add_edge(s, t, edge);
                Ok(EdgeWrite::Inserted)
            }
        }
    }

    /// Removes a node, cascading removal of all edges touching it.
    ///
    /// Returns false if the id is unknown. Removal is always explicit;
    /// nothing in the graph core prunes nodes on its own.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(index) = self.id_index.remove(id) else {
            return false;
        };

        if let Some(node) = self.graph.node_weight(index) {
            let path = node.path.clone();
            let node_id = node.id.clone();
            self.unindex_path(&path, &node_id);
        }

        self.graph.remove_node(index);

        // petgraph swap-removes: the node formerly at the highest index
        // now occupies `index`. Re-point its id entry.
        if let Some(moved) = self.graph.node_weight(index) {
            self.id_index.insert(moved.id.clone(), index);
        }

        true
    }

    /// Removes the edge with the given key. Returns false if absent.
    pub fn remove_edge(&mut self, key: &EdgeKey) -> bool {
        let (Some(&s), Some(&t)) = (self.id_index.get(&key.source), self.id_index.get(&key.target))
        else {
            return false;
        };

        let found = self
            .graph
            .edges_connecting(s, t)
            .find(|e| e.weight().relationship == key.relationship)
            .map(|e| e.id());

        match found {
            Some(edge_index) => {
                self.graph.remove_edge(edge_index);
                true
            }
            None => false,
        }
    }

    /// Gets a node by id.
    pub fn get(&self, id: &str) -> Option<&ArtifactNode> {
        let index = self.id_index.get(id)?;
        self.graph.node_weight(*index)
    }

    /// Gets the edge for a key, if present.
    pub fn get_edge(&self, key: &EdgeKey) -> Option<EdgeRecord> {
        let (&s, &t) = (self.id_index.get(&key.source)?, self.id_index.get(&key.target)?);
        self.graph
            .edges_connecting(s, t)
            .find(|e| e.weight().relationship == key.relationship)
            .map(|e| self.record(e.source(), e.target(), e.weight()))
    }

    /// True if the id has a node.
    pub fn contains(&self, id: &str) -> bool {
        self.id_index.contains_key(id)
    }

    /// Finds node ids backed by a file path.
    pub fn find_by_path(&self, path: &str) -> Vec<&ArtifactNode> {
        self.path_index
            .get(path)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Edges leaving the given node, optionally filtered by relationship.
    pub fn forward_edges(&self, id: &str, filter: Option<Relationship>) -> Vec<EdgeRecord> {
        self.adjacent_edges(id, petgraph::Direction::Outgoing, filter)
    }

    /// Edges arriving at the given node, optionally filtered by relationship.
    pub fn reverse_edges(&self, id: &str, filter: Option<Relationship>) -> Vec<EdgeRecord> {
        self.adjacent_edges(id, petgraph::Direction::Incoming, filter)
    }

    fn adjacent_edges(
        &self,
        id: &str,
        direction: petgraph::Direction,
        filter: Option<Relationship>,
    ) -> Vec<EdgeRecord> {
        let Some(&index) = self.id_index.get(id) else {
            return Vec::new();
        };

        let mut records: Vec<EdgeRecord> = self
            .graph
            .edges_directed(index, direction)
            .filter(|e| filter.map_or(true, |rel| e.weight().relationship == rel))
            .map(|e| self.record(e.source(), e.target(), e.weight()))
            .collect();

        records.sort_by(|a, b| a.key().cmp(&b.key()));
        records
    }

    /// Ids of every node adjacent to the given node, in either direction.
    pub fn neighbor_ids(&self, id: &str) -> Vec<String> {
        let Some(&index) = self.id_index.get(id) else {
            return Vec::new();
        };

        let mut ids: Vec<String> = self
            .graph
            .neighbors_undirected(index)
            .filter_map(|idx| self.graph.node_weight(idx))
            .map(|node| node.id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// All nodes, sorted by id for deterministic output.
    pub fn sorted_nodes(&self) -> Vec<&ArtifactNode> {
        let mut nodes: Vec<&ArtifactNode> = self.graph.node_weights().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// All edges as standalone records, sorted by key.
    pub fn edge_records(&self) -> Vec<EdgeRecord> {
        let mut records: Vec<EdgeRecord> = self
            .graph
            .edge_references()
            .map(|e| self.record(e.source(), e.target(), e.weight()))
            .collect();
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        records
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns graph statistics.
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            specs: 0,
            code: 0,
            tests: 0,
        };
        for node in self.graph.node_weights() {
            match node.kind {
                ArtifactKind::Spec => stats.specs += 1,
                ArtifactKind::Code => stats.code += 1,
                ArtifactKind::Test => stats.tests += 1,
            }
        }
        stats
    }

    /// Takes an immutable snapshot for readers.
    ///
    /// Traversal and export operate on snapshots so a concurrent
    /// incremental update never yields a torn read.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot(Arc::new(self.clone()))
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.id_index.get(id).copied()
    }

    pub(crate) fn record(&self, s: NodeIndex, t: NodeIndex, edge: &Edge) -> EdgeRecord {
        let source = self
            .graph
            .node_weight(s)
            .map(|n| n.id.clone())
            .unwrap_or_default();
        let target = self
            .graph
            .node_weight(t)
            .map(|n| n.id.clone())
            .unwrap_or_default();
        EdgeRecord {
            source,
            target,
            relationship: edge.relationship,
            confidence: edge.confidence,
            origin: edge.origin,
            updated_at: edge.updated_at,
        }
    }

    fn unindex_path(&mut self, path: &str, id: &str) {
        if let Some(ids) = self.path_index.get_mut(path) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.path_index.remove(path);
            }
        }
    }
}

/// An immutable view of the graph at a point in time.
///
/// Cheap to clone and safe to hand to concurrent readers; a snapshot
/// never reflects a partially-applied update.
#[derive(Debug, Clone)]
pub struct GraphSnapshot(Arc<ImpactGraph>);

impl Deref for GraphSnapshot {
    type Target = ImpactGraph;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Graph statistics for the info endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub specs: usize,
    pub code: usize,
    pub tests: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str) -> ArtifactNode {
        ArtifactNode::new(id, ArtifactKind::Spec, format!("specs/{}.md", id))
    }

    fn code(id: &str) -> ArtifactNode {
        ArtifactNode::new(id, ArtifactKind::Code, format!("src/{}.rs", id))
    }

    #[test]
    fn test_upsert_node_idempotent() {
        let mut graph = ImpactGraph::new();
        graph.upsert_node(spec("spec:auth")).unwrap();
        graph.upsert_node(spec("spec:auth")).unwrap();
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_upsert_node_kind_conflict() {
        let mut graph = ImpactGraph::new();
        graph.upsert_node(spec("auth")).unwrap();

        let err = graph.upsert_node(code("auth")).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateIdConflict { .. }));

        // Existing node unchanged.
        assert_eq!(graph.get("auth").unwrap().kind, ArtifactKind::Spec);
    }

    #[test]
    fn test_upsert_node_refreshes_path_index() {
        let mut graph = ImpactGraph::new();
        graph.upsert_node(code("code:auth")).unwrap();

        let mut moved = code("code:auth");
        moved.path = "src/auth/mod.rs".to_string();
        graph.upsert_node(moved).unwrap();

        assert!(graph.find_by_path("src/code:auth.rs").is_empty());
        assert_eq!(graph.find_by_path("src/auth/mod.rs").len(), 1);
    }

    #[test]
    fn test_upsert_edge_rejects_dangling() {
        let mut graph = ImpactGraph::new();
        graph.upsert_node(spec("spec:auth")).unwrap();

        let err = graph
            .upsert_edge(
                "code:auth_service",
                "spec:auth",
                Edge::new(Relationship::Implements, 0.9, LinkOrigin::Inferred),
            )
            .unwrap_err();

        match &err {
            GraphError::DanglingEdge { missing, .. } => assert_eq!(missing, "code:auth_service"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            err.to_string(),
            "dangling edge code:auth_service --implements--> spec:auth: \
             unknown node code:auth_service"
        );
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_upsert_edge_same_key_replaces() {
        let mut graph = ImpactGraph::new();
        graph.upsert_node(spec("spec:auth")).unwrap();
        graph.upsert_node(code("code:auth_service")).unwrap();

        let write = graph
            .upsert_edge(
                "code:auth_service",
                "spec:auth",
                Edge::new(Relationship::Implements, 0.75, LinkOrigin::Inferred),
            )
            .unwrap();
        assert_eq!(write, EdgeWrite::Inserted);

        let write = graph
            .upsert_edge(
                "code:auth_service",
                "spec:auth",
                Edge::new(Relationship::Implements, 0.9, LinkOrigin::Inferred),
            )
            .unwrap();
        assert_eq!(write, EdgeWrite::Replaced);
        assert_eq!(graph.edge_count(), 1);

        let key = EdgeKey::new("code:auth_service", "spec:auth", Relationship::Implements);
        assert_eq!(graph.get_edge(&key).unwrap().confidence, 0.9);
    }

    #[test]
    fn test_upsert_edge_distinct_relationships_coexist() {
        let mut graph = ImpactGraph::new();
        graph.upsert_node(spec("spec:auth")).unwrap();
        graph.upsert_node(code("code:auth_service")).unwrap();

        graph
            .upsert_edge(
                "code:auth_service",
                "spec:auth",
                Edge::new(Relationship::Implements, 0.9, LinkOrigin::Inferred),
            )
            .unwrap();
        graph
            .upsert_edge(
                "code:auth_service",
                "spec:auth",
                Edge::new(Relationship::References, 0.75, LinkOrigin::Inferred),
            )
            .unwrap();

        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_declared_edge_dominates_inferred() {
        let mut graph = ImpactGraph::new();
        graph.upsert_node(spec("spec:auth")).unwrap();
        graph.upsert_node(code("code:auth_service")).unwrap();

        graph
            .upsert_edge(
                "code:auth_service",
                "spec:auth",
                Edge::declared(Relationship::Implements),
            )
            .unwrap();

        let write = graph
            .upsert_edge(
                "code:auth_service",
                "spec:auth",
                Edge::new(Relationship::Implements, 0.6, LinkOrigin::Inferred),
            )
            .unwrap();
        assert_eq!(write, EdgeWrite::KeptDeclared);

        let key = EdgeKey::new("code:auth_service", "spec:auth", Relationship::Implements);
        let edge = graph.get_edge(&key).unwrap();
        assert_eq!(edge.confidence, 1.0);
        assert_eq!(edge.origin, LinkOrigin::Declared);
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let mut graph = ImpactGraph::new();
        graph.upsert_node(spec("spec:auth")).unwrap();
        graph.upsert_node(code("code:auth_service")).unwrap();
        graph.upsert_node(code("code:session")).unwrap();

        graph
            .upsert_edge(
                "code:auth_service",
                "spec:auth",
                Edge::new(Relationship::Implements, 0.9, LinkOrigin::Inferred),
            )
            .unwrap();
        graph
            .upsert_edge(
                "code:session",
                "spec:auth",
                Edge::new(Relationship::References, 0.75, LinkOrigin::Inferred),
            )
            .unwrap();

        assert!(graph.remove_node("spec:auth"));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.remove_node("spec:auth"));
    }

    #[test]
    fn test_remove_node_repairs_id_index() {
        // petgraph swap-removes; lookups for the moved node must survive.
        let mut graph = ImpactGraph::new();
        graph.upsert_node(spec("spec:a")).unwrap();
        graph.upsert_node(spec("spec:b")).unwrap();
        graph.upsert_node(spec("spec:c")).unwrap();

        assert!(graph.remove_node("spec:a"));
        assert!(graph.get("spec:b").is_some());
        assert!(graph.get("spec:c").is_some());
        assert_eq!(graph.get("spec:c").unwrap().id, "spec:c");
    }

    #[test]
    fn test_adjacency_with_filter() {
        let mut graph = ImpactGraph::new();
        graph.upsert_node(spec("spec:auth")).unwrap();
        graph.upsert_node(code("code:auth_service")).unwrap();
        graph
            .upsert_node(ArtifactNode::new(
                "test:test_auth",
                ArtifactKind::Test,
                "tests/test_auth.rs",
            ))
            .unwrap();

        graph
            .upsert_edge(
                "code:auth_service",
                "spec:auth",
                Edge::new(Relationship::Implements, 0.9, LinkOrigin::Inferred),
            )
            .unwrap();
        graph
            .upsert_edge(
                "test:test_auth",
                "spec:auth",
                Edge::new(Relationship::TestedBy, 0.9, LinkOrigin::Inferred),
            )
            .unwrap();

        let incoming = graph.reverse_edges("spec:auth", None);
        assert_eq!(incoming.len(), 2);

        let tested = graph.reverse_edges("spec:auth", Some(Relationship::TestedBy));
        assert_eq!(tested.len(), 1);
        assert_eq!(tested[0].source, "test:test_auth");

        let outgoing = graph.forward_edges("code:auth_service", None);
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].target, "spec:auth");
    }

    #[test]
    fn test_snapshot_isolated_from_writes() {
        let mut graph = ImpactGraph::new();
        graph.upsert_node(spec("spec:auth")).unwrap();

        let snapshot = graph.snapshot();
        graph.upsert_node(code("code:auth_service")).unwrap();

        assert_eq!(snapshot.node_count(), 1);
        assert_eq!(graph.node_count(), 2);
    }
}
