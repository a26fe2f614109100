//! Sled-backed persistence for the impact graph.
//!
//! Layout: one record per node and per edge, bincode-encoded.
//! - `nodes` tree: key = node id, value = ArtifactNode
//! - `edges` tree: key = `source \0 target \0 relationship`, value = EdgeRecord
//! - `reverse` tree: key = `target \0 source \0 relationship`, empty value
//!
//! This gives point lookup by id and by edge key, plus prefix range
//! scans by source id and (via the reverse tree) by target id.

use crate::edge::{EdgeKey, EdgeRecord, Relationship};
use crate::graph::{ArtifactNode, GraphError, ImpactGraph};
use sled::Db;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Corrupt record key: {0}")]
    CorruptKey(String),
}

const SEP: u8 = 0;

pub struct GraphStore {
    db: Db,
    nodes: sled::Tree,
    edges: sled::Tree,
    reverse: sled::Tree,
}

impl GraphStore {
    /// Opens or creates a graph store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let nodes = db.open_tree("nodes")?;
        let edges = db.open_tree("edges")?;
        let reverse = db.open_tree("reverse")?;
        Ok(Self {
            db,
            nodes,
            edges,
            reverse,
        })
    }

    /// Persists the entire graph, replacing any prior contents.
    pub fn save(&self, graph: &ImpactGraph) -> Result<(), StoreError> {
        self.nodes.clear()?;
        self.edges.clear()?;
        self.reverse.clear()?;

        for node in graph.sorted_nodes() {
            self.put_node(node)?;
        }
        for record in graph.edge_records() {
            self.put_edge(&record)?;
        }

        self.db.flush()?;
        Ok(())
    }

    /// Loads the graph. Returns `None` if the store is empty.
    pub fn load(&self) -> Result<Option<ImpactGraph>, StoreError> {
        if self.nodes.is_empty() {
            return Ok(None);
        }

        let mut graph = ImpactGraph::new();
        for entry in self.nodes.iter() {
            let (_, value) = entry?;
            let node: ArtifactNode = bincode::deserialize(&value)?;
            graph.upsert_node(node)?;
        }
        for entry in self.edges.iter() {
            let (_, value) = entry?;
            let record: EdgeRecord = bincode::deserialize(&value)?;
            graph.upsert_edge(&record.source, &record.target, record.edge())?;
        }
        Ok(Some(graph))
    }

    /// Writes one node record.
    pub fn put_node(&self, node: &ArtifactNode) -> Result<(), StoreError> {
        let bytes = bincode::serialize(node)?;
        self.nodes.insert(node.id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Point lookup of a node by id.
    pub fn get_node(&self, id: &str) -> Result<Option<ArtifactNode>, StoreError> {
        match self.nodes.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Writes one edge record and its reverse-index entry.
    pub fn put_edge(&self, record: &EdgeRecord) -> Result<(), StoreError> {
        let bytes = bincode::serialize(record)?;
        self.edges.insert(edge_key(&record.key()), bytes)?;
        self.reverse.insert(reverse_key(&record.key()), Vec::new())?;
        Ok(())
    }

    /// Point lookup of an edge by key.
    pub fn get_edge(&self, key: &EdgeKey) -> Result<Option<EdgeRecord>, StoreError> {
        match self.edges.get(edge_key(key))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes an edge record and its reverse-index entry.
    pub fn delete_edge(&self, key: &EdgeKey) -> Result<bool, StoreError> {
        let removed = self.edges.remove(edge_key(key))?.is_some();
        self.reverse.remove(reverse_key(key))?;
        Ok(removed)
    }

    /// Range scan: all edges leaving a source id.
    pub fn edges_from(&self, source: &str) -> Result<Vec<EdgeRecord>, StoreError> {
        let mut prefix = source.as_bytes().to_vec();
        prefix.push(SEP);

        let mut records = Vec::new();
        for entry in self.edges.scan_prefix(prefix) {
            let (_, value) = entry?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    /// Range scan: all edges arriving at a target id.
    pub fn edges_into(&self, target: &str) -> Result<Vec<EdgeRecord>, StoreError> {
        let mut prefix = target.as_bytes().to_vec();
        prefix.push(SEP);

        let mut records = Vec::new();
        for entry in self.reverse.scan_prefix(prefix) {
            let (key, _) = entry?;
            let edge_key = decode_reverse_key(&key)?;
            if let Some(record) = self.get_edge(&edge_key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Clears all persisted state.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.nodes.clear()?;
        self.edges.clear()?;
        self.reverse.clear()?;
        self.db.flush()?;
        Ok(())
    }
}

fn edge_key(key: &EdgeKey) -> Vec<u8> {
    compose_key(&key.source, &key.target, key.relationship)
}

fn reverse_key(key: &EdgeKey) -> Vec<u8> {
    compose_key(&key.target, &key.source, key.relationship)
}

fn compose_key(first: &str, second: &str, relationship: Relationship) -> Vec<u8> {
    let rel = relationship.to_string();
    let mut bytes = Vec::with_capacity(first.len() + second.len() + rel.len() + 2);
    bytes.extend_from_slice(first.as_bytes());
    bytes.push(SEP);
    bytes.extend_from_slice(second.as_bytes());
    bytes.push(SEP);
    bytes.extend_from_slice(rel.as_bytes());
    bytes
}

fn decode_reverse_key(bytes: &[u8]) -> Result<EdgeKey, StoreError> {
    let corrupt = || StoreError::CorruptKey(String::from_utf8_lossy(bytes).into_owned());

    let mut parts = bytes.split(|&b| b == SEP);
    let target = parts.next().ok_or_else(corrupt)?;
    let source = parts.next().ok_or_else(corrupt)?;
    let relationship = parts.next().ok_or_else(corrupt)?;

    let relationship: Relationship = std::str::from_utf8(relationship)
        .map_err(|_| corrupt())?
        .parse()
        .map_err(|_| corrupt())?;

    Ok(EdgeKey::new(
        String::from_utf8(source.to_vec()).map_err(|_| corrupt())?,
        String::from_utf8(target.to_vec()).map_err(|_| corrupt())?,
        relationship,
    ))
}
