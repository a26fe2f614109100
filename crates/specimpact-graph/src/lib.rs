//! SpecImpact Graph - The spec/code/test relationship graph
//!
//! This crate holds the directed, typed multigraph linking specifications,
//! source files, and tests, and everything that reads it: bounded-depth
//! impact traversal, graph export, and sled-backed persistence.
//!
//! # Architecture
//!
//! The graph uses petgraph internally with additional indexes for:
//! - Id-based lookups
//! - Path-based grouping (for resolving changed files)
//!
//! Writers go through [`ImpactGraph::upsert_node`] and
//! [`ImpactGraph::upsert_edge`], which enforce the two store invariants:
//! edges never dangle, and a `Declared` edge is never overwritten by an
//! `Inferred` one for the same (source, target, relationship) key.
//! Readers take a [`GraphSnapshot`] so a concurrent update never yields a
//! torn read.
//!
//! # Example
//!
//! ```no_run
//! use specimpact_core::ArtifactKind;
//! use specimpact_graph::{ArtifactNode, Edge, ImpactGraph, LinkOrigin, Relationship};
//!
//! let mut graph = ImpactGraph::new();
//! graph.upsert_node(ArtifactNode::new("spec:auth", ArtifactKind::Spec, "specs/auth.md"))?;
//! graph.upsert_node(ArtifactNode::new("code:auth_service", ArtifactKind::Code, "src/auth.rs"))?;
//! graph.upsert_edge(
//!     "code:auth_service",
//!     "spec:auth",
//!     Edge::new(Relationship::Implements, 0.9, LinkOrigin::Inferred),
//! )?;
//! # Ok::<(), specimpact_graph::GraphError>(())
//! ```

mod edge;
mod export;
mod graph;
mod impact;
mod store;

pub use edge::{Edge, EdgeKey, EdgeRecord, EdgeWrite, LinkOrigin, Relationship};
pub use export::{export, import_json, ExportError, ExportFormat, Focus};
pub use graph::{ArtifactNode, GraphError, GraphSnapshot, GraphStats, ImpactGraph};
pub use impact::{Direction, ImpactEntry, ImpactQuery, ImpactSet};
pub use store::{GraphStore, StoreError};
