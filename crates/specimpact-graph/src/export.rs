//! Graph export to DOT, JSON, and Mermaid.
//!
//! All formats emit nodes and edges in id-ascending order so exports
//! are diffable. The JSON form round-trips: feeding it back through
//! [`import_json`] reproduces an identical graph.

use crate::edge::EdgeRecord;
use crate::graph::{ArtifactNode, GraphError, ImpactGraph};
use crate::impact::{Direction, ImpactQuery};
use serde::{Deserialize, Serialize};
use specimpact_core::ArtifactKind;
use std::collections::BTreeSet;
use std::fmt::Write;
use thiserror::Error;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Dot,
    Json,
    Mermaid,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dot" => Ok(Self::Dot),
            "json" => Ok(Self::Json),
            "mermaid" => Ok(Self::Mermaid),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Restricts an export to the neighborhood of one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Focus {
    /// Center of the induced subgraph.
    pub node_id: String,

    /// Hop radius, walked in both directions.
    pub radius: usize,
}

/// Errors from export and re-import.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

/// The JSON export bundle. Every node and edge field is present so the
/// bundle can rebuild an identical graph.
#[derive(Debug, Serialize, Deserialize)]
struct JsonBundle {
    nodes: Vec<ArtifactNode>,
    edges: Vec<EdgeRecord>,
}

/// Renders the graph (or a focused subgraph) as text.
///
/// With `focus`, the impact set is computed in both directions up to
/// `radius` hops and only the induced subgraph is exported: the reached
/// nodes plus edges where both endpoints are included.
pub fn export(
    graph: &ImpactGraph,
    format: ExportFormat,
    focus: Option<&Focus>,
) -> Result<String, ExportError> {
    let (nodes, edges) = match focus {
        Some(focus) => induced_subgraph(graph, focus),
        None => (
            graph.sorted_nodes().into_iter().cloned().collect(),
            graph.edge_records(),
        ),
    };

    match format {
        ExportFormat::Json => {
            let bundle = JsonBundle { nodes, edges };
            Ok(serde_json::to_string_pretty(&bundle)?)
        }
        ExportFormat::Dot => Ok(render_dot(&nodes, &edges)),
        ExportFormat::Mermaid => Ok(render_mermaid(&nodes, &edges)),
    }
}

/// Rebuilds a graph from a JSON export bundle.
pub fn import_json(text: &str) -> Result<ImpactGraph, ExportError> {
    let bundle: JsonBundle = serde_json::from_str(text)?;
    let mut graph = ImpactGraph::new();
    for node in bundle.nodes {
        graph.upsert_node(node)?;
    }
    for record in bundle.edges {
        graph.upsert_edge(&record.source, &record.target, record.edge())?;
    }
    Ok(graph)
}

fn induced_subgraph(graph: &ImpactGraph, focus: &Focus) -> (Vec<ArtifactNode>, Vec<EdgeRecord>) {
    let mut included: BTreeSet<String> = BTreeSet::new();

    for direction in [Direction::Upstream, Direction::Downstream] {
        let query = ImpactQuery::new(vec![focus.node_id.clone()], focus.radius, direction)
            .with_start_nodes()
            .with_suggested();
        for entry in graph.impact(&query).all() {
            included.insert(entry.id.clone());
        }
    }

    let nodes: Vec<ArtifactNode> = included
        .iter()
        .filter_map(|id| graph.get(id))
        .cloned()
        .collect();

    let edges: Vec<EdgeRecord> = graph
        .edge_records()
        .into_iter()
        .filter(|e| included.contains(&e.source) && included.contains(&e.target))
        .collect();

    (nodes, edges)
}

fn dot_shape(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Spec => "ellipse",
        ArtifactKind::Code => "box",
        ArtifactKind::Test => "diamond",
    }
}

/// Escapes a string for use inside a double-quoted DOT string.
fn dot_quote(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn render_dot(nodes: &[ArtifactNode], edges: &[EdgeRecord]) -> String {
    let mut out = String::from("digraph specimpact {\n    rankdir=LR;\n");

    for node in nodes {
        let id = dot_quote(&node.id);
        let _ = writeln!(
            out,
            "    \"{}\" [label=\"{}\", shape={}];",
            id,
            id,
            dot_shape(node.kind)
        );
    }

    for edge in edges {
        let _ = writeln!(
            out,
            "    \"{}\" -> \"{}\" [label=\"{} ({:.2})\"];",
            dot_quote(&edge.source),
            dot_quote(&edge.target),
            edge.relationship,
            edge.confidence
        );
    }

    out.push_str("}\n");
    out
}

fn render_mermaid(nodes: &[ArtifactNode], edges: &[EdgeRecord]) -> String {
    // Mermaid node ids must be plain identifiers; map artifact ids to
    // n0, n1, ... in sorted order.
    let alias = |id: &str| -> Option<String> {
        nodes
            .iter()
            .position(|n| n.id == id)
            .map(|pos| format!("n{}", pos))
    };

    let mut out = String::from("graph TD\n");

    for (pos, node) in nodes.iter().enumerate() {
        // Mermaid has no backslash escape inside quoted labels.
        let label = node.id.replace('"', "#quot;");
        let _ = writeln!(out, "    n{}[\"{}\"]", pos, label);
    }

    for edge in edges {
        let (Some(source), Some(target)) = (alias(&edge.source), alias(&edge.target)) else {
            continue;
        };
        let _ = writeln!(out, "    {} -->|{}| {}", source, edge.relationship, target);
    }

    out
}
