//! Request handlers for protocol methods.
//!
//! Read handlers clone a graph snapshot under the read lock and release
//! it before doing any work, so a long traversal never holds the lock.
//! The update handler takes the write lock; concurrent updates queue
//! behind it.

use crate::protocol::{
    ExportParams, ImpactParams, NodeGetParams, Response, UpdateParams, NODE_NOT_FOUND,
};
use serde_json::Value;
use specimpact_core::ArtifactKind;
use specimpact_graph::{export, Direction, ExportFormat, Focus, ImpactQuery};
use specimpact_link::IncrementalUpdater;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

/// Shared updater state across connections.
pub type SharedState = Arc<RwLock<IncrementalUpdater>>;

/// Handles the graph.info method.
pub async fn handle_info(state: SharedState, id: Option<Value>) -> Response {
    let snapshot = state.read().await.snapshot();
    let stats = snapshot.stats();

    Response::success(
        id,
        serde_json::json!({
            "nodeCount": stats.node_count,
            "edgeCount": stats.edge_count,
            "specs": stats.specs,
            "code": stats.code,
            "tests": stats.tests,
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Handles the impact method.
pub async fn handle_impact(state: SharedState, id: Option<Value>, params: ImpactParams) -> Response {
    let start = Instant::now();
    let snapshot = state.read().await.snapshot();

    // Resolve start nodes; paths may name several artifacts each.
    let mut start_ids: BTreeSet<String> = params.ids.iter().cloned().collect();
    for path in &params.paths {
        for node in snapshot.find_by_path(path) {
            start_ids.insert(node.id.clone());
        }
    }

    debug!("impact query over {} start nodes", start_ids.len());

    let direction = match params.direction.as_deref() {
        None => Direction::Downstream,
        Some(s) => match s.parse::<Direction>() {
            Ok(d) => d,
            Err(e) => return Response::invalid_params(id, e),
        },
    };

    let mut query = ImpactQuery::new(start_ids.into_iter().collect(), params.depth, direction);
    if let Some(kinds) = &params.kinds {
        let mut parsed = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match kind.parse::<ArtifactKind>() {
                Ok(k) => parsed.push(k),
                Err(e) => return Response::invalid_params(id, e),
            }
        }
        query = query.with_kinds(parsed);
    }
    if params.include_suggested {
        query = query.with_suggested();
    }

    let set = snapshot.impact(&query);
    let total = set.total();

    Response::success(
        id,
        serde_json::json!({
            "impact": set,
            "total": total,
            "queryTime": start.elapsed().as_millis() as u64,
        }),
    )
}

/// Handles the node.get method.
pub async fn handle_node_get(state: SharedState, id: Option<Value>, params: NodeGetParams) -> Response {
    let snapshot = state.read().await.snapshot();

    match snapshot.get(&params.id) {
        Some(node) => {
            let outgoing = snapshot.forward_edges(&node.id, None);
            let incoming = snapshot.reverse_edges(&node.id, None);

            Response::success(
                id,
                serde_json::json!({
                    "id": node.id,
                    "kind": node.kind,
                    "path": node.path,
                    "metadata": node.metadata,
                    "edges": {
                        "outgoing": outgoing,
                        "incoming": incoming,
                    }
                }),
            )
        }
        None => Response::error(id, NODE_NOT_FOUND, format!("Node not found: {}", params.id)),
    }
}

/// Handles the export method.
pub async fn handle_export(state: SharedState, id: Option<Value>, params: ExportParams) -> Response {
    let snapshot = state.read().await.snapshot();

    let format = match params.format.parse::<ExportFormat>() {
        Ok(f) => f,
        Err(e) => return Response::invalid_params(id, e),
    };

    let focus = match params.focus_node {
        Some(node_id) => {
            if !snapshot.contains(&node_id) {
                return Response::error(id, NODE_NOT_FOUND, format!("Node not found: {}", node_id));
            }
            Some(Focus {
                node_id,
                radius: params.radius.unwrap_or(1),
            })
        }
        None => None,
    };

    match export(&snapshot, format, focus.as_ref()) {
        Ok(content) => Response::success(
            id,
            serde_json::json!({
                "format": params.format,
                "content": content,
            }),
        ),
        Err(e) => Response::error(id, crate::protocol::INTERNAL_ERROR, e.to_string()),
    }
}

/// Handles the update method.
pub async fn handle_update(state: SharedState, id: Option<Value>, params: UpdateParams) -> Response {
    let start = Instant::now();
    let mut updater = state.write().await;

    debug!("update over {} changed artifacts", params.changed.len());
    let report = updater.update(&params.changed);
    drop(updater);

    Response::success(
        id,
        serde_json::json!({
            "edgesAdded": report.edges_added,
            "edgesRemoved": report.edges_removed,
            "edgesUnchanged": report.edges_unchanged,
            "conflicts": report.conflicts,
            "failedArtifacts": report.failed_artifacts,
            "cancelled": report.cancelled,
            "queryTime": start.elapsed().as_millis() as u64,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use specimpact_core::Artifact;
    use specimpact_core::NoDeclaredLinks;
    use specimpact_link::LinkInference;

    fn auth_state() -> SharedState {
        let mut updater = IncrementalUpdater::new(LinkInference::new(Box::new(NoDeclaredLinks)));
        updater
            .register(Artifact::new("spec:auth", ArtifactKind::Spec, "specs/auth.md"))
            .unwrap();
        updater
            .register(Artifact::new(
                "code:auth_service",
                ArtifactKind::Code,
                "src/auth_service.rs",
            ))
            .unwrap();
        updater.update(&["code:auth_service".to_string()]);
        Arc::new(RwLock::new(updater))
    }

    #[tokio::test]
    async fn test_info_reports_counts() {
        let response = handle_info(auth_state(), Some(serde_json::json!(1))).await;
        let result = response.result.unwrap();
        assert_eq!(result["nodeCount"], 2);
        assert_eq!(result["edgeCount"], 1);
        assert_eq!(result["specs"], 1);
    }

    #[tokio::test]
    async fn test_impact_by_path() {
        let params = ImpactParams {
            ids: vec![],
            paths: vec!["src/auth_service.rs".to_string()],
            depth: 1,
            direction: Some("upstream".to_string()),
            kinds: None,
            include_suggested: false,
        };
        let response = handle_impact(auth_state(), None, params).await;
        let result = response.result.unwrap();
        assert_eq!(result["total"], 1);
        assert_eq!(result["impact"]["specs"][0]["id"], "spec:auth");
    }

    #[tokio::test]
    async fn test_impact_rejects_bad_direction() {
        let params = ImpactParams {
            ids: vec!["spec:auth".to_string()],
            paths: vec![],
            depth: 1,
            direction: Some("sideways".to_string()),
            kinds: None,
            include_suggested: false,
        };
        let response = handle_impact(auth_state(), None, params).await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_node_get_missing() {
        let params = NodeGetParams {
            id: "code:ghost".to_string(),
        };
        let response = handle_node_get(auth_state(), None, params).await;
        assert_eq!(response.error.unwrap().code, NODE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_reports_idempotence() {
        let state = auth_state();
        let params = UpdateParams {
            changed: vec!["code:auth_service".to_string()],
        };
        let response = handle_update(state, None, params).await;
        let result = response.result.unwrap();
        assert_eq!(result["edgesAdded"], 0);
        assert_eq!(result["edgesRemoved"], 0);
    }
}
