//! WebSocket server implementation.
//!
//! Handles client connections and routes messages to handlers.

use crate::handlers::{
    handle_export, handle_impact, handle_info, handle_node_get, handle_update, SharedState,
};
use crate::protocol::{ExportParams, ImpactParams, NodeGetParams, Request, Response, UpdateParams};
use futures_util::{SinkExt, StreamExt};
use specimpact_link::IncrementalUpdater;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Server configuration.
pub struct ServerConfig {
    /// Address to bind to.
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 7641)),
        }
    }
}

/// The SpecImpact WebSocket server.
pub struct ImpactServer {
    config: ServerConfig,
    state: SharedState,
}

impl ImpactServer {
    /// Creates a new server around an updater.
    pub fn new(updater: IncrementalUpdater, config: ServerConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(updater)),
        }
    }

    /// Returns a handle to the shared state for out-of-band updates.
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Runs the server, accepting connections forever.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        info!("specimpact server listening on {}", self.config.addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, state).await {
                            error!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handles a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: SharedState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    info!("WebSocket connection established with {}", addr);

    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!("Message error from {}: {}", addr, e);
                break;
            }
        };

        if msg.is_close() {
            debug!("Client {} disconnected", addr);
            break;
        }

        if msg.is_ping() {
            write.send(Message::Pong(msg.into_data())).await?;
            continue;
        }

        if msg.is_text() {
            let text = msg.to_text().unwrap_or("");
            let response = process_message(text, state.clone()).await;
            let json = serde_json::to_string(&response)?;
            write.send(Message::Text(json)).await?;
        }
    }

    info!("Connection closed: {}", addr);
    Ok(())
}

/// Processes a JSON-RPC message and returns a response.
async fn process_message(text: &str, state: SharedState) -> Response {
    let request: Request = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => return Response::parse_error(),
    };

    let id = request.id.clone();
    let method = request.method.as_str();

    debug!("Processing method: {}", method);

    match method {
        "graph.info" => handle_info(state, id).await,

        "impact" => match serde_json::from_value::<ImpactParams>(request.params) {
            Ok(params) => handle_impact(state, id, params).await,
            Err(e) => Response::invalid_params(id, e.to_string()),
        },

        "node.get" => match serde_json::from_value::<NodeGetParams>(request.params) {
            Ok(params) => handle_node_get(state, id, params).await,
            Err(e) => Response::invalid_params(id, e.to_string()),
        },

        "export" => match serde_json::from_value::<ExportParams>(request.params) {
            Ok(params) => handle_export(state, id, params).await,
            Err(e) => Response::invalid_params(id, e.to_string()),
        },

        "update" => match serde_json::from_value::<UpdateParams>(request.params) {
            Ok(params) => handle_update(state, id, params).await,
            Err(e) => Response::invalid_params(id, e.to_string()),
        },

        _ => Response::method_not_found(id, method),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specimpact_core::{Artifact, ArtifactKind, NoDeclaredLinks};
    use specimpact_link::LinkInference;

    fn state() -> SharedState {
        let mut updater = IncrementalUpdater::new(LinkInference::new(Box::new(NoDeclaredLinks)));
        updater
            .register(Artifact::new("spec:auth", ArtifactKind::Spec, "specs/auth.md"))
            .unwrap();
        Arc::new(RwLock::new(updater))
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let response = process_message("{not json", state()).await;
        assert_eq!(response.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = process_message(
            r#"{"jsonrpc":"2.0","method":"graph.reticulate","id":3}"#,
            state(),
        )
        .await;
        assert_eq!(response.error.unwrap().code, -32601);
        assert_eq!(response.id, Some(serde_json::json!(3)));
    }

    #[tokio::test]
    async fn test_info_routes() {
        let response = process_message(r#"{"jsonrpc":"2.0","method":"graph.info","id":1}"#, state()).await;
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["nodeCount"], 1);
    }
}
