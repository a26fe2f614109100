//! JSON-RPC 2.0 message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC request.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<Value>,
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

pub const NODE_NOT_FOUND: i64 = -32001;
pub const INTERNAL_ERROR: i64 = -32603;

impl Response {
    pub fn success(id: Option<Value>, result: impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self {
                jsonrpc: "2.0",
                result: Some(value),
                error: None,
                id,
            },
            Err(e) => Self::error(id, INTERNAL_ERROR, e.to_string()),
        }
    }

    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }

    pub fn parse_error() -> Self {
        Self::error(None, -32700, "Parse error")
    }

    pub fn invalid_params(id: Option<Value>, message: impl Into<String>) -> Self {
        Self::error(id, -32602, message)
    }

    pub fn method_not_found(id: Option<Value>, method: &str) -> Self {
        Self::error(id, -32601, format!("Method not found: {}", method))
    }
}

/// Parameters for the impact method.
///
/// Start nodes may be named by id or by path; paths resolve to every
/// artifact at that path.
#[derive(Debug, Clone, Deserialize)]
pub struct ImpactParams {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    pub depth: usize,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub kinds: Option<Vec<String>>,
    #[serde(default, rename = "includeSuggested")]
    pub include_suggested: bool,
}

/// Parameters for the node.get method.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeGetParams {
    pub id: String,
}

/// Parameters for the export method.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportParams {
    pub format: String,
    #[serde(default, rename = "focusNode")]
    pub focus_node: Option<String>,
    #[serde(default)]
    pub radius: Option<usize>,
}

/// Parameters for the update method.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateParams {
    pub changed: Vec<String>,
}
