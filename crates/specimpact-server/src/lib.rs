//! WebSocket server for the SpecImpact graph.
//!
//! Exposes impact queries, node lookups, exports, and incremental
//! updates as JSON-RPC 2.0 messages over WebSocket. Multiple clients
//! may connect concurrently; reads run against graph snapshots while
//! updates serialize behind a write lock.

mod handlers;
mod protocol;
mod server;

pub use handlers::SharedState;
pub use protocol::{Request, Response, RpcError};
pub use server::{ImpactServer, ServerConfig};
