//! Error types for the MCP crate.

use std::time::Duration;

use agentloop_runtime::TransportError;

use crate::types::{JsonRpcError, RpcId};

/// Errors that can occur while talking to an MCP server.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The server process could not be started.
    #[error("failed to spawn MCP server: {0}")]
    Spawn(String),

    /// A line on the wire was not valid JSON-RPC.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with a JSON-RPC error object.
    #[error("MCP server error: {0}")]
    Rpc(#[from] JsonRpcError),

    /// A response arrived for a request that is not outstanding.
    #[error("expected response to request {expected}, got {got}")]
    UnexpectedId { expected: RpcId, got: RpcId },

    /// The server repeated a pagination cursor.
    #[error("{method} returned the same cursor twice: {cursor}")]
    CursorLoop { method: &'static str, cursor: String },

    #[error("MCP request timed out after {0:?}")]
    Timeout(Duration),

    /// The server closed its end, or the session was shut down.
    #[error("MCP server disconnected")]
    Disconnected,
}

impl McpError {
    /// Whether the session can keep going after this error. Only a JSON-RPC
    /// error reply leaves the wire in a known state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, McpError::Rpc(_))
    }
}

impl From<McpError> for TransportError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Spawn(msg) => TransportError::Unreachable(msg),
            McpError::Io(e) => TransportError::Io(e),
            McpError::Timeout(d) => TransportError::Timeout(d),
            McpError::Disconnected => TransportError::Closed,
            other @ (McpError::Json(_)
            | McpError::Rpc(_)
            | McpError::UnexpectedId { .. }
            | McpError::CursorLoop { .. }) => TransportError::Protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_mapping() {
        assert!(matches!(
            TransportError::from(McpError::Disconnected),
            TransportError::Closed
        ));
        assert!(matches!(
            TransportError::from(McpError::Spawn("no such file".into())),
            TransportError::Unreachable(_)
        ));
        let mismatch = McpError::UnexpectedId {
            expected: RpcId::Number(2),
            got: RpcId::Number(7),
        };
        match TransportError::from(mismatch) {
            TransportError::Protocol(msg) => {
                assert_eq!(msg, "expected response to request 2, got 7")
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_only_rpc_errors_are_recoverable() {
        let rpc = McpError::Rpc(JsonRpcError {
            code: -32602,
            message: "bad params".into(),
            data: None,
        });
        assert!(rpc.is_recoverable());
        assert!(!McpError::Timeout(Duration::from_secs(1)).is_recoverable());
        assert!(!McpError::Disconnected.is_recoverable());
    }
}
