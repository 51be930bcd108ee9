//! The seam between the orchestration loop and whatever actually runs tools.
//!
//! The trait lives here, next to its consumer; the MCP session in
//! `agentloop-mcp` is the production implementation.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

/// Runs tools on behalf of the orchestration loop.
///
/// Methods take `&mut self`, so a dispatcher never has more than one call in
/// flight.
#[async_trait]
pub trait ToolDispatcher: Send {
    /// Invoke `name` with `arguments` and return the textual result.
    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, ToolCallError>;
}

/// A tool call that failed at the application level. Recoverable: the loop
/// shows it to the model as a tool result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolInvocationError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Remote failure: {0}")]
    RemoteFailure(String),
}

/// The connection to the tool process is broken. Fatal for the session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("tool process unreachable: {0}")]
    Unreachable(String),
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("no response after {0:?}")]
    Timeout(Duration),
    #[error("session is closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error(transparent)]
    Invocation(#[from] ToolInvocationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Scripted dispatcher for exercising the loop without a tool process.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// Returns queued results in order and records every call it receives.
    /// Once the queue is empty each call succeeds with an empty string.
    #[derive(Default)]
    pub struct ScriptedDispatcher {
        results: VecDeque<Result<String, ToolCallError>>,
        calls: Vec<(String, Map<String, Value>)>,
    }

    impl ScriptedDispatcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_ok(&mut self, content: &str) -> &mut Self {
            self.results.push_back(Ok(content.to_string()));
            self
        }

        pub fn queue_err(&mut self, error: impl Into<ToolCallError>) -> &mut Self {
            self.results.push_back(Err(error.into()));
            self
        }

        /// Calls received so far, as `(tool name, arguments)`.
        pub fn calls(&self) -> &[(String, Map<String, Value>)] {
            &self.calls
        }
    }

    #[async_trait]
    impl ToolDispatcher for ScriptedDispatcher {
        async fn call_tool(
            &mut self,
            name: &str,
            arguments: Map<String, Value>,
        ) -> Result<String, ToolCallError> {
            self.calls.push((name.to_string(), arguments));
            self.results.pop_front().unwrap_or_else(|| Ok(String::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::ScriptedDispatcher;
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ToolInvocationError::UnknownTool("get_time".into()).to_string(),
            "Unknown tool: get_time"
        );
        let wrapped: ToolCallError = ToolInvocationError::RemoteFailure("boom".into()).into();
        assert_eq!(wrapped.to_string(), "Remote failure: boom");
    }

    #[tokio::test]
    async fn test_scripted_dispatcher_order() {
        let mut dispatcher = ScriptedDispatcher::new();
        dispatcher
            .queue_ok("first")
            .queue_err(ToolInvocationError::UnknownTool("x".into()));

        assert_eq!(dispatcher.call_tool("a", Map::new()).await.unwrap(), "first");
        assert!(matches!(
            dispatcher.call_tool("x", Map::new()).await,
            Err(ToolCallError::Invocation(ToolInvocationError::UnknownTool(_)))
        ));
        assert_eq!(dispatcher.call_tool("b", Map::new()).await.unwrap(), "");
        assert_eq!(dispatcher.calls().len(), 3);
    }
}
