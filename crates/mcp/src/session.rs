//! MCP client session.
//!
//! Owns one connection to an MCP server: runs the initialize handshake,
//! discovers tools and prompts, and forwards tool calls. Every request
//! method takes `&mut self`, so at most one request is ever in flight and
//! responses can be read inline without a background reader task.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use agentloop_runtime::{
    ToolCallError, ToolDescriptor, ToolDispatcher, ToolInvocationError, TransportError,
};

use crate::error::McpError;
use crate::transport::{ChildProcessTransport, McpTransport, ServerCommand};
use crate::types::*;

/// Maximum time to wait for a server to respond to `initialize`.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time to wait for any other request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Name reported to servers in `clientInfo`.
const CLIENT_NAME: &str = "agentloop";

/// A live connection to an MCP server.
pub struct McpSession {
    transport: Box<dyn McpTransport>,
    next_id: i64,
    request_timeout: Duration,
    server_info: ServerInfo,
    /// Tool names from the last `tools/list`
    known_tools: HashSet<String>,
    /// Set after `close` or any error that leaves the wire in an unknown state
    closed: bool,
}

impl McpSession {
    /// Spawn a server process and connect to it.
    pub async fn spawn(command: &ServerCommand) -> Result<Self, TransportError> {
        let transport = ChildProcessTransport::spawn(command)?;
        Self::connect(transport).await
    }

    /// Run the MCP handshake over an already-open transport.
    pub async fn connect(transport: impl McpTransport + 'static) -> Result<Self, TransportError> {
        let mut session = Self {
            transport: Box::new(transport),
            next_id: 1,
            request_timeout: REQUEST_TIMEOUT,
            server_info: ServerInfo::default(),
            known_tools: HashSet::new(),
            closed: false,
        };

        if let Err(e) = session.initialize().await {
            tracing::warn!(error = %e, "MCP handshake failed");
            let _ = session.close().await;
            return Err(TransportError::Unreachable(format!("initialize failed: {}", e)));
        }
        Ok(session)
    }

    /// Override the per-request timeout (does not apply to `initialize`).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Server info reported during initialization.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn initialize(&mut self) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: CLIENT_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let result: InitializeResult = self
            .request("initialize", Some(serde_json::to_value(&params)?), INIT_TIMEOUT)
            .await?;

        if result.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                server = %result.protocol_version,
                client = PROTOCOL_VERSION,
                "MCP server uses a different protocol version"
            );
        }

        self.notify("notifications/initialized", None).await?;

        tracing::info!(
            server = %result.server_info.name,
            version = result.server_info.version.as_deref().unwrap_or("unknown"),
            "MCP session initialized"
        );
        self.server_info = result.server_info;
        Ok(())
    }

    /// Fetch every tool the server advertises, following pagination.
    ///
    /// The returned names become the set `call_tool` accepts.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = serde_json::to_value(PaginatedParams { cursor: cursor.clone() })
                .map_err(McpError::from)?;
            let page: ListToolsResult = self.request_default("tools/list", Some(params)).await?;
            tools.extend(page.tools.into_iter().map(ToolDescriptor::from));
            cursor = next_page("tools/list", cursor, page.next_cursor)?;
            if cursor.is_none() {
                break;
            }
        }

        self.known_tools = tools.iter().map(|t| t.name.clone()).collect();
        for tool in &tools {
            tracing::debug!(name = %tool.name, "Discovered tool");
        }
        tracing::info!(count = tools.len(), "Tool discovery complete");
        Ok(tools)
    }

    /// Call a tool on the server.
    ///
    /// Names not returned by the last [`list_tools`](Self::list_tools) are
    /// rejected locally without a round trip. A JSON-RPC error reply or a
    /// result flagged `isError` is a [`ToolInvocationError::RemoteFailure`].
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, ToolCallError> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        if !self.known_tools.contains(name) {
            return Err(ToolInvocationError::UnknownTool(name.to_string()).into());
        }

        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| TransportError::from(McpError::from(e)))?;

        tracing::debug!(tool = %name, "Calling tool");
        let result: CallToolResult = self
            .request_default("tools/call", Some(params))
            .await
            .map_err(remote_or_transport)?;

        if result.is_error {
            return Err(ToolInvocationError::RemoteFailure(result.text()).into());
        }
        Ok(result)
    }

    /// Fetch every prompt template the server offers.
    pub async fn list_prompts(&mut self) -> Result<Vec<PromptDescriptor>, ToolCallError> {
        let mut prompts = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = serde_json::to_value(PaginatedParams { cursor: cursor.clone() })
                .map_err(|e| TransportError::from(McpError::from(e)))?;
            let page: ListPromptsResult = self
                .request_default("prompts/list", Some(params))
                .await
                .map_err(remote_or_transport)?;
            prompts.extend(page.prompts);
            cursor = next_page("prompts/list", cursor, page.next_cursor)
                .map_err(TransportError::from)?;
            if cursor.is_none() {
                break;
            }
        }
        Ok(prompts)
    }

    /// Render a prompt template with the given arguments.
    pub async fn get_prompt(
        &mut self,
        name: &str,
        arguments: BTreeMap<String, String>,
    ) -> Result<GetPromptResult, ToolCallError> {
        let params = serde_json::to_value(GetPromptParams {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| TransportError::from(McpError::from(e)))?;

        self.request_default("prompts/get", Some(params))
            .await
            .map_err(remote_or_transport)
    }

    /// Shut the connection down. Safe to call more than once.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        tracing::info!("Closing MCP session");
        self.transport.close().await.map_err(TransportError::from)
    }

    async fn request_default<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, McpError> {
        let timeout = self.request_timeout;
        self.request(method, params, timeout).await
    }

    /// Send a request and wait for its response.
    ///
    /// Anything other than a JSON-RPC error reply poisons the session: after
    /// a timeout or a stray id the next line on the wire can no longer be
    /// trusted.
    async fn request<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<T, McpError> {
        if self.closed {
            return Err(McpError::Disconnected);
        }

        let result = self.exchange(method, params, timeout).await;
        if let Err(e) = &result {
            if !e.is_recoverable() {
                tracing::warn!(method = %method, error = %e, "MCP transport failed");
                self.closed = true;
            }
        }
        Ok(serde_json::from_value(result?)?)
    }

    async fn exchange(
        &mut self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = JsonRpcRequest::new(RpcId::Number(id), method, params);
        let line = serde_json::to_string(&request)?;
        tracing::debug!(method = %method, id, "Sending request");
        self.transport.send(&line).await?;

        let response = tokio::time::timeout(timeout, self.read_response(RpcId::Number(id)))
            .await
            .map_err(|_| McpError::Timeout(timeout))??;
        Ok(response.into_result()?)
    }

    async fn read_response(&mut self, expected: RpcId) -> Result<JsonRpcResponse, McpError> {
        loop {
            let line = self
                .transport
                .receive()
                .await?
                .ok_or(McpError::Disconnected)?;
            let message: JsonRpcResponse = serde_json::from_str(&line)?;
            match message.id {
                None => {
                    tracing::debug!(
                        method = message.method.as_deref().unwrap_or("?"),
                        "Skipping server notification"
                    );
                }
                Some(ref id) if *id == expected => return Ok(message),
                Some(got) => return Err(McpError::UnexpectedId { expected, got }),
            }
        }
    }

    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let line = serde_json::to_string(&notification)?;
        self.transport.send(&line).await
    }
}

#[async_trait]
impl ToolDispatcher for McpSession {
    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, ToolCallError> {
        McpSession::call_tool(self, name, arguments)
            .await
            .map(|result| result.text())
    }
}

/// Advance a pagination cursor, refusing a server that repeats itself.
fn next_page(
    method: &'static str,
    current: Option<String>,
    next: Option<String>,
) -> Result<Option<String>, McpError> {
    match next {
        Some(cursor) if cursor.is_empty() => Ok(None),
        Some(cursor) if current.as_deref() == Some(cursor.as_str()) => {
            Err(McpError::CursorLoop { method, cursor })
        }
        other => Ok(other),
    }
}

fn remote_or_transport(err: McpError) -> ToolCallError {
    match err {
        McpError::Rpc(rpc) => ToolInvocationError::RemoteFailure(rpc.message).into(),
        other => TransportError::from(other).into(),
    }
}
