//! MCP (Model Context Protocol) client for agentloop.
//!
//! Talks JSON-RPC 2.0 to a tool server running as a child process and
//! exposes it to the orchestration loop as a [`ToolDispatcher`].
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **transport**: Pluggable transport layer (child process, channels)
//! - **session**: Handshake, discovery and tool calls over a transport
//! - **error**: Wire-level errors, mapped into [`TransportError`]
//!
//! # Usage
//!
//! ```no_run
//! use agentloop_mcp::{McpSession, ServerCommand};
//!
//! # async fn example() -> Result<(), agentloop_runtime::TransportError> {
//! let mut session = McpSession::spawn(&ServerCommand::new("./bin/weather_server")).await?;
//! let tools = session.list_tools().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`ToolDispatcher`]: agentloop_runtime::ToolDispatcher
//! [`TransportError`]: agentloop_runtime::TransportError

pub mod error;
pub mod session;
pub mod transport;
pub mod types;

pub use error::McpError;
pub use session::McpSession;
pub use transport::{ChannelTransport, ChildProcessTransport, McpTransport, ServerCommand};
pub use types::*;
