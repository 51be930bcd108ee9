//! Conversation state, tool adaptation and the orchestration loop.
//!
//! Vendor-neutral: model backends live in `agentloop-llm`, the tool process
//! client lives in `agentloop-mcp`. Both plug in through the traits defined
//! here ([`ModelClient`], [`ToolDispatcher`]).

pub mod conversation;
pub mod dispatch;
pub mod event;
pub mod provider;
pub mod registry;
pub mod runtime;
pub mod tool;

pub use conversation::{ContentPart, Conversation, ConversationError, Role, Turn};
pub use dispatch::{ToolCallError, ToolDispatcher, ToolInvocationError, TransportError};
pub use event::LoopEvent;
pub use provider::{Choice, ModelChoice, ModelClient, ModelError, ModelResponse, Selection, Usage};
pub use registry::build_descriptors;
pub use runtime::{AgenticLoop, AgenticLoopError, TurnReport, DEFAULT_MAX_ITERATIONS};
pub use tool::{ArgumentParseError, ModelToolSpec, ToolCallIntent, ToolDescriptor, ToolResponse};
