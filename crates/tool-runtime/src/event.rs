use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Things that happened while resolving one user turn, in order.
/// The CLI renders these; the conversation history is the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoopEvent {
    /// The model asked for a tool and the loop is dispatching it
    ToolCallIssued {
        id: String,
        name: String,
        arguments: Value,
    },
    /// A tool result (or error) was added to the conversation
    ToolResultReceived {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    /// Extra tool calls in a single response that were not executed
    DiscardedToolCalls { names: Vec<String> },
    /// The per-turn tool-call budget ran out
    IterationLimitReached { max_iterations: usize },
    /// The answer emitted to the user
    FinalAnswer { text: String },
}
