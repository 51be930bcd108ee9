use crate::conversation::Turn;
use crate::tool::{ModelToolSpec, ToolCallIntent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Trait for LLM backends that support function calling.
///
/// This trait lives in tool-runtime (not in crates/llm) because it's
/// defined by the consumer (the agentic loop), not the provider.
/// Implementations live in crates/llm.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the full history and the available tools to the model and return
    /// its raw response.
    async fn generate(
        &self,
        history: &[Turn],
        tools: &[ModelToolSpec],
    ) -> Result<ModelResponse, ModelError>;

    /// Generate and reduce the response to a single [`ModelChoice`].
    async fn invoke(
        &self,
        history: &[Turn],
        tools: &[ModelToolSpec],
    ) -> Result<Selection, ModelError> {
        self.generate(history, tools).await?.select()
    }

    /// Provider name for logging/debugging (e.g., "gemini", "openai")
    fn provider_name(&self) -> &str;
}

/// Vendor-neutral shape of a model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// What the model wants to happen next.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChoice {
    ToolCall(ToolCallIntent),
    FinalAnswer(String),
}

/// A [`ModelChoice`] plus the tool calls that were dropped to produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub choice: ModelChoice,
    /// Additional tool calls proposed in the same response. They are never
    /// executed.
    pub discarded: Vec<ToolCallIntent>,
    pub usage: Option<Usage>,
}

impl ModelResponse {
    /// A single-choice response carrying plain text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                content: content.into(),
                ..Choice::default()
            }],
            usage: None,
        }
    }

    /// A single-choice response carrying the given tool calls.
    pub fn tool_calls(calls: Vec<ToolCallIntent>) -> Self {
        Self {
            choices: vec![Choice {
                tool_calls: calls,
                ..Choice::default()
            }],
            usage: None,
        }
    }

    /// Reduce the response to one choice.
    ///
    /// Only the first choice is considered, and only its first tool call is
    /// acted upon. Models that propose several calls in one response get the
    /// rest discarded un-executed; they are returned in
    /// [`Selection::discarded`] so callers can surface the drop. This is a
    /// deliberate one-call-per-turn policy, not a transport limitation.
    pub fn select(self) -> Result<Selection, ModelError> {
        let usage = self.usage;
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyResponse)?;

        let mut calls = choice.tool_calls.into_iter();
        match calls.next() {
            Some(first) => {
                let discarded: Vec<ToolCallIntent> = calls.collect();
                if !discarded.is_empty() {
                    warn!(
                        kept = %first.tool_name,
                        discarded = discarded.len(),
                        "Model proposed several tool calls; only the first is executed"
                    );
                }
                Ok(Selection {
                    choice: ModelChoice::ToolCall(first),
                    discarded,
                    usage,
                })
            }
            // An empty assistant turn would poison every later request
            None if choice.content.trim().is_empty() => Err(ModelError::EmptyResponse),
            None => Ok(Selection {
                choice: ModelChoice::FinalAnswer(choice.content),
                discarded: Vec::new(),
                usage,
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Rate limited{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("Response blocked by safety filters: {0}")]
    SafetyBlocked(String),
    #[error("Network error: {0}")]
    Transport(String),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Authentication failed")]
    Auth,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Model returned an empty response")]
    EmptyResponse,
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(": retry after {}s", secs),
        None => String::new(),
    }
}

impl ModelError {
    /// Whether the model backend is unusable for the rest of the session.
    ///
    /// Only a rejected credential qualifies; network failures end the turn
    /// and the next input tries again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ModelError::Auth)
    }
}

/// Mock model client for testing the agentic loop without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A mock client that returns pre-configured responses in order and
    /// records every history it was shown.
    ///
    /// Once the queue is empty, calls fail with [`ModelError::EmptyResponse`].
    #[derive(Default)]
    pub struct ScriptedModelClient {
        responses: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
        seen: Mutex<Vec<Vec<Turn>>>,
    }

    impl ScriptedModelClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response that will be returned on the next unanswered call.
        pub fn queue_response(&self, response: ModelResponse) {
            self.responses.lock().unwrap().push_back(Ok(response));
        }

        /// Queue a simple text response.
        pub fn queue_text(&self, text: &str) {
            self.queue_response(ModelResponse::text(text));
        }

        /// Queue a response proposing a single tool call.
        pub fn queue_tool_call(&self, id: &str, name: &str, arguments: serde_json::Value) {
            self.queue_response(ModelResponse::tool_calls(vec![ToolCallIntent::new(
                id, name, arguments,
            )]));
        }

        pub fn queue_error(&self, error: ModelError) {
            self.responses.lock().unwrap().push_back(Err(error));
        }

        /// Number of times the model was invoked.
        pub fn invocations(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        /// The history passed on the `n`th invocation.
        pub fn history_at(&self, n: usize) -> Vec<Turn> {
            self.seen.lock().unwrap()[n].clone()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModelClient {
        async fn generate(
            &self,
            history: &[Turn],
            _tools: &[ModelToolSpec],
        ) -> Result<ModelResponse, ModelError> {
            self.seen.lock().unwrap().push(history.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ModelError::EmptyResponse))
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_final_answer() {
        let selection = ModelResponse::text("It's sunny.").select().unwrap();
        assert_eq!(selection.choice, ModelChoice::FinalAnswer("It's sunny.".to_string()));
        assert!(selection.discarded.is_empty());
    }

    #[test]
    fn test_select_first_tool_call_only() {
        let response = ModelResponse::tool_calls(vec![
            ToolCallIntent::new("a", "get_weather", json!({"location": "London"})),
            ToolCallIntent::new("b", "get_weather", json!({"location": "New York"})),
        ]);
        let selection = response.select().unwrap();
        match selection.choice {
            ModelChoice::ToolCall(intent) => assert_eq!(intent.id, "a"),
            other => panic!("expected tool call, got {:?}", other),
        }
        assert_eq!(selection.discarded.len(), 1);
        assert_eq!(selection.discarded[0].id, "b");
    }

    #[test]
    fn test_tool_call_wins_over_text() {
        let response = ModelResponse {
            choices: vec![Choice {
                content: "Let me check.".to_string(),
                tool_calls: vec![ToolCallIntent::new("a", "get_weather", json!({}))],
                finish_reason: None,
            }],
            usage: None,
        };
        assert!(matches!(response.select().unwrap().choice, ModelChoice::ToolCall(_)));
    }

    #[test]
    fn test_only_first_choice_is_used() {
        let response = ModelResponse {
            choices: vec![
                Choice {
                    content: "first".to_string(),
                    ..Choice::default()
                },
                Choice {
                    content: "second".to_string(),
                    ..Choice::default()
                },
            ],
            usage: Some(Usage {
                prompt_tokens: 3,
                completion_tokens: 1,
                total_tokens: 4,
            }),
        };
        let selection = response.select().unwrap();
        assert_eq!(selection.choice, ModelChoice::FinalAnswer("first".to_string()));
        assert_eq!(selection.usage.unwrap().total_tokens, 4);
    }

    #[test]
    fn test_no_choices_is_an_error() {
        assert!(matches!(
            ModelResponse::default().select(),
            Err(ModelError::EmptyResponse)
        ));
    }

    #[test]
    fn test_empty_text_is_an_error() {
        assert!(matches!(
            ModelResponse::text("").select(),
            Err(ModelError::EmptyResponse)
        ));
        assert!(matches!(
            ModelResponse::text("  \n").select(),
            Err(ModelError::EmptyResponse)
        ));
    }

    #[test]
    fn test_error_classification() {
        assert!(!ModelError::Transport("connection reset".into()).is_fatal());
        assert!(ModelError::Auth.is_fatal());
        assert!(!ModelError::RateLimited { retry_after_secs: None }.is_fatal());
        assert!(!ModelError::SafetyBlocked("SAFETY".into()).is_fatal());
        assert_eq!(
            ModelError::RateLimited { retry_after_secs: Some(7) }.to_string(),
            "Rate limited: retry after 7s"
        );
    }
}
