use crate::conversation::{Conversation, ConversationError, Turn};
use crate::dispatch::{ToolCallError, ToolDispatcher, TransportError};
use crate::event::LoopEvent;
use crate::provider::{ModelChoice, ModelClient, ModelError};
use crate::tool::{ModelToolSpec, ToolCallIntent, ToolResponse};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default cap on model invocations per user turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Where the loop is while resolving a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingUserInput,
    AwaitingModelResponse,
    DispatchingTool,
    EmittingFinalAnswer,
}

/// The outcome of one user turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// Text emitted to the user
    pub answer: String,
    /// Number of tool calls dispatched during the turn
    pub tool_calls: usize,
    /// True when the answer was synthesized because the iteration cap hit
    pub exhausted: bool,
    pub events: Vec<LoopEvent>,
}

/// The core agentic loop that orchestrates LLM ↔ Tool execution.
///
/// Flow: User → LLM → ToolCall → Dispatch → Result → LLM → ... → Final Text
///
/// Strictly sequential: one model call or one tool call at a time, and a
/// turn is fully resolved before `run` returns.
pub struct AgenticLoop {
    model: Arc<dyn ModelClient>,
    tools: Vec<ModelToolSpec>,
    max_iterations: usize,
}

impl AgenticLoop {
    pub fn new(model: Arc<dyn ModelClient>, tools: Vec<ModelToolSpec>) -> Self {
        Self {
            model,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// At least one model invocation is always allowed.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run a single user turn through the agentic loop.
    ///
    /// Tool failures become tool-result turns the model can react to. A
    /// [`ModelError`] ends the turn and carries the events recorded before
    /// it; a broken transport or a history invariant violation is returned
    /// as a fatal error.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        dispatcher: &mut dyn ToolDispatcher,
        user_message: String,
    ) -> Result<TurnReport, AgenticLoopError> {
        let mut state = LoopState::AwaitingUserInput;
        conversation.append(Turn::user(user_message))?;
        enter(&mut state, LoopState::AwaitingModelResponse);

        let mut events = Vec::new();
        let mut tool_calls = 0;

        for iteration in 0..self.max_iterations {
            debug!(
                iteration,
                provider = self.model.provider_name(),
                turns = conversation.len(),
                approx_tokens = conversation.approximate_tokens(),
                "Invoking model"
            );

            let selection = match self.model.invoke(conversation.snapshot(), &self.tools).await {
                Ok(selection) => selection,
                Err(source) => {
                    return Err(AgenticLoopError::Model {
                        source,
                        events,
                    })
                }
            };

            if let Some(usage) = selection.usage {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "Model usage"
                );
            }
            if !selection.discarded.is_empty() {
                events.push(LoopEvent::DiscardedToolCalls {
                    names: selection
                        .discarded
                        .iter()
                        .map(|c| c.tool_name.clone())
                        .collect(),
                });
            }

            match selection.choice {
                ModelChoice::FinalAnswer(text) if text.trim().is_empty() => {
                    warn!(iteration, "Model returned a blank answer");
                    return Err(AgenticLoopError::Model {
                        source: ModelError::EmptyResponse,
                        events,
                    });
                }
                ModelChoice::FinalAnswer(text) => {
                    conversation.append(Turn::assistant(text.clone()))?;
                    enter(&mut state, LoopState::EmittingFinalAnswer);
                    info!(iteration, tool_calls, "Agentic loop complete");
                    events.push(LoopEvent::FinalAnswer { text: text.clone() });
                    enter(&mut state, LoopState::AwaitingUserInput);
                    return Ok(TurnReport {
                        answer: text,
                        tool_calls,
                        exhausted: false,
                        events,
                    });
                }
                ModelChoice::ToolCall(intent) => {
                    conversation.append(Turn::tool_call(intent.clone()))?;
                    enter(&mut state, LoopState::DispatchingTool);
                    events.push(LoopEvent::ToolCallIssued {
                        id: intent.id.clone(),
                        name: intent.tool_name.clone(),
                        arguments: intent.arguments.clone(),
                    });

                    let response = self.dispatch(dispatcher, &intent).await?;
                    tool_calls += 1;
                    events.push(LoopEvent::ToolResultReceived {
                        id: response.tool_call_id.clone(),
                        name: response.tool_name.clone(),
                        content: response.content.clone(),
                        is_error: response.is_error,
                    });
                    conversation.append(Turn::tool_result(response))?;
                    enter(&mut state, LoopState::AwaitingModelResponse);
                }
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            tool_calls, "Tool-call budget exhausted, giving up on this turn"
        );
        let text = format!(
            "I was unable to complete this request within {} tool calls.",
            self.max_iterations
        );
        conversation.append(Turn::assistant(text.clone()))?;
        enter(&mut state, LoopState::EmittingFinalAnswer);
        events.push(LoopEvent::IterationLimitReached {
            max_iterations: self.max_iterations,
        });
        events.push(LoopEvent::FinalAnswer { text: text.clone() });
        enter(&mut state, LoopState::AwaitingUserInput);

        Ok(TurnReport {
            answer: text,
            tool_calls,
            exhausted: true,
            events,
        })
    }

    /// Execute one tool call, folding recoverable failures into the result.
    async fn dispatch(
        &self,
        dispatcher: &mut dyn ToolDispatcher,
        intent: &ToolCallIntent,
    ) -> Result<ToolResponse, AgenticLoopError> {
        let arguments = match intent.parse_arguments() {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %intent.tool_name, error = %e, "Rejecting tool call arguments");
                return Ok(ToolResponse::failure(intent, e));
            }
        };

        info!(tool = %intent.tool_name, id = %intent.id, "Dispatching tool call");
        match dispatcher.call_tool(&intent.tool_name, arguments).await {
            Ok(content) => Ok(ToolResponse::success(intent, content)),
            Err(ToolCallError::Invocation(e)) => {
                warn!(tool = %intent.tool_name, error = %e, "Tool call failed");
                Ok(ToolResponse::failure(intent, e))
            }
            Err(ToolCallError::Transport(e)) => Err(AgenticLoopError::Transport(e)),
        }
    }
}

fn enter(state: &mut LoopState, next: LoopState) {
    debug!(from = ?*state, to = ?next, "Loop state transition");
    *state = next;
}

#[derive(Debug, thiserror::Error)]
pub enum AgenticLoopError {
    #[error("LLM error: {source}")]
    Model {
        source: ModelError,
        /// What happened in the turn before the model failed
        events: Vec<LoopEvent>,
    },
    #[error("Tool transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Conversation invariant violated: {0}")]
    Conversation(#[from] ConversationError),
}

impl AgenticLoopError {
    /// Whether the session must end rather than just this turn.
    pub fn is_fatal(&self) -> bool {
        match self {
            AgenticLoopError::Model { source, .. } => source.is_fatal(),
            AgenticLoopError::Transport(_) | AgenticLoopError::Conversation(_) => true,
        }
    }

    /// Events recorded before a model failure. Empty for other errors.
    pub fn events(&self) -> &[LoopEvent] {
        match self {
            AgenticLoopError::Model { events, .. } => events,
            _ => &[],
        }
    }
}
