use crate::tool::{ToolCallIntent, ToolResponse};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolResult,
}

/// One piece of a turn's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentPart {
    Text(String),
    /// The assistant asking for a tool to be run
    ToolCall(ToolCallIntent),
    /// The outcome of a tool call, correlated by id
    ToolCallResponse(ToolResponse),
}

/// A single entry in the conversation history.
///
/// Turns are built through the role-specific constructors and never change
/// once appended to a [`Conversation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    parts: Vec<ContentPart>,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Assistant turn recording a tool-call intent.
    pub fn tool_call(intent: ToolCallIntent) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![ContentPart::ToolCall(intent)],
        }
    }

    pub fn tool_result(response: ToolResponse) -> Self {
        Self {
            role: Role::ToolResult,
            parts: vec![ContentPart::ToolCallResponse(response)],
        }
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    /// Concatenated text parts, if the turn has any.
    pub fn text_content(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }

    pub fn tool_call_intent(&self) -> Option<&ToolCallIntent> {
        self.parts.iter().find_map(|p| match p {
            ContentPart::ToolCall(intent) => Some(intent),
            _ => None,
        })
    }

    pub fn tool_response(&self) -> Option<&ToolResponse> {
        self.parts.iter().find_map(|p| match p {
            ContentPart::ToolCallResponse(resp) => Some(resp),
            _ => None,
        })
    }

    fn char_count(&self) -> usize {
        self.parts
            .iter()
            .map(|p| match p {
                ContentPart::Text(text) => text.len(),
                ContentPart::ToolCall(intent) => {
                    intent.tool_name.len() + intent.arguments.to_string().len()
                }
                ContentPart::ToolCallResponse(resp) => resp.content.len(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    #[error("tool response '{tool_call_id}' does not answer any outstanding tool call")]
    UncorrelatedToolResponse { tool_call_id: String },
    #[error("tool call id '{0}' is already in use")]
    DuplicateToolCallId(String),
    #[error("{part} part is not allowed in a {role:?} turn")]
    MisplacedPart { role: Role, part: &'static str },
}

/// Append-only, totally ordered conversation history.
///
/// The full history is handed to the model on every invocation; no
/// truncation is applied.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    /// Tool calls recorded but not yet answered
    outstanding: HashSet<String>,
    /// Every tool call id seen so far
    seen_call_ids: HashSet<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the history with a system turn.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        if self.turns.is_empty() {
            self.turns.push(Turn::system(prompt));
        }
        self
    }

    pub fn system_prompt(&self) -> Option<String> {
        self.turns
            .first()
            .filter(|t| t.role() == Role::System)
            .and_then(Turn::text_content)
    }

    /// Append a turn.
    ///
    /// Rejects tool responses that do not answer an earlier, still
    /// unanswered tool call, tool calls that reuse an id, and parts placed
    /// under the wrong role. Rejection leaves the history untouched.
    pub fn append(&mut self, turn: Turn) -> Result<(), ConversationError> {
        self.check(&turn)?;
        for part in &turn.parts {
            match part {
                ContentPart::ToolCall(intent) => {
                    self.outstanding.insert(intent.id.clone());
                    self.seen_call_ids.insert(intent.id.clone());
                }
                ContentPart::ToolCallResponse(resp) => {
                    self.outstanding.remove(&resp.tool_call_id);
                }
                ContentPart::Text(_) => {}
            }
        }
        self.turns.push(turn);
        Ok(())
    }

    fn check(&self, turn: &Turn) -> Result<(), ConversationError> {
        let mut answered = HashSet::new();
        let mut issued = HashSet::new();
        for part in &turn.parts {
            match part {
                ContentPart::Text(_) => {}
                ContentPart::ToolCall(intent) => {
                    if turn.role != Role::Assistant {
                        return Err(ConversationError::MisplacedPart {
                            role: turn.role,
                            part: "tool call",
                        });
                    }
                    if self.seen_call_ids.contains(&intent.id) || !issued.insert(&intent.id) {
                        return Err(ConversationError::DuplicateToolCallId(intent.id.clone()));
                    }
                }
                ContentPart::ToolCallResponse(resp) => {
                    if turn.role != Role::ToolResult {
                        return Err(ConversationError::MisplacedPart {
                            role: turn.role,
                            part: "tool response",
                        });
                    }
                    if !self.outstanding.contains(&resp.tool_call_id)
                        || !answered.insert(&resp.tool_call_id)
                    {
                        return Err(ConversationError::UncorrelatedToolResponse {
                            tool_call_id: resp.tool_call_id.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// The full ordered history, for use as model input.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Tool calls that have been recorded but not answered yet.
    pub fn has_outstanding_tool_calls(&self) -> bool {
        !self.outstanding.is_empty()
    }

    /// Approximate token count using character count / 4 heuristic.
    pub fn approximate_tokens(&self) -> usize {
        self.turns.iter().map(Turn::char_count).sum::<usize>() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn intent(id: &str) -> ToolCallIntent {
        ToolCallIntent::new(id, "get_weather", json!({"location": "Bengaluru"}))
    }

    #[test]
    fn test_conversation_basic() {
        let mut conv = Conversation::new().with_system_prompt("You are a weather assistant.");
        conv.append(Turn::user("Hello")).unwrap();
        conv.append(Turn::assistant("Hi there!")).unwrap();

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.system_prompt().as_deref(), Some("You are a weather assistant."));
        assert_eq!(conv.snapshot()[2].text_content().as_deref(), Some("Hi there!"));
    }

    #[test]
    fn test_conversation_with_tool_calls() {
        let mut conv = Conversation::new();
        conv.append(Turn::user("Weather in Bengaluru?")).unwrap();
        let call = intent("call_1");
        conv.append(Turn::tool_call(call.clone())).unwrap();
        assert!(conv.has_outstanding_tool_calls());
        conv.append(Turn::tool_result(ToolResponse::success(&call, "scattered clouds, 28.5°C")))
            .unwrap();

        assert_eq!(conv.len(), 3);
        assert!(!conv.has_outstanding_tool_calls());
        assert_eq!(conv.snapshot()[1].role(), Role::Assistant);
        assert_eq!(conv.snapshot()[2].role(), Role::ToolResult);
        assert_eq!(
            conv.snapshot()[2].tool_response().unwrap().tool_call_id,
            conv.snapshot()[1].tool_call_intent().unwrap().id
        );
    }

    #[test]
    fn test_uncorrelated_response_rejected() {
        let mut conv = Conversation::new();
        conv.append(Turn::tool_call(intent("call_1"))).unwrap();

        let stray = ToolResponse::success(&intent("call_2"), "?");
        let err = conv.append(Turn::tool_result(stray)).unwrap_err();
        assert_eq!(
            err,
            ConversationError::UncorrelatedToolResponse {
                tool_call_id: "call_2".to_string()
            }
        );
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn test_response_cannot_answer_twice() {
        let mut conv = Conversation::new();
        let call = intent("call_1");
        conv.append(Turn::tool_call(call.clone())).unwrap();
        conv.append(Turn::tool_result(ToolResponse::success(&call, "one"))).unwrap();
        assert!(conv
            .append(Turn::tool_result(ToolResponse::success(&call, "two")))
            .is_err());
    }

    #[test]
    fn test_duplicate_call_id_rejected() {
        let mut conv = Conversation::new();
        let call = intent("call_1");
        conv.append(Turn::tool_call(call.clone())).unwrap();
        conv.append(Turn::tool_result(ToolResponse::success(&call, "ok"))).unwrap();
        assert_eq!(
            conv.append(Turn::tool_call(call)).unwrap_err(),
            ConversationError::DuplicateToolCallId("call_1".to_string())
        );
    }

    #[test]
    fn test_append_only_snapshot() {
        let mut conv = Conversation::new();
        conv.append(Turn::user("first")).unwrap();
        conv.append(Turn::assistant("second")).unwrap();
        let before = conv.snapshot().to_vec();

        conv.append(Turn::user("third")).unwrap();
        let after = conv.snapshot();

        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(&after[..before.len()], before.as_slice());
        assert_eq!(after[before.len()], Turn::user("third"));
    }

    #[test]
    fn test_system_prompt_only_at_start() {
        let mut conv = Conversation::new();
        conv.append(Turn::user("hi")).unwrap();
        let conv = conv.with_system_prompt("late");
        assert!(conv.system_prompt().is_none());
    }

    #[test]
    fn test_approximate_tokens() {
        let mut conv = Conversation::new();
        conv.append(Turn::user("a".repeat(40))).unwrap();
        assert_eq!(conv.approximate_tokens(), 10);
    }

    #[test]
    fn test_serialization() {
        let turn = Turn::tool_call(intent("call_1"));
        let json = serde_json::to_string(&turn).unwrap();
        let roundtrip: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(roundtrip, turn);
    }
}
