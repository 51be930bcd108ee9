//! Translation between the conversation types and the Gemini
//! `generateContent` wire format.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use agentloop_runtime::{
    Choice, ContentPart, ModelError, ModelResponse, ModelToolSpec, Role, ToolCallIntent, Turn,
    Usage,
};

use crate::provider::synthesize_call_id;

/// Build the request body for the Gemini generateContent API.
pub(super) fn build_request_body(
    history: &[Turn],
    tools: &[ModelToolSpec],
    max_tokens: u32,
    temperature: Option<f32>,
) -> Value {
    // Gemini takes system text out of band
    let system: Vec<String> = history
        .iter()
        .filter(|t| t.role() == Role::System)
        .filter_map(Turn::text_content)
        .collect();

    let contents: Vec<Value> = history
        .iter()
        .filter(|t| t.role() != Role::System)
        .map(turn_to_gemini)
        .collect();

    let mut generation_config = json!({ "maxOutputTokens": max_tokens });
    if let Some(temperature) = temperature {
        generation_config["temperature"] = json!(temperature);
    }

    let mut body = json!({
        "contents": contents,
        "generationConfig": generation_config,
    });

    if !system.is_empty() {
        body["system_instruction"] = json!({
            "parts": [{ "text": system.join("\n") }],
        });
    }

    if !tools.is_empty() {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    body
}

fn turn_to_gemini(turn: &Turn) -> Value {
    let role = match turn.role() {
        Role::Assistant => "model",
        // Function responses travel as user content
        Role::User | Role::ToolResult | Role::System => "user",
    };

    let parts: Vec<Value> = turn
        .parts()
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "text": text }),
            ContentPart::ToolCall(intent) => {
                let args = intent
                    .parse_arguments()
                    .unwrap_or_else(|_| Map::new());
                json!({
                    "functionCall": {
                        "name": intent.tool_name,
                        "args": args,
                    }
                })
            }
            ContentPart::ToolCallResponse(resp) => json!({
                "functionResponse": {
                    "name": resp.tool_name,
                    "response": { "content": resp.content },
                }
            }),
        })
        .collect();

    json!({ "role": role, "parts": parts })
}

// ── Response ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

/// Finish reasons Gemini uses when it withholds content.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
];

/// Convert a Gemini response into the vendor-neutral shape.
///
/// A blocked prompt, or a candidate stopped by a content filter with nothing
/// to show, becomes [`ModelError::SafetyBlocked`]. Any other candidate with
/// neither text nor a function call is an error too, never an empty answer.
pub(super) fn parse_response(resp: GenerateContentResponse) -> Result<ModelResponse, ModelError> {
    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ModelError::SafetyBlocked(reason));
    }

    let mut choices = Vec::with_capacity(resp.candidates.len());
    for candidate in resp.candidates {
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in parts {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(call) = part.function_call {
                tool_calls.push(ToolCallIntent::new(
                    call.id.unwrap_or_else(synthesize_call_id),
                    call.name,
                    call.args,
                ));
            }
        }

        if text.trim().is_empty() && tool_calls.is_empty() {
            // Only the first candidate is ever acted on
            if choices.is_empty() {
                return Err(empty_candidate_error(candidate.finish_reason));
            }
            continue;
        }

        choices.push(Choice {
            content: text,
            tool_calls,
            finish_reason: candidate.finish_reason,
        });
    }

    let usage = resp.usage_metadata.map(|u| Usage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
    });

    Ok(ModelResponse { choices, usage })
}

fn empty_candidate_error(finish_reason: Option<String>) -> ModelError {
    match finish_reason {
        Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason.as_str()) => {
            ModelError::SafetyBlocked(reason)
        }
        Some(reason) if reason == "MAX_TOKENS" => ModelError::InvalidResponse(
            "output token limit reached before any content was produced".to_string(),
        ),
        Some(reason) => {
            ModelError::InvalidResponse(format!("candidate has no content (finish reason {})", reason))
        }
        None => ModelError::EmptyResponse,
    }
}
