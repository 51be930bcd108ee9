use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use agentloop_runtime::{
    Choice, ContentPart, ModelClient, ModelError, ModelResponse, ModelToolSpec, Role,
    ToolCallIntent, Turn, Usage,
};

use crate::config::ModelConfig;
use crate::provider::{post_json, synthesize_call_id};

/// Client for OpenAI-compatible `/v1/chat/completions` endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>, config: &ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            base_url: config.resolved_base_url(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn build_request_body(&self, history: &[Turn], tools: &[ModelToolSpec]) -> Value {
        let messages: Vec<Value> = history.iter().flat_map(turn_to_messages).collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if !tools.is_empty() {
            let api_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(api_tools);
        }
        body
    }
}

/// One turn may expand to several chat messages (one per tool result).
fn turn_to_messages(turn: &Turn) -> Vec<Value> {
    match turn.role() {
        Role::System => vec![json!({"role": "system", "content": turn.text_content().unwrap_or_default()})],
        Role::User => vec![json!({"role": "user", "content": turn.text_content().unwrap_or_default()})],
        Role::Assistant => {
            let calls: Vec<Value> = turn
                .parts()
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolCall(intent) => Some(json!({
                        "id": intent.id,
                        "type": "function",
                        "function": {
                            "name": intent.tool_name,
                            "arguments": encode_arguments(&intent.arguments),
                        }
                    })),
                    _ => None,
                })
                .collect();
            let mut message = json!({"role": "assistant", "content": turn.text_content()});
            if !calls.is_empty() {
                message["tool_calls"] = json!(calls);
            }
            vec![message]
        }
        Role::ToolResult => turn
            .parts()
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolCallResponse(resp) => Some(json!({
                    "role": "tool",
                    "tool_call_id": resp.tool_call_id,
                    "content": resp.content,
                })),
                _ => None,
            })
            .collect(),
    }
}

/// The API wants arguments as JSON text. Unparsed text is sent back as-is.
fn encode_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: Option<String>,
    function: ChatFunction,
}

#[derive(Debug, Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

fn parse_response(resp: ChatCompletion) -> Result<ModelResponse, ModelError> {
    let mut choices = Vec::with_capacity(resp.choices.len());
    for choice in resp.choices {
        if choice.finish_reason.as_deref() == Some("content_filter")
            && choice.message.content.is_none()
            && choice.message.tool_calls.is_empty()
        {
            return Err(ModelError::SafetyBlocked("content_filter".to_string()));
        }

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                // Keep text that is not JSON so the loop can report it
                let arguments = serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments));
                ToolCallIntent::new(
                    call.id.unwrap_or_else(synthesize_call_id),
                    call.function.name,
                    arguments,
                )
            })
            .collect();

        choices.push(Choice {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason: choice.finish_reason,
        });
    }

    Ok(ModelResponse {
        choices,
        usage: resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn generate(
        &self,
        history: &[Turn],
        tools: &[ModelToolSpec],
    ) -> Result<ModelResponse, ModelError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(history, tools);

        debug!(url = %url, model = %self.model, turns = history.len(), "OpenAI request");

        let mut request = self.client.post(&url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        let resp: ChatCompletion = post_json(request, &body).await?;
        parse_response(resp)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
