use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A tool as advertised by the tool process (`tools/list`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name (e.g., "get_weather")
    pub name: String,
    /// Human-readable description for the LLM
    #[serde(default)]
    pub description: String,
    /// JSON Schema describing the expected input, if the server sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Function declaration in the shape the model client expects.
///
/// Unlike [`ToolDescriptor`], `parameters` is always a well-formed object
/// schema; see [`crate::registry::build_descriptors`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Represents an LLM requesting execution of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallIntent {
    /// Correlation token, echoed back in the matching [`ToolResponse`]
    pub id: String,
    /// Tool name to execute
    pub tool_name: String,
    /// Arguments as produced by the model. Usually an object; vendors that
    /// emit arguments as text may leave an unparsed JSON string here.
    pub arguments: Value,
}

impl ToolCallIntent {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Interpret the arguments as a JSON object.
    ///
    /// `null` and blank text count as "no arguments". A JSON string is parsed
    /// as an encoded object.
    pub fn parse_arguments(&self) -> Result<Map<String, Value>, ArgumentParseError> {
        match &self.arguments {
            Value::Object(map) => Ok(map.clone()),
            Value::Null => Ok(Map::new()),
            Value::String(raw) if raw.trim().is_empty() => Ok(Map::new()),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => Err(ArgumentParseError::NotAnObject {
                    tool: self.tool_name.clone(),
                    found: json_type_name(&other),
                }),
                Err(e) => Err(ArgumentParseError::Malformed {
                    tool: self.tool_name.clone(),
                    message: e.to_string(),
                }),
            },
            other => Err(ArgumentParseError::NotAnObject {
                tool: self.tool_name.clone(),
                found: json_type_name(other),
            }),
        }
    }
}

/// Result of a tool invocation, fed back to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Must match the ToolCallIntent id
    pub tool_call_id: String,
    /// Name of the tool that produced this response
    pub tool_name: String,
    pub content: String,
    /// Whether this result represents an error
    pub is_error: bool,
}

impl ToolResponse {
    pub fn success(intent: &ToolCallIntent, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: intent.id.clone(),
            tool_name: intent.tool_name.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Build an error result whose content is the error's display text, so the
    /// model can see what went wrong.
    pub fn failure(intent: &ToolCallIntent, error: impl fmt::Display) -> Self {
        Self {
            tool_call_id: intent.id.clone(),
            tool_name: intent.tool_name.clone(),
            content: format!("Tool error: {}", error),
            is_error: true,
        }
    }
}

/// The model produced tool-call arguments that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentParseError {
    #[error("malformed arguments for '{tool}': {message}")]
    Malformed { tool: String, message: String },
    #[error("arguments for '{tool}' must be a JSON object, got {found}")]
    NotAnObject { tool: String, found: &'static str },
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
