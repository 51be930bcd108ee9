//! Converts tool descriptors fetched from the tool process into the
//! function declarations handed to the model.

use serde_json::{json, Map, Value};

use crate::tool::{ModelToolSpec, ToolDescriptor};

/// Schema used for tools that declare no input.
pub fn empty_object_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// Normalize a tool's input schema so model clients never see a missing or
/// malformed one.
///
/// Absent, non-object and empty-object schemas become
/// [`empty_object_schema`]. An object schema without `type` is marked as an
/// object, and an object schema without `properties` gets an empty map.
pub fn canonical_schema(schema: Option<&Value>) -> Value {
    match schema {
        Some(Value::Object(map)) if !map.is_empty() => {
            let mut map = map.clone();
            map.entry("type")
                .or_insert_with(|| Value::String("object".to_string()));
            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.entry("properties")
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            Value::Object(map)
        }
        _ => empty_object_schema(),
    }
}

/// Build model-facing tool specs from descriptors, preserving order.
pub fn build_descriptors(raw: &[ToolDescriptor]) -> Vec<ModelToolSpec> {
    raw.iter()
        .map(|desc| ModelToolSpec {
            name: desc.name.clone(),
            description: desc.description.clone(),
            parameters: canonical_schema(desc.input_schema.as_ref()),
        })
        .collect()
}
