use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default model used for every agent call in the workflow.
pub const DEFAULT_MODEL: &str = "qwen/qwen3-32b";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonSchemaProperty {
    #[serde(rename = "type")]
    pub property_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, JsonSchemaProperty>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "additionalProperties")]
    pub additional_properties: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonSchemaDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    pub schema: JsonSchema,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaDefinition>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponseMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionResponseMessage,
    pub finish_reason: Option<String>,
    pub index: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: Option<String>,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Option<ChatCompletionUsage>,
}

impl JsonSchemaProperty {
    pub fn string(description: &str) -> Self {
        Self {
            property_type: "string".to_string(),
            description: Some(description.to_string()),
            r#enum: None,
            items: None,
        }
    }

    pub fn string_enum(description: &str, variants: &[&str]) -> Self {
        Self {
            property_type: "string".to_string(),
            description: Some(description.to_string()),
            r#enum: Some(variants.iter().map(|v| v.to_string()).collect()),
            items: None,
        }
    }

    pub fn integer(description: &str) -> Self {
        Self {
            property_type: "integer".to_string(),
            description: Some(description.to_string()),
            r#enum: None,
            items: None,
        }
    }

    pub fn string_array(description: &str) -> Self {
        Self {
            property_type: "array".to_string(),
            description: Some(description.to_string()),
            r#enum: None,
            items: Some(Box::new(JsonSchema {
                schema_type: "string".to_string(),
                properties: None,
                required: None,
                additional_properties: None,
            })),
        }
    }
}

/// Builds a strict object schema from named properties.
pub fn object_schema(
    name: &str,
    properties: Vec<(&str, JsonSchemaProperty)>,
    required: &[&str],
) -> JsonSchemaDefinition {
    let mut map = HashMap::new();
    for (key, prop) in properties {
        map.insert(key.to_string(), prop);
    }
    JsonSchemaDefinition {
        name: name.to_string(),
        strict: Some(true),
        schema: JsonSchema {
            schema_type: "object".to_string(),
            properties: Some(map),
            required: Some(required.iter().map(|r| r.to_string()).collect()),
            additional_properties: Some(false),
        },
    }
}
