use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::api_connection::connection::{ApiConnectionError, Provider};
use crate::api_connection::endpoints::{
    ChatCompletionRequest, ChatMessage, JsonSchemaDefinition, ResponseFormat, DEFAULT_MODEL,
};

/// Single seam to the LLM collaborator: one structured completion call,
/// validated against a JSON schema by the caller. Every agent node
/// (planning, relaxation, explanation, failure) goes through this trait so
/// tests can substitute a deterministic stub.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &JsonSchemaDefinition,
    ) -> Result<String, ApiConnectionError>;
}

/// LLM-backed client with a prompt-hash response cache.
///
/// The cache is an optimization only: a miss is always safe to recompute,
/// and entries are immutable once written.
pub struct LlmClient {
    provider: Provider,
    temperature: f32,
    cache: Mutex<HashMap<u64, String>>,
}

impl LlmClient {
    pub fn new(api_key_env_var: &str) -> Self {
        Self {
            provider: Provider::openrouter(api_key_env_var),
            temperature: 0.1,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn prompt_hash(system: &str, user: &str, schema_name: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        system.hash(&mut hasher);
        user.hash(&mut hasher);
        schema_name.hash(&mut hasher);
        hasher.finish()
    }
}

#[async_trait]
impl CompletionClient for LlmClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &JsonSchemaDefinition,
    ) -> Result<String, ApiConnectionError> {
        let key = Self::prompt_hash(system_prompt, user_prompt, &schema.name);
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            debug!(schema = %schema.name, "LLM cache hit");
            return Ok(hit.clone());
        }

        let request = ChatCompletionRequest {
            model: DEFAULT_MODEL.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            response_format: Some(ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: Some(schema.clone()),
            }),
            temperature: Some(self.temperature),
            max_tokens: Some(1024),
        };

        let response = self.provider.call_chat_completion(request).await?;
        let choice = response
            .choices
            .first()
            .ok_or(ApiConnectionError::EmptyResponse)?;
        let content = choice.message.content.trim().to_string();

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, content.clone());
        Ok(content)
    }
}

/// Strips markdown code fences some models wrap around JSON output.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Runs a structured completion and parses it, re-prompting once on a schema
/// violation before giving up. Callers supply their own safe default on Err.
pub async fn complete_structured<T: DeserializeOwned>(
    client: &dyn CompletionClient,
    system_prompt: &str,
    user_prompt: &str,
    schema: &JsonSchemaDefinition,
) -> Result<T, ApiConnectionError> {
    let raw = client.complete(system_prompt, user_prompt, schema).await?;
    match serde_json::from_str::<T>(strip_code_fences(&raw)) {
        Ok(parsed) => Ok(parsed),
        Err(first_err) => {
            warn!(
                schema = %schema.name,
                error = %first_err,
                "malformed LLM response, re-prompting once"
            );
            let correction = format!(
                "{}\n\nYour previous response was not valid JSON for the '{}' schema \
                 (error: {}). Respond again with ONLY the JSON object.",
                user_prompt, schema.name, first_err
            );
            let retry = client.complete(system_prompt, &correction, schema).await?;
            serde_json::from_str::<T>(strip_code_fences(&retry)).map_err(Into::into)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn prompt_hash_is_stable_per_input() {
        let a = LlmClient::prompt_hash("s", "u", "schema");
        let b = LlmClient::prompt_hash("s", "u", "schema");
        let c = LlmClient::prompt_hash("s", "u2", "schema");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
