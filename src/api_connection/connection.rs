use dotenv::dotenv;
use reqwest::Client;
use std::env;
use thiserror::Error;

use super::endpoints::{ChatCompletionRequest, ChatCompletionResponse};

#[derive(Debug, Error)]
pub enum ApiConnectionError {
    #[error("API key not found in environment: {0}")]
    MissingApiKey(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("API error {status}: {error_body}")]
    Api {
        status: reqwest::StatusCode,
        error_body: String,
    },
    #[error("API returned no completion choices")]
    EmptyResponse,
}

/// Chat-completion provider. The workflow talks to an OpenRouter-compatible
/// endpoint; the API key is read from the named environment variable at call
/// time so tests can point at a throwaway name.
#[derive(Debug, Clone)]
pub enum Provider {
    OpenRouter { api_key_env_var: String },
}

impl Provider {
    pub fn openrouter(api_key_env_var: &str) -> Self {
        dotenv().ok();
        Self::OpenRouter {
            api_key_env_var: api_key_env_var.to_string(),
        }
    }

    pub async fn call_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ApiConnectionError> {
        match self {
            Provider::OpenRouter { api_key_env_var } => {
                let api_key = env::var(api_key_env_var)
                    .map_err(|_| ApiConnectionError::MissingApiKey(api_key_env_var.clone()))?;

                let site_url =
                    env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
                let app_name =
                    env::var("APP_NAME").unwrap_or_else(|_| "MealRecommender".to_string());

                let client = Client::new();
                let response = client
                    .post("https://openrouter.ai/api/v1/chat/completions")
                    .bearer_auth(api_key)
                    .header("Content-Type", "application/json")
                    .header("HTTP-Referer", site_url)
                    .header("X-Title", app_name)
                    .json(&request)
                    .send()
                    .await?;

                if response.status().is_success() {
                    Ok(response.json::<ChatCompletionResponse>().await?)
                } else {
                    let status = response.status();
                    let error_body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to read error body".to_string());
                    Err(ApiConnectionError::Api { status, error_body })
                }
            }
        }
    }
}
