use std::time::Duration;

use serde_json::{json, Value as JsonValue};

use super::{endpoint, read_success, LanguageModel, ModelError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Settings for the Anthropic Messages API.
#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl AnthropicConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    pub const DEFAULT_MODEL: &'static str = "claude-sonnet-4-5";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: Self::DEFAULT_MODEL.to_string(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            max_tokens: 2048,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// [`LanguageModel`] over `POST /v1/messages`.
#[derive(Clone, Debug)]
pub struct AnthropicClient {
    http: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }
}

impl LanguageModel for AnthropicClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ModelError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": user }],
        });
        let response = self
            .http
            .post(endpoint(&self.config.base_url, "v1/messages"))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let payload = read_success(response).await?;
        message_text(&payload)
    }
}

fn message_text(payload: &JsonValue) -> Result<String, ModelError> {
    let blocks = payload
        .get("content")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| ModelError::MalformedResponse("missing `content` array".to_string()))?;
    let text = blocks
        .iter()
        .filter(|block| block.get("type").and_then(JsonValue::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(JsonValue::as_str))
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(ModelError::EmptyCompletion);
    }
    Ok(text)
}
