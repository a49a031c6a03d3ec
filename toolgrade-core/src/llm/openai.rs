use std::time::Duration;

use serde_json::{json, Value as JsonValue};

use super::{endpoint, read_success, LanguageModel, ModelError};

/// Settings for an OpenAI-compatible Chat Completions endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    /// Base URL including the version prefix, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

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

/// [`LanguageModel`] over `POST /chat/completions`.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }
}

impl LanguageModel for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ModelError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        let response = self
            .http
            .post(endpoint(&self.config.base_url, "chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let payload = read_success(response).await?;
        choice_text(&payload)
    }
}

fn choice_text(payload: &JsonValue) -> Result<String, ModelError> {
    let message = payload
        .get("choices")
        .and_then(JsonValue::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| ModelError::MalformedResponse("missing `choices[0].message`".to_string()))?;
    match message.get("content").and_then(JsonValue::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(ModelError::EmptyCompletion),
    }
}
