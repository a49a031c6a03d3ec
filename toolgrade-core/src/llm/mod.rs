//! The generative-model collaborator: a system + user prompt in, text out.

use std::fmt;
use std::future::Future;

mod anthropic;
mod extract;
mod openai;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use extract::extract_json;
pub use openai::{OpenAiClient, OpenAiConfig};

#[cfg(test)]
#[path = "../../tests/internal/llm_tests.rs"]
mod tests;

/// Failures talking to a language model.
#[derive(Debug)]
pub enum ModelError {
    /// The HTTP request could not be sent or its body not read.
    Request(reqwest::Error),
    /// The API answered with a non-success status.
    Status { status: u16, body: String },
    /// The API answered with a body of unexpected shape.
    MalformedResponse(String),
    /// The completion contained no text.
    EmptyCompletion,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Request(error) => write!(f, "model request failed: {error}"),
            ModelError::Status { status, body } => {
                write!(f, "model API returned status {status}: {body}")
            }
            ModelError::MalformedResponse(reason) => {
                write!(f, "model API returned an unexpected body: {reason}")
            }
            ModelError::EmptyCompletion => f.write_str("model returned an empty completion"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Request(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(error: reqwest::Error) -> Self {
        ModelError::Request(error)
    }
}

/// Opaque text-completion channel used by the test generator.
pub trait LanguageModel: Send + Sync {
    /// Completes `user` under the `system` instructions.
    fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;
}

/// Either supported hosted model client, chosen at runtime.
#[derive(Clone, Debug)]
pub enum ModelClient {
    Anthropic(AnthropicClient),
    OpenAi(OpenAiClient),
}

impl LanguageModel for ModelClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ModelError> {
        match self {
            ModelClient::Anthropic(client) => client.complete(system, user).await,
            ModelClient::OpenAi(client) => client.complete(system, user).await,
        }
    }
}

pub(crate) async fn read_success(response: reqwest::Response) -> Result<serde_json::Value, ModelError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ModelError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<serde_json::Value>().await?)
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
