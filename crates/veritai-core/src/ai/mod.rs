pub mod claude;
pub mod ollama;
pub mod openai;

pub use claude::ClaudeClient;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};

use crate::error::ModelError;
use crate::state::ChatMessage;

/// A language model that answers a role-tagged conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, ModelError>;
}

/// Map a transport failure to a model error.
pub(crate) fn transport_error(service: &str, err: reqwest::Error) -> ModelError {
    if err.is_decode() {
        ModelError::InvalidResponse(format!("{}: {}", service, err))
    } else {
        ModelError::Unreachable(format!("{}: {}", service, err))
    }
}

/// Pass successful responses through, classify the rest by status code.
pub(crate) async fn check_status(service: &str, response: Response) -> Result<Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("{} API error {}: {}", service, status, body.trim());
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimited(detail),
        s if s.is_server_error() => ModelError::Unreachable(detail),
        _ => ModelError::InvalidResponse(detail),
    })
}

/// Decode a JSON body, treating malformed payloads as invalid responses.
pub(crate) async fn decode_json<T: serde::de::DeserializeOwned>(
    service: &str,
    response: Response,
) -> Result<T, ModelError> {
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(service, e))?;
    serde_json::from_str(&text)
        .map_err(|e| ModelError::InvalidResponse(format!("{}: malformed response: {}", service, e)))
}

/// Reject blank completions so they never enter a transcript.
pub(crate) fn non_empty(service: &str, content: Option<String>) -> Result<String, ModelError> {
    match content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ModelError::InvalidResponse(format!("{} returned an empty reply", service))),
    }
}
