use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ai::{check_status, decode_json, non_empty, transport_error, ChatModel};
use crate::error::ModelError;
use crate::state::ChatMessage;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

/// Client for the OpenAI chat completions protocol.
///
/// Groq serves the same protocol, so it is this client with another base URL.
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    service: &'static str,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_BASE_URL, "OpenAI")
    }

    pub fn groq(api_key: &str) -> Self {
        Self::with_base_url(api_key, GROQ_BASE_URL, "Groq")
    }

    pub fn with_base_url(api_key: &str, base_url: &str, service: &'static str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        }
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
            "gpt-3.5-turbo".to_string(),
        ]
    }

    pub fn list_groq_models() -> Vec<String> {
        vec![
            "llama-3.3-70b-versatile".to_string(),
            "llama-3.1-8b-instant".to_string(),
            "mixtral-8x7b-32768".to_string(),
            "gemma2-9b-it".to_string(),
        ]
    }
}

#[async_trait]
impl ChatModel for OpenAIClient {
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, ModelError> {
        let request = OpenAIRequest {
            model,
            messages: messages
                .iter()
                .map(|m| OpenAIMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
        };

        let response = self.client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(self.service, e))?;

        let response = check_status(self.service, response).await?;
        let openai_response: OpenAIResponse = decode_json(self.service, response).await?;
        non_empty(
            self.service,
            openai_response.choices.into_iter().next().and_then(|c| c.message.content),
        )
    }
}
