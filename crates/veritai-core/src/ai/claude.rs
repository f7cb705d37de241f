use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ai::{check_status, decode_json, non_empty, transport_error, ChatModel};
use crate::error::ModelError;
use crate::state::{ChatMessage, ChatRole};

pub const CLAUDE_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ClaudeClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, CLAUDE_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "claude-sonnet-4-20250514".to_string(),
            "claude-3-5-sonnet-20241022".to_string(),
            "claude-3-5-haiku-20241022".to_string(),
            "claude-3-opus-20240229".to_string(),
        ]
    }
}

/// The Messages API takes system text as a top-level field, not a turn.
fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<ClaudeMessage<'_>>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let turns = messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| ClaudeMessage { role: m.role.as_str(), content: &m.content })
        .collect();
    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, turns)
}

#[async_trait]
impl ChatModel for ClaudeClient {
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, ModelError> {
        let (system, turns) = split_system(messages);
        let request = ClaudeRequest {
            model,
            max_tokens: 4096,
            system,
            messages: turns,
        };

        let response = self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("Claude", e))?;

        let response = check_status("Claude", response).await?;
        let claude_response: ClaudeResponse = decode_json("Claude", response).await?;
        let text: String = claude_response
            .content
            .into_iter()
            .map(|c| c.text)
            .collect();
        non_empty("Claude", Some(text))
    }
}
