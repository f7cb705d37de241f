use std::sync::Arc;

use crate::ai::{ChatModel, ClaudeClient, OpenAIClient};
use crate::config::Config;
use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    Claude,
    OpenAI,
    Groq,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::Claude => "claude",
            Provider::OpenAI => "openai",
            Provider::Groq => "groq",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Provider::Ollama),
            "claude" => Some(Provider::Claude),
            "openai" => Some(Provider::OpenAI),
            "groq" => Some(Provider::Groq),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![Provider::Ollama, Provider::Claude, Provider::OpenAI, Provider::Groq]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Ollama => "Ollama (Local)",
            Provider::Claude => "Claude (Anthropic)",
            Provider::OpenAI => "ChatGPT (OpenAI)",
            Provider::Groq => "Groq (Llama)",
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Provider::Ollama => "Ollama",
            Provider::Claude => "Claude",
            Provider::OpenAI => "OpenAI",
            Provider::Groq => "Groq",
        }
    }

    /// Environment variable that supplies this provider's API key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::Ollama => None,
            Provider::Claude => Some("ANTHROPIC_API_KEY"),
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
        }
    }

    /// Model used when the config names none for this provider.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Ollama => "gemma3:latest",
            Provider::Claude => "claude-3-5-haiku-20241022",
            Provider::OpenAI => "gpt-4o-mini",
            Provider::Groq => "llama-3.3-70b-versatile",
        }
    }

    /// Built-in model list; Ollama's comes from the local server instead.
    pub fn known_models(&self) -> Vec<String> {
        match self {
            Provider::Ollama => Vec::new(),
            Provider::Claude => ClaudeClient::list_models(),
            Provider::OpenAI => OpenAIClient::list_models(),
            Provider::Groq => OpenAIClient::list_groq_models(),
        }
    }

    /// Build a client for this provider from config and environment.
    pub fn build_model(&self, config: &Config) -> Result<Arc<dyn ChatModel>, ModelError> {
        let missing = || ModelError::NotConfigured(format!("{} API key", self.short_name()));
        Ok(match self {
            Provider::Ollama => Arc::new(config.ollama_client()),
            Provider::Claude => Arc::new(ClaudeClient::new(&config.api_key(*self).ok_or_else(missing)?)),
            Provider::OpenAI => Arc::new(OpenAIClient::new(&config.api_key(*self).ok_or_else(missing)?)),
            Provider::Groq => Arc::new(OpenAIClient::groq(&config.api_key(*self).ok_or_else(missing)?)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for provider in Provider::all() {
            assert_eq!(Provider::from_str(provider.as_str()), Some(provider));
        }
        assert_eq!(Provider::from_str("GROQ"), Some(Provider::Groq));
        assert_eq!(Provider::from_str("gemini"), None);
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = Config::new();
        assert!(Provider::Ollama.build_model(&config).is_ok());
        assert_eq!(Provider::Ollama.api_key_env(), None);
    }

    #[test]
    fn test_missing_key_is_not_configured() {
        let mut config = Config::new();
        config.claude_api_key = None;
        if std::env::var("ANTHROPIC_API_KEY").is_err() {
            let err = Provider::Claude.build_model(&config).err().unwrap();
            assert!(matches!(err, ModelError::NotConfigured(_)));
        }
        config.claude_api_key = Some("sk-ant-test".into());
        assert!(Provider::Claude.build_model(&config).is_ok());
    }
}
