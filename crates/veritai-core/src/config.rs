use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

use crate::ai::ollama::{OllamaClient, DEFAULT_OLLAMA_URL};
use crate::conversation::{ContextPolicy, DEFAULT_SYSTEM_TEMPLATE};
use crate::provider::Provider;

const DEFAULT_TRANSCRIPT_LANGUAGE: &str = "pt";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub transcript_language: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub max_history_turns: Option<usize>,
    pub max_document_chars: Option<usize>,
    pub system_prompt: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some("ollama".to_string()),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.default_model = Some(model.to_string());
        config.save()
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("veritai"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Ollama)
    }

    pub fn model(&self) -> String {
        self.default_model
            .clone()
            .unwrap_or_else(|| self.provider().default_model().to_string())
    }

    /// API key for a provider: environment variable first, then config.
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        let from_env = provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty());
        from_env.or_else(|| self.stored_key(provider).cloned())
    }

    /// Where a provider's key comes from: "local", "env", "config", or None.
    pub fn key_source(&self, provider: Provider) -> Option<&'static str> {
        match provider.api_key_env() {
            None => Some("local"),
            Some(var) if std::env::var(var).is_ok_and(|k| !k.trim().is_empty()) => Some("env"),
            Some(_) => self.stored_key(provider).map(|_| "config"),
        }
    }

    pub fn set_api_key(&mut self, provider: Provider, key: &str) {
        let key = Some(key.trim().to_string());
        match provider {
            Provider::Claude => self.claude_api_key = key,
            Provider::OpenAI => self.openai_api_key = key,
            Provider::Groq => self.groq_api_key = key,
            Provider::Ollama => {}
        }
    }

    fn stored_key(&self, provider: Provider) -> Option<&String> {
        match provider {
            Provider::Ollama => None,
            Provider::Claude => self.claude_api_key.as_ref(),
            Provider::OpenAI => self.openai_api_key.as_ref(),
            Provider::Groq => self.groq_api_key.as_ref(),
        }
    }

    pub fn ollama_url(&self) -> String {
        let url = std::env::var("OLLAMA_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .or_else(|| self.ollama_url.clone())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        if url.starts_with("http://") || url.starts_with("https://") {
            url
        } else {
            format!("http://{}", url)
        }
    }

    /// Ollama client bounded by the request timeout.
    pub fn ollama_client(&self) -> OllamaClient {
        OllamaClient::with_timeout(&self.ollama_url(), self.request_timeout())
    }

    pub fn transcript_language(&self) -> String {
        self.transcript_language
            .clone()
            .unwrap_or_else(|| DEFAULT_TRANSCRIPT_LANGUAGE.to_string())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn context_policy(&self) -> ContextPolicy {
        ContextPolicy {
            max_turns: self.max_history_turns,
            max_document_chars: self.max_document_chars,
        }
    }

    pub fn system_template(&self) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_TEMPLATE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.provider(), Provider::Ollama);
        assert_eq!(config.transcript_language(), "pt");
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.context_policy(), ContextPolicy::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.provider = Some("groq".into());
        config.default_model = Some("llama-3.1-8b-instant".into());
        config.set_api_key(Provider::Groq, "  gsk_test  ");
        config.max_history_turns = Some(6);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.provider(), Provider::Groq);
        assert_eq!(loaded.model(), "llama-3.1-8b-instant");
        assert_eq!(loaded.groq_api_key.as_deref(), Some("gsk_test"));
        assert_eq!(loaded.context_policy().max_turns, Some(6));
    }

    #[test]
    fn test_partial_file_fills_missing_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"provider": "claude"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.provider(), Provider::Claude);
        assert_eq!(config.model(), Provider::Claude.default_model());
        assert_eq!(config.system_template(), DEFAULT_SYSTEM_TEMPLATE);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_unknown_provider_falls_back_to_ollama() {
        let config = Config {
            provider: Some("gemini".into()),
            ..Config::default()
        };
        assert_eq!(config.provider(), Provider::Ollama);
    }

    #[test]
    fn test_ollama_key_source_is_local() {
        assert_eq!(Config::new().key_source(Provider::Ollama), Some("local"));
    }
}
