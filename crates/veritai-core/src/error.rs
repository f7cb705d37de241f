//! Error types for source loading and model invocation.
//!
//! Every variant is recoverable: front ends show the message and keep the
//! session usable.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("Source unreachable: {0}")]
    Unreachable(String),

    #[error("The source returned no text content")]
    EmptyContent,

    #[error("Could not read PDF: {0}")]
    UnparsablePdf(String),

    #[error("No transcript available in language '{language}'")]
    NoTranscript { language: String },

    #[error("Invalid source: {0}")]
    InvalidLocator(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Model service unreachable: {0}")]
    Unreachable(String),

    #[error("Rate limited by model service: {0}")]
    RateLimited(String),

    #[error("Invalid response from model service: {0}")]
    InvalidResponse(String),

    #[error("{0} is not configured. Set an API key first.")]
    NotConfigured(String),
}

impl ModelError {
    /// Whether sending the same transcript again could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::Unreachable(_) | ModelError::RateLimited(_))
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No document loaded. Load a website, PDF, or YouTube video first.")]
    NoDocumentLoaded,

    #[error("Nothing to retry: the last message already has a reply")]
    NothingToRetry,

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ModelError::Unreachable("timeout".into()).is_retryable());
        assert!(ModelError::RateLimited("429".into()).is_retryable());
        assert!(!ModelError::InvalidResponse("bad json".into()).is_retryable());
        assert!(!ModelError::NotConfigured("Claude".into()).is_retryable());
    }

    #[test]
    fn test_no_transcript_message_names_language() {
        let err = LoadError::NoTranscript { language: "pt".into() };
        assert_eq!(err.to_string(), "No transcript available in language 'pt'");
    }
}
