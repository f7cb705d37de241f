//! Per-session state shared by the front ends.
//!
//! A [`Session`] owns the current document and transcript and is passed
//! explicitly to whatever drives it. There is no global session.

use tracing::{info, warn};

use crate::conversation::ConversationContext;
use crate::error::{LoadError, ModelError, SessionError};
use crate::source::{Document, SourceDescriptor, SourceKind, SourceNormalizer};
use crate::state::{ChatMessage, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No load has been attempted yet.
    NotLoaded,
    /// A load was attempted but no document is available.
    NoDocument,
    Ready,
    /// The last message is a user turn without a reply.
    AwaitingReply,
}

/// Kind and label of the source the current document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    pub kind: SourceKind,
    pub label: String,
}

#[derive(Debug, Default)]
pub struct Session {
    document: Option<Document>,
    transcript: Transcript,
    source: Option<LoadedSource>,
    load_attempted: bool,
    last_load_error: Option<LoadError>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a source, replacing the document and starting a fresh transcript.
    ///
    /// On failure the previous document and transcript are kept.
    pub async fn load(
        &mut self,
        normalizer: &SourceNormalizer,
        descriptor: &SourceDescriptor,
    ) -> Result<(), LoadError> {
        let result = normalizer.normalize(descriptor).await;
        self.apply_load(descriptor.kind(), descriptor.label(), result)
    }

    /// Record the outcome of a load that ran elsewhere.
    pub fn apply_load(
        &mut self,
        kind: SourceKind,
        label: String,
        result: Result<Document, LoadError>,
    ) -> Result<(), LoadError> {
        self.load_attempted = true;
        match result {
            Ok(document) => {
                info!(kind = ?kind, source = %label, "Document replaced, transcript cleared");
                self.document = Some(document);
                self.transcript.clear();
                self.source = Some(LoadedSource { kind, label });
                self.last_load_error = None;
                Ok(())
            }
            Err(e) => {
                warn!(kind = ?kind, source = %label, error = %e, "Load failed");
                self.last_load_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Ask a question about the loaded document.
    pub async fn ask(
        &mut self,
        context: &ConversationContext,
        message: &str,
    ) -> Result<String, SessionError> {
        let document = self.document.as_ref().ok_or(SessionError::NoDocumentLoaded)?;
        Ok(context.respond(&mut self.transcript, document, message).await?)
    }

    /// Re-send the last user message after a failed call.
    pub async fn retry(&mut self, context: &ConversationContext) -> Result<String, SessionError> {
        let document = self.document.as_ref().ok_or(SessionError::NoDocumentLoaded)?;
        context.retry(&mut self.transcript, document).await
    }

    /// Record a user message and return the model input, for callers that
    /// run the model call on their own task.
    pub fn begin_ask(
        &mut self,
        context: &ConversationContext,
        message: &str,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let document = self.document.as_ref().ok_or(SessionError::NoDocumentLoaded)?;
        Ok(context.begin_turn(&mut self.transcript, document, message))
    }

    /// Model input for re-sending the unanswered last user message.
    pub fn begin_retry(&self, context: &ConversationContext) -> Result<Vec<ChatMessage>, SessionError> {
        let document = self.document.as_ref().ok_or(SessionError::NoDocumentLoaded)?;
        context
            .retry_input(&self.transcript, document)
            .ok_or(SessionError::NothingToRetry)
    }

    /// Record the result of a model call started with `begin_ask` or `begin_retry`.
    pub fn finish_reply(
        &mut self,
        context: &ConversationContext,
        result: Result<String, ModelError>,
    ) -> Result<String, ModelError> {
        context.finish_turn(&mut self.transcript, result)
    }

    pub fn state(&self) -> SessionState {
        if !self.load_attempted {
            SessionState::NotLoaded
        } else if self.document.is_none() {
            SessionState::NoDocument
        } else if self.transcript.awaiting_reply() {
            SessionState::AwaitingReply
        } else {
            SessionState::Ready
        }
    }

    /// Start over on the same document.
    pub fn reset_conversation(&mut self) {
        self.transcript.clear();
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn source(&self) -> Option<&LoadedSource> {
        self.source.as_ref()
    }

    pub fn last_load_error(&self) -> Option<&LoadError> {
        self.last_load_error.as_ref()
    }

    pub fn can_chat(&self) -> bool {
        self.document.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(text: &str) -> Result<Document, LoadError> {
        Ok(Document::from_fragments([text]).unwrap())
    }

    #[test]
    fn test_state_transitions() {
        let mut session = Session::new();
        assert_eq!(session.state(), SessionState::NotLoaded);
        assert!(!session.can_chat());

        let _ = session.apply_load(SourceKind::Website, "u".into(), Err(LoadError::EmptyContent));
        assert_eq!(session.state(), SessionState::NoDocument);
        assert_eq!(session.last_load_error(), Some(&LoadError::EmptyContent));

        session.apply_load(SourceKind::Pdf, "a.pdf".into(), loaded("text")).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.last_load_error(), None);
        assert_eq!(session.source().unwrap().kind, SourceKind::Pdf);
    }

    #[test]
    fn test_failed_load_keeps_previous_document_and_transcript() {
        let mut session = Session::new();
        session.apply_load(SourceKind::Website, "u".into(), loaded("first")).unwrap();
        session.transcript.push(ChatMessage::user("q"));
        session.transcript.push(ChatMessage::assistant("a"));

        let err = session
            .apply_load(SourceKind::YouTube, "v".into(), Err(LoadError::NoTranscript { language: "pt".into() }))
            .unwrap_err();
        assert!(matches!(err, LoadError::NoTranscript { .. }));
        assert_eq!(session.document().unwrap().text(), "first");
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.source().unwrap().label, "u");
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_successful_load_clears_transcript() {
        let mut session = Session::new();
        session.apply_load(SourceKind::Website, "u".into(), loaded("first")).unwrap();
        session.transcript.push(ChatMessage::user("q"));
        assert_eq!(session.state(), SessionState::AwaitingReply);

        session.apply_load(SourceKind::Website, "w".into(), loaded("second")).unwrap();
        assert!(session.transcript().is_empty());
        assert_eq!(session.document().unwrap().text(), "second");
    }

    #[test]
    fn test_reset_conversation_keeps_document() {
        let mut session = Session::new();
        session.apply_load(SourceKind::Website, "u".into(), loaded("doc")).unwrap();
        session.transcript.push(ChatMessage::user("q"));
        session.reset_conversation();
        assert!(session.transcript().is_empty());
        assert!(session.can_chat());
    }
}
