//! Prompt assembly and turn bookkeeping.
//!
//! Every model call is built from the current document and the whole
//! transcript at call time. A [`ContextPolicy`] can bound what is sent, but
//! the stored transcript itself is never cut.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ai::ChatModel;
use crate::config::Config;
use crate::error::{ModelError, SessionError};
use crate::provider::Provider;
use crate::source::Document;
use crate::state::{ChatMessage, ChatRole, Transcript};

pub const DOCUMENT_PLACEHOLDER: &str = "{document}";

pub const DEFAULT_SYSTEM_TEMPLATE: &str = "You are a friendly assistant named VeritAI. \
Answer the user's questions using the following information: {document}";

pub const TRUNCATION_MARKER: &str = "[document truncated]";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Limits on what one prompt carries. `None` sends everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextPolicy {
    /// Most recent user turns (with their replies) to send.
    pub max_turns: Option<usize>,
    /// Characters of the document to send before the truncation marker.
    pub max_document_chars: Option<usize>,
}

/// Render the system template with the document text in place.
pub fn render_system_prompt(template: &str, document: &str) -> String {
    if template.contains(DOCUMENT_PLACEHOLDER) {
        template.replacen(DOCUMENT_PLACEHOLDER, document, 1)
    } else {
        format!("{}\n\n{}", template, document)
    }
}

fn document_text<'a>(document: &'a Document, policy: &ContextPolicy) -> std::borrow::Cow<'a, str> {
    let text = document.text();
    match policy.max_document_chars {
        Some(limit) => match text.char_indices().nth(limit) {
            Some((cut, _)) => format!("{}\n{}", &text[..cut], TRUNCATION_MARKER).into(),
            None => text.into(),
        },
        None => text.into(),
    }
}

/// Index of the first transcript message to send under `max_turns`.
///
/// Cuts only at a user message, so pairs stay whole and the newest user
/// message is always included.
fn window_start(messages: &[ChatMessage], max_turns: Option<usize>) -> usize {
    let Some(max_turns) = max_turns else {
        return 0;
    };
    let keep = max_turns.max(1);

    let mut seen = 0;
    for (idx, message) in messages.iter().enumerate().rev() {
        if message.role == ChatRole::User {
            seen += 1;
            if seen == keep {
                return idx;
            }
        }
    }
    0
}

/// Build the message list for one model call.
pub fn build_model_input(
    document: &Document,
    transcript: &Transcript,
    system_template: &str,
    policy: &ContextPolicy,
) -> Vec<ChatMessage> {
    let history = transcript.messages();
    let start = window_start(history, policy.max_turns);

    let mut messages = Vec::with_capacity(history.len() - start + 1);
    messages.push(ChatMessage::system(render_system_prompt(
        system_template,
        &document_text(document, policy),
    )));
    messages.extend(history[start..].iter().cloned());
    messages
}

/// Drives one conversation against a chat model.
#[derive(Clone)]
pub struct ConversationContext {
    model: Arc<dyn ChatModel>,
    model_name: String,
    system_template: String,
    policy: ContextPolicy,
    request_timeout: Duration,
}

impl ConversationContext {
    pub fn new(model: Arc<dyn ChatModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            system_template: DEFAULT_SYSTEM_TEMPLATE.to_string(),
            policy: ContextPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Context for `provider` with template, policy and timeout from config.
    pub fn from_config(
        config: &Config,
        provider: Provider,
        model_name: impl Into<String>,
    ) -> Result<Self, ModelError> {
        Ok(Self::new(provider.build_model(config)?, model_name)
            .with_system_template(config.system_template())
            .with_policy(config.context_policy())
            .with_request_timeout(config.request_timeout()))
    }

    pub fn with_system_template(mut self, template: impl Into<String>) -> Self {
        self.system_template = template.into();
        self
    }

    pub fn with_policy(mut self, policy: ContextPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn policy(&self) -> &ContextPolicy {
        &self.policy
    }

    /// Record the user's message and build the model input for it.
    pub fn begin_turn(
        &self,
        transcript: &mut Transcript,
        document: &Document,
        user_message: &str,
    ) -> Vec<ChatMessage> {
        transcript.push(ChatMessage::user(user_message));
        self.model_input(transcript, document)
    }

    /// Model input for re-sending an unanswered user message, if there is one.
    pub fn retry_input(&self, transcript: &Transcript, document: &Document) -> Option<Vec<ChatMessage>> {
        transcript
            .awaiting_reply()
            .then(|| self.model_input(transcript, document))
    }

    fn model_input(&self, transcript: &Transcript, document: &Document) -> Vec<ChatMessage> {
        let messages = build_model_input(document, transcript, &self.system_template, &self.policy);
        debug!(
            messages = messages.len(),
            prompt_chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Built model input"
        );
        messages
    }

    /// Call the model, bounded by the request timeout.
    pub async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        match tokio::time::timeout(
            self.request_timeout,
            self.model.complete(messages, &self.model_name),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ModelError::Unreachable(format!(
                "timed out after {}s",
                self.request_timeout.as_secs()
            ))),
        }
    }

    /// Record the outcome of a model call.
    ///
    /// A reply is appended as an assistant message. On failure the
    /// transcript is left as is, keeping the unanswered user message.
    pub fn finish_turn(
        &self,
        transcript: &mut Transcript,
        result: Result<String, ModelError>,
    ) -> Result<String, ModelError> {
        let result = result.and_then(|reply| {
            if reply.trim().is_empty() {
                Err(ModelError::InvalidResponse("empty reply".to_string()))
            } else {
                Ok(reply)
            }
        });

        match result {
            Ok(reply) => {
                info!(model = %self.model_name, transcript_len = transcript.len() + 1, "Reply received");
                transcript.push(ChatMessage::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                warn!(model = %self.model_name, error = %e, "Model call failed");
                Err(e)
            }
        }
    }

    /// Answer one user message against the document.
    pub async fn respond(
        &self,
        transcript: &mut Transcript,
        document: &Document,
        user_message: &str,
    ) -> Result<String, ModelError> {
        let messages = self.begin_turn(transcript, document, user_message);
        let result = self.invoke(&messages).await;
        self.finish_turn(transcript, result)
    }

    /// Re-send the unanswered last user message.
    pub async fn retry(
        &self,
        transcript: &mut Transcript,
        document: &Document,
    ) -> Result<String, SessionError> {
        let messages = self
            .retry_input(transcript, document)
            .ok_or(SessionError::NothingToRetry)?;
        let result = self.invoke(&messages).await;
        Ok(self.finish_turn(transcript, result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn doc(text: &str) -> Document {
        Document::from_fragments([text]).unwrap()
    }

    /// Replays queued results and records every input it receives.
    struct Scripted {
        replies: Mutex<Vec<Result<String, ModelError>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn complete(&self, messages: &[ChatMessage], _model: &str) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("default".to_string()))
        }
    }

    struct Hangs;

    #[async_trait]
    impl ChatModel for Hangs {
        async fn complete(&self, _messages: &[ChatMessage], _model: &str) -> Result<String, ModelError> {
            std::future::pending().await
        }
    }

    fn transcript_of(pairs: &[(&str, &str)]) -> Transcript {
        let mut transcript = Transcript::new();
        for (user, assistant) in pairs {
            transcript.push(ChatMessage::user(*user));
            transcript.push(ChatMessage::assistant(*assistant));
        }
        transcript
    }

    #[test]
    fn test_input_is_system_then_full_transcript() {
        let mut transcript = transcript_of(&[("q1", "a1")]);
        transcript.push(ChatMessage::user("q2"));

        let input = build_model_input(
            &doc("the sky is green"),
            &transcript,
            DEFAULT_SYSTEM_TEMPLATE,
            &ContextPolicy::default(),
        );

        assert_eq!(input.len(), 4);
        assert_eq!(input[0].role, ChatRole::System);
        assert!(input[0].content.contains("VeritAI"));
        assert!(input[0].content.ends_with("the sky is green"));
        assert_eq!(&input[1..], transcript.messages());
    }

    #[test]
    fn test_template_without_placeholder_still_carries_document() {
        assert_eq!(render_system_prompt("Be brief.", "doc"), "Be brief.\n\ndoc");
        assert_eq!(render_system_prompt("Use {document}.", "doc"), "Use doc.");
    }

    #[test]
    fn test_max_turns_keeps_whole_pairs_and_newest_user() {
        let mut transcript = transcript_of(&[("q1", "a1"), ("q2", "a2"), ("q3", "a3")]);
        transcript.push(ChatMessage::user("q4"));
        let policy = ContextPolicy { max_turns: Some(2), max_document_chars: None };

        let input = build_model_input(&doc("d"), &transcript, "{document}", &policy);
        let contents: Vec<&str> = input[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q3", "a3", "q4"]);

        let zero = ContextPolicy { max_turns: Some(0), max_document_chars: None };
        let input = build_model_input(&doc("d"), &transcript, "{document}", &zero);
        assert_eq!(input.last().unwrap().content, "q4");
        assert_eq!(input.len(), 2);
        assert_eq!(transcript.len(), 7);
    }

    #[test]
    fn test_document_truncation_respects_char_boundaries() {
        let policy = ContextPolicy { max_turns: None, max_document_chars: Some(3) };
        let input = build_model_input(&doc("ação completa"), &Transcript::new(), "{document}", &policy);
        assert_eq!(input[0].content, format!("açã\n{}", TRUNCATION_MARKER));

        let roomy = ContextPolicy { max_turns: None, max_document_chars: Some(100) };
        let input = build_model_input(&doc("short"), &Transcript::new(), "{document}", &roomy);
        assert_eq!(input[0].content, "short");
    }

    #[tokio::test]
    async fn test_respond_appends_user_and_assistant() {
        let model = Scripted::new(vec![Ok("It says hello world.".into())]);
        let context = ConversationContext::new(model.clone(), "stub");
        let mut transcript = Transcript::new();

        let reply = context
            .respond(&mut transcript, &doc("Hello World"), "Summarize")
            .await
            .unwrap();

        assert_eq!(reply, "It says hello world.");
        assert_eq!(
            transcript.messages(),
            &[ChatMessage::user("Summarize"), ChatMessage::assistant("It says hello world.")]
        );
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].last(), Some(&ChatMessage::user("Summarize")));
    }

    #[tokio::test]
    async fn test_failures_retain_user_message_then_retry_answers_it() {
        let model = Scripted::new(vec![
            Err(ModelError::RateLimited("429".into())),
            Err(ModelError::Unreachable("down".into())),
            Ok("finally".into()),
        ]);
        let context = ConversationContext::new(model.clone(), "stub");
        let document = doc("d");
        let mut transcript = Transcript::new();

        assert!(context.respond(&mut transcript, &document, "one").await.is_err());
        assert_eq!(transcript.len(), 1);
        assert!(context.respond(&mut transcript, &document, "two").await.is_err());
        assert_eq!(transcript.len(), 2);

        let reply = context.retry(&mut transcript, &document).await.unwrap();
        assert_eq!(reply, "finally");
        assert_eq!(transcript.len(), 3);
        assert!(!transcript.awaiting_reply());

        let err = context.retry(&mut transcript, &document).await.unwrap_err();
        assert!(matches!(err, SessionError::NothingToRetry));
    }

    #[tokio::test]
    async fn test_blank_reply_is_not_appended() {
        let model = Scripted::new(vec![Ok("   \n".into())]);
        let context = ConversationContext::new(model, "stub");
        let mut transcript = Transcript::new();

        let err = context
            .respond(&mut transcript, &doc("d"), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
        assert_eq!(transcript.messages(), &[ChatMessage::user("hi")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_is_unreachable() {
        let context = ConversationContext::new(Arc::new(Hangs), "stub")
            .with_request_timeout(Duration::from_secs(5));
        let mut transcript = Transcript::new();

        let err = context
            .respond(&mut transcript, &doc("d"), "hi")
            .await
            .unwrap_err();
        assert_eq!(err, ModelError::Unreachable("timed out after 5s".into()));
        assert_eq!(transcript.len(), 1);
    }
}
