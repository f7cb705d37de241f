//! VeritAI core library
//!
//! Loads a website, PDF, or YouTube transcript into a flat document and
//! answers questions about it through a pluggable chat model.

pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod provider;
pub mod session;
pub mod source;
pub mod state;

pub use ai::ChatModel;
pub use config::Config;
pub use conversation::{build_model_input, ContextPolicy, ConversationContext};
pub use error::{LoadError, ModelError, SessionError};
pub use provider::Provider;
pub use session::{LoadedSource, Session, SessionState};
pub use source::{Document, SourceDescriptor, SourceKind, SourceNormalizer};
pub use state::{ChatMessage, ChatRole, Transcript};
