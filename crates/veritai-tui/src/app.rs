use std::path::Path;

use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use veritai_core::{
    ChatMessage, ChatRole, Config, ConversationContext, Document, LoadError, ModelError,
    Provider, Session, SourceDescriptor, SourceKind, SourceNormalizer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Source,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Which field of the source form receives typed characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceField {
    Locator,
    Language,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
}

/// What a finished load task hands back to the session.
pub struct LoadOutcome {
    pub kind: SourceKind,
    pub label: String,
    pub result: Result<Document, LoadError>,
}

/// Build the descriptor for a typed locator and run it through the normalizer.
pub async fn load_source(
    normalizer: SourceNormalizer,
    kind: SourceKind,
    locator: String,
    language: String,
) -> LoadOutcome {
    let descriptor = match kind {
        SourceKind::Website => Ok(SourceDescriptor::website(locator.clone())),
        SourceKind::Pdf => SourceDescriptor::pdf_from_path(Path::new(&locator)).await,
        SourceKind::YouTube => Ok(SourceDescriptor::youtube(locator.clone(), language)),
    };

    match descriptor {
        Ok(descriptor) => LoadOutcome {
            kind,
            label: descriptor.label(),
            result: normalizer.normalize(&descriptor).await,
        },
        Err(e) => LoadOutcome { kind, label: locator, result: Err(e) },
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub status: Option<StatusLine>,

    // Source screen state
    pub source_state: ListState,
    pub source_field: SourceField,
    pub locator_input: String,
    pub locator_cursor: usize,
    pub language_input: String,
    pub language_cursor: usize,
    pub load_task: Option<JoinHandle<LoadOutcome>>,

    // Chat state
    pub query_input: String,
    pub query_cursor: usize,
    pub query_loading: bool,
    pub query_scroll: u16,
    pub query_chat_height: u16,
    pub query_chat_width: u16,
    pub query_task: Option<JoinHandle<Result<String, ModelError>>>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // Provider state
    pub current_provider: Provider,
    pub selected_model: String,
    pub show_provider_picker: bool,
    pub provider_picker_state: ListState,

    // API key input state
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,
    pub api_key_target_provider: Option<Provider>,

    // Data
    pub config: Config,
    pub session: Session,
    pub normalizer: SourceNormalizer,
    pub context: Option<ConversationContext>,
}

impl App {
    pub fn new(config: Config, provider: Provider, model: String) -> Self {
        let normalizer = SourceNormalizer::with_defaults(config.fetch_timeout());
        let language_input = config.transcript_language();

        let mut source_state = ListState::default();
        source_state.select(Some(0));

        let mut app = Self {
            should_quit: false,
            screen: Screen::Source,
            input_mode: InputMode::Normal,
            status: None,

            source_state,
            source_field: SourceField::Locator,
            locator_input: String::new(),
            locator_cursor: 0,
            language_cursor: language_input.chars().count(),
            language_input,
            load_task: None,

            query_input: String::new(),
            query_cursor: 0,
            query_loading: false,
            query_scroll: 0,
            query_chat_height: 0,
            query_chat_width: 0,
            query_task: None,

            animation_frame: 0,

            show_model_picker: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),

            current_provider: provider,
            selected_model: model,
            show_provider_picker: false,
            provider_picker_state: ListState::default(),

            show_api_key_input: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,
            api_key_target_provider: None,

            config,
            session: Session::new(),
            normalizer,
            context: None,
        };
        app.rebuild_context();
        app
    }

    pub fn set_info(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine { text: text.into(), is_error: false });
    }

    pub fn set_error(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine { text: text.into(), is_error: true });
    }

    /// Recreate the model client after a provider, model, or key change.
    pub fn rebuild_context(&mut self) {
        match ConversationContext::from_config(&self.config, self.current_provider, &self.selected_model) {
            Ok(context) => self.context = Some(context),
            Err(e) => {
                self.context = None;
                self.set_error(format!("{} Press P to choose a provider.", e));
            }
        }
    }

    /// A load or model call is in flight; the session must not change.
    pub fn is_busy(&self) -> bool {
        self.load_task.is_some() || self.query_task.is_some()
    }

    pub fn selected_kind(&self) -> SourceKind {
        let kinds = SourceKind::all();
        self.source_state
            .selected()
            .and_then(|i| kinds.get(i).copied())
            .unwrap_or(SourceKind::Website)
    }

    pub fn source_nav_down(&mut self) {
        let len = SourceKind::all().len();
        let i = self.source_state.selected().unwrap_or(0);
        self.source_state.select(Some((i + 1).min(len - 1)));
        self.source_field = SourceField::Locator;
    }

    pub fn source_nav_up(&mut self) {
        let i = self.source_state.selected().unwrap_or(0);
        self.source_state.select(Some(i.saturating_sub(1)));
        self.source_field = SourceField::Locator;
    }

    pub fn start_load(&mut self) {
        if self.is_busy() {
            self.set_error("Wait for the current request to finish.");
            return;
        }

        let kind = self.selected_kind();
        let locator = self.locator_input.trim().to_string();
        if locator.is_empty() {
            self.set_error(format!("Enter a {} first.", kind.locator_prompt().to_lowercase()));
            return;
        }
        let language = match self.language_input.trim() {
            "" => self.config.transcript_language(),
            lang => lang.to_string(),
        };

        info!(kind = ?kind, source = %locator, "Starting load");
        self.load_task = Some(tokio::spawn(load_source(
            self.normalizer.clone(),
            kind,
            locator,
            language,
        )));
        self.input_mode = InputMode::Normal;
        self.set_info(format!("Loading {}", kind.display_name()));
    }

    pub fn finish_load(&mut self, outcome: LoadOutcome) {
        let LoadOutcome { kind, label, result } = outcome;
        match self.session.apply_load(kind, label.clone(), result) {
            Ok(()) => {
                let chars = self.session.document().map(|d| d.char_count()).unwrap_or(0);
                self.set_info(format!("Loaded {} ({} characters). Ask away.", label, chars));
                self.screen = Screen::Chat;
                self.input_mode = InputMode::Editing;
                self.query_scroll = 0;
            }
            Err(e) => self.set_error(format!("Could not load {}: {}", label, e)),
        }
    }

    pub fn send_message(&mut self) {
        let message = self.query_input.trim().to_string();
        if message.is_empty() {
            return;
        }
        if self.is_busy() {
            self.set_error("Wait for the current request to finish.");
            return;
        }
        let Some(context) = self.context.clone() else {
            self.set_error(format!(
                "{} is not configured. Press P to choose a provider.",
                self.current_provider.short_name()
            ));
            return;
        };

        match self.session.begin_ask(&context, &message) {
            Ok(messages) => {
                self.query_input.clear();
                self.query_cursor = 0;
                self.spawn_query(context, messages);
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Re-send the last user message after a failed call.
    pub fn retry(&mut self) {
        if self.is_busy() {
            return;
        }
        let Some(context) = self.context.clone() else {
            self.set_error("No provider configured. Press P to choose one.");
            return;
        };

        match self.session.begin_retry(&context) {
            Ok(messages) => self.spawn_query(context, messages),
            Err(e) => self.set_error(e.to_string()),
        }
    }

    fn spawn_query(&mut self, context: ConversationContext, messages: Vec<ChatMessage>) {
        self.query_loading = true;
        self.status = None;
        self.input_mode = InputMode::Normal;
        self.scroll_query_to_bottom();
        self.query_task = Some(tokio::spawn(async move { context.invoke(&messages).await }));
    }

    pub fn finish_reply(&mut self, result: Result<String, ModelError>) {
        self.query_loading = false;
        let Some(context) = self.context.clone() else {
            self.set_error("Provider changed while waiting for a reply.");
            return;
        };

        match self.session.finish_reply(&context, result) {
            Ok(_) => self.status = None,
            Err(e) => {
                let hint = if e.is_retryable() {
                    "Press r to retry."
                } else {
                    "Check the provider (P) or model (M), then press r to retry."
                };
                self.set_error(format!("{} {}", e, hint));
            }
        }
        self.scroll_query_to_bottom();
    }

    /// Collect finished background tasks (called every tick).
    pub async fn poll_tasks(&mut self) {
        if self.load_task.as_ref().is_some_and(|t| t.is_finished()) {
            if let Some(task) = self.load_task.take() {
                match task.await {
                    Ok(outcome) => self.finish_load(outcome),
                    Err(e) => {
                        warn!(error = %e, "Load task ended abnormally");
                        self.set_error(format!("Load failed: {}", e));
                    }
                }
            }
        }

        if self.query_task.as_ref().is_some_and(|t| t.is_finished()) {
            if let Some(task) = self.query_task.take() {
                let result = task.await.unwrap_or_else(|e| {
                    Err(ModelError::Unreachable(format!("request task failed: {}", e)))
                });
                self.finish_reply(result);
            }
        }
    }

    /// Start over on the loaded document.
    pub fn new_conversation(&mut self) {
        if self.is_busy() {
            return;
        }
        self.session.reset_conversation();
        self.query_scroll = 0;
        self.set_info("Conversation cleared.");
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Scroll chat to bottom so the newest message is visible
    pub fn scroll_query_to_bottom(&mut self) {
        let wrap_width = if self.query_chat_width > 0 {
            self.query_chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.session.transcript().messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.content.lines() {
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 { 1 } else { char_count / wrap_width + 1 };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.query_loading || self.session.transcript().awaiting_reply() {
            total_lines = total_lines.saturating_add(2);
        }

        let visible_height = if self.query_chat_height > 0 {
            self.query_chat_height
        } else {
            20
        };

        self.query_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn last_role(&self) -> Option<ChatRole> {
        self.session.transcript().last().map(|m| m.role)
    }

    // Model picker methods
    pub async fn open_model_picker(&mut self) {
        let models = match self.current_provider {
            Provider::Ollama => {
                match self.config.ollama_client().list_models().await {
                    Ok(models) => models,
                    Err(e) => {
                        self.set_error(e.to_string());
                        Vec::new()
                    }
                }
            }
            provider => provider.known_models(),
        };
        self.available_models = models;
        if self.available_models.is_empty() {
            if self.current_provider == Provider::Ollama && self.status.is_none() {
                self.set_error("No Ollama models found. Pull one with: ollama pull llama3.2");
            }
            return;
        }

        let current_idx = self
            .available_models
            .iter()
            .position(|m| m == &self.selected_model)
            .unwrap_or(0);
        self.model_picker_state.select(Some(current_idx));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(model) = self
            .model_picker_state
            .selected()
            .and_then(|i| self.available_models.get(i))
            .cloned()
        {
            self.selected_model = model.clone();
            self.show_model_picker = false;
            self.config.default_model = Some(model);
            self.persist_config();
            self.rebuild_context();
        }
    }

    // Provider picker methods
    pub fn open_provider_picker(&mut self) {
        let current_idx = Provider::all()
            .iter()
            .position(|p| *p == self.current_provider)
            .unwrap_or(0);
        self.provider_picker_state.select(Some(current_idx));
        self.show_provider_picker = true;
    }

    pub fn provider_picker_nav_down(&mut self) {
        let len = Provider::all().len();
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn provider_picker_nav_up(&mut self) {
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some(i.saturating_sub(1)));
    }

    /// Switch to the highlighted provider, asking for a key when it has none.
    pub async fn choose_provider(&mut self) {
        let Some(provider) = self
            .provider_picker_state
            .selected()
            .and_then(|i| Provider::all().get(i).copied())
        else {
            return;
        };
        self.show_provider_picker = false;

        if self.config.key_source(provider).is_none() {
            self.api_key_target_provider = Some(provider);
            self.show_api_key_input = true;
            self.api_key_input.clear();
            self.api_key_input_cursor = 0;
            return;
        }
        self.switch_provider(provider).await;
    }

    async fn switch_provider(&mut self, provider: Provider) {
        self.current_provider = provider;
        self.selected_model = match provider {
            Provider::Ollama => self.config.ollama_client()
                .list_models()
                .await
                .ok()
                .and_then(|models| models.into_iter().next())
                .unwrap_or_else(|| provider.default_model().to_string()),
            _ => provider.default_model().to_string(),
        };
        self.config.provider = Some(provider.as_str().to_string());
        self.config.default_model = Some(self.selected_model.clone());
        self.persist_config();
        self.status = None;
        self.rebuild_context();
    }

    pub async fn submit_api_key(&mut self) {
        let key = self.api_key_input.trim().to_string();
        let target = self.api_key_target_provider.take();
        self.close_api_key_input();

        if let Some(provider) = target.filter(|_| !key.is_empty()) {
            self.config.set_api_key(provider, &key);
            self.switch_provider(provider).await;
        }
    }

    pub fn close_api_key_input(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
        self.api_key_target_provider = None;
    }

    fn persist_config(&mut self) {
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Could not save config");
            self.set_error(format!("Could not save config: {}", e));
        }
    }
}
