use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing::info;
use veritai_core::{Config, Provider, SourceKind};

mod app;
mod cli;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;

#[derive(Parser)]
#[command(name = "veritai")]
#[command(version, about = "Chat with a website, PDF, or YouTube video")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Model provider: ollama, claude, openai, or groq
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model name (defaults to the configured model)
    #[arg(short, long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive terminal UI (default)
    Tui,
    /// Line-mode chat: pick a source, then ask questions until `x`
    Chat {
        /// Load a web page
        #[arg(long, conflicts_with_all = ["pdf", "youtube"])]
        website: Option<String>,
        /// Load a PDF file
        #[arg(long, conflicts_with = "youtube")]
        pdf: Option<PathBuf>,
        /// Load a YouTube video's transcript
        #[arg(long)]
        youtube: Option<String>,
        /// Transcript language code (YouTube only)
        #[arg(short, long)]
        language: Option<String>,
    },
    /// List models for the selected provider
    Models,
}

/// Pick the provider and model: flags first, then config.
fn resolve_model(config: &Config, provider: Option<&str>, model: Option<String>) -> Result<(Provider, String)> {
    let provider = match provider {
        Some(name) => Provider::from_str(name).ok_or_else(|| {
            anyhow!("Unknown provider '{}'. Use ollama, claude, openai, or groq.", name)
        })?,
        None => config.provider(),
    };

    // A configured model belongs to the configured provider only
    let model = model.unwrap_or_else(|| {
        if provider == config.provider() {
            config.model()
        } else {
            provider.default_model().to_string()
        }
    });
    Ok((provider, model))
}

fn initial_source(website: Option<String>, pdf: Option<PathBuf>, youtube: Option<String>) -> Option<(SourceKind, String)> {
    website
        .map(|url| (SourceKind::Website, url))
        .or_else(|| pdf.map(|path| (SourceKind::Pdf, path.display().to_string())))
        .or_else(|| youtube.map(|url| (SourceKind::YouTube, url)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("{} {}", "Ignoring config:".yellow(), e);
        Config::new()
    });
    let (provider, model) = resolve_model(&config, cli.provider.as_deref(), cli.model)?;

    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Tui => run_tui(config, provider, model).await?,
        Commands::Chat { website, pdf, youtube, language } => {
            logging::init_stderr();
            let language = language.unwrap_or_else(|| config.transcript_language());
            let initial = initial_source(website, pdf, youtube);
            cli::run_chat(&config, provider, &model, initial, &language).await?
        }
        Commands::Models => {
            logging::init_stderr();
            cli::list_models(&config, provider, &model).await?
        }
    }

    Ok(())
}

async fn run_tui(config: Config, provider: Provider, model: String) -> Result<()> {
    let log_path = logging::init_file()?;
    info!(log = %log_path.display(), provider = provider.as_str(), model = %model, "Starting TUI");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();
    let mut app = App::new(config, provider, model);

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut tui::Tui, app: &mut App, events: &mut tui::EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_chat_flags() {
        let cli = Cli::parse_from([
            "veritai", "--provider", "groq", "chat", "--youtube", "https://youtu.be/dQw4w9WgXcQ", "-l", "en",
        ]);
        assert_eq!(cli.provider.as_deref(), Some("groq"));
        match cli.command {
            Some(Commands::Chat { youtube, language, .. }) => {
                assert_eq!(youtube.as_deref(), Some("https://youtu.be/dQw4w9WgXcQ"));
                assert_eq!(language.as_deref(), Some("en"));
            }
            _ => panic!("expected chat command"),
        }
    }

    #[test]
    fn test_cli_rejects_two_sources() {
        let result = Cli::try_parse_from(["veritai", "chat", "--website", "https://a.example", "--youtube", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_model() {
        let config = Config {
            provider: Some("claude".into()),
            default_model: Some("claude-3-opus-20240229".into()),
            ..Config::default()
        };

        let (provider, model) = resolve_model(&config, None, None).unwrap();
        assert_eq!(provider, Provider::Claude);
        assert_eq!(model, "claude-3-opus-20240229");

        let (provider, model) = resolve_model(&config, Some("groq"), None).unwrap();
        assert_eq!(provider, Provider::Groq);
        assert_eq!(model, Provider::Groq.default_model());

        let (_, model) = resolve_model(&config, Some("ollama"), Some("llama3.2".into())).unwrap();
        assert_eq!(model, "llama3.2");

        assert!(resolve_model(&config, Some("gemini"), None).is_err());
    }

    #[test]
    fn test_initial_source_prefers_given_flag() {
        assert_eq!(initial_source(None, None, None), None);
        assert_eq!(
            initial_source(None, Some(PathBuf::from("a.pdf")), None),
            Some((SourceKind::Pdf, "a.pdf".to_string()))
        );
    }
}
