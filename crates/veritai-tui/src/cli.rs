use colored::*;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use anyhow::Result;
use veritai_core::{
    Config, ConversationContext, Provider, Session, SessionError, SourceKind, SourceNormalizer,
};

use crate::app::load_source;

const EXIT_COMMAND: &str = "x";

/// What the user typed at the question prompt.
#[derive(Debug, PartialEq, Eq)]
enum ChatInput {
    Exit,
    Retry,
    Reset,
    ChangeSource,
    Skip,
    Question(String),
}

fn parse_chat_input(line: &str) -> ChatInput {
    let line = line.trim();
    match line {
        "" => ChatInput::Skip,
        l if l.eq_ignore_ascii_case(EXIT_COMMAND) => ChatInput::Exit,
        "/retry" => ChatInput::Retry,
        "/reset" => ChatInput::Reset,
        "/source" => ChatInput::ChangeSource,
        question => ChatInput::Question(question.to_string()),
    }
}

fn choose_source() -> Result<(SourceKind, String)> {
    let kinds = SourceKind::all();
    let names: Vec<String> = kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| format!("{}. {}", i + 1, kind.display_name()))
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("What would you like to chat with?")
        .items(&names)
        .default(0)
        .interact()?;
    let kind = kinds[selection];

    let locator: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(kind.locator_prompt())
        .interact_text()?;
    Ok((kind, locator.trim().to_string()))
}

/// Load sources until one succeeds, starting with `initial` when given.
async fn load_until_ready(
    session: &mut Session,
    normalizer: &SourceNormalizer,
    mut next: Option<(SourceKind, String)>,
    language: &str,
) -> Result<()> {
    loop {
        let (kind, locator) = match next.take() {
            Some(source) => source,
            None => choose_source()?,
        };

        println!("{} {}...", "Loading".dimmed(), locator.cyan());
        let outcome = load_source(normalizer.clone(), kind, locator, language.to_string()).await;
        match session.apply_load(outcome.kind, outcome.label, outcome.result) {
            Ok(()) => {
                let chars = session.document().map(|d| d.char_count()).unwrap_or(0);
                println!(
                    "{} ({} characters)\n",
                    "Document loaded".bold().green(),
                    chars.to_string().bold()
                );
                return Ok(());
            }
            Err(e) => println!("{}: {}\n", "Could not load source".red(), e),
        }
    }
}

fn print_model_error(err: &SessionError) {
    println!("{}: {}", "Error".red(), err);
    if let SessionError::Model(model_err) = err {
        let hint = if model_err.is_retryable() {
            "Type /retry to send it again."
        } else {
            "Check the provider settings, then type /retry."
        };
        println!("{}", hint.dimmed());
    }
}

/// Line-mode conversation: pick a source, then ask until `x`.
pub async fn run_chat(
    config: &Config,
    provider: Provider,
    model: &str,
    initial: Option<(SourceKind, String)>,
    language: &str,
) -> Result<()> {
    let context = ConversationContext::from_config(config, provider, model)?;
    let normalizer = SourceNormalizer::with_defaults(config.fetch_timeout());
    let mut session = Session::new();

    println!(
        "\n{} {}",
        "VeritAI".bold().blue(),
        format!("({}: {})", provider.short_name(), model).dimmed()
    );
    println!("{}\n", "=".repeat(40).dimmed());

    load_until_ready(&mut session, &normalizer, initial, language).await?;
    println!(
        "{}",
        format!("Ask questions about the document. Type {} to exit, /retry, /reset, or /source.", EXIT_COMMAND)
            .dimmed()
    );

    loop {
        let line: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;

        let result = match parse_chat_input(&line) {
            ChatInput::Exit => break,
            ChatInput::Skip => continue,
            ChatInput::Reset => {
                session.reset_conversation();
                println!("{}", "Conversation cleared.".dimmed());
                continue;
            }
            ChatInput::ChangeSource => {
                load_until_ready(&mut session, &normalizer, None, language).await?;
                continue;
            }
            ChatInput::Retry => session.retry(&context).await,
            ChatInput::Question(question) => {
                println!("{}", "Thinking...".dimmed());
                session.ask(&context, &question).await
            }
        };

        match result {
            Ok(reply) => println!("\n{}\n{}\n", "VeritAI:".bold().yellow(), reply),
            Err(e) => print_model_error(&e),
        }
    }

    println!("{}", "Goodbye!".dimmed());
    Ok(())
}

pub async fn list_models(config: &Config, provider: Provider, current: &str) -> Result<()> {
    println!("\n{}", format!("Available {} Models", provider.short_name()).bold().blue());
    println!("{}", "=".repeat(30).dimmed());

    let models = match provider {
        Provider::Ollama => {
            let ollama = config.ollama_client();
            match ollama.list_models().await {
                Ok(models) => models,
                Err(e) => {
                    println!("{}: {}", "Error connecting to Ollama".red(), e);
                    println!("Make sure Ollama is running: {}", "ollama serve".bold());
                    return Ok(());
                }
            }
        }
        other => other.known_models(),
    };

    if models.is_empty() {
        println!("{}", "No models found. Pull a model with: ollama pull llama3.2".yellow());
    }
    for model in models {
        if model == current {
            println!("  • {} {}", model.green().bold(), "(default)".dimmed());
        } else {
            println!("  • {}", model.green());
        }
    }

    if config.key_source(provider).is_none() {
        println!(
            "\n{} Set {} or add it to {}",
            "No API key configured.".yellow(),
            provider.api_key_env().unwrap_or("the API key").bold(),
            Config::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "the config file".to_string())
        );
    }

    Ok(())
}
