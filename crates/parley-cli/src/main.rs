use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use parley::{
    credentials::{KeyRetrievalStrategy, KeyStore},
    models::{
        conversation::{ChatModel, Conversation},
        message::Message,
    },
    orchestrator::{ConversationEvent, Orchestrator, UserInput},
    providers::factory::{ProviderKind, ProviderRegistry},
};
use rustyline::error::ReadlineError;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

mod configuration;
mod error;
mod render;

use configuration::Settings;
use render::Renderer;

const PROMPT: &str = "\x1b[1m\x1b[38;5;30m> \x1b[0m";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Model to chat with, e.g. openai/gpt-4o-mini or gemini-2.5-flash
    #[arg(short, long)]
    model: Option<String>,

    /// Path to a TOML config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Store an API key for a backend in the system keyring
    Key {
        /// openrouter, gemini or kimi
        provider: ProviderKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Key { provider }) => save_key(provider),
        None => chat(cli.config, cli.model).await,
    }
}

fn save_key(provider: ProviderKind) -> Result<()> {
    let term = console::Term::stderr();
    term.write_str(&format!("{} API key: ", provider))?;
    let key = term.read_secure_line()?;
    if key.trim().is_empty() {
        anyhow::bail!("No key entered");
    }

    KeyStore::system(KeyRetrievalStrategy::KeyringOnly)
        .save(provider.credential_key(), key.trim())
        .with_context(|| format!("Failed to store the {} key", provider))?;
    println!("Saved {} to the system keyring", provider.credential_key());
    Ok(())
}

async fn chat(config_file: Option<PathBuf>, model: Option<String>) -> Result<()> {
    let mut settings = Settings::load(config_file.as_deref(), model)?;

    let credentials = Arc::new(KeyStore::system(settings.key_strategy()));
    let registry = ProviderRegistry::with_defaults(settings.take_provider_configs(), credentials)?;

    let model = ChatModel::infer(settings.model.as_str());
    let conversation = match settings.system_prompt.as_deref() {
        Some(prompt) if !prompt.trim().is_empty() => {
            Conversation::with_messages(model, vec![Message::system().with_text(prompt)])
        }
        _ => Conversation::new(model),
    };
    let mut orchestrator =
        Orchestrator::new(conversation, registry, None, settings.orchestrator_config());
    let mut events = orchestrator.subscribe();
    let mut renderer = Renderer::stdout();

    // Ctrl-C while a response streams stops that response, not the program
    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut editor = rustyline::DefaultEditor::new()?;
    println!(
        "{} {}",
        style("parley").bold().cyan(),
        style(format!("talking to {}", orchestrator.conversation().model.id)).dim()
    );
    println!(
        "Type {} to leave, {} to switch models\n",
        style("/exit").dim(),
        style("/model <id>").dim()
    );

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(err) = editor.add_history_entry(line) {
            tracing::debug!("Could not record history entry: {}", err);
        }

        match line {
            "/exit" | "/quit" => break,
            _ if line.starts_with("/model") => {
                let id = line.trim_start_matches("/model").trim();
                if id.is_empty() {
                    println!("{}", style(&orchestrator.conversation().model.id).dim());
                } else {
                    let model = ChatModel::infer(id);
                    println!(
                        "{}",
                        style(format!("now talking to {} via {}", model.id, model.provider)).dim()
                    );
                    orchestrator.set_model(model)?;
                }
            }
            _ => run_turn(&mut orchestrator, &mut events, &mut renderer, line).await?,
        }
    }
    Ok(())
}

/// Submit one line and render its events while the turn runs
async fn run_turn(
    orchestrator: &mut Orchestrator,
    events: &mut broadcast::Receiver<ConversationEvent>,
    renderer: &mut Renderer<std::io::Stdout>,
    line: &str,
) -> Result<()> {
    let submit = orchestrator.submit(UserInput::text(line));
    tokio::pin!(submit);

    let result = loop {
        tokio::select! {
            result = &mut submit => break result,
            event = events.recv() => match event {
                Ok(event) => renderer.render(&event)?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Renderer fell behind, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => {}
            },
        }
    };

    while let Ok(event) = events.try_recv() {
        renderer.render(&event)?;
    }
    result.map_err(Into::into)
}
