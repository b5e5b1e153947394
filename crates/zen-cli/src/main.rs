//! Zen CLI - run the agent loop from a terminal
//!
//! `zen chat` sends a message through the agent loop and streams the
//! resulting frames to stdout, as NDJSON by default. Logs go to stderr so
//! stdout stays a clean frame stream.

mod output;

use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use output::OutputFormat;
use zen_core::config::{Config, ConfigManager};
use zen_core::orchestration::ToolRegistryBuilder;
use zen_core::protocol::Frame;
use zen_core::provider::catalog;
use zen_core::session::AgentLoop;

/// Frames buffered between the loop and the stdout writer
const FRAME_BUFFER: usize = 256;

#[derive(Parser)]
#[command(name = "zen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tool-calling agent that streams its work as NDJSON", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the agent's frames
    Chat(ChatArgs),

    /// Show available tools
    Tools {
        /// Print the JSON schemas sent to the model
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },

    /// List free OpenCode Zen models
    Models,
}

#[derive(Args)]
struct ChatArgs {
    /// Message to send. Without one, each stdin line is sent as a message.
    message: Option<String>,

    /// Continue an existing conversation
    #[arg(long)]
    conversation: Option<String>,

    /// Provider (zen, openai_compatible, or any genai provider)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum model calls per message
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Ndjson)]
    format: OutputFormat,
}

impl ChatArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(provider) = &self.provider {
            config.model.provider = provider.clone();
        }
        if let Some(model) = &self.model {
            config.model.model = model.clone();
        }
        if let Some(max) = self.max_iterations {
            config.agent.max_iterations = max;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries frames
    let default_filter = if cli.verbose { "info,zen_core=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Use dunce::canonicalize to avoid UNC path prefix on Windows (\\?\)
    let workspace = dunce::canonicalize(&cli.workspace).unwrap_or_else(|_| {
        if cli.workspace.is_absolute() {
            cli.workspace.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&cli.workspace))
                .unwrap_or(cli.workspace.clone())
        }
    });

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };

    match cli.command {
        Some(Commands::Chat(args)) => {
            let mut config = config_manager.config().clone();
            args.apply(&mut config);
            run_chat(&config, workspace, args).await?
        }
        Some(Commands::Tools { json }) => show_tools(config_manager.config(), &workspace, json)?,
        Some(Commands::Config { init }) => show_config(&config_manager, &workspace, init)?,
        Some(Commands::Models) => show_models(config_manager.config()),
        None => Cli::command().print_help()?,
    }

    Ok(())
}

async fn run_chat(config: &Config, workspace: PathBuf, args: ChatArgs) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let agent = AgentLoop::from_config(config, workspace)
        .await?
        .with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    let writer = tokio::spawn(output::write_frames(rx, args.format));

    let result = match &args.message {
        Some(message) => agent
            .handle_message(args.conversation.clone(), message, &tx)
            .await
            .map(|outcome| {
                info!(
                    "Conversation {} finished after {} model call(s)",
                    outcome.conversation_id, outcome.iterations
                );
            }),
        None => run_interactive(&agent, args.conversation.clone(), &tx).await,
    };

    // Closing the channel ends the writer once every frame is flushed
    drop(tx);
    writer.await??;
    Ok(result?)
}

/// Send each stdin line as a message in one conversation
async fn run_interactive(
    agent: &AgentLoop,
    mut conversation_id: Option<String>,
    tx: &mpsc::Sender<Frame>,
) -> zen_core::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        match agent.handle_message(conversation_id.clone(), message, tx).await {
            Ok(outcome) => conversation_id = Some(outcome.conversation_id),
            Err(zen_core::Error::Cancelled) => return Err(zen_core::Error::Cancelled),
            // Already reported as an error frame; keep reading
            Err(e) => warn!("Message failed: {}", e),
        }
    }
    Ok(())
}

fn show_tools(config: &Config, workspace: &Path, json: bool) -> anyhow::Result<()> {
    let registry = ToolRegistryBuilder::from_config(&config.tools, workspace.to_path_buf())?.build();

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.schema())?);
        return Ok(());
    }

    println!("{}", style("Available Tools:").bold());
    println!();
    for tool in registry.list() {
        println!("  {:<16} {}", style(&tool.name).cyan(), tool.description);
        for param in &tool.parameters {
            let required = if param.required { "" } else { " (optional)" };
            println!(
                "  {:<16}   {} {}{}",
                "",
                style(&param.name).bold(),
                style(param.kind.as_str()).dim(),
                style(required).dim()
            );
        }
    }
    Ok(())
}

fn show_config(manager: &ConfigManager, workspace: &Path, init: bool) -> anyhow::Result<()> {
    let path = manager.config_path();

    if init {
        if path.exists() {
            println!("Config already exists at {}", style(path.display()).yellow());
        } else {
            manager.save()?;
            println!("Wrote default config to {}", style(path.display()).green());
        }
        return Ok(());
    }

    println!("{}", style("Configuration:").bold());
    println!();
    println!("  Workspace: {}", style(workspace.display()).green());
    let status = if path.exists() { "" } else { " (not found, using defaults)" };
    println!("  Config file: {}{}", style(path.display()).dim(), status);
    println!(
        "  Data dir: {}",
        style(manager.config().storage.data_dir().display()).dim()
    );
    println!();
    print!("{}", manager.to_toml()?);
    Ok(())
}

fn show_models(config: &Config) {
    println!("{}", style("Free OpenCode Zen models:").bold());
    for model in catalog::FREE_MODELS {
        let marker = if *model == config.model.model { " (configured)" } else { "" };
        println!("  {}{}", style(model).cyan(), style(marker).dim());
    }
}
