//! Tengen - AI research assistant
//!
//! `tengen serve` runs the HTTP backend; the other subcommands are terminal
//! front ends talking to it.

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tengen_core::{error::Result, types::DEFAULT_MAX_SOURCES, ChatMode, TengenConfig};
use tracing::{debug, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "tengen")]
#[command(about = "AI research assistant: chat, web research and document Q&A", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Configuration file
    #[arg(long, global = true, env = "TENGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL for client commands
    #[arg(long, global = true, env = "TENGEN_API_URL")]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Listen address, e.g. 127.0.0.1:8000
        #[arg(long)]
        addr: Option<String>,
    },

    /// Interactive chat session
    Chat {
        /// Request mode: chat, code, research or auto
        #[arg(short, long, default_value = "chat", value_parser = parse_mode)]
        mode: ChatMode,
    },

    /// Ask a single question and stream the answer
    Ask {
        prompt: String,

        #[arg(short, long, default_value = "chat", value_parser = parse_mode)]
        mode: ChatMode,
    },

    /// Research a topic on the web
    Research {
        topic: String,

        #[arg(long, default_value_t = DEFAULT_MAX_SOURCES)]
        max_sources: usize,
    },

    /// Upload a document (.json, .txt, .md) for document Q&A
    Upload { path: PathBuf },

    /// Check backend health
    Health,

    /// Manage saved conversations
    #[command(subcommand)]
    Sessions(SessionCommands),
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List saved conversations, newest first
    List,
    /// Print a conversation
    Show { id: String },
    /// Delete a conversation
    Delete { id: String },
}

fn parse_mode(s: &str) -> std::result::Result<ChatMode, String> {
    ChatMode::parse(s).ok_or_else(|| format!("unknown mode '{}' (chat, code, research, auto)", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Use the requested level for our crates, keep HTTP internals quieter
    let level = level.as_str().to_lowercase();
    let filter = EnvFilter::new(format!(
        "tengen={0},tengen_core={0},tower_http={0},hyper=warn,reqwest=warn",
        level
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Tengen v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = TengenConfig::load(cli.config.as_deref())?;
    if let Some(api_url) = cli.api_url {
        config.client.api_url = api_url;
    }

    match cli.command {
        Commands::Serve { addr } => cli::serve::handle(config, addr).await,
        Commands::Chat { mode } => cli::chat::handle(config, mode).await,
        Commands::Ask { prompt, mode } => cli::chat::ask(config, prompt, mode).await,
        Commands::Research { topic, max_sources } => {
            cli::research::handle(config, topic, max_sources).await
        }
        Commands::Upload { path } => cli::upload::handle(config, path).await,
        Commands::Health => cli::health::handle(config).await,
        Commands::Sessions(command) => match command {
            SessionCommands::List => cli::sessions::list(config).await,
            SessionCommands::Show { id } => cli::sessions::show(config, id).await,
            SessionCommands::Delete { id } => cli::sessions::delete(config, id).await,
        },
    }
}
