//! Toolforge CLI — the terminal surface.
//!
//! Commands:
//! - `chat`     — one assistant turn, or a full tool loop with `--toolloop`
//! - `tool`     — execute a single tool manually through the registry
//! - `sessions` — list, export, delete, and prune stored sessions
//!
//! Exit code 1 on any error, 0 otherwise.

use clap::{Parser, Subcommand};

use toolforge_core::error::classify;
use toolforge_telemetry::{EventLog, LogEvent};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolforge",
    about = "Toolforge — a budget-governed LLM tool-loop runtime",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the model, optionally letting it run tools
    Chat(commands::chat::ChatArgs),

    /// Execute a single tool manually
    Tool(commands::tool::ToolArgs),

    /// Manage stored sessions
    Sessions {
        #[command(subcommand)]
        action: commands::sessions_cmd::SessionsAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Chat(args) => commands::chat::run(args).await,
        Commands::Tool(args) => commands::tool::run(args).await,
        Commands::Sessions { action } => commands::sessions_cmd::run(action),
    };

    if let Err(e) = result {
        let class = classify(&e);
        EventLog::new("logs/app.log").emit(
            LogEvent::error("error")
                .error_class(class)
                .message(e.to_string()),
        );
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
