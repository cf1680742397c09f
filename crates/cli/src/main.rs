//! Ferrocode CLI: the main entry point.
//!
//! Commands:
//! - `status`: Replay a session log and show its size
//! - `history`: Print the conversation stored in a session log
//! - `revert`: Revert a session log to a checkpoint
//! - `agent`: Load and validate an agent spec file
//!
//! Commands that take a session log fall back to the most recent log in the
//! configured sessions directory.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ferrocode",
    about = "Ferrocode: autonomous coding agent runtime",
    version,
    author
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
    /// Show message count, token count, checkpoints and context usage
    Status {
        /// Session log (defaults to the most recent one)
        log: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the conversation stored in a session log
    History {
        /// Session log (defaults to the most recent one)
        log: Option<PathBuf>,

        /// Only show the last N messages
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Drop everything from a checkpoint onward (the old log is kept as a backup)
    Revert {
        /// Checkpoint id to revert to
        checkpoint: u64,

        /// Session log (defaults to the most recent one)
        #[arg(short, long)]
        log: Option<PathBuf>,
    },

    /// Load an agent spec file and report what it resolves to
    Agent {
        /// Agent spec file (defaults to `default_agent_file` from the config)
        spec: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Status { log, json } => commands::status::run(log, json).await?,
        Commands::History { log, limit } => commands::history::run(log, limit).await?,
        Commands::Revert { checkpoint, log } => commands::revert::run(log, checkpoint).await?,
        Commands::Agent { spec } => commands::agent::run(spec).await?,
    }

    Ok(())
}
