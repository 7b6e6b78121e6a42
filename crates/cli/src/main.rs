//! TabHive CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write a default config file
//! - `status`  — Show the effective configuration
//! - `catalog` — Print the external command catalog
//! - `replay`  — Feed recorded host events through an engine
//! - `serve`   — Start the HTTP gateway over an in-process host

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tabhive",
    about = "TabHive — per-page agent engine",
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
    /// Write a default config file
    Onboard,

    /// Show the effective configuration
    Status,

    /// Print the external command catalog
    Catalog {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Feed a JSONL file of host events through an engine and print the final snapshot
    Replay {
        /// One JSON event per line
        file: PathBuf,

        /// Also rank agents against this query
        #[arg(long)]
        find: Option<String>,
    },

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long, env = "TABHIVE_PORT")]
        port: Option<u16>,

        /// Seed the in-process host from a JSONL event file
        #[arg(long)]
        seed: Option<PathBuf>,
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
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Status => commands::status::run().await?,
        Commands::Catalog { json } => commands::catalog::run(json)?,
        Commands::Replay { file, find } => commands::replay::run(&file, find).await?,
        Commands::Serve { port, seed } => commands::serve::run(port, seed).await?,
    }

    Ok(())
}
