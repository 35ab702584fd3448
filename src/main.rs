//! Lamport Forwarder - forwards every confirmed incoming payment to a fixed address
//!
//! # WARNING
//! - This moves real funds. Double-check `destination_address` before starting.
//! - The forwarding fee is deducted from every payment; payments at or below
//!   the fee are never forwarded.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

// Use the library crate
use lamport_forwarder::cli::commands;
use lamport_forwarder::config::Config;

/// Lamport Forwarder - confirmation-gated payment forwarding
#[derive(Parser)]
#[command(name = "forwarder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "forwarder.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start forwarding incoming payments
    Start {
        /// Run in dry-run mode (log forwards, send nothing)
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the receive address and its balance
    Address,

    /// Show current configuration (secrets masked)
    Config,

    /// Check system health (RPC, keypair)
    Health,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("lamport_forwarder=info".parse().unwrap());

    let json = std::env::var("FORWARDER_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    info!("Loaded configuration from {}", cli.config);

    // Execute command
    let result = match cli.command {
        Commands::Start { dry_run } => commands::start(&config, dry_run).await,
        Commands::Address => commands::address(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
