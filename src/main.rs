//! XRP Sweeper - forwards an XRPL account's spendable balance to a fixed destination
//!
//! # WARNING
//! - This tool moves real funds. Double-check the destination address.
//! - Anything above the reserve is sent; the destination must accept it.
//! - If stopped with a transaction in flight, look up its hash before restarting.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use xrp_sweeper::cli::commands;
use xrp_sweeper::config::Config;
use xrp_sweeper::Error;

/// XRP Sweeper - forwards spendable XRP to a fixed destination
#[derive(Parser)]
#[command(name = "sweep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sweep.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the account and sweep once funds arrive
    Run {
        /// Plan and sign once without submitting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the derived account address and public key
    Address,

    /// Show account balance and the current sweep decision
    Status,

    /// Show current configuration (secrets masked)
    Config,

    /// Check RPC connectivity and secrets
    Health,
}

/// Exit code for a failed command
fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<Error>().map(Error::exit_code).unwrap_or(1)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xrp_sweeper=info".parse()?),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(2);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run { dry_run } => commands::run(&config, dry_run).await,
        Commands::Address => commands::address(),
        Commands::Status => commands::status(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(exit_code(&e));
    }

    Ok(())
}
