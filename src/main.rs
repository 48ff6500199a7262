//! Smart Wallet Finder - discover and classify Solana trading wallets
//!
//! Starting from seed wallets, walks the graph of transaction participants
//! a bounded number of rounds, scores every wallet found and appends the
//! ones meeting all thresholds to a CSV file as they are found.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

// Use the library crate
use smart_wallet_finder::cli::commands::{self, RunOptions};
use smart_wallet_finder::config::Config;

/// Smart Wallet Finder - Solana wallet discovery and classification
#[derive(Parser)]
#[command(name = "swf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "finder.toml", global = true)]
    config: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run wallet discovery
    Run {
        /// Round limit (overrides discovery.max_rounds)
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Stop the run after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Output file; `{timestamp}` is replaced with the start time
        #[arg(short, long)]
        output: Option<String>,

        /// Seed file (JSON array or one address per line)
        #[arg(long)]
        seeds: Option<PathBuf>,
    },

    /// Probe every configured RPC endpoint
    Health,

    /// Show current configuration (secrets masked)
    Config,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "smart_wallet_finder=info"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.json_logs);

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run {
            max_rounds,
            deadline_secs,
            output,
            seeds,
        } => {
            let options = RunOptions {
                max_rounds,
                deadline_secs,
                output,
                seeds,
            };
            commands::run(&config, options).await
        }
        Commands::Health => commands::health(&config).await,
        Commands::Config => commands::show_config(&config).map(|_| 0),
    };

    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
