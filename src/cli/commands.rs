//! CLI command implementations

use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analysis::{strategy_for, WalletAnalyzer};
use crate::config::Config;
use crate::engine::Orchestrator;
use crate::error::Error;
use crate::rpc::{ChainClient, EndpointPool};
use crate::seeds::load_seeds;

/// Exit code when no endpoint answers at startup
pub const EXIT_NO_CONNECTIVITY: i32 = 2;

/// Command-line overrides for `run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub max_rounds: Option<u32>,
    pub deadline_secs: Option<u64>,
    pub output: Option<String>,
    pub seeds: Option<PathBuf>,
}

impl RunOptions {
    /// Config with the overrides applied
    fn apply(&self, config: &Config) -> Result<Config> {
        let mut config = config.clone();
        if let Some(max_rounds) = self.max_rounds {
            config.discovery.max_rounds = max_rounds;
        }
        if let Some(deadline) = self.deadline_secs {
            config.run.deadline_secs = deadline;
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if let Some(seeds) = &self.seeds {
            config.seeds.file = Some(seeds.clone());
        }
        config.validate().context("Invalid command-line overrides")?;
        Ok(config)
    }
}

fn build_client(config: &Config) -> Result<Arc<ChainClient>> {
    let pool = Arc::new(EndpointPool::new(&config.endpoints, config.rpc.failure_threshold));
    let client = ChainClient::new(config.rpc.clone(), pool)?;
    Ok(Arc::new(client))
}

/// Run discovery; returns the process exit code
pub async fn run(config: &Config, options: RunOptions) -> Result<i32> {
    let config = options.apply(config)?;

    let seeds = load_seeds(config.seeds.file.as_deref(), &config.seeds.addresses)
        .await
        .context("Failed to load seed wallets")?;

    let client = build_client(&config)?;
    let strategy = strategy_for(config.analysis.strategy);
    info!(
        "Metrics strategy: {}, thresholds: {}",
        strategy.name(),
        config.thresholds.describe()
    );
    let analyzer = Arc::new(WalletAnalyzer::new(
        client.clone(),
        strategy,
        config.thresholds.clone(),
        config.analysis.tx_limit,
    ));

    let orchestrator = Orchestrator::new(client, analyzer, config.discovery.clone(), config.rpc.workers)
        .with_deadline(config.run.deadline())
        .with_endpoint_names(config.endpoints.iter().map(|e| e.name.clone()).collect())
        .with_console_output(true);

    let output = config.output.resolve_path(Local::now());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, stopping after in-flight writes");
            on_signal.cancel();
        }
    });

    match orchestrator.run(seeds, &output, cancel).await {
        Ok(summary) => {
            println!("{}", summary);
            if summary.smart == 0 {
                println!("\nNo smart wallets found.");
            } else {
                println!("\nFound {} smart wallets, saved to {}", summary.smart, output.display());
            }
            Ok(summary.termination.exit_code())
        }
        Err(e @ Error::Connectivity(_)) => {
            error!("{}", e);
            eprintln!("Cannot reach any RPC endpoint: {}", e);
            Ok(EXIT_NO_CONNECTIVITY)
        }
        Err(e) => Err(e.into()),
    }
}

/// Probe every endpoint and print a health table; returns the exit code
pub async fn health(config: &Config) -> Result<i32> {
    let client = build_client(config)?;

    println!("\n=== ENDPOINT HEALTH CHECK ===\n");
    println!("{:<16} {:<10} {:>10}  URL", "ENDPOINT", "STATUS", "LATENCY");

    let reports = client.probe_all().await;
    for report in &reports {
        let latency = match &report.result {
            Ok(latency) => format!("{}ms", latency.as_millis()),
            Err(_) => "-".to_string(),
        };
        println!(
            "{:<16} {:<10} {:>10}  {}",
            report.endpoint.name,
            report.endpoint.health.to_string(),
            latency,
            report.endpoint.display_url()
        );
        if let Err(reason) = &report.result {
            println!("    {}", reason);
        }
    }

    let healthy = reports.iter().filter(|r| r.result.is_ok()).count();
    println!();
    if healthy == reports.len() {
        println!("All endpoints healthy!");
    } else if healthy > 0 {
        println!("{} of {} endpoints healthy.", healthy, reports.len());
    } else {
        println!("No endpoint reachable. Check network access, proxy settings and credentials.");
        return Ok(EXIT_NO_CONNECTIVITY);
    }

    Ok(0)
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
