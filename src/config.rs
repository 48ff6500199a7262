//! Configuration loading and validation

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::types::ClassificationThresholds;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub thresholds: ClassificationThresholds,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub seeds: SeedConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// A candidate JSON-RPC endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    /// API key, sent as the `api-key` query parameter
    #[serde(default)]
    pub credential: Option<String>,
}

/// Bounds on graph exploration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Round limit
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Pending addresses dequeued per round
    #[serde(default = "default_addresses_per_round")]
    pub addresses_per_round: usize,
    /// New addresses admitted per round
    #[serde(default = "default_max_new_per_round")]
    pub max_new_per_round: usize,
    /// Addresses admitted over the whole run (seeds included)
    #[serde(default = "default_max_total_addresses")]
    pub max_total_addresses: usize,
    /// Signatures fetched per explored address
    #[serde(default = "default_signatures_per_address")]
    pub signatures_per_address: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            addresses_per_round: default_addresses_per_round(),
            max_new_per_round: default_max_new_per_round(),
            max_total_addresses: default_max_total_addresses(),
            signatures_per_address: default_signatures_per_address(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcConfig {
    /// Per-call timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries per endpoint before failing over
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Consecutive failures before an endpoint is marked unhealthy
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Global ceiling on concurrent RPC calls
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Addresses processed concurrently within a round
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            failure_threshold: default_failure_threshold(),
            max_in_flight: default_max_in_flight(),
            workers: default_workers(),
        }
    }
}

/// Which metrics strategy scores a wallet
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricsStrategyKind {
    /// Fixed-ratio stub, not derived from the chain
    Placeholder,
    /// FIFO matching of buy/sell legs per token
    Fifo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    #[serde(default = "default_strategy")]
    pub strategy: MetricsStrategyKind,
    /// Signatures analysed per wallet
    #[serde(default = "default_tx_limit")]
    pub tx_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            tx_limit: default_tx_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedConfig {
    /// Seed file (JSON array or one address per line)
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Inline seeds, appended after the file's
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Output path; `{timestamp}` is replaced at run start
    #[serde(default = "default_output_path")]
    pub path: String,
}

impl OutputConfig {
    /// Resolve the output path for a run started at `started_at`
    pub fn resolve_path(&self, started_at: DateTime<Local>) -> PathBuf {
        let stamp = started_at.format("%Y%m%d_%H%M%S").to_string();
        PathBuf::from(self.path.replace("{timestamp}", &stamp))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Run-level deadline in seconds (0 = none)
    #[serde(default)]
    pub deadline_secs: u64,
}

impl RunConfig {
    pub fn deadline(&self) -> Option<Duration> {
        (self.deadline_secs > 0).then(|| Duration::from_secs(self.deadline_secs))
    }
}

// Default value functions
fn default_endpoints() -> Vec<EndpointConfig> {
    vec![EndpointConfig {
        name: "mainnet-beta".into(),
        url: std::env::var("RPC_ENDPOINT")
            .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into()),
        credential: None,
    }]
}

fn default_max_rounds() -> u32 {
    2
}

fn default_addresses_per_round() -> usize {
    10
}

fn default_max_new_per_round() -> usize {
    5
}

fn default_max_total_addresses() -> usize {
    1000
}

fn default_signatures_per_address() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    10000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

fn default_retry_max_delay_ms() -> u64 {
    4000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_max_in_flight() -> usize {
    8
}

fn default_workers() -> usize {
    4
}

fn default_strategy() -> MetricsStrategyKind {
    MetricsStrategyKind::Placeholder
}

fn default_tx_limit() -> usize {
    50
}

fn default_output_path() -> String {
    "smart_wallets_{timestamp}.csv".into()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default("rpc.max_retries", default_max_retries() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix FINDER_)
            .add_source(
                config::Environment::with_prefix("FINDER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            anyhow::bail!("At least one [[endpoints]] entry is required");
        }

        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.trim().is_empty() {
                anyhow::bail!("Endpoint name cannot be empty (url: {})", mask_url(&endpoint.url));
            }
            if !names.insert(endpoint.name.as_str()) {
                anyhow::bail!("Duplicate endpoint name: {}", endpoint.name);
            }
            let parsed = url::Url::parse(&endpoint.url)
                .with_context(|| format!("Invalid URL for endpoint {}", endpoint.name))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!(
                    "Endpoint {} must use http or https, got {}",
                    endpoint.name,
                    parsed.scheme()
                );
            }
        }

        self.thresholds
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid thresholds: {}", e))?;

        let d = &self.discovery;
        if d.max_rounds == 0 {
            anyhow::bail!("discovery.max_rounds must be at least 1");
        }
        if d.addresses_per_round == 0 || d.max_new_per_round == 0 || d.signatures_per_address == 0 {
            anyhow::bail!("discovery caps must be positive");
        }
        if d.max_total_addresses == 0 {
            anyhow::bail!("discovery.max_total_addresses must be positive");
        }

        let r = &self.rpc;
        if r.timeout_ms == 0 {
            anyhow::bail!("rpc.timeout_ms must be positive");
        }
        if r.failure_threshold == 0 {
            anyhow::bail!("rpc.failure_threshold must be at least 1");
        }
        if r.workers == 0 || r.max_in_flight == 0 {
            anyhow::bail!("rpc.workers and rpc.max_in_flight must be at least 1");
        }
        if r.retry_base_delay_ms > r.retry_max_delay_ms {
            anyhow::bail!(
                "rpc.retry_base_delay_ms ({}) cannot exceed rpc.retry_max_delay_ms ({})",
                r.retry_base_delay_ms,
                r.retry_max_delay_ms
            );
        }
        if r.workers > r.max_in_flight {
            tracing::warn!(
                "rpc.workers ({}) exceeds rpc.max_in_flight ({}) - workers will queue on the call ceiling",
                r.workers,
                r.max_in_flight
            );
        }

        if self.analysis.tx_limit == 0 {
            anyhow::bail!("analysis.tx_limit must be positive");
        }

        if self.output.path.trim().is_empty() {
            anyhow::bail!("output.path cannot be empty");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let endpoints = self
            .endpoints
            .iter()
            .map(|e| {
                format!(
                    "    - {}: {} (credential: {})",
                    e.name,
                    mask_url(&e.url),
                    if e.credential.is_some() { "***" } else { "(not set)" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Configuration:
  Endpoints:
{}
  Thresholds:
    win_rate >= {}%
    profit_loss_ratio >= {}
    daily_trades >= {}
    avg_holding_time <= {}h
    balance >= {} SOL
  Discovery:
    max_rounds: {}
    addresses_per_round: {}
    max_new_per_round: {}
    max_total_addresses: {}
    signatures_per_address: {}
  RPC:
    timeout: {}ms
    max_retries: {}
    backoff: {}ms..{}ms
    failure_threshold: {}
    max_in_flight: {}
    workers: {}
  Analysis:
    strategy: {:?}
    tx_limit: {}
  Output:
    path: {}
  Run:
    deadline: {}
"#,
            endpoints,
            self.thresholds.win_rate_min,
            self.thresholds.profit_loss_ratio_min,
            self.thresholds.daily_trades_min,
            self.thresholds.max_holding_hours,
            self.thresholds.min_balance,
            self.discovery.max_rounds,
            self.discovery.addresses_per_round,
            self.discovery.max_new_per_round,
            self.discovery.max_total_addresses,
            self.discovery.signatures_per_address,
            self.rpc.timeout_ms,
            self.rpc.max_retries,
            self.rpc.retry_base_delay_ms,
            self.rpc.retry_max_delay_ms,
            self.rpc.failure_threshold,
            self.rpc.max_in_flight,
            self.rpc.workers,
            self.analysis.strategy,
            self.analysis.tx_limit,
            self.output.path,
            match self.run.deadline() {
                Some(d) => format!("{}s", d.as_secs()),
                None => "none".to_string(),
            },
        )
    }
}

/// Mask URL for display (hide API keys in query params)
pub fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            thresholds: ClassificationThresholds::default(),
            discovery: DiscoveryConfig::default(),
            rpc: RpcConfig::default(),
            analysis: AnalysisConfig::default(),
            seeds: SeedConfig::default(),
            output: OutputConfig::default(),
            run: RunConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.discovery.max_rounds, 2);
        assert_eq!(config.discovery.max_new_per_round, 5);
        assert_eq!(config.thresholds.win_rate_min, 70.0);
        assert_eq!(config.analysis.strategy, MetricsStrategyKind::Placeholder);
        assert!(config.run.deadline().is_none());
    }

    #[test]
    fn test_strategy_deserialize() {
        let kind: MetricsStrategyKind = serde_json::from_str(r#""fifo""#).unwrap();
        assert_eq!(kind, MetricsStrategyKind::Fifo);
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://mainnet.helius-rpc.com/?api-key=secret"),
            "https://mainnet.helius-rpc.com/?***"
        );
        assert_eq!(
            mask_url("https://api.mainnet-beta.solana.com"),
            "https://api.mainnet-beta.solana.com"
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_endpoint_names() {
        let mut config = Config::default();
        config.endpoints.push(config.endpoints[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Config::default();
        config.endpoints[0].url = "not a url".into();
        assert!(config.validate().is_err());

        config.endpoints[0].url = "ftp://example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_caps() {
        let mut config = Config::default();
        config.discovery.max_new_per_round = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rpc.max_in_flight = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rpc.retry_base_delay_ms = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_win_rate_over_100() {
        let mut config = Config::default();
        config.thresholds.win_rate_min = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[[endpoints]]
name = "primary"
url = "https://rpc.example.com"
credential = "abc"

[[endpoints]]
name = "backup"
url = "https://backup.example.com"

[thresholds]
win_rate_min = 60.0

[discovery]
max_rounds = 4

[analysis]
strategy = "fifo"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].credential.as_deref(), Some("abc"));
        assert_eq!(config.thresholds.win_rate_min, 60.0);
        assert_eq!(config.thresholds.profit_loss_ratio_min, 3.0);
        assert_eq!(config.discovery.max_rounds, 4);
        assert_eq!(config.analysis.strategy, MetricsStrategyKind::Fifo);
        assert_eq!(config.rpc.timeout_ms, 10000);
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[discovery]
max_rounds = 2
max_depth = 9
"#
        )
        .unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_resolve_output_path() {
        let output = OutputConfig::default();
        let started = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(
            output.resolve_path(started),
            PathBuf::from("smart_wallets_20240305_140709.csv")
        );

        let fixed = OutputConfig {
            path: "out/wallets.csv".into(),
        };
        assert_eq!(fixed.resolve_path(started), PathBuf::from("out/wallets.csv"));
    }

    #[test]
    fn test_masked_display_hides_credentials() {
        let mut config = Config::default();
        config.endpoints[0].credential = Some("super-secret".into());
        config.endpoints[0].url = "https://rpc.example.com/?api-key=super-secret".into();
        let display = config.masked_display();
        assert!(!display.contains("super-secret"));
        assert!(display.contains("***"));
    }
}
