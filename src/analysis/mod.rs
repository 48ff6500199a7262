//! Wallet scoring and classification

pub mod analyzer;
pub mod metrics;
pub mod types;

pub use analyzer::WalletAnalyzer;
pub use metrics::{strategy_for, MetricsStrategy, WalletActivity};
pub use types::{ClassificationThresholds, TradingMetrics, WalletRecord};
