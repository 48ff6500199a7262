//! Wallet analyzer
//!
//! Scores a wallet's recent activity with the configured metrics strategy
//! and classifies it against the run's thresholds.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::metrics::{MetricsStrategy, WalletActivity};
use super::types::{ClassificationThresholds, WalletRecord};
use crate::discovery::{fetch_history, AddressHistory};
use crate::error::{Error, Result};
use crate::rpc::{Ledger, SignatureInfo};

pub struct WalletAnalyzer {
    ledger: Arc<dyn Ledger>,
    strategy: Arc<dyn MetricsStrategy>,
    thresholds: ClassificationThresholds,
    /// Signatures analysed per wallet
    tx_limit: usize,
}

impl WalletAnalyzer {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        strategy: Arc<dyn MetricsStrategy>,
        thresholds: ClassificationThresholds,
        tx_limit: usize,
    ) -> Self {
        Self {
            ledger,
            strategy,
            thresholds,
            tx_limit,
        }
    }

    pub fn thresholds(&self) -> &ClassificationThresholds {
        &self.thresholds
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Signatures analysed per wallet
    pub fn tx_limit(&self) -> usize {
        self.tx_limit
    }

    /// Whether the strategy reads transaction bodies
    pub fn needs_transaction_details(&self) -> bool {
        self.strategy.needs_transaction_details()
    }

    /// Fetch and analyse one wallet.
    ///
    /// `Ok(None)` when the wallet has no transactions. Addresses that are
    /// not valid public keys fail with [`Error::InvalidAddress`] before any
    /// call is made.
    pub async fn analyze(&self, address: &str) -> Result<Option<WalletRecord>> {
        validate_address(address)?;

        let detail_limit = if self.needs_transaction_details() {
            self.tx_limit
        } else {
            0
        };
        let history = fetch_history(self.ledger.as_ref(), address, self.tx_limit, detail_limit).await?;
        self.analyze_history(&history).await
    }

    /// Analyse a wallet from already fetched history.
    ///
    /// Only the newest `tx_limit` signatures are used. The balance is the
    /// one call made here.
    pub async fn analyze_history(&self, history: &AddressHistory) -> Result<Option<WalletRecord>> {
        let address = history.address.as_str();
        let signatures: Vec<SignatureInfo> = history
            .signatures
            .iter()
            .take(self.tx_limit)
            .cloned()
            .collect();
        if signatures.is_empty() {
            info!(address = %address, "Wallet has no transactions, skipping");
            return Ok(None);
        }

        let balance = self.ledger.get_balance(address).await?;

        let transactions = if self.needs_transaction_details() {
            history.transactions(self.tx_limit).cloned().collect()
        } else {
            Vec::new()
        };

        let first_seen = signatures.iter().filter_map(|s| s.timestamp()).min();
        let last_active = signatures.iter().filter_map(|s| s.timestamp()).max();

        let activity = WalletActivity {
            address: address.to_string(),
            balance,
            signatures,
            transactions,
        };
        let metrics = self.strategy.compute(&activity);

        let record = WalletRecord::new(
            address,
            balance,
            metrics,
            first_seen,
            last_active,
            &self.thresholds,
        );

        debug!(
            address = %address,
            strategy = self.strategy.name(),
            balance = record.balance(),
            win_rate = record.win_rate(),
            profit_loss_ratio = record.profit_loss_ratio(),
            daily_trades = record.daily_trades(),
            avg_holding_time = record.avg_holding_time(),
            smart = record.is_smart(),
            "Wallet analysed"
        );

        Ok(Some(record))
    }
}

/// Reject strings that are not base58 public keys
pub fn validate_address(address: &str) -> Result<()> {
    Pubkey::from_str(address)
        .map(|_| ())
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))
}
