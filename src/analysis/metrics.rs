//! Pluggable trading-metrics strategies
//!
//! A strategy turns a wallet's fetched activity into [`TradingMetrics`].
//! Classification never looks past the metrics, so strategies can be
//! swapped without touching the rest of the pipeline.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use super::types::TradingMetrics;
use crate::config::MetricsStrategyKind;
use crate::rpc::types::{SignatureInfo, TransactionDetail};

/// Profit/loss ratio reported for wallets with wins and no losses
pub const MAX_PROFIT_LOSS_RATIO: f64 = 100.0;

/// Everything fetched about one wallet
#[derive(Debug, Clone, Default)]
pub struct WalletActivity {
    pub address: String,
    /// SOL
    pub balance: f64,
    /// Newest first
    pub signatures: Vec<SignatureInfo>,
    /// Details of the signatures, when the strategy asked for them
    pub transactions: Vec<TransactionDetail>,
}

/// Computes trading metrics from wallet activity
pub trait MetricsStrategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Whether `compute` reads `WalletActivity::transactions`
    fn needs_transaction_details(&self) -> bool;

    fn compute(&self, activity: &WalletActivity) -> TradingMetrics;
}

/// Build the configured strategy
pub fn strategy_for(kind: MetricsStrategyKind) -> Arc<dyn MetricsStrategy> {
    match kind {
        MetricsStrategyKind::Placeholder => Arc::new(PlaceholderMetrics),
        MetricsStrategyKind::Fifo => Arc::new(FifoMetrics),
    }
}

/// Fixed-ratio stub: 70% of signatures count as wins, ratio 3.5,
/// 30-day window, 12h holds.
///
/// Not a real derivation. Use [`FifoMetrics`] for numbers derived from
/// the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderMetrics;

impl PlaceholderMetrics {
    const WIN_SHARE: f64 = 0.7;
    const PROFIT_LOSS_RATIO: f64 = 3.5;
    const WINDOW_DAYS: f64 = 30.0;
    const HOLDING_HOURS: f64 = 12.0;
}

impl MetricsStrategy for PlaceholderMetrics {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn needs_transaction_details(&self) -> bool {
        false
    }

    fn compute(&self, activity: &WalletActivity) -> TradingMetrics {
        let total = activity.signatures.len() as u32;
        if total == 0 {
            return TradingMetrics::default();
        }

        let winning = (total as f64 * Self::WIN_SHARE) as u32;
        TradingMetrics {
            total_trades: total,
            winning_trades: winning,
            win_rate: winning as f64 / total as f64 * 100.0,
            profit_loss_ratio: Self::PROFIT_LOSS_RATIO,
            daily_trades: total as f64 / Self::WINDOW_DAYS,
            avg_holding_time: Self::HOLDING_HOURS,
        }
    }
}

/// One side of a swap as seen from the wallet
#[derive(Debug, Clone)]
struct Leg {
    mint: String,
    is_buy: bool,
    /// SOL spent (buy) or received (sell)
    sol_amount: f64,
    timestamp: Option<DateTime<Utc>>,
}

/// A buy matched with a later sell of the same mint
#[derive(Debug, Clone)]
struct CompletedTrade {
    profit_sol: f64,
    hold_time_secs: i64,
}

/// Buy/sell legs matched first-in first-out per token.
///
/// A transaction is a buy of every mint whose balance grew while the
/// wallet's SOL shrank, and a sell of every mint whose balance shrank
/// while SOL grew. The SOL side is split evenly across the mints.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoMetrics;

impl FifoMetrics {
    fn legs(activity: &WalletActivity) -> Vec<Leg> {
        let mut legs = Vec::new();

        for tx in &activity.transactions {
            if tx.meta.as_ref().map_or(false, |m| m.err.as_ref().map_or(false, |e| !e.is_null())) {
                continue;
            }
            let Some(sol_delta) = tx.sol_delta(&activity.address) else {
                continue;
            };
            let token_deltas = tx.token_deltas(&activity.address);

            let bought: Vec<&String> = token_deltas
                .iter()
                .filter(|(_, d)| **d > 0.0)
                .map(|(m, _)| m)
                .collect();
            let sold: Vec<&String> = token_deltas
                .iter()
                .filter(|(_, d)| **d < 0.0)
                .map(|(m, _)| m)
                .collect();

            let (mints, is_buy) = if sol_delta < 0.0 && !bought.is_empty() {
                (bought, true)
            } else if sol_delta > 0.0 && !sold.is_empty() {
                (sold, false)
            } else {
                continue;
            };

            let share = sol_delta.abs() / mints.len() as f64;
            for mint in mints {
                legs.push(Leg {
                    mint: mint.clone(),
                    is_buy,
                    sol_amount: share,
                    timestamp: tx.timestamp(),
                });
            }
        }

        legs
    }

    fn match_trades_fifo(legs: &[Leg]) -> Vec<CompletedTrade> {
        let mut by_mint: BTreeMap<&str, Vec<&Leg>> = BTreeMap::new();
        for leg in legs {
            by_mint.entry(leg.mint.as_str()).or_default().push(leg);
        }

        let mut completed = Vec::new();
        for (_, mut legs) in by_mint {
            legs.sort_by_key(|l| l.timestamp);

            let mut open_buys: VecDeque<&Leg> = VecDeque::new();
            for leg in legs {
                if leg.is_buy {
                    open_buys.push_back(leg);
                    continue;
                }
                let Some(buy) = open_buys.pop_front() else {
                    // Sell of a position opened before the observed window
                    continue;
                };
                let hold_time_secs = match (buy.timestamp, leg.timestamp) {
                    (Some(bought), Some(sold)) => (sold - bought).num_seconds().max(0),
                    _ => 0,
                };
                completed.push(CompletedTrade {
                    profit_sol: leg.sol_amount - buy.sol_amount,
                    hold_time_secs,
                });
            }
        }

        completed
    }
}

impl MetricsStrategy for FifoMetrics {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn needs_transaction_details(&self) -> bool {
        true
    }

    fn compute(&self, activity: &WalletActivity) -> TradingMetrics {
        let legs = Self::legs(activity);
        if legs.is_empty() {
            return TradingMetrics::default();
        }
        let completed = Self::match_trades_fifo(&legs);

        let wins: Vec<f64> = completed
            .iter()
            .filter(|t| t.profit_sol > 0.0)
            .map(|t| t.profit_sol)
            .collect();
        let losses: Vec<f64> = completed
            .iter()
            .filter(|t| t.profit_sol <= 0.0)
            .map(|t| -t.profit_sol)
            .collect();

        let win_rate = if completed.is_empty() {
            0.0
        } else {
            wins.len() as f64 / completed.len() as f64 * 100.0
        };

        let avg_win = mean(&wins);
        let avg_loss = mean(&losses);
        let profit_loss_ratio = if wins.is_empty() {
            0.0
        } else if avg_loss <= f64::EPSILON {
            MAX_PROFIT_LOSS_RATIO
        } else {
            (avg_win / avg_loss).min(MAX_PROFIT_LOSS_RATIO)
        };

        let timestamps: Vec<DateTime<Utc>> = legs.iter().filter_map(|l| l.timestamp).collect();
        let span_days = match (timestamps.iter().min(), timestamps.iter().max()) {
            (Some(first), Some(last)) => (*last - *first).num_seconds() as f64 / 86_400.0,
            _ => 0.0,
        };
        let daily_trades = legs.len() as f64 / span_days.max(1.0);

        let holds: Vec<f64> = completed
            .iter()
            .map(|t| t.hold_time_secs as f64 / 3600.0)
            .collect();

        TradingMetrics {
            total_trades: legs.len() as u32,
            winning_trades: wins.len() as u32,
            win_rate,
            profit_loss_ratio,
            daily_trades,
            avg_holding_time: mean(&holds),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WALLET: &str = "Wallet1111";

    fn sigs(n: usize) -> Vec<SignatureInfo> {
        (0..n).map(|i| SignatureInfo::new(format!("sig{}", i), None)).collect()
    }

    /// Swap where the wallet's SOL moves by `sol` and `mint` by `tokens`
    fn swap(block_time: i64, sol: f64, mint: &str, tokens: f64) -> TransactionDetail {
        let pre_sol = 10_000_000_000u64;
        let post_sol = (pre_sol as f64 + sol * 1e9) as u64;
        let pre_tokens = if tokens < 0.0 { -tokens } else { 0.0 };
        let post_tokens = if tokens > 0.0 { tokens } else { 0.0 };
        serde_json::from_value(json!({
            "blockTime": block_time,
            "transaction": {"message": {"accountKeys": [WALLET, "Pool"]}},
            "meta": {
                "err": null,
                "preBalances": [pre_sol, 1u64],
                "postBalances": [post_sol, 1u64],
                "preTokenBalances": [{"mint": mint, "owner": WALLET, "uiTokenAmount": {"uiAmount": pre_tokens}}],
                "postTokenBalances": [{"mint": mint, "owner": WALLET, "uiTokenAmount": {"uiAmount": post_tokens}}]
            }
        }))
        .unwrap()
    }

    fn activity(transactions: Vec<TransactionDetail>) -> WalletActivity {
        WalletActivity {
            address: WALLET.into(),
            balance: 1.0,
            signatures: sigs(transactions.len()),
            transactions,
        }
    }

    #[test]
    fn test_placeholder_uses_fixed_ratios() {
        let metrics = PlaceholderMetrics.compute(&WalletActivity {
            signatures: sigs(10),
            ..Default::default()
        });
        assert_eq!(metrics.total_trades, 10);
        assert_eq!(metrics.winning_trades, 7);
        assert!((metrics.win_rate - 70.0).abs() < 1e-9);
        assert_eq!(metrics.profit_loss_ratio, 3.5);
        assert!((metrics.daily_trades - 10.0 / 30.0).abs() < 1e-9);
        assert_eq!(metrics.avg_holding_time, 12.0);
    }

    #[test]
    fn test_placeholder_without_signatures() {
        assert_eq!(
            PlaceholderMetrics.compute(&WalletActivity::default()),
            TradingMetrics::default()
        );
    }

    #[test]
    fn test_fifo_matches_buys_and_sells_per_mint() {
        let hour = 3600;
        let metrics = FifoMetrics.compute(&activity(vec![
            swap(0, -1.0, "MintA", 100.0),
            swap(2 * hour, -1.0, "MintB", 50.0),
            swap(4 * hour, 3.0, "MintA", -100.0),
            swap(6 * hour, 0.5, "MintB", -50.0),
        ]));

        assert_eq!(metrics.total_trades, 4);
        assert_eq!(metrics.winning_trades, 1);
        assert!((metrics.win_rate - 50.0).abs() < 1e-6);
        // avg win 2.0 / avg loss 0.5
        assert!((metrics.profit_loss_ratio - 4.0).abs() < 1e-6);
        // 4 legs within a single day
        assert!((metrics.daily_trades - 4.0).abs() < 1e-9);
        assert!((metrics.avg_holding_time - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_fifo_uses_earliest_open_buy() {
        let hour = 3600;
        let metrics = FifoMetrics.compute(&activity(vec![
            swap(0, -1.0, "MintA", 10.0),
            swap(hour, -2.0, "MintA", 10.0),
            swap(3 * hour, 1.5, "MintA", -10.0),
        ]));
        // Sell matched against the 1 SOL buy opened at t=0
        assert_eq!(metrics.winning_trades, 1);
        assert!((metrics.avg_holding_time - 3.0).abs() < 1e-9);
        assert_eq!(metrics.profit_loss_ratio, MAX_PROFIT_LOSS_RATIO);
    }

    #[test]
    fn test_fifo_without_wins_has_zero_ratio() {
        let metrics = FifoMetrics.compute(&activity(vec![
            swap(0, -1.0, "MintA", 10.0),
            swap(60, 0.2, "MintA", -10.0),
        ]));
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.profit_loss_ratio, 0.0);
    }

    #[test]
    fn test_fifo_daily_trades_over_span() {
        let day = 86_400;
        let metrics = FifoMetrics.compute(&activity(vec![
            swap(0, -1.0, "MintA", 10.0),
            swap(day, 2.0, "MintA", -10.0),
            swap(2 * day, -1.0, "MintB", 10.0),
            swap(4 * day, 2.0, "MintB", -10.0),
        ]));
        assert!((metrics.daily_trades - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fifo_ignores_transfers_and_unowned_transactions() {
        let transfer: TransactionDetail = serde_json::from_value(json!({
            "blockTime": 0,
            "transaction": {"message": {"accountKeys": [WALLET, "Friend"]}},
            "meta": {"preBalances": [2_000_000_000u64, 0u64], "postBalances": [1_000_000_000u64, 1_000_000_000u64]}
        }))
        .unwrap();
        let metrics = FifoMetrics.compute(&activity(vec![transfer, TransactionDetail::default()]));
        assert_eq!(metrics, TradingMetrics::default());
    }

    #[test]
    fn test_strategy_for_kind() {
        assert_eq!(strategy_for(MetricsStrategyKind::Placeholder).name(), "placeholder");
        let fifo = strategy_for(MetricsStrategyKind::Fifo);
        assert_eq!(fifo.name(), "fifo");
        assert!(fifo.needs_transaction_details());
    }
}
