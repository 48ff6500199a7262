//! Wallet classification types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Thresholds a wallet must meet on every axis to count as smart.
///
/// Loaded once per run and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClassificationThresholds {
    /// Minimum win rate, percent (0-100)
    #[serde(default = "default_win_rate_min")]
    pub win_rate_min: f64,
    /// Minimum average win / average loss
    #[serde(default = "default_profit_loss_ratio_min")]
    pub profit_loss_ratio_min: f64,
    /// Minimum trades per day
    #[serde(default = "default_daily_trades_min")]
    pub daily_trades_min: f64,
    /// Maximum average holding time, hours
    #[serde(default = "default_max_holding_hours")]
    pub max_holding_hours: f64,
    /// Minimum balance, SOL
    #[serde(default = "default_min_balance")]
    pub min_balance: f64,
}

fn default_win_rate_min() -> f64 {
    70.0
}

fn default_profit_loss_ratio_min() -> f64 {
    3.0
}

fn default_daily_trades_min() -> f64 {
    20.0
}

fn default_max_holding_hours() -> f64 {
    24.0
}

fn default_min_balance() -> f64 {
    0.1
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        Self {
            win_rate_min: default_win_rate_min(),
            profit_loss_ratio_min: default_profit_loss_ratio_min(),
            daily_trades_min: default_daily_trades_min(),
            max_holding_hours: default_max_holding_hours(),
            min_balance: default_min_balance(),
        }
    }
}

impl ClassificationThresholds {
    /// Check value ranges
    pub fn validate(&self) -> std::result::Result<(), String> {
        let all = [
            ("win_rate_min", self.win_rate_min),
            ("profit_loss_ratio_min", self.profit_loss_ratio_min),
            ("daily_trades_min", self.daily_trades_min),
            ("max_holding_hours", self.max_holding_hours),
            ("min_balance", self.min_balance),
        ];
        for (name, value) in all {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a finite non-negative number, got {}", name, value));
            }
        }
        if self.win_rate_min > 100.0 {
            return Err(format!("win_rate_min must be <= 100, got {}", self.win_rate_min));
        }
        Ok(())
    }

    /// Apply all five predicates. Every comparison is evaluated.
    pub fn is_smart(&self, metrics: &TradingMetrics, balance_sol: f64) -> bool {
        let win_rate_ok = metrics.win_rate >= self.win_rate_min;
        let ratio_ok = metrics.profit_loss_ratio >= self.profit_loss_ratio_min;
        let frequency_ok = metrics.daily_trades >= self.daily_trades_min;
        let holding_ok = metrics.avg_holding_time <= self.max_holding_hours;
        let balance_ok = balance_sol >= self.min_balance;

        win_rate_ok & ratio_ok & frequency_ok & holding_ok & balance_ok
    }

    /// One-line description for output headers and logs
    pub fn describe(&self) -> String {
        format!(
            "win_rate>={}%, profit_loss_ratio>={}, daily_trades>={}, avg_holding_time<={}h, balance>={} SOL",
            self.win_rate_min,
            self.profit_loss_ratio_min,
            self.daily_trades_min,
            self.max_holding_hours,
            self.min_balance
        )
    }
}

/// Output of a metrics strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingMetrics {
    pub total_trades: u32,
    pub winning_trades: u32,
    /// Percent, 0-100
    pub win_rate: f64,
    pub profit_loss_ratio: f64,
    pub daily_trades: f64,
    /// Hours
    pub avg_holding_time: f64,
}

/// Analysed wallet.
///
/// Read-only once built: `is_smart` is derived from the other fields and the
/// thresholds at construction, so none of them can change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletRecord {
    address: String,
    /// SOL
    balance: f64,
    metrics: TradingMetrics,
    first_seen: Option<DateTime<Utc>>,
    last_active: Option<DateTime<Utc>>,
    is_smart: bool,
}

impl WalletRecord {
    /// Build a record and classify it against `thresholds`
    pub fn new(
        address: impl Into<String>,
        balance: f64,
        metrics: TradingMetrics,
        first_seen: Option<DateTime<Utc>>,
        last_active: Option<DateTime<Utc>>,
        thresholds: &ClassificationThresholds,
    ) -> Self {
        let is_smart = thresholds.is_smart(&metrics, balance);
        Self {
            address: address.into(),
            balance,
            metrics,
            first_seen,
            last_active,
            is_smart,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// SOL
    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn total_trades(&self) -> u32 {
        self.metrics.total_trades
    }

    pub fn winning_trades(&self) -> u32 {
        self.metrics.winning_trades
    }

    pub fn win_rate(&self) -> f64 {
        self.metrics.win_rate
    }

    pub fn profit_loss_ratio(&self) -> f64 {
        self.metrics.profit_loss_ratio
    }

    pub fn daily_trades(&self) -> f64 {
        self.metrics.daily_trades
    }

    /// Hours
    pub fn avg_holding_time(&self) -> f64 {
        self.metrics.avg_holding_time
    }

    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        self.first_seen
    }

    pub fn last_active(&self) -> Option<DateTime<Utc>> {
        self.last_active
    }

    pub fn is_smart(&self) -> bool {
        self.is_smart
    }

    pub fn metrics(&self) -> &TradingMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> ClassificationThresholds {
        ClassificationThresholds {
            win_rate_min: 70.0,
            profit_loss_ratio_min: 3.0,
            daily_trades_min: 20.0,
            max_holding_hours: 24.0,
            min_balance: 0.1,
        }
    }

    fn metrics(daily_trades: f64) -> TradingMetrics {
        TradingMetrics {
            total_trades: 100,
            winning_trades: 71,
            win_rate: 71.0,
            profit_loss_ratio: 3.5,
            daily_trades,
            avg_holding_time: 12.0,
        }
    }

    #[test]
    fn test_smart_wallet_scenario() {
        let t = thresholds();
        let smart = WalletRecord::new("w", 1.0, metrics(21.0), None, None, &t);
        assert!(smart.is_smart());

        let not_smart = WalletRecord::new("w", 1.0, metrics(19.0), None, None, &t);
        assert!(!not_smart.is_smart());
    }

    #[test]
    fn test_each_predicate_can_fail() {
        let t = thresholds();
        let base = metrics(21.0);

        let mut m = base.clone();
        m.win_rate = 69.9;
        assert!(!t.is_smart(&m, 1.0));

        let mut m = base.clone();
        m.profit_loss_ratio = 2.9;
        assert!(!t.is_smart(&m, 1.0));

        let mut m = base.clone();
        m.avg_holding_time = 24.5;
        assert!(!t.is_smart(&m, 1.0));

        assert!(!t.is_smart(&base, 0.05));
        assert!(t.is_smart(&base, 1.0));
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let t = thresholds();
        let m = TradingMetrics {
            total_trades: 10,
            winning_trades: 7,
            win_rate: 70.0,
            profit_loss_ratio: 3.0,
            daily_trades: 20.0,
            avg_holding_time: 24.0,
        };
        assert!(t.is_smart(&m, 0.1));
    }

    #[test]
    fn test_classification_is_pure() {
        let t = thresholds();
        let grid = [
            (71.0, 3.5, 21.0, 12.0, 1.0),
            (50.0, 3.5, 21.0, 12.0, 1.0),
            (71.0, 1.0, 21.0, 12.0, 1.0),
            (71.0, 3.5, 5.0, 12.0, 1.0),
            (71.0, 3.5, 21.0, 48.0, 1.0),
            (71.0, 3.5, 21.0, 12.0, 0.0),
        ];
        for (win_rate, ratio, daily, holding, balance) in grid {
            let m = TradingMetrics {
                total_trades: 10,
                winning_trades: 5,
                win_rate,
                profit_loss_ratio: ratio,
                daily_trades: daily,
                avg_holding_time: holding,
            };
            let record = WalletRecord::new("w", balance, m, None, None, &t);
            let expected = record.win_rate() >= t.win_rate_min
                && record.profit_loss_ratio() >= t.profit_loss_ratio_min
                && record.daily_trades() >= t.daily_trades_min
                && record.avg_holding_time() <= t.max_holding_hours
                && record.balance() >= t.min_balance;
            assert_eq!(record.is_smart(), expected);
            // Same inputs, same answer
            assert_eq!(t.is_smart(record.metrics(), record.balance()), record.is_smart());
        }
    }

    #[test]
    fn test_record_exposes_what_it_was_classified_on() {
        let t = thresholds();
        let seen = chrono::Utc::now();
        let record = WalletRecord::new("w", 2.0, metrics(21.0), Some(seen), None, &t);

        assert_eq!(record.address(), "w");
        assert_eq!(record.balance(), 2.0);
        assert_eq!(record.metrics(), &metrics(21.0));
        assert_eq!(record.total_trades(), 100);
        assert_eq!(record.winning_trades(), 71);
        assert_eq!(record.first_seen(), Some(seen));
        assert_eq!(record.last_active(), None);
        assert_eq!(record.is_smart(), t.is_smart(record.metrics(), record.balance()));
    }

    #[test]
    fn test_threshold_validation() {
        assert!(thresholds().validate().is_ok());

        let mut t = thresholds();
        t.min_balance = -1.0;
        assert!(t.validate().is_err());

        let mut t = thresholds();
        t.max_holding_hours = f64::NAN;
        assert!(t.validate().is_err());
    }
}
