//! JSON-RPC envelopes and ledger payload types
//!
//! Payload structs mirror the node's JSON with every field optional, so a
//! partially populated transaction still deserializes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL
}

// ============ JSON-RPC envelopes ============

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: serde_json::Value,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// `getBalance` result
#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct BalanceResult {
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    pub value: u64,
}

// ============ Signatures ============

/// One entry of `getSignaturesForAddress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(default)]
    pub slot: Option<u64>,
    #[serde(default)]
    pub block_time: Option<i64>,
    /// Present when the transaction failed on-chain
    #[serde(default)]
    pub err: Option<serde_json::Value>,
}

impl SignatureInfo {
    pub fn new(signature: impl Into<String>, block_time: Option<i64>) -> Self {
        Self {
            signature: signature.into(),
            slot: None,
            block_time,
            err: None,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.block_time.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    pub fn succeeded(&self) -> bool {
        self.err.as_ref().map_or(true, |e| e.is_null())
    }
}

// ============ Transaction detail ============

/// `getTransaction` result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    #[serde(default)]
    pub slot: Option<u64>,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
    #[serde(default)]
    pub transaction: Option<TransactionEnvelope>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub fee: Option<u64>,
    #[serde(default)]
    pub pre_balances: Option<Vec<u64>>,
    #[serde(default)]
    pub post_balances: Option<Vec<u64>>,
    #[serde(default)]
    pub pre_token_balances: Option<Vec<TokenBalance>>,
    #[serde(default)]
    pub post_token_balances: Option<Vec<TokenBalance>>,
    #[serde(default)]
    pub loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    #[serde(default)]
    pub account_index: Option<usize>,
    #[serde(default)]
    pub mint: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub ui_token_amount: Option<UiTokenAmount>,
}

impl TokenBalance {
    /// Token amount in UI units (0 when absent)
    pub fn ui_amount(&self) -> f64 {
        let Some(amount) = &self.ui_token_amount else {
            return 0.0;
        };
        if let Some(ui) = amount.ui_amount {
            return ui;
        }
        match (&amount.amount, amount.decimals) {
            (Some(raw), Some(decimals)) => raw
                .parse::<f64>()
                .map(|v| v / 10f64.powi(decimals as i32))
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub ui_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadedAddresses {
    #[serde(default)]
    pub writable: Vec<String>,
    #[serde(default)]
    pub readonly: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    #[serde(default)]
    pub message: Option<TransactionMessage>,
    #[serde(default)]
    pub signatures: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    #[serde(default)]
    pub account_keys: Option<Vec<AccountKey>>,
}

/// Account key as plain string (`json`) or object (`jsonParsed`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountKey {
    Plain(String),
    Parsed { pubkey: String },
}

impl AccountKey {
    pub fn as_str(&self) -> &str {
        match self {
            AccountKey::Plain(key) => key,
            AccountKey::Parsed { pubkey } => pubkey,
        }
    }
}

impl TransactionDetail {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.block_time.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    /// Account keys in index order: static keys, then loaded writable, then loaded readonly
    pub fn account_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .transaction
            .as_ref()
            .and_then(|t| t.message.as_ref())
            .and_then(|m| m.account_keys.as_ref())
            .map(|keys| keys.iter().map(AccountKey::as_str).collect())
            .unwrap_or_default();

        if let Some(loaded) = self.meta.as_ref().and_then(|m| m.loaded_addresses.as_ref()) {
            keys.extend(loaded.writable.iter().map(String::as_str));
            keys.extend(loaded.readonly.iter().map(String::as_str));
        }

        keys
    }

    /// Change of `owner`'s SOL balance in this transaction (fees included)
    pub fn sol_delta(&self, owner: &str) -> Option<f64> {
        let meta = self.meta.as_ref()?;
        let index = self.account_keys().iter().position(|k| *k == owner)?;
        let pre = *meta.pre_balances.as_ref()?.get(index)?;
        let post = *meta.post_balances.as_ref()?.get(index)?;
        Some((post as f64 - pre as f64) / LAMPORTS_PER_SOL)
    }

    /// Per-mint change of token balances owned by `owner`
    pub fn token_deltas(&self, owner: &str) -> BTreeMap<String, f64> {
        let mut deltas: BTreeMap<String, f64> = BTreeMap::new();
        let Some(meta) = self.meta.as_ref() else {
            return deltas;
        };

        let owned = |balances: &Option<Vec<TokenBalance>>| -> Vec<(String, f64)> {
            balances
                .iter()
                .flatten()
                .filter(|b| b.owner.as_deref() == Some(owner))
                .filter_map(|b| b.mint.clone().map(|mint| (mint, b.ui_amount())))
                .collect()
        };

        for (mint, amount) in owned(&meta.post_token_balances) {
            *deltas.entry(mint).or_default() += amount;
        }
        for (mint, amount) in owned(&meta.pre_token_balances) {
            *deltas.entry(mint).or_default() -= amount;
        }

        deltas.retain(|_, delta| delta.abs() > f64::EPSILON);
        deltas
    }
}
