//! Participant extraction from transaction payloads

use std::collections::BTreeSet;

use crate::rpc::types::{TokenBalance, TransactionDetail};

/// Program and sysvar accounts that show up in almost every transaction
/// and are never wallets
pub const NON_WALLET_ACCOUNTS: &[&str] = &[
    // System program
    "11111111111111111111111111111111",
    // SPL Token
    "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
    // Token-2022
    "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb",
    // Associated Token Account
    "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL",
    "ComputeBudget111111111111111111111111111111",
    "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr",
    "Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo",
    "Vote111111111111111111111111111111111111111",
    "Stake11111111111111111111111111111111111111",
    "Config1111111111111111111111111111111111111",
    "AddressLookupTab1e1111111111111111111111111",
    "BPFLoaderUpgradeab1e11111111111111111111111",
    "BPFLoader2111111111111111111111111111111111",
    // Sysvars
    "SysvarC1ock11111111111111111111111111111111",
    "SysvarRent111111111111111111111111111111111",
    "SysvarRecentB1ockHashes11111111111111111111",
    "SysvarS1otHashes111111111111111111111111111",
    "SysvarS1otHistory11111111111111111111111111",
    "SysvarStakeHistory1111111111111111111111111",
    "SysvarEpochSchedu1e111111111111111111111111",
    "SysvarFees111111111111111111111111111111111",
    "SysvarRewards111111111111111111111111111111",
    "Sysvar1nstructions1111111111111111111111111",
];

/// True for well-known program and sysvar accounts
pub fn is_non_wallet(address: &str) -> bool {
    NON_WALLET_ACCOUNTS.contains(&address)
}

/// Every participant address of a transaction.
///
/// Reads token balance owners (pre and post), static account keys and
/// addresses loaded through lookup tables. Missing sections contribute
/// nothing.
pub fn extract_accounts(tx: &TransactionDetail) -> BTreeSet<String> {
    let mut accounts = BTreeSet::new();

    if let Some(meta) = &tx.meta {
        let owners = |balances: &Option<Vec<TokenBalance>>| -> Vec<String> {
            balances
                .iter()
                .flatten()
                .filter_map(|b| b.owner.clone())
                .collect()
        };
        accounts.extend(owners(&meta.pre_token_balances));
        accounts.extend(owners(&meta.post_token_balances));
    }

    // Static keys plus lookup-table keys
    accounts.extend(tx.account_keys().into_iter().map(str::to_string));

    accounts.retain(|a| !a.trim().is_empty() && !is_non_wallet(a));
    accounts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> TransactionDetail {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_extract_all_sources() {
        let tx = parse(json!({
            "transaction": {"message": {"accountKeys": [
                "WalletA",
                {"pubkey": "WalletB", "signer": false, "writable": true},
                "11111111111111111111111111111111",
                "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
            ]}},
            "meta": {
                "preTokenBalances": [{"accountIndex": 1, "mint": "M", "owner": "OwnerC"}],
                "postTokenBalances": [{"accountIndex": 1, "mint": "M", "owner": "OwnerD"}],
                "loadedAddresses": {"writable": ["LoadedE"], "readonly": ["SysvarRent111111111111111111111111111111111"]}
            }
        }));

        let accounts = extract_accounts(&tx);
        let expected: BTreeSet<String> = ["WalletA", "WalletB", "OwnerC", "OwnerD", "LoadedE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(accounts, expected);
    }

    #[test]
    fn test_deduplicates() {
        let tx = parse(json!({
            "transaction": {"message": {"accountKeys": ["WalletA", "WalletA", "WalletB"]}},
            "meta": {"preTokenBalances": [{"owner": "WalletA"}, {"owner": "WalletB"}]}
        }));
        assert_eq!(extract_accounts(&tx).len(), 2);
    }

    #[test]
    fn test_partial_payloads_yield_partial_sets() {
        assert!(extract_accounts(&parse(json!({}))).is_empty());
        assert!(extract_accounts(&parse(json!({"meta": null, "transaction": null}))).is_empty());

        // Token owners only
        let tx = parse(json!({"meta": {"preTokenBalances": [{"mint": "M"}, {"owner": "OwnerA"}]}}));
        assert_eq!(extract_accounts(&tx).into_iter().collect::<Vec<_>>(), vec!["OwnerA"]);

        // Message without keys
        let tx = parse(json!({"transaction": {"message": {}, "signatures": ["s"]}}));
        assert!(extract_accounts(&tx).is_empty());
    }

    #[test]
    fn test_skips_empty_strings() {
        let tx = parse(json!({"transaction": {"message": {"accountKeys": ["", "  ", "WalletA"]}}}));
        assert_eq!(extract_accounts(&tx).len(), 1);
    }

    #[test]
    fn test_non_wallet_list() {
        assert!(is_non_wallet("ComputeBudget111111111111111111111111111111"));
        assert!(!is_non_wallet("WalletA"));
    }
}
