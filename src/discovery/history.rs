//! Recent activity of one address
//!
//! Fetched once per explored address. The same signatures and transaction
//! bodies feed wallet analysis and frontier expansion.

use std::collections::HashSet;
use tracing::debug;

use super::extractor::extract_accounts;
use crate::error::Result;
use crate::rpc::{Ledger, SignatureInfo, TransactionDetail};

/// Signatures of an address and the transaction bodies fetched for them
#[derive(Debug, Clone, Default)]
pub struct AddressHistory {
    pub address: String,
    /// Newest first
    pub signatures: Vec<SignatureInfo>,
    /// Bodies for a prefix of `signatures`, same order; `None` where the
    /// body could not be fetched
    details: Vec<Option<TransactionDetail>>,
}

/// Counterparties found in an address's recent transactions
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    /// Participants other than the address itself, first-seen order
    pub accounts: Vec<String>,
    pub transactions_read: usize,
    /// Transactions whose detail could not be fetched
    pub transactions_skipped: usize,
}

impl AddressHistory {
    pub fn new(
        address: impl Into<String>,
        signatures: Vec<SignatureInfo>,
        details: Vec<Option<TransactionDetail>>,
    ) -> Self {
        Self {
            address: address.into(),
            signatures,
            details,
        }
    }

    /// Number of signatures whose body was requested
    pub fn details_requested(&self) -> usize {
        self.details.len()
    }

    /// Fetched bodies among the newest `limit` signatures
    pub fn transactions(&self, limit: usize) -> impl Iterator<Item = &TransactionDetail> + '_ {
        self.details.iter().take(limit).flatten()
    }

    /// Participants of the newest `limit` transactions
    pub fn neighbors(&self, limit: usize) -> Neighbors {
        let mut neighbors = Neighbors::default();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(self.address.clone());

        for detail in self.details.iter().take(limit) {
            let Some(detail) = detail else {
                neighbors.transactions_skipped += 1;
                continue;
            };
            neighbors.transactions_read += 1;

            for account in extract_accounts(detail) {
                if seen.insert(account.clone()) {
                    neighbors.accounts.push(account);
                }
            }
        }

        neighbors
    }
}

/// Fetch up to `signature_limit` recent signatures of `address` and the
/// bodies of the newest `detail_limit` of them.
///
/// Failing to list signatures fails the fetch; a single transaction that
/// cannot be fetched is left out.
pub async fn fetch_history(
    ledger: &dyn Ledger,
    address: &str,
    signature_limit: usize,
    detail_limit: usize,
) -> Result<AddressHistory> {
    let signatures = ledger
        .get_transaction_signatures(address, signature_limit)
        .await?;

    let mut details = Vec::new();
    for info in signatures.iter().take(detail_limit) {
        let detail = match ledger.get_transaction_detail(&info.signature).await {
            Ok(Some(detail)) => Some(detail),
            Ok(None) => {
                debug!(signature = %info.signature, "Transaction not found");
                None
            }
            Err(e) => {
                debug!(signature = %info.signature, error = %e, "Skipping transaction");
                None
            }
        };
        details.push(detail);
    }

    Ok(AddressHistory::new(address, signatures, details))
}
