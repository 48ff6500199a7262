//! Ledger access
//!
//! The engine talks to the chain only through [`Ledger`], implemented by
//! [`ChainClient`] over JSON-RPC.

pub mod client;
pub mod endpoint;
pub mod types;

pub use client::ChainClient;
pub use endpoint::{CallOutcome, EndpointHealth, EndpointPool, RpcEndpoint};
pub use types::{SignatureInfo, TransactionDetail};

use async_trait::async_trait;

use crate::error::Result;

/// Read access to the ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Probe every endpoint, returning how many answered
    async fn probe_endpoints(&self) -> usize;

    /// Re-probe unhealthy endpoints, returning how many recovered
    async fn revive_endpoints(&self) -> usize;

    /// Balance in SOL
    async fn get_balance(&self, address: &str) -> Result<f64>;

    /// Most recent signatures for `address`, newest first
    async fn get_transaction_signatures(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>>;

    /// Transaction by signature; `None` when the node does not know it
    async fn get_transaction_detail(&self, signature: &str) -> Result<Option<TransactionDetail>>;
}
