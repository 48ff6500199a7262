//! Address graph discovery

pub mod extractor;
pub mod frontier;
pub mod history;

pub use extractor::extract_accounts;
pub use frontier::{DiscoveryFrontier, FrontierState, RoundReport};
pub use history::{fetch_history, AddressHistory, Neighbors};
