//! Smart Wallet Finder Library
//!
//! Discovers Solana wallets by bounded breadth-first traversal of
//! transaction participants, scores their trading and classifies them
//! against configurable thresholds.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod output;
pub mod rpc;
pub mod seeds;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
