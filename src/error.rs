//! Error types for the wallet finder

use std::fmt;

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the wallet finder
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Seed loading failed: {0}")]
    Seeds(String),

    // RPC errors
    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("RPC rate limited: {0}")]
    RateLimited(String),

    #[error("RPC endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("RPC request rejected ({code}): {message}")]
    RpcRejected { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),

    #[error("No healthy RPC endpoint available")]
    NoHealthyEndpoint,

    #[error("No RPC endpoint reachable: {0}")]
    Connectivity(String),

    // Analysis errors
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // Output errors
    #[error("Result persistence failed: {0}")]
    Persistence(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Failure buckets reported in the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    /// No endpoint reachable or none left healthy; aborts the run unless
    /// an endpoint recovers
    Connectivity,
    /// Timeout, rate limit or unreachable endpoint after retries and failover
    Transient,
    /// Response did not match the expected schema, or the node rejected the call
    Malformed,
    /// Address could not be parsed as a public key
    InvalidAddress,
    /// A classified wallet could not be written to the output
    Persistence,
}

impl FailureKind {
    pub const ALL: [FailureKind; 5] = [
        FailureKind::Connectivity,
        FailureKind::Transient,
        FailureKind::Malformed,
        FailureKind::InvalidAddress,
        FailureKind::Persistence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Connectivity => "connectivity",
            FailureKind::Transient => "transient",
            FailureKind::Malformed => "malformed",
            FailureKind::InvalidAddress => "invalid_address",
            FailureKind::Persistence => "persistence",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RpcTimeout(_) | Error::RateLimited(_) | Error::Unreachable(_)
        )
    }

    /// Check if this error counts against the endpoint's health
    pub fn is_endpoint_fault(&self) -> bool {
        matches!(self, Error::RpcTimeout(_) | Error::Unreachable(_))
    }

    /// Map onto the failure taxonomy used by the run summary
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Connectivity(_) | Error::NoHealthyEndpoint => FailureKind::Connectivity,
            Error::RpcTimeout(_)
            | Error::RateLimited(_)
            | Error::Unreachable(_)
            | Error::Cancelled => FailureKind::Transient,
            Error::RpcRejected { .. }
            | Error::MalformedResponse(_)
            | Error::Serialization(_) => FailureKind::Malformed,
            Error::InvalidAddress(_) => FailureKind::InvalidAddress,
            Error::Persistence(_) | Error::Io(_) => FailureKind::Persistence,
            Error::Config(_) | Error::Seeds(_) | Error::Anyhow(_) => FailureKind::Malformed,
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
