//! Error taxonomy for the storage layer.
//!
//! Remote-store failures ([`StoreError::Connectivity`], [`StoreError::Timeout`]) and
//! transaction misuse ([`StoreError::Concurrency`]) always propagate to the caller.
//! Local data-quality problems are mostly absorbed by the vector index and reported
//! through return values instead; the variants exist so those outcomes can still carry
//! a typed cause.

/// Errors produced by the SPARQL executor, the cache layer, the vector index and the
/// memory store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{operation} against {endpoint} failed{}: {message}", status_suffix(.status))]
    Connectivity {
        endpoint: String,
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("{operation} against {endpoint} timed out")]
    Timeout {
        endpoint: String,
        operation: &'static str,
    },

    #[error("transaction error: {0}")]
    Concurrency(String),

    #[error("invalid embedding: {0}")]
    Validation(String),

    #[error("index serialization error: {0}")]
    Serialization(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed stored record: {0}")]
    Decode(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with HTTP {code}"),
        None => String::new(),
    }
}

impl StoreError {
    /// `true` for transport-level failures, including timeouts.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Timeout { .. })
    }

    pub fn is_concurrency(&self) -> bool {
        matches!(self, Self::Concurrency(_))
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
