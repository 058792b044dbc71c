use crate::chain::ChainId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("chain {0} is not supported")]
    ChainNotSupported(ChainId),
    #[error("transaction {tx_hash} not found on chain {chain}")]
    TransactionNotFound { chain: ChainId, tx_hash: String },
    #[error("failed to fetch transaction {tx_hash} on chain {chain}")]
    FetchFailed { chain: ChainId, tx_hash: String },
    #[error("cannot look up transactions on chain {chain}: {reason}")]
    InvalidRequest { chain: ChainId, reason: String },
    #[error("message {0} is already processed")]
    AlreadyProcessed(String),
    #[error("transaction hash is empty for message {0}")]
    HashEmpty(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("invalid target transaction status: {0}")]
    InvalidStatus(String),
    #[error("invalid event: {0:#}")]
    InvalidEvent(anyhow::Error),
    #[error("repository error: {0:#}")]
    Repository(#[from] anyhow::Error),
}

impl TrackerError {
    /// Resolution failures that may succeed later once upstream indexers catch up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::TransactionNotFound { .. } | TrackerError::FetchFailed { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TrackerError::Cancelled)
    }
}

/// Error returned by a single adapter call against a single endpoint.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream error: {0:#}")]
    Upstream(#[from] anyhow::Error),
    /// The request lacks data the adapter needs; no endpoint can answer it.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn not_found(reason: impl Into<String>) -> Self {
        FetchError::NotFound(reason.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Upstream(err.into())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Upstream(anyhow::Error::new(err).context("malformed upstream response"))
    }
}
