pub mod chain;
pub mod chains;
pub mod consumer;
mod error;
pub mod metrics;
pub mod processor;
pub mod provider_pool;
pub mod repository;
mod resolver;
pub mod settings;
#[cfg(test)]
pub mod test_utils;
mod types;
pub mod worker_pool;

pub use chain::{ChainFamily, ChainId, P2pNetwork};
pub use chains::{AdapterRegistry, AdapterSettings, ChainAdapter, FetchRequest};
pub use error::{FetchError, TrackerError};
pub use provider_pool::{ProviderPool, ProviderPools};
pub use resolver::TransactionResolver;
pub use types::*;
