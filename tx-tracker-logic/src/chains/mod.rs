//! Per-chain transaction fetchers.
//!
//! Chains are grouped into families that share one upstream protocol. Every
//! family has a single [`ChainAdapter`] implementation; the [`AdapterRegistry`]
//! maps each supported chain to the adapter of its family.

mod algorand;
mod aptos;
mod cosmos;
mod evm;
mod gateway;
pub mod rpc;
mod solana;
mod sui;

pub use algorand::AlgorandAdapter;
pub use aptos::AptosAdapter;
pub use cosmos::CosmosAdapter;
pub use evm::EvmAdapter;
pub use gateway::GatewayAdapter;
pub use solana::SolanaAdapter;
pub use sui::SuiAdapter;

use crate::{
    chain::{ChainFamily, ChainId, P2pNetwork},
    error::{FetchError, TrackerError},
    provider_pool::ProviderPools,
    settings::{AptosSettings, GatewaySettings},
    types::TxDetail,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rpc::RpcClient;
use std::{collections::HashMap, sync::Arc};

/// Everything an adapter may need to locate a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub chain_id: ChainId,
    pub tx_hash: String,
    /// Message sequence; required by chains that look transactions up by event.
    pub sequence: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub p2p_network: P2pNetwork,
}

impl FetchRequest {
    pub fn new(chain_id: ChainId, tx_hash: impl Into<String>, p2p_network: P2pNetwork) -> Self {
        Self {
            chain_id,
            tx_hash: tx_hash.into(),
            sequence: None,
            timestamp: None,
            p2p_network,
        }
    }
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Resolves one transaction against one endpoint url.
    async fn fetch_tx(&self, endpoint_url: &str, request: &FetchRequest)
    -> Result<TxDetail, FetchError>;

    /// Hash in the form it would be stored, if it can be derived without a network call.
    fn canonical_tx_hash(&self, _tx_hash: &str) -> Option<String> {
        None
    }

    /// Chain whose provider pool serves the first lookup.
    fn pool_chain(&self, chain_id: ChainId) -> ChainId {
        chain_id
    }
}

#[derive(Clone, Debug, Default)]
pub struct AdapterSettings {
    pub gateway: GatewaySettings,
    pub aptos: AptosSettings,
}

/// Chain to adapter table, built once at startup.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    /// Registers the family adapter for every known chain.
    pub fn new(client: RpcClient, settings: AdapterSettings, pools: Arc<ProviderPools>) -> Self {
        let evm: Arc<dyn ChainAdapter> = Arc::new(EvmAdapter::new(client.clone()));
        let solana: Arc<dyn ChainAdapter> = Arc::new(SolanaAdapter::new(client.clone()));
        let cosmos: Arc<dyn ChainAdapter> = Arc::new(CosmosAdapter::new(client.clone()));
        let aptos: Arc<dyn ChainAdapter> =
            Arc::new(AptosAdapter::new(client.clone(), settings.aptos));
        let sui: Arc<dyn ChainAdapter> = Arc::new(SuiAdapter::new(client.clone()));
        let algorand: Arc<dyn ChainAdapter> = Arc::new(AlgorandAdapter::new(client.clone()));
        let gateway: Arc<dyn ChainAdapter> =
            Arc::new(GatewayAdapter::new(client, settings.gateway, pools));

        let mut registry = Self::default();
        for chain_id in ChainId::known() {
            let adapter = match ChainFamily::of(chain_id) {
                Some(ChainFamily::Evm) => &evm,
                Some(ChainFamily::Solana) => &solana,
                Some(ChainFamily::Cosmos) => &cosmos,
                Some(ChainFamily::Aptos) => &aptos,
                Some(ChainFamily::Sui) => &sui,
                Some(ChainFamily::Algorand) => &algorand,
                Some(ChainFamily::Gateway) => &gateway,
                None => continue,
            };
            registry.register(chain_id, adapter.clone());
        }
        registry
    }

    pub fn register(&mut self, chain_id: ChainId, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(chain_id, adapter);
    }

    pub fn dispatch(&self, chain_id: ChainId) -> Result<Arc<dyn ChainAdapter>, TrackerError> {
        self.adapters
            .get(&chain_id)
            .cloned()
            .ok_or(TrackerError::ChainNotSupported(chain_id))
    }

    pub fn canonical_tx_hash(&self, chain_id: ChainId, tx_hash: &str) -> Option<String> {
        self.adapters
            .get(&chain_id)
            .and_then(|adapter| adapter.canonical_tx_hash(tx_hash))
    }
}

/// Decodes a hex hash with or without `0x` prefix.
pub(crate) fn decode_hex(tx_hash: &str) -> Option<Vec<u8>> {
    let raw = tx_hash
        .strip_prefix("0x")
        .or_else(|| tx_hash.strip_prefix("0X"))
        .unwrap_or(tx_hash);
    hex::decode(raw).ok()
}

/// Decodes a 32-byte hex hash.
pub(crate) fn decode_hash32(tx_hash: &str) -> Option<[u8; 32]> {
    decode_hex(tx_hash).and_then(|bytes| bytes.try_into().ok())
}
