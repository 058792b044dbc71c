use crate::{
    chain::ChainId,
    chains::{AdapterRegistry, ChainAdapter, FetchRequest},
    error::FetchError,
    provider_pool::{
        EndpointConfig, FALLBACK_PRIORITY, PRIMARY_PRIORITY, ProviderPool, ProviderPools,
    },
    repository::{ChangeKind, ChangeLogEntry, UpsertOriginTxParams, UpsertTargetTxParams},
    resolver::TransactionResolver,
    types::{SourceTxStatus, TargetTxStatus, TxDetail},
};
use async_trait::async_trait;
use blockscout_service_launcher::test_database::TestDbGuard;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};

pub async fn init_db(name: &str) -> TestDbGuard {
    TestDbGuard::new::<migration::Migrator>(name).await
}

#[derive(Clone, Debug)]
pub enum MockBehavior {
    Found(TxDetail),
    NotFound,
    Upstream,
    Invalid,
    /// Never completes; exercises timeouts and cancellation.
    Hang,
}

/// Adapter answering per endpoint url. Unknown urls report not found.
#[derive(Default)]
pub struct MockAdapter {
    behaviors: HashMap<String, MockBehavior>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockAdapter {
    pub fn with(mut self, url: &str, behavior: MockBehavior) -> Self {
        self.behaviors.insert(url.to_string(), behavior);
        self
    }

    /// Urls called so far, in call order.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    async fn fetch_tx(
        &self,
        endpoint_url: &str,
        request: &FetchRequest,
    ) -> Result<TxDetail, FetchError> {
        self.calls.lock().push(endpoint_url.to_string());
        match self.behaviors.get(endpoint_url).cloned() {
            Some(MockBehavior::Found(detail)) => Ok(detail),
            Some(MockBehavior::Upstream) => Err(anyhow::anyhow!("upstream unavailable").into()),
            Some(MockBehavior::Invalid) => {
                Err(FetchError::InvalidRequest("missing sequence".into()))
            }
            Some(MockBehavior::Hang) => futures::future::pending().await,
            Some(MockBehavior::NotFound) | None => {
                Err(FetchError::not_found(request.tx_hash.clone()))
            }
        }
    }

    fn canonical_tx_hash(&self, tx_hash: &str) -> Option<String> {
        (!tx_hash.is_empty()).then(|| tx_hash.to_lowercase())
    }
}

pub fn tx_detail(from: &str) -> TxDetail {
    TxDetail {
        from: from.to_string(),
        native_tx_hash: "0xabc".to_string(),
        attribute: None,
        fee: None,
        block_timestamp: None,
    }
}

pub fn origin_params(id: &str, processed: bool) -> UpsertOriginTxParams {
    UpsertOriginTxParams {
        id: id.to_string(),
        vaa_id: id.to_string(),
        chain_id: ChainId::ETHEREUM,
        status: SourceTxStatus::Confirmed,
        native_tx_hash: None,
        tx_detail: Some(tx_detail("0xsender")),
        processed,
        timestamp: None,
        change: ChangeLogEntry::new("track-1", "test", ChangeKind::OriginTxResolved),
    }
}

pub fn target_params(id: &str, status: TargetTxStatus) -> UpsertTargetTxParams {
    UpsertTargetTxParams {
        id: id.to_string(),
        vaa_id: Some(id.to_string()),
        chain_id: ChainId::SOLANA,
        status,
        tx_hash: "5xTargetSignature".to_string(),
        block_height: Some(100),
        method: Some("completeTransfer".to_string()),
        from: Some("redeemer".to_string()),
        to: Some("recipient".to_string()),
        timestamp: None,
        change: ChangeLogEntry::new("track-2", "test", ChangeKind::TargetTxUpserted),
    }
}

/// Resolver over a single chain whose endpoints are served by `adapter`.
pub fn mock_resolver(
    chain_id: ChainId,
    adapter: Arc<dyn ChainAdapter>,
    urls: &[&str],
) -> TransactionResolver {
    let configs = urls
        .iter()
        .enumerate()
        .map(|(i, url)| EndpointConfig {
            url: url.to_string(),
            priority: if i == 0 { PRIMARY_PRIORITY } else { FALLBACK_PRIORITY },
            requests_per_minute: 600,
        })
        .collect();
    let mut pools = ProviderPools::default();
    pools.insert(ProviderPool::new(chain_id, configs).expect("valid pool"));
    let mut registry = AdapterRegistry::default();
    registry.register(chain_id, adapter);
    TransactionResolver::new(Arc::new(pools), Arc::new(registry), Duration::from_secs(30))
}
