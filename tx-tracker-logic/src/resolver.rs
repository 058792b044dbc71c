use crate::{
    chains::{AdapterRegistry, FetchRequest},
    error::{FetchError, TrackerError},
    metrics,
    provider_pool::ProviderPools,
    types::TxDetail,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Resolves a transaction on its chain, failing over across the chain's endpoints.
#[derive(Clone)]
pub struct TransactionResolver {
    pools: Arc<ProviderPools>,
    registry: Arc<AdapterRegistry>,
    call_timeout: Duration,
}

impl TransactionResolver {
    pub fn new(
        pools: Arc<ProviderPools>,
        registry: Arc<AdapterRegistry>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            pools,
            registry,
            call_timeout,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Tries every endpoint of the chain in score order; the first success wins.
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(chain_id = %request.chain_id, tx_hash = %request.tx_hash)
    )]
    pub async fn fetch_tx(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<TxDetail, TrackerError> {
        let chain_id = request.chain_id;
        let adapter = self.registry.dispatch(chain_id)?;
        let pool = self
            .pools
            .get(adapter.pool_chain(chain_id))
            .ok_or(TrackerError::ChainNotSupported(chain_id))?;

        let mut saw_not_found = false;
        for endpoint in pool.list_by_score() {
            endpoint.wait(cancel).await?;

            let call = tokio::time::timeout(
                self.call_timeout,
                adapter.fetch_tx(endpoint.url(), request),
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TrackerError::Cancelled),
                result = call => result,
            };

            match result {
                Ok(Ok(detail)) => {
                    metrics::ENDPOINT_CALLS
                        .with_label_values(&[&chain_id.to_string(), "ok"])
                        .inc();
                    return Ok(detail);
                }
                Ok(Err(FetchError::NotFound(reason))) => {
                    saw_not_found = true;
                    metrics::ENDPOINT_CALLS
                        .with_label_values(&[&chain_id.to_string(), "not_found"])
                        .inc();
                    tracing::debug!(endpoint = endpoint.url(), reason = %reason, "transaction not found");
                }
                Ok(Err(FetchError::InvalidRequest(reason))) => {
                    metrics::ENDPOINT_CALLS
                        .with_label_values(&[&chain_id.to_string(), "invalid"])
                        .inc();
                    return Err(TrackerError::InvalidRequest {
                        chain: chain_id,
                        reason,
                    });
                }
                Ok(Err(FetchError::Upstream(err))) => {
                    metrics::ENDPOINT_CALLS
                        .with_label_values(&[&chain_id.to_string(), "error"])
                        .inc();
                    tracing::warn!(endpoint = endpoint.url(), err = ?err, "endpoint call failed");
                }
                Err(_) => {
                    metrics::ENDPOINT_CALLS
                        .with_label_values(&[&chain_id.to_string(), "timeout"])
                        .inc();
                    tracing::warn!(
                        endpoint = endpoint.url(),
                        timeout = ?self.call_timeout,
                        "endpoint call timed out"
                    );
                }
            }
        }

        metrics::RESOLUTION_FAILURES
            .with_label_values(&[&chain_id.to_string()])
            .inc();
        let tx_hash = request.tx_hash.clone();
        if saw_not_found {
            Err(TrackerError::TransactionNotFound {
                chain: chain_id,
                tx_hash,
            })
        } else {
            Err(TrackerError::FetchFailed {
                chain: chain_id,
                tx_hash,
            })
        }
    }
}
