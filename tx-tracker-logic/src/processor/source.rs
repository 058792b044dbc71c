use crate::{
    chain::{ChainId, P2pNetwork},
    chains::FetchRequest,
    error::TrackerError,
    metrics,
    repository::{ChangeKind, ChangeLogEntry, Repository, UpsertOriginTxParams},
    resolver::TransactionResolver,
    settings::ProcessorSettings,
    types::{SourceTxStatus, TxDetail, vaa_id},
};
use backon::{ConstantBuilder, Retryable};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceTxParams {
    pub track_id: String,
    /// Caller identity recorded in the change log, e.g. `pipeline` or `backfiller`.
    pub source: String,
    pub id: String,
    /// `chain/emitter/sequence` key of the hash index; derived when absent.
    pub vaa_id: Option<String>,
    pub chain_id: ChainId,
    pub emitter: String,
    pub sequence: u64,
    pub tx_hash: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub vaa_is_signed: bool,
    pub overwrite: bool,
}

impl SourceTxParams {
    pub fn vaa_id(&self) -> String {
        self.vaa_id
            .clone()
            .unwrap_or_else(|| vaa_id(self.chain_id, &self.emitter, &self.sequence.to_string()))
    }
}

/// Resolves the source transaction of a message and stores the outcome.
#[derive(Clone)]
pub struct SourceTxProcessor {
    repository: Arc<dyn Repository>,
    resolver: TransactionResolver,
    settings: ProcessorSettings,
    p2p_network: P2pNetwork,
}

impl SourceTxProcessor {
    pub fn new(
        repository: Arc<dyn Repository>,
        resolver: TransactionResolver,
        settings: ProcessorSettings,
        p2p_network: P2pNetwork,
    ) -> Self {
        Self {
            repository,
            resolver,
            settings,
            p2p_network,
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(message_id = %params.id, chain_id = %params.chain_id, track_id = %params.track_id)
    )]
    pub async fn process_source_tx(
        &self,
        params: &SourceTxParams,
        cancel: &CancellationToken,
    ) -> Result<TxDetail, TrackerError> {
        let started = Instant::now();
        let result = self.process(params, cancel).await;
        let outcome = match &result {
            Ok(_) => "resolved",
            Err(TrackerError::AlreadyProcessed(_)) => "already_processed",
            Err(TrackerError::Cancelled) => "cancelled",
            Err(_) => "failed",
        };
        metrics::PROCESSED
            .with_label_values(&["origin", outcome])
            .inc();
        metrics::PROCESSING_DURATION
            .with_label_values(&["origin"])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn process(
        &self,
        params: &SourceTxParams,
        cancel: &CancellationToken,
    ) -> Result<TxDetail, TrackerError> {
        if !params.overwrite && self.repository.already_processed(&params.id).await? {
            tracing::debug!("source transaction already processed");
            return Err(TrackerError::AlreadyProcessed(params.id.clone()));
        }

        let vaa_id = params.vaa_id();
        let tx_hash = self.repair_hash(params, &vaa_id).await?;
        let request = FetchRequest {
            chain_id: params.chain_id,
            tx_hash: tx_hash.clone(),
            sequence: Some(params.sequence),
            timestamp: params.timestamp,
            p2p_network: self.p2p_network,
        };

        match self.resolve_with_retry(&request, cancel).await {
            Ok(detail) => {
                self.repository
                    .upsert_origin_tx(&UpsertOriginTxParams {
                        id: params.id.clone(),
                        vaa_id,
                        chain_id: params.chain_id,
                        status: SourceTxStatus::Confirmed,
                        native_tx_hash: None,
                        tx_detail: Some(detail.clone()),
                        processed: true,
                        timestamp: params.timestamp,
                        change: ChangeLogEntry::new(
                            &params.track_id,
                            &params.source,
                            ChangeKind::OriginTxResolved,
                        ),
                    })
                    .await?;
                tracing::info!(native_tx_hash = %detail.native_tx_hash, "source transaction resolved");
                Ok(detail)
            }
            Err(err @ (TrackerError::ChainNotSupported(_) | TrackerError::Cancelled)) => Err(err),
            Err(err) => {
                let status = match err {
                    TrackerError::TransactionNotFound { .. } => SourceTxStatus::Confirmed,
                    _ => SourceTxStatus::InternalError,
                };
                let partial = UpsertOriginTxParams {
                    id: params.id.clone(),
                    vaa_id,
                    chain_id: params.chain_id,
                    status,
                    native_tx_hash: self
                        .resolver
                        .registry()
                        .canonical_tx_hash(params.chain_id, &tx_hash),
                    tx_detail: None,
                    processed: false,
                    timestamp: params.timestamp,
                    change: ChangeLogEntry::new(
                        &params.track_id,
                        &params.source,
                        ChangeKind::OriginTxPartial,
                    ),
                };
                if let Err(write_err) = self.repository.upsert_origin_tx(&partial).await {
                    tracing::error!(err = ?write_err, "failed to store partial source transaction");
                }
                tracing::warn!(tx_hash = %tx_hash, err = %err, "source transaction stored as unprocessed");
                Err(err)
            }
        }
    }

    /// Hash carried by the event, or the one recorded earlier for the same vaa id.
    async fn repair_hash(&self, params: &SourceTxParams, vaa_id: &str) -> Result<String, TrackerError> {
        if !params.tx_hash.is_empty() {
            return Ok(params.tx_hash.clone());
        }
        if params.vaa_is_signed {
            if let Some(hash) = self.repository.get_vaa_id_tx_hash(vaa_id).await? {
                tracing::info!(vaa_id, tx_hash = %hash, "recovered transaction hash");
                return Ok(hash);
            }
        }
        metrics::MISSING_HASH
            .with_label_values(&[&params.chain_id.to_string()])
            .inc();
        tracing::warn!(vaa_id, vaa_is_signed = params.vaa_is_signed, "transaction hash is empty");
        Err(TrackerError::HashEmpty(params.id.clone()))
    }

    /// Retries resolution failures a fixed number of times; stops at once on success,
    /// on a non-retryable error or on cancellation.
    async fn resolve_with_retry(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<TxDetail, TrackerError> {
        let backoff = ConstantBuilder::default()
            .with_delay(self.settings.retry_delay)
            .with_max_times(self.settings.retry_attempts.saturating_sub(1));
        let resolve = (|| self.resolver.fetch_tx(request, cancel))
            .retry(backoff)
            .when(|err: &TrackerError| err.is_retryable())
            .notify(|err: &TrackerError, delay| {
                tracing::warn!(err = %err, ?delay, "retrying transaction resolution");
            });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TrackerError::Cancelled),
            result = resolve => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chains::{ChainAdapter, EvmAdapter, rpc::RpcClient},
        repository::InMemoryRepository,
        test_utils::{MockAdapter, MockBehavior, mock_resolver, tx_detail},
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method},
    };

    const PRIMARY: &str = "http://primary";

    fn params(tx_hash: &str) -> SourceTxParams {
        SourceTxParams {
            track_id: "track-1".into(),
            source: "pipeline".into(),
            id: "2/0000000000000000000000003ee18b2214aff97000d974cf647e7c347e8fa585/107429".into(),
            vaa_id: None,
            chain_id: ChainId::ETHEREUM,
            emitter: "0000000000000000000000003ee18b2214aff97000d974cf647e7c347e8fa585".into(),
            sequence: 107429,
            tx_hash: tx_hash.into(),
            timestamp: None,
            vaa_is_signed: true,
            overwrite: false,
        }
    }

    fn processor(
        repository: Arc<InMemoryRepository>,
        adapter: Arc<dyn ChainAdapter>,
        settings: ProcessorSettings,
    ) -> SourceTxProcessor {
        SourceTxProcessor::new(
            repository,
            mock_resolver(ChainId::ETHEREUM, adapter, &[PRIMARY]),
            settings,
            P2pNetwork::Mainnet,
        )
    }

    #[tokio::test]
    async fn second_call_is_already_processed() {
        let repository = Arc::new(InMemoryRepository::default());
        let adapter = MockAdapter::default().with(PRIMARY, MockBehavior::Found(tx_detail("0xsender")));
        let calls = adapter.calls();
        let processor = processor(repository.clone(), Arc::new(adapter), ProcessorSettings::default());
        let cancel = CancellationToken::new();

        processor.process_source_tx(&params("0xabc"), &cancel).await.unwrap();
        let err = processor
            .process_source_tx(&params("0xabc"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, TrackerError::AlreadyProcessed(_)), "{err}");
        assert_eq!(calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn overwrite_bypasses_idempotency_gate() {
        let repository = Arc::new(InMemoryRepository::default());
        let adapter = MockAdapter::default().with(PRIMARY, MockBehavior::Found(tx_detail("0xsender")));
        let calls = adapter.calls();
        let processor = processor(repository, Arc::new(adapter), ProcessorSettings::default());
        let cancel = CancellationToken::new();

        processor.process_source_tx(&params("0xabc"), &cancel).await.unwrap();
        let mut again = params("0xabc");
        again.overwrite = true;
        processor.process_source_tx(&again, &cancel).await.unwrap();
        assert_eq!(calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn repairs_empty_hash_from_index() {
        let repository = Arc::new(InMemoryRepository::default());
        let input = params("");
        repository.upsert_vaa_id_tx_hash(&input.vaa_id(), "0xrecovered");
        let adapter = MockAdapter::default().with(PRIMARY, MockBehavior::Found(tx_detail("0xsender")));
        let processor = processor(repository.clone(), Arc::new(adapter), ProcessorSettings::default());

        processor
            .process_source_tx(&input, &CancellationToken::new())
            .await
            .unwrap();
        assert!(repository.already_processed(&input.id).await.unwrap());
    }

    #[tokio::test]
    async fn empty_hash_without_index_entry_fails_fast() {
        let repository = Arc::new(InMemoryRepository::default());
        let adapter = MockAdapter::default();
        let calls = adapter.calls();
        let processor = processor(repository.clone(), Arc::new(adapter), ProcessorSettings::default());

        let err = processor
            .process_source_tx(&params(""), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::HashEmpty(_)), "{err}");
        assert!(calls.lock().is_empty());
        assert!(repository.get_origin_tx(&params("").id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_store_partial_record() {
        let repository = Arc::new(InMemoryRepository::default());
        let adapter = MockAdapter::default().with(PRIMARY, MockBehavior::NotFound);
        let calls = adapter.calls();
        let settings = ProcessorSettings {
            retry_attempts: 3,
            retry_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let processor = processor(repository.clone(), Arc::new(adapter), settings);

        let input = params("0xABC");
        let err = processor
            .process_source_tx(&input, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TrackerError::TransactionNotFound { .. }), "{err}");
        assert_eq!(calls.lock().len(), 3);
        let record = repository.get_origin_tx(&input.id).await.unwrap().unwrap();
        assert!(!record.processed);
        assert_eq!(record.status, SourceTxStatus::Confirmed);
        assert_eq!(record.native_tx_hash.as_deref(), Some("0xabc"));
        let log = repository.change_log(&input.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, ChangeKind::OriginTxPartial);
    }

    #[tokio::test]
    async fn upstream_failure_is_stored_as_internal_error() {
        let repository = Arc::new(InMemoryRepository::default());
        let adapter = MockAdapter::default().with(PRIMARY, MockBehavior::Upstream);
        let settings = ProcessorSettings {
            retry_attempts: 1,
            ..Default::default()
        };
        let processor = processor(repository.clone(), Arc::new(adapter), settings);

        let input = params("0xabc");
        let err = processor
            .process_source_tx(&input, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::FetchFailed { .. }), "{err}");
        let record = repository.get_origin_tx(&input.id).await.unwrap().unwrap();
        assert_eq!(record.status, SourceTxStatus::InternalError);
    }

    #[tokio::test]
    async fn unsupported_chain_writes_nothing() {
        let repository = Arc::new(InMemoryRepository::default());
        let processor = processor(
            repository.clone(),
            Arc::new(MockAdapter::default()),
            ProcessorSettings::default(),
        );
        let mut input = params("0xabc");
        input.chain_id = ChainId::SUI;

        let err = processor
            .process_source_tx(&input, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::ChainNotSupported(ChainId::SUI)));
        assert!(repository.get_origin_tx(&input.id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_retry_delay_writes_nothing() {
        let repository = Arc::new(InMemoryRepository::default());
        let adapter = MockAdapter::default().with(PRIMARY, MockBehavior::NotFound);
        let settings = ProcessorSettings {
            retry_attempts: 5,
            retry_delay: Duration::from_secs(60),
            ..Default::default()
        };
        let processor = processor(repository.clone(), Arc::new(adapter), settings);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let input = params("0xabc");
        let err = processor.process_source_tx(&input, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(repository.get_origin_tx(&input.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolves_evm_transaction_end_to_end() {
        let server = MockServer::start().await;
        let rpc_result = |result: serde_json::Value| {
            ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
        };
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getTransactionByHash", "params": ["0xabc123"]})))
            .respond_with(rpc_result(json!({"from": "0xDEF", "blockHash": "0x1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getBlockByHash"})))
            .respond_with(rpc_result(json!({"timestamp": "0x65a0e9c0"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
            .respond_with(rpc_result(serde_json::Value::Null))
            .mount(&server)
            .await;

        let repository = Arc::new(InMemoryRepository::default());
        let processor = SourceTxProcessor::new(
            repository.clone(),
            mock_resolver(
                ChainId::ETHEREUM,
                Arc::new(EvmAdapter::new(RpcClient::default())),
                &[&server.uri()],
            ),
            ProcessorSettings::default(),
            P2pNetwork::Mainnet,
        );

        let input = params("abc123");
        let detail = processor
            .process_source_tx(&input, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(detail.from, "0xdef");

        let record = repository.get_origin_tx(&input.id).await.unwrap().unwrap();
        assert!(record.processed);
        assert_eq!(record.status, SourceTxStatus::Confirmed);
        assert_eq!(record.from.as_deref(), Some("0xdef"));
        assert_eq!(record.native_tx_hash.as_deref(), Some("0xabc123"));
    }
}
