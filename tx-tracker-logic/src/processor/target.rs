use crate::{
    chain::ChainId,
    error::TrackerError,
    metrics,
    repository::{ChangeKind, ChangeLogEntry, Repository, UpsertTargetTxParams},
    types::TargetTxStatus,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetTxParams {
    pub track_id: String,
    pub source: String,
    pub id: String,
    pub vaa_id: Option<String>,
    pub chain_id: ChainId,
    pub tx_hash: String,
    pub block_height: Option<u64>,
    pub block_timestamp: Option<DateTime<Utc>>,
    pub method: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Raw status as reported by the watcher.
    pub status: String,
}

/// Stores destination transactions, never letting a weaker status replace a stronger one.
#[derive(Clone)]
pub struct TargetTxProcessor {
    repository: Arc<dyn Repository>,
}

impl TargetTxProcessor {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    #[tracing::instrument(
        skip_all,
        fields(message_id = %params.id, chain_id = %params.chain_id, status = %params.status)
    )]
    pub async fn process_target_tx(&self, params: &TargetTxParams) -> Result<(), TrackerError> {
        let result = self.process(params).await;
        let outcome = match &result {
            Ok(true) => "stored",
            Ok(false) => "rejected",
            Err(_) => "failed",
        };
        metrics::PROCESSED
            .with_label_values(&["target", outcome])
            .inc();
        result.map(|_| ())
    }

    /// Returns whether the record was written.
    async fn process(&self, params: &TargetTxParams) -> Result<bool, TrackerError> {
        let status: TargetTxStatus = params.status.parse()?;

        if status != TargetTxStatus::Confirmed {
            let existing = self
                .repository
                .get_target_tx(&params.id)
                .await?
                .map(|record| record.status);
            if !status.may_overwrite(existing) {
                tracing::warn!(
                    existing = ?existing,
                    "ignoring destination status that would downgrade the stored one"
                );
                return Ok(false);
            }
        }

        self.repository
            .upsert_target_tx(&UpsertTargetTxParams {
                id: params.id.clone(),
                vaa_id: params.vaa_id.clone(),
                chain_id: params.chain_id,
                status,
                tx_hash: params.tx_hash.clone(),
                block_height: params.block_height,
                method: params.method.clone(),
                from: params.from.clone(),
                to: params.to.clone(),
                timestamp: params.block_timestamp,
                change: ChangeLogEntry::new(
                    &params.track_id,
                    &params.source,
                    ChangeKind::TargetTxUpserted,
                ),
            })
            .await?;
        tracing::info!(tx_hash = %params.tx_hash, "destination transaction stored");
        Ok(true)
    }
}
