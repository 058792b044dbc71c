use super::{
    ChangeLogEntry, Repository, SourceTxRecord, TargetTxRecord, UpsertOriginTxParams,
    UpsertTargetTxParams,
};
use crate::metrics;
use async_trait::async_trait;
use std::sync::Arc;

/// Writes to both stores during a migration between backends. The primary is
/// authoritative: its errors propagate and all reads are served from it. Secondary
/// failures are logged and counted only.
#[derive(Clone)]
pub struct FanOutRepository {
    primary: Arc<dyn Repository>,
    secondary: Arc<dyn Repository>,
}

impl FanOutRepository {
    pub fn new(primary: Arc<dyn Repository>, secondary: Arc<dyn Repository>) -> Self {
        Self { primary, secondary }
    }

    fn secondary_failed(operation: &str, id: &str, err: anyhow::Error) {
        metrics::SECONDARY_STORE_ERRORS
            .with_label_values(&[operation])
            .inc();
        tracing::error!(operation, id, err = ?err, "secondary repository write failed");
    }
}

#[async_trait]
impl Repository for FanOutRepository {
    async fn already_processed(&self, id: &str) -> anyhow::Result<bool> {
        self.primary.already_processed(id).await
    }

    async fn get_vaa_id_tx_hash(&self, vaa_id: &str) -> anyhow::Result<Option<String>> {
        self.primary.get_vaa_id_tx_hash(vaa_id).await
    }

    async fn upsert_origin_tx(&self, params: &UpsertOriginTxParams) -> anyhow::Result<()> {
        self.primary.upsert_origin_tx(params).await?;
        if let Err(err) = self.secondary.upsert_origin_tx(params).await {
            Self::secondary_failed("upsert_origin_tx", &params.id, err);
        }
        Ok(())
    }

    async fn upsert_target_tx(&self, params: &UpsertTargetTxParams) -> anyhow::Result<()> {
        self.primary.upsert_target_tx(params).await?;
        if let Err(err) = self.secondary.upsert_target_tx(params).await {
            Self::secondary_failed("upsert_target_tx", &params.id, err);
        }
        Ok(())
    }

    async fn get_origin_tx(&self, id: &str) -> anyhow::Result<Option<SourceTxRecord>> {
        self.primary.get_origin_tx(id).await
    }

    async fn get_target_tx(&self, id: &str) -> anyhow::Result<Option<TargetTxRecord>> {
        self.primary.get_target_tx(id).await
    }

    async fn change_log(&self, id: &str) -> anyhow::Result<Vec<ChangeLogEntry>> {
        self.primary.change_log(id).await
    }
}
