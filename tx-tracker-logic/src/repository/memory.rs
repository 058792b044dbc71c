use super::{
    ChangeLogEntry, Repository, SourceTxRecord, TargetTxRecord, UpsertOriginTxParams,
    UpsertTargetTxParams,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

#[derive(Default)]
struct State {
    origin_txs: HashMap<String, SourceTxRecord>,
    target_txs: HashMap<String, TargetTxRecord>,
    change_logs: HashMap<String, Vec<ChangeLogEntry>>,
    vaa_id_tx_hashes: HashMap<String, String>,
}

/// Process-local store with the same merge rules as the database backends.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

impl InMemoryRepository {
    pub fn upsert_vaa_id_tx_hash(&self, vaa_id: &str, tx_hash: &str) {
        self.state
            .lock()
            .vaa_id_tx_hashes
            .insert(vaa_id.to_string(), tx_hash.to_string());
    }

    /// Makes every subsequent upsert fail until switched off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("in-memory repository is read-only");
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn already_processed(&self, id: &str) -> anyhow::Result<bool> {
        Ok(self
            .state
            .lock()
            .origin_txs
            .get(id)
            .is_some_and(|record| record.processed))
    }

    async fn get_vaa_id_tx_hash(&self, vaa_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .vaa_id_tx_hashes
            .get(vaa_id)
            .filter(|hash| !hash.is_empty())
            .cloned())
    }

    async fn upsert_origin_tx(&self, params: &UpsertOriginTxParams) -> anyhow::Result<()> {
        self.check_writable()?;
        let mut state = self.state.lock();
        let previous = state.origin_txs.remove(&params.id);
        let detail = params.tx_detail.as_ref();
        let record = SourceTxRecord {
            id: params.id.clone(),
            vaa_id: params.vaa_id.clone(),
            chain_id: params.chain_id,
            status: params.status,
            native_tx_hash: params
                .effective_native_tx_hash()
                .or_else(|| previous.as_ref().and_then(|r| r.native_tx_hash.clone())),
            from: detail
                .map(|d| d.from.clone())
                .or_else(|| previous.as_ref().and_then(|r| r.from.clone())),
            attribute: match detail {
                Some(d) => d.attribute.clone(),
                None => previous.as_ref().and_then(|r| r.attribute.clone()),
            },
            fee: match detail {
                Some(d) => d.fee.clone(),
                None => previous.as_ref().and_then(|r| r.fee.clone()),
            },
            processed: params.processed,
            timestamp: params
                .effective_timestamp()
                .or_else(|| previous.as_ref().and_then(|r| r.timestamp)),
        };
        state.origin_txs.insert(params.id.clone(), record);
        state
            .change_logs
            .entry(params.id.clone())
            .or_default()
            .push(params.change.clone());
        Ok(())
    }

    async fn upsert_target_tx(&self, params: &UpsertTargetTxParams) -> anyhow::Result<()> {
        self.check_writable()?;
        let mut state = self.state.lock();
        state.target_txs.insert(
            params.id.clone(),
            TargetTxRecord {
                id: params.id.clone(),
                vaa_id: params.vaa_id.clone(),
                chain_id: params.chain_id,
                status: params.status,
                tx_hash: params.tx_hash.clone(),
                block_height: params.block_height,
                method: params.method.clone(),
                from: params.from.clone(),
                to: params.to.clone(),
                timestamp: params.timestamp,
            },
        );
        state
            .change_logs
            .entry(params.id.clone())
            .or_default()
            .push(params.change.clone());
        Ok(())
    }

    async fn get_origin_tx(&self, id: &str) -> anyhow::Result<Option<SourceTxRecord>> {
        Ok(self.state.lock().origin_txs.get(id).cloned())
    }

    async fn get_target_tx(&self, id: &str) -> anyhow::Result<Option<TargetTxRecord>> {
        Ok(self.state.lock().target_txs.get(id).cloned())
    }

    async fn change_log(&self, id: &str) -> anyhow::Result<Vec<ChangeLogEntry>> {
        Ok(self
            .state
            .lock()
            .change_logs
            .get(id)
            .cloned()
            .unwrap_or_default())
    }
}
