//! Durable store of resolved source and destination transactions.

mod document;
mod fan_out;
mod memory;
mod relational;

pub use document::DocumentRepository;
pub use fan_out::FanOutRepository;
pub use memory::InMemoryRepository;
pub use relational::RelationalRepository;

use crate::{
    chain::ChainId,
    types::{AttributeTxDetail, FeeDetail, SourceTxStatus, TargetTxStatus, TxDetail},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    OriginTxResolved,
    OriginTxPartial,
    TargetTxUpserted,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::OriginTxResolved => "origin-tx-resolved",
            ChangeKind::OriginTxPartial => "origin-tx-partial",
            ChangeKind::TargetTxUpserted => "target-tx-upserted",
        }
    }

    pub fn is_origin(self) -> bool {
        !matches!(self, ChangeKind::TargetTxUpserted)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "origin-tx-resolved" => Ok(ChangeKind::OriginTxResolved),
            "origin-tx-partial" => Ok(ChangeKind::OriginTxPartial),
            "target-tx-upserted" => Ok(ChangeKind::TargetTxUpserted),
            other => Err(anyhow::anyhow!("unknown change kind: {other}")),
        }
    }
}

/// One append-only record of who wrote a message's transaction and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub track_id: String,
    pub source: String,
    pub kind: ChangeKind,
    pub created_at: DateTime<Utc>,
}

impl ChangeLogEntry {
    pub fn new(track_id: impl Into<String>, source: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            track_id: track_id.into(),
            source: source.into(),
            kind,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertOriginTxParams {
    pub id: String,
    pub vaa_id: String,
    pub chain_id: ChainId,
    pub status: SourceTxStatus,
    /// Best-effort hash for partial records; ignored when `tx_detail` is present.
    pub native_tx_hash: Option<String>,
    pub tx_detail: Option<TxDetail>,
    pub processed: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub change: ChangeLogEntry,
}

impl UpsertOriginTxParams {
    pub fn effective_native_tx_hash(&self) -> Option<String> {
        self.tx_detail
            .as_ref()
            .map(|d| d.native_tx_hash.clone())
            .or_else(|| self.native_tx_hash.clone())
    }

    pub fn effective_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .or_else(|| self.tx_detail.as_ref().and_then(|d| d.block_timestamp))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertTargetTxParams {
    pub id: String,
    pub vaa_id: Option<String>,
    pub chain_id: ChainId,
    pub status: TargetTxStatus,
    pub tx_hash: String,
    pub block_height: Option<u64>,
    pub method: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub change: ChangeLogEntry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceTxRecord {
    pub id: String,
    pub vaa_id: String,
    pub chain_id: ChainId,
    pub status: SourceTxStatus,
    pub native_tx_hash: Option<String>,
    pub from: Option<String>,
    pub attribute: Option<AttributeTxDetail>,
    pub fee: Option<FeeDetail>,
    pub processed: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetTxRecord {
    pub id: String,
    pub vaa_id: Option<String>,
    pub chain_id: ChainId,
    pub status: TargetTxStatus,
    pub tx_hash: String,
    pub block_height: Option<u64>,
    pub method: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Operations the processors need from a backing store. Every method must be safe
/// to call concurrently for distinct message ids.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Whether a fully resolved source transaction exists for the message.
    async fn already_processed(&self, id: &str) -> anyhow::Result<bool>;

    /// Previously observed hash for a `chain/emitter/sequence` key.
    async fn get_vaa_id_tx_hash(&self, vaa_id: &str) -> anyhow::Result<Option<String>>;

    async fn upsert_origin_tx(&self, params: &UpsertOriginTxParams) -> anyhow::Result<()>;

    async fn upsert_target_tx(&self, params: &UpsertTargetTxParams) -> anyhow::Result<()>;

    async fn get_origin_tx(&self, id: &str) -> anyhow::Result<Option<SourceTxRecord>>;

    async fn get_target_tx(&self, id: &str) -> anyhow::Result<Option<TargetTxRecord>>;

    /// All change-log entries of a message, oldest first.
    async fn change_log(&self, id: &str) -> anyhow::Result<Vec<ChangeLogEntry>>;
}
