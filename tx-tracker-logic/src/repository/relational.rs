use super::{
    ChangeKind, ChangeLogEntry, Repository, SourceTxRecord, TargetTxRecord, UpsertOriginTxParams,
    UpsertTargetTxParams,
};
use crate::{
    chain::ChainId,
    types::{SourceTxStatus, TargetTxStatus},
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait, sea_query::OnConflict,
};
use std::sync::Arc;
use tx_tracker_entity::{
    origin_txs, sea_orm_active_enums as db_enums, target_txs, tx_change_logs, vaa_id_tx_hashes,
};

/// Normalized tables: one row per transaction plus a separate change-log table.
#[derive(Clone)]
pub struct RelationalRepository {
    db: Arc<DatabaseConnection>,
}

impl RelationalRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn upsert_vaa_id_tx_hash(&self, vaa_id: &str, tx_hash: &str) -> anyhow::Result<()> {
        vaa_id_tx_hashes::Entity::insert(vaa_id_tx_hashes::ActiveModel {
            vaa_id: Set(vaa_id.to_string()),
            tx_hash: Set(tx_hash.to_string()),
            updated_at: Set(Utc::now().naive_utc()),
        })
        .on_conflict(
            OnConflict::column(vaa_id_tx_hashes::Column::VaaId)
                .update_columns([
                    vaa_id_tx_hashes::Column::TxHash,
                    vaa_id_tx_hashes::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(self.db.as_ref())
        .await
        .context("upsert vaa id tx hash")?;
        Ok(())
    }
}

async fn insert_change_log<C: ConnectionTrait>(
    db: &C,
    message_id: &str,
    change: &ChangeLogEntry,
) -> anyhow::Result<()> {
    let direction = if change.kind.is_origin() {
        db_enums::TxDirection::Origin
    } else {
        db_enums::TxDirection::Target
    };
    tx_change_logs::Entity::insert(tx_change_logs::ActiveModel {
        message_id: Set(message_id.to_string()),
        direction: Set(direction),
        track_id: Set(change.track_id.clone()),
        source: Set(change.source.clone()),
        kind: Set(change.kind.as_str().to_string()),
        created_at: Set(change.created_at.naive_utc()),
        ..Default::default()
    })
    .exec(db)
    .await
    .context("insert change log")?;
    Ok(())
}

#[async_trait]
impl Repository for RelationalRepository {
    async fn already_processed(&self, id: &str) -> anyhow::Result<bool> {
        let processed = origin_txs::Entity::find_by_id(id.to_string())
            .filter(origin_txs::Column::Processed.eq(true))
            .one(self.db.as_ref())
            .await
            .context("find origin tx")?
            .is_some();
        Ok(processed)
    }

    async fn get_vaa_id_tx_hash(&self, vaa_id: &str) -> anyhow::Result<Option<String>> {
        let row = vaa_id_tx_hashes::Entity::find_by_id(vaa_id.to_string())
            .one(self.db.as_ref())
            .await
            .context("find vaa id tx hash")?;
        Ok(row.map(|r| r.tx_hash).filter(|hash| !hash.is_empty()))
    }

    async fn upsert_origin_tx(&self, params: &UpsertOriginTxParams) -> anyhow::Result<()> {
        use origin_txs::Column;

        let now = Utc::now().naive_utc();
        let detail = params.tx_detail.as_ref();
        let model = origin_txs::ActiveModel {
            id: Set(params.id.clone()),
            vaa_id: Set(params.vaa_id.clone()),
            chain_id: Set(params.chain_id.0 as i32),
            status: Set(params.status.into()),
            native_tx_hash: Set(params.effective_native_tx_hash()),
            from: Set(detail.map(|d| d.from.clone())),
            attribute: Set(detail
                .and_then(|d| d.attribute.as_ref())
                .map(serde_json::to_value)
                .transpose()?),
            fee: Set(detail
                .and_then(|d| d.fee.as_ref())
                .map(serde_json::to_value)
                .transpose()?),
            processed: Set(params.processed),
            timestamp: Set(params.effective_timestamp().map(|t| t.naive_utc())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // A partial write must not erase detail columns filled by an earlier full one.
        let mut update_columns = vec![
            Column::VaaId,
            Column::ChainId,
            Column::Status,
            Column::Processed,
            Column::UpdatedAt,
        ];
        if params.effective_native_tx_hash().is_some() {
            update_columns.push(Column::NativeTxHash);
        }
        if params.effective_timestamp().is_some() {
            update_columns.push(Column::Timestamp);
        }
        if detail.is_some() {
            update_columns.extend([Column::From, Column::Attribute, Column::Fee]);
        }

        let txn = self.db.begin().await?;
        origin_txs::Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns(update_columns)
                    .to_owned(),
            )
            .exec(&txn)
            .await
            .context("upsert origin tx")?;
        insert_change_log(&txn, &params.id, &params.change).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn upsert_target_tx(&self, params: &UpsertTargetTxParams) -> anyhow::Result<()> {
        use target_txs::Column;

        let now = Utc::now().naive_utc();
        let model = target_txs::ActiveModel {
            id: Set(params.id.clone()),
            vaa_id: Set(params.vaa_id.clone()),
            chain_id: Set(params.chain_id.0 as i32),
            status: Set(params.status.into()),
            native_tx_hash: Set(params.tx_hash.clone()),
            block_height: Set(params.block_height.map(|h| h as i64)),
            method: Set(params.method.clone()),
            from: Set(params.from.clone()),
            to: Set(params.to.clone()),
            timestamp: Set(params.timestamp.map(|t| t.naive_utc())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let txn = self.db.begin().await?;
        target_txs::Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns([
                        Column::VaaId,
                        Column::ChainId,
                        Column::Status,
                        Column::NativeTxHash,
                        Column::BlockHeight,
                        Column::Method,
                        Column::From,
                        Column::To,
                        Column::Timestamp,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&txn)
            .await
            .context("upsert target tx")?;
        insert_change_log(&txn, &params.id, &params.change).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn get_origin_tx(&self, id: &str) -> anyhow::Result<Option<SourceTxRecord>> {
        let row = origin_txs::Entity::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await
            .context("find origin tx")?;
        row.map(SourceTxRecord::try_from).transpose()
    }

    async fn get_target_tx(&self, id: &str) -> anyhow::Result<Option<TargetTxRecord>> {
        let row = target_txs::Entity::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await
            .context("find target tx")?;
        Ok(row.map(TargetTxRecord::from))
    }

    async fn change_log(&self, id: &str) -> anyhow::Result<Vec<ChangeLogEntry>> {
        let rows = tx_change_logs::Entity::find()
            .filter(tx_change_logs::Column::MessageId.eq(id))
            .order_by_asc(tx_change_logs::Column::Id)
            .all(self.db.as_ref())
            .await
            .context("find change logs")?;
        rows.into_iter()
            .map(|row| {
                Ok(ChangeLogEntry {
                    track_id: row.track_id,
                    source: row.source,
                    kind: row.kind.parse::<ChangeKind>()?,
                    created_at: utc(row.created_at),
                })
            })
            .collect()
    }
}

fn utc(value: NaiveDateTime) -> DateTime<Utc> {
    value.and_utc()
}

impl From<SourceTxStatus> for db_enums::OriginTxStatus {
    fn from(value: SourceTxStatus) -> Self {
        match value {
            SourceTxStatus::Confirmed => db_enums::OriginTxStatus::Confirmed,
            SourceTxStatus::InternalError => db_enums::OriginTxStatus::InternalError,
        }
    }
}

impl From<db_enums::OriginTxStatus> for SourceTxStatus {
    fn from(value: db_enums::OriginTxStatus) -> Self {
        match value {
            db_enums::OriginTxStatus::Confirmed => SourceTxStatus::Confirmed,
            db_enums::OriginTxStatus::InternalError => SourceTxStatus::InternalError,
        }
    }
}

impl From<TargetTxStatus> for db_enums::TargetTxStatus {
    fn from(value: TargetTxStatus) -> Self {
        match value {
            TargetTxStatus::Confirmed => db_enums::TargetTxStatus::Confirmed,
            TargetTxStatus::FailedToProcess => db_enums::TargetTxStatus::FailedToProcess,
            TargetTxStatus::Unknown => db_enums::TargetTxStatus::Unknown,
        }
    }
}

impl From<db_enums::TargetTxStatus> for TargetTxStatus {
    fn from(value: db_enums::TargetTxStatus) -> Self {
        match value {
            db_enums::TargetTxStatus::Confirmed => TargetTxStatus::Confirmed,
            db_enums::TargetTxStatus::FailedToProcess => TargetTxStatus::FailedToProcess,
            db_enums::TargetTxStatus::Unknown => TargetTxStatus::Unknown,
        }
    }
}

impl TryFrom<origin_txs::Model> for SourceTxRecord {
    type Error = anyhow::Error;

    fn try_from(row: origin_txs::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            vaa_id: row.vaa_id,
            chain_id: ChainId(
                u16::try_from(row.chain_id).context("chain id out of range")?,
            ),
            status: row.status.into(),
            native_tx_hash: row.native_tx_hash,
            from: row.from,
            attribute: row.attribute.map(serde_json::from_value).transpose()?,
            fee: row.fee.map(serde_json::from_value).transpose()?,
            processed: row.processed,
            timestamp: row.timestamp.map(utc),
        })
    }
}

impl From<target_txs::Model> for TargetTxRecord {
    fn from(row: target_txs::Model) -> Self {
        Self {
            block_height: row.validated_block_height(),
            id: row.id,
            vaa_id: row.vaa_id,
            chain_id: ChainId(row.chain_id as u16),
            status: row.status.into(),
            tx_hash: row.native_tx_hash,
            method: row.method,
            from: row.from,
            to: row.to,
            timestamp: row.timestamp.map(utc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        repository::ChangeKind,
        test_utils::{init_db, origin_params, target_params},
    };
    use pretty_assertions::assert_eq;

    #[tokio::test]
    #[ignore = "Needs database to run"]
    async fn origin_tx_upsert_keeps_details_on_partial_write() {
        let db = init_db("relational_origin_tx_upsert").await;
        let repo = RelationalRepository::new(db.client());

        let full = origin_params("2/00/1", true);
        repo.upsert_origin_tx(&full).await.unwrap();
        assert!(repo.already_processed("2/00/1").await.unwrap());

        let mut partial = origin_params("2/00/1", false);
        partial.tx_detail = None;
        partial.native_tx_hash = None;
        partial.status = SourceTxStatus::InternalError;
        partial.change.kind = ChangeKind::OriginTxPartial;
        repo.upsert_origin_tx(&partial).await.unwrap();

        let record = repo.get_origin_tx("2/00/1").await.unwrap().unwrap();
        assert_eq!(record.status, SourceTxStatus::InternalError);
        assert!(!record.processed);
        assert_eq!(record.from.as_deref(), Some("0xsender"));
        assert_eq!(record.native_tx_hash.as_deref(), Some("0xabc"));

        let kinds: Vec<_> = repo
            .change_log("2/00/1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::OriginTxResolved, ChangeKind::OriginTxPartial]
        );
    }

    #[tokio::test]
    #[ignore = "Needs database to run"]
    async fn target_tx_roundtrip() {
        let db = init_db("relational_target_tx_roundtrip").await;
        let repo = RelationalRepository::new(db.client());

        let params = target_params("2/00/7", TargetTxStatus::Confirmed);
        repo.upsert_target_tx(&params).await.unwrap();
        let record = repo.get_target_tx("2/00/7").await.unwrap().unwrap();
        assert_eq!(record.status, TargetTxStatus::Confirmed);
        assert_eq!(record.tx_hash, params.tx_hash);
        assert_eq!(record.block_height, Some(100));
        assert!(repo.get_target_tx("2/00/8").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "Needs database to run"]
    async fn vaa_id_tx_hash_lookup() {
        let db = init_db("relational_vaa_id_tx_hash").await;
        let repo = RelationalRepository::new(db.client());

        assert_eq!(repo.get_vaa_id_tx_hash("2/00/1").await.unwrap(), None);
        repo.upsert_vaa_id_tx_hash("2/00/1", "0xabc").await.unwrap();
        assert_eq!(
            repo.get_vaa_id_tx_hash("2/00/1").await.unwrap().as_deref(),
            Some("0xabc")
        );
    }
}
