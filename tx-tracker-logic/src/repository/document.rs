use super::{
    ChangeLogEntry, Repository, SourceTxRecord, TargetTxRecord, UpsertOriginTxParams,
    UpsertTargetTxParams,
};
use crate::{
    chain::ChainId,
    types::{AttributeTxDetail, FeeDetail, SourceTxStatus, TargetTxStatus},
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, Statement};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tx_tracker_entity::documents;

const GLOBAL_TRANSACTIONS: &str = "globalTransactions";
const VAA_ID_TX_HASH: &str = "vaaIdTxHash";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GlobalTransactionDocument {
    origin_tx: Option<OriginTxDocument>,
    destination_tx: Option<DestinationTxDocument>,
    change_log: Vec<ChangeLogEntry>,
}

/// Absent fields are not serialized, so merging into an existing document keeps them.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OriginTxDocument {
    vaa_id: String,
    chain_id: ChainId,
    status: SourceTxStatus,
    processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    native_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attribute: Option<AttributeTxDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fee: Option<FeeDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DestinationTxDocument {
    #[serde(default)]
    vaa_id: Option<String>,
    chain_id: ChainId,
    status: TargetTxStatus,
    tx_hash: String,
    #[serde(default)]
    block_height: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaaIdTxHashDocument {
    tx_hash: String,
}

/// One JSON document per message in a generic `documents` table. Field merges and
/// change-log appends happen inside a single upsert statement.
#[derive(Clone)]
pub struct DocumentRepository {
    db: Arc<DatabaseConnection>,
}

impl DocumentRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn upsert_vaa_id_tx_hash(&self, vaa_id: &str, tx_hash: &str) -> anyhow::Result<()> {
        let document = serde_json::to_value(VaaIdTxHashDocument {
            tx_hash: tx_hash.to_string(),
        })?;
        let sql = r#"
            INSERT INTO documents (collection, id, document)
            VALUES ($1, $2, $3::jsonb)
            ON CONFLICT (collection, id) DO UPDATE SET
                document = documents.document || EXCLUDED.document,
                updated_at = (now() at time zone 'utc')
        "#;
        self.db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [VAA_ID_TX_HASH.into(), vaa_id.into(), document.into()],
            ))
            .await
            .context("upsert vaa id tx hash document")?;
        Ok(())
    }

    async fn find<T: DeserializeOwned>(&self, collection: &str, id: &str) -> anyhow::Result<Option<T>> {
        let row = documents::Entity::find_by_id((collection.to_string(), id.to_string()))
            .one(self.db.as_ref())
            .await
            .with_context(|| format!("find {collection} document"))?;
        row.map(|row| serde_json::from_value(row.document))
            .transpose()
            .with_context(|| format!("malformed {collection} document {id}"))
    }

    async fn merge_field(
        &self,
        id: &str,
        field: &'static str,
        value: serde_json::Value,
        change: &ChangeLogEntry,
    ) -> anyhow::Result<()> {
        let change = serde_json::to_value(change)?;
        let sql = format!(
            r#"
            INSERT INTO documents (collection, id, document)
            VALUES ($1, $2, jsonb_build_object('{field}', $3::jsonb, 'changeLog', jsonb_build_array($4::jsonb)))
            ON CONFLICT (collection, id) DO UPDATE SET
                document = documents.document || jsonb_build_object(
                    '{field}', COALESCE(documents.document -> '{field}', '{{}}'::jsonb) || $3::jsonb,
                    'changeLog', COALESCE(documents.document -> 'changeLog', '[]'::jsonb) || jsonb_build_array($4::jsonb)
                ),
                updated_at = (now() at time zone 'utc')
            "#
        );
        self.db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [
                    GLOBAL_TRANSACTIONS.into(),
                    id.into(),
                    value.into(),
                    change.into(),
                ],
            ))
            .await
            .with_context(|| format!("upsert {field} document"))?;
        Ok(())
    }

    async fn global_transaction(&self, id: &str) -> anyhow::Result<Option<GlobalTransactionDocument>> {
        self.find(GLOBAL_TRANSACTIONS, id).await
    }
}

/// `originTx` fields to merge into the stored document. A resolved detail replaces the
/// previous one as a whole, so the parts it lacks are written as explicit nulls.
fn origin_tx_fields(params: &UpsertOriginTxParams) -> anyhow::Result<serde_json::Value> {
    let detail = params.tx_detail.as_ref();
    let origin = OriginTxDocument {
        vaa_id: params.vaa_id.clone(),
        chain_id: params.chain_id,
        status: params.status,
        processed: params.processed,
        native_tx_hash: params.effective_native_tx_hash(),
        from: detail.map(|d| d.from.clone()),
        attribute: detail.and_then(|d| d.attribute.clone()),
        fee: detail.and_then(|d| d.fee.clone()),
        timestamp: params.effective_timestamp(),
    };
    let mut value = serde_json::to_value(origin)?;
    if let (Some(_), Some(fields)) = (detail, value.as_object_mut()) {
        for key in ["from", "attribute", "fee"] {
            fields.entry(key).or_insert(serde_json::Value::Null);
        }
    }
    Ok(value)
}

#[async_trait]
impl Repository for DocumentRepository {
    async fn already_processed(&self, id: &str) -> anyhow::Result<bool> {
        let processed = self
            .global_transaction(id)
            .await?
            .and_then(|doc| doc.origin_tx)
            .is_some_and(|origin| origin.processed);
        Ok(processed)
    }

    async fn get_vaa_id_tx_hash(&self, vaa_id: &str) -> anyhow::Result<Option<String>> {
        let doc: Option<VaaIdTxHashDocument> = self.find(VAA_ID_TX_HASH, vaa_id).await?;
        Ok(doc.map(|d| d.tx_hash).filter(|hash| !hash.is_empty()))
    }

    async fn upsert_origin_tx(&self, params: &UpsertOriginTxParams) -> anyhow::Result<()> {
        self.merge_field(&params.id, "originTx", origin_tx_fields(params)?, &params.change)
            .await
    }

    async fn upsert_target_tx(&self, params: &UpsertTargetTxParams) -> anyhow::Result<()> {
        let destination = DestinationTxDocument {
            vaa_id: params.vaa_id.clone(),
            chain_id: params.chain_id,
            status: params.status,
            tx_hash: params.tx_hash.clone(),
            block_height: params.block_height,
            method: params.method.clone(),
            from: params.from.clone(),
            to: params.to.clone(),
            timestamp: params.timestamp,
        };
        self.merge_field(
            &params.id,
            "destinationTx",
            serde_json::to_value(destination)?,
            &params.change,
        )
        .await
    }

    async fn get_origin_tx(&self, id: &str) -> anyhow::Result<Option<SourceTxRecord>> {
        let record = self
            .global_transaction(id)
            .await?
            .and_then(|doc| doc.origin_tx)
            .map(|origin| SourceTxRecord {
                id: id.to_string(),
                vaa_id: origin.vaa_id,
                chain_id: origin.chain_id,
                status: origin.status,
                native_tx_hash: origin.native_tx_hash,
                from: origin.from,
                attribute: origin.attribute,
                fee: origin.fee,
                processed: origin.processed,
                timestamp: origin.timestamp,
            });
        Ok(record)
    }

    async fn get_target_tx(&self, id: &str) -> anyhow::Result<Option<TargetTxRecord>> {
        let record = self
            .global_transaction(id)
            .await?
            .and_then(|doc| doc.destination_tx)
            .map(|destination| TargetTxRecord {
                id: id.to_string(),
                vaa_id: destination.vaa_id,
                chain_id: destination.chain_id,
                status: destination.status,
                tx_hash: destination.tx_hash,
                block_height: destination.block_height,
                method: destination.method,
                from: destination.from,
                to: destination.to,
                timestamp: destination.timestamp,
            });
        Ok(record)
    }

    async fn change_log(&self, id: &str) -> anyhow::Result<Vec<ChangeLogEntry>> {
        Ok(self
            .global_transaction(id)
            .await?
            .map(|doc| doc.change_log)
            .unwrap_or_default())
    }
}
