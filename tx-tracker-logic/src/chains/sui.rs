use super::{ChainAdapter, FetchRequest, decode_hash32, rpc::RpcClient};
use crate::{error::FetchError, types::TxDetail};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuiTransactionBlock {
    digest: String,
    #[serde(default)]
    timestamp_ms: Option<String>,
    transaction: SuiTransaction,
}

#[derive(Debug, Deserialize)]
struct SuiTransaction {
    data: SuiTransactionData,
}

#[derive(Debug, Deserialize)]
struct SuiTransactionData {
    #[serde(default)]
    sender: Option<String>,
}

pub struct SuiAdapter {
    client: RpcClient,
}

impl SuiAdapter {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

/// Sui digests are base58; messages carry the raw 32 bytes as hex.
fn digest(tx_hash: &str) -> String {
    match decode_hash32(tx_hash) {
        Some(bytes) => bs58::encode(bytes).into_string(),
        None => tx_hash.to_string(),
    }
}

#[async_trait]
impl ChainAdapter for SuiAdapter {
    async fn fetch_tx(
        &self,
        endpoint_url: &str,
        request: &FetchRequest,
    ) -> Result<TxDetail, FetchError> {
        let digest = digest(&request.tx_hash);
        let block: SuiTransactionBlock = self
            .client
            .call(
                endpoint_url,
                "sui_getTransactionBlock",
                json!([digest, {"showInput": true}]),
            )
            .await?;
        let from = block
            .transaction
            .data
            .sender
            .ok_or_else(|| FetchError::not_found(format!("{digest}: missing sender")))?;

        Ok(TxDetail {
            from,
            native_tx_hash: block.digest,
            attribute: None,
            fee: None,
            block_timestamp: block
                .timestamp_ms
                .and_then(|t| t.parse::<i64>().ok())
                .and_then(DateTime::from_timestamp_millis),
        })
    }

    fn canonical_tx_hash(&self, tx_hash: &str) -> Option<String> {
        (!tx_hash.is_empty()).then(|| digest(tx_hash))
    }
}
