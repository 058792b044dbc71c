use super::{ChainAdapter, FetchRequest, decode_hash32, rpc::{RpcClient, join_url}};
use crate::{error::FetchError, types::TxDetail};
use async_trait::async_trait;
use base32ct::{Base32Unpadded, Encoding};
use chrono::DateTime;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct IndexerResponse {
    transaction: AlgorandTransaction,
}

#[derive(Debug, Deserialize)]
struct AlgorandTransaction {
    id: String,
    #[serde(default)]
    sender: Option<String>,
    #[serde(rename = "round-time", default)]
    round_time: Option<i64>,
}

/// Algorand indexer REST api.
pub struct AlgorandAdapter {
    client: RpcClient,
}

impl AlgorandAdapter {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

/// Algorand transaction ids are the uppercase unpadded base32 form of the 32-byte hash.
fn transaction_id(tx_hash: &str) -> String {
    match decode_hash32(tx_hash) {
        Some(bytes) => Base32Unpadded::encode_string(&bytes).to_uppercase(),
        None => tx_hash.to_string(),
    }
}

#[async_trait]
impl ChainAdapter for AlgorandAdapter {
    async fn fetch_tx(
        &self,
        endpoint_url: &str,
        request: &FetchRequest,
    ) -> Result<TxDetail, FetchError> {
        let id = transaction_id(&request.tx_hash);
        let url = join_url(endpoint_url, &format!("v2/transactions/{id}"));
        let response: IndexerResponse = self.client.get(&url).await?;
        let tx = response.transaction;
        let from = tx
            .sender
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FetchError::not_found(format!("{id}: missing sender")))?;

        Ok(TxDetail {
            from,
            native_tx_hash: tx.id,
            attribute: None,
            fee: None,
            block_timestamp: tx.round_time.and_then(|t| DateTime::from_timestamp(t, 0)),
        })
    }

    fn canonical_tx_hash(&self, tx_hash: &str) -> Option<String> {
        (!tx_hash.is_empty()).then(|| transaction_id(tx_hash))
    }
}
