use super::{ChainAdapter, FetchRequest, rpc::{RpcClient, join_url}};
use crate::{error::FetchError, types::TxDetail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct GetTxResponse {
    tx: CosmosTx,
    tx_response: CosmosTxResponse,
}

#[derive(Debug, Deserialize)]
struct CosmosTx {
    body: CosmosTxBody,
}

#[derive(Debug, Deserialize)]
struct CosmosTxBody {
    #[serde(default)]
    messages: Vec<CosmosMessage>,
}

#[derive(Debug, Deserialize)]
struct CosmosMessage {
    #[serde(rename = "@type")]
    type_url: String,
    #[serde(default)]
    sender: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CosmosTxResponse {
    txhash: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Cosmos-SDK chains with a wormhole core contract, queried over the REST gateway.
pub struct CosmosAdapter {
    client: RpcClient,
}

impl CosmosAdapter {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

/// Contract executions carry the wormhole message; the sender is the executing account.
fn is_execute_contract(type_url: &str) -> bool {
    type_url.ends_with("MsgExecuteContract") || type_url.ends_with("MsgExecuteContractCompat")
}

#[async_trait]
impl ChainAdapter for CosmosAdapter {
    async fn fetch_tx(
        &self,
        endpoint_url: &str,
        request: &FetchRequest,
    ) -> Result<TxDetail, FetchError> {
        let hash = request.tx_hash.trim_start_matches("0x").to_uppercase();
        let url = join_url(endpoint_url, &format!("cosmos/tx/v1beta1/txs/{hash}"));
        let response: GetTxResponse = self.client.get(&url).await?;

        let from = response
            .tx
            .body
            .messages
            .into_iter()
            .filter(|m| is_execute_contract(&m.type_url))
            .find_map(|m| m.sender)
            .ok_or_else(|| FetchError::not_found(format!("{hash}: missing sender")))?;

        Ok(TxDetail {
            from,
            native_tx_hash: response.tx_response.txhash.to_lowercase(),
            attribute: None,
            fee: None,
            block_timestamp: response.tx_response.timestamp,
        })
    }

    fn canonical_tx_hash(&self, tx_hash: &str) -> Option<String> {
        (!tx_hash.is_empty()).then(|| tx_hash.trim_start_matches("0x").to_lowercase())
    }
}
