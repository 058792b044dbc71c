use super::{ChainAdapter, FetchRequest, rpc::RpcClient};
use crate::{
    error::FetchError,
    types::{FeeDetail, TxDetail},
};
use alloy::primitives::U256;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvmTransaction {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    block_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EvmBlock {
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvmReceipt {
    gas_used: String,
    #[serde(default)]
    effective_gas_price: Option<String>,
}

/// Any chain speaking the Ethereum JSON-RPC.
pub struct EvmAdapter {
    client: RpcClient,
}

impl EvmAdapter {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    async fn fetch_fee(&self, url: &str, tx_hash: &str) -> Result<Option<FeeDetail>, FetchError> {
        let receipt: EvmReceipt = self
            .client
            .call(url, "eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        let Some(gas_price) = receipt.effective_gas_price else {
            return Ok(None);
        };
        let gas_used = parse_quantity(&receipt.gas_used)?;
        let gas_price = parse_quantity(&gas_price)?;
        Ok(Some(FeeDetail {
            gas_used: gas_used.to_string(),
            gas_price: gas_price.to_string(),
            fee: gas_used.saturating_mul(gas_price).to_string(),
        }))
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    async fn fetch_tx(
        &self,
        endpoint_url: &str,
        request: &FetchRequest,
    ) -> Result<TxDetail, FetchError> {
        let tx_hash = canonical_hash(&request.tx_hash);
        let tx: EvmTransaction = self
            .client
            .call(endpoint_url, "eth_getTransactionByHash", json!([tx_hash]))
            .await?;
        let block_hash = tx
            .block_hash
            .filter(|h| !h.is_empty())
            .ok_or_else(|| FetchError::not_found(format!("{tx_hash}: missing block hash")))?;
        let from = tx
            .from
            .filter(|f| !f.is_empty())
            .ok_or_else(|| FetchError::not_found(format!("{tx_hash}: missing sender")))?;

        let block: EvmBlock = self
            .client
            .call(endpoint_url, "eth_getBlockByHash", json!([block_hash, false]))
            .await?;
        let block_timestamp = parse_timestamp(&block.timestamp)?;

        let fee = match self.fetch_fee(endpoint_url, &tx_hash).await {
            Ok(fee) => fee,
            Err(err) => {
                tracing::warn!(chain_id = %request.chain_id, tx_hash = %tx_hash, err = %err, "failed to fetch transaction fee");
                None
            }
        };

        Ok(TxDetail {
            from: from.to_lowercase(),
            native_tx_hash: tx_hash,
            attribute: None,
            fee,
            block_timestamp,
        })
    }

    fn canonical_tx_hash(&self, tx_hash: &str) -> Option<String> {
        (!tx_hash.is_empty()).then(|| canonical_hash(tx_hash))
    }
}

/// `0x`-prefixed lowercase hex.
fn canonical_hash(tx_hash: &str) -> String {
    let lower = tx_hash.to_lowercase();
    if lower.starts_with("0x") {
        lower
    } else {
        format!("0x{lower}")
    }
}

fn parse_quantity(value: &str) -> Result<U256, FetchError> {
    U256::from_str(value).map_err(|e| FetchError::Upstream(anyhow!("invalid quantity '{value}': {e}")))
}

fn parse_timestamp(value: &str) -> Result<Option<DateTime<Utc>>, FetchError> {
    let seconds = parse_quantity(value)?;
    let seconds = i64::try_from(seconds)
        .map_err(|_| FetchError::Upstream(anyhow!("block timestamp out of range: {value}")))?;
    Ok(DateTime::from_timestamp(seconds, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainId, P2pNetwork};
    use pretty_assertions::assert_eq;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method},
    };

    fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
    }

    async fn mock_method(server: &MockServer, name: &str, result: serde_json::Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": name})))
            .respond_with(rpc_result(result))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetches_transaction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                json!({"method": "eth_getTransactionByHash", "params": ["0xabc123"]}),
            ))
            .respond_with(rpc_result(json!({"from": "0xDEF", "blockHash": "0x1"})))
            .expect(1)
            .mount(&server)
            .await;
        mock_method(&server, "eth_getBlockByHash", json!({"timestamp": "0x65a0e9c0"})).await;
        mock_method(
            &server,
            "eth_getTransactionReceipt",
            json!({"gasUsed": "0x5208", "effectiveGasPrice": "0x3b9aca00"}),
        )
        .await;

        let request = FetchRequest::new(ChainId::ETHEREUM, "ABC123", P2pNetwork::Mainnet);
        let detail = EvmAdapter::new(RpcClient::default())
            .fetch_tx(&server.uri(), &request)
            .await
            .unwrap();

        assert_eq!(detail.from, "0xdef");
        assert_eq!(detail.native_tx_hash, "0xabc123");
        assert_eq!(
            detail.block_timestamp,
            DateTime::from_timestamp(0x65a0e9c0, 0)
        );
        assert_eq!(
            detail.fee,
            Some(FeeDetail {
                gas_used: "21000".into(),
                gas_price: "1000000000".into(),
                fee: "21000000000000".into(),
            })
        );
    }

    #[tokio::test]
    async fn missing_block_hash_is_not_found() {
        let server = MockServer::start().await;
        mock_method(
            &server,
            "eth_getTransactionByHash",
            json!({"from": "0xdef", "blockHash": null}),
        )
        .await;

        let request = FetchRequest::new(ChainId::BASE, "0x01", P2pNetwork::Mainnet);
        let err = EvmAdapter::new(RpcClient::default())
            .fetch_tx(&server.uri(), &request)
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[tokio::test]
    async fn missing_receipt_does_not_fail_resolution() {
        let server = MockServer::start().await;
        mock_method(
            &server,
            "eth_getTransactionByHash",
            json!({"from": "0xdef", "blockHash": "0x1"}),
        )
        .await;
        mock_method(&server, "eth_getBlockByHash", json!({"timestamp": "0x1"})).await;

        let request = FetchRequest::new(ChainId::POLYGON, "0x01", P2pNetwork::Mainnet);
        let detail = EvmAdapter::new(RpcClient::default())
            .fetch_tx(&server.uri(), &request)
            .await
            .unwrap();
        assert_eq!(detail.fee, None);
    }

    #[test]
    fn canonicalizes_hash() {
        assert_eq!(canonical_hash("ABC"), "0xabc");
        assert_eq!(canonical_hash("0xAbC"), "0xabc");
    }
}
