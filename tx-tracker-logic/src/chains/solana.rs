use super::{ChainAdapter, FetchRequest, decode_hash32, rpc::RpcClient};
use crate::{error::FetchError, types::TxDetail};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct SignatureInfo {
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolanaTransaction {
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    meta: Option<SolanaMeta>,
    transaction: SolanaTransactionBody,
}

#[derive(Debug, Deserialize)]
struct SolanaMeta {
    #[serde(default)]
    err: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SolanaTransactionBody {
    message: SolanaMessage,
    #[serde(default)]
    signatures: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolanaMessage {
    account_keys: Vec<AccountKey>,
}

#[derive(Debug, Deserialize)]
struct AccountKey {
    pubkey: String,
    #[serde(default)]
    signer: bool,
}

/// The message hash of a Solana VAA is the address of the core bridge message
/// account, so the emitting transaction is found through that account's history.
pub struct SolanaAdapter {
    client: RpcClient,
}

impl SolanaAdapter {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    async fn find_signature(&self, url: &str, account: &str) -> Result<String, FetchError> {
        let signatures: Vec<SignatureInfo> = self
            .client
            .call(
                url,
                "getSignaturesForAddress",
                json!([account, {"limit": 10, "commitment": "finalized"}]),
            )
            .await?;
        match signatures.as_slice() {
            [single] => Ok(single.signature.clone()),
            [] => Err(FetchError::not_found(format!("{account}: no signatures"))),
            many => Err(FetchError::not_found(format!(
                "{account}: expected exactly one signature, got {}",
                many.len()
            ))),
        }
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    async fn fetch_tx(
        &self,
        endpoint_url: &str,
        request: &FetchRequest,
    ) -> Result<TxDetail, FetchError> {
        let signature = match decode_hash32(&request.tx_hash) {
            Some(account) => {
                let account = bs58::encode(account).into_string();
                self.find_signature(endpoint_url, &account).await?
            }
            None => request.tx_hash.clone(),
        };

        let tx: SolanaTransaction = self
            .client
            .call(
                endpoint_url,
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "jsonParsed",
                        "maxSupportedTransactionVersion": 0,
                        "commitment": "finalized",
                    }
                ]),
            )
            .await?;

        if let Some(err) = tx.meta.as_ref().and_then(|m| m.err.as_ref()) {
            return Err(FetchError::Upstream(anyhow::anyhow!(
                "transaction {signature} failed: {err}"
            )));
        }

        let from = tx
            .transaction
            .message
            .account_keys
            .iter()
            .find(|key| key.signer)
            .map(|key| key.pubkey.clone())
            .ok_or_else(|| FetchError::not_found(format!("{signature}: no signer")))?;

        let native_tx_hash = tx
            .transaction
            .signatures
            .into_iter()
            .next()
            .unwrap_or(signature);

        Ok(TxDetail {
            from,
            native_tx_hash,
            attribute: None,
            fee: None,
            block_timestamp: tx.block_time.and_then(|t| DateTime::from_timestamp(t, 0)),
        })
    }
    /// Only a base58 signature is a transaction hash; a message account is not.
    fn canonical_tx_hash(&self, tx_hash: &str) -> Option<String> {
        if decode_hash32(tx_hash).is_some() {
            return None;
        }
        bs58::decode(tx_hash)
            .into_vec()
            .ok()
            .filter(|bytes| bytes.len() == 64)
            .map(|_| tx_hash.to_string())
    }
}
