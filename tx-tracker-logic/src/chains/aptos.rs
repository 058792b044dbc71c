use super::{ChainAdapter, FetchRequest, rpc::{RpcClient, join_url}};
use crate::{error::FetchError, settings::AptosSettings, types::TxDetail};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AptosEvent {
    version: String,
}

#[derive(Debug, Deserialize)]
struct AptosTransaction {
    hash: String,
    #[serde(default)]
    sender: Option<String>,
    /// Microseconds since epoch.
    #[serde(default)]
    timestamp: Option<String>,
}

/// Aptos transactions are located through the core bridge event stream by sequence.
/// Endpoint urls are expected to include the `/v1` api prefix.
pub struct AptosAdapter {
    client: RpcClient,
    settings: AptosSettings,
}

impl AptosAdapter {
    pub fn new(client: RpcClient, settings: AptosSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl ChainAdapter for AptosAdapter {
    async fn fetch_tx(
        &self,
        endpoint_url: &str,
        request: &FetchRequest,
    ) -> Result<TxDetail, FetchError> {
        let sequence = request.sequence.ok_or_else(|| {
            FetchError::InvalidRequest("aptos lookup requires a message sequence".into())
        })?;

        let events_url = join_url(
            endpoint_url,
            &format!(
                "accounts/{}/events/{}?start={sequence}&limit=1",
                self.settings.core_bridge_account, self.settings.event_creation_number
            ),
        );
        let events: Vec<AptosEvent> = self.client.get(&events_url).await?;
        let version = events
            .into_iter()
            .next()
            .map(|e| e.version)
            .ok_or_else(|| FetchError::not_found(format!("no event for sequence {sequence}")))?;

        let tx_url = join_url(endpoint_url, &format!("transactions/by_version/{version}"));
        let tx: AptosTransaction = self.client.get(&tx_url).await?;
        let from = tx
            .sender
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FetchError::not_found(format!("version {version}: missing sender")))?;

        let block_timestamp = tx
            .timestamp
            .and_then(|t| t.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_micros);

        Ok(TxDetail {
            from,
            native_tx_hash: tx.hash,
            attribute: None,
            fee: None,
            block_timestamp,
        })
    }

    fn canonical_tx_hash(&self, tx_hash: &str) -> Option<String> {
        let hash = tx_hash.trim_start_matches("0x");
        (!hash.is_empty()).then(|| format!("0x{}", hash.to_lowercase()))
    }
}
