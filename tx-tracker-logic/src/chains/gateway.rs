use super::{ChainAdapter, FetchRequest, rpc::{RpcClient, join_url}};
use crate::{
    chain::{ChainFamily, ChainId},
    error::FetchError,
    provider_pool::ProviderPools,
    settings::GatewaySettings,
    types::{AttributeTxDetail, TxDetail},
};
use anyhow::anyhow;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct TendermintTx {
    hash: String,
    tx_result: TendermintTxResult,
}

#[derive(Debug, Deserialize)]
struct TendermintTxResult {
    #[serde(default)]
    events: Vec<TendermintEvent>,
}

#[derive(Debug, Deserialize)]
struct TendermintEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Vec<TendermintAttribute>,
}

#[derive(Debug, Deserialize)]
struct TendermintAttribute {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TxSearchResult {
    #[serde(default)]
    txs: Vec<TxSearchItem>,
}

#[derive(Debug, Deserialize)]
struct TxSearchItem {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct LcdTxSearchResult {
    #[serde(default)]
    tx_responses: Vec<LcdTxResponse>,
}

#[derive(Debug, Deserialize)]
struct LcdTxResponse {
    txhash: String,
}

/// ICS-20 transfer packet payload.
#[derive(Debug, Deserialize)]
struct PacketData {
    sender: String,
}

#[derive(Debug, PartialEq, Eq)]
struct Packet {
    sequence: String,
    timeout_timestamp: String,
    src_channel: String,
    dst_channel: String,
    data: Option<String>,
}

impl TendermintEvent {
    /// Attributes as plain strings. Older nodes return base64-encoded keys and values.
    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.iter().find_map(|attr| {
            let (key, value) = if is_plain_key(&attr.key) {
                (attr.key.clone(), attr.value.clone())
            } else {
                (
                    decode_base64(&attr.key)?,
                    attr.value.as_deref().and_then(decode_base64),
                )
            };
            (key == name).then_some(value).flatten()
        })
    }
}

fn is_plain_key(key: &str) -> bool {
    key.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}

fn decode_base64(value: &str) -> Option<String> {
    STANDARD
        .decode(value)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

impl TendermintTx {
    fn event_attribute(&self, kind: &str, name: &str) -> Option<String> {
        self.tx_result
            .events
            .iter()
            .filter(|e| e.kind == kind)
            .find_map(|e| e.attribute(name))
    }

    fn recv_packet(&self) -> Option<Packet> {
        let event = self
            .tx_result
            .events
            .iter()
            .find(|e| e.kind == "recv_packet")?;
        Some(Packet {
            sequence: event.attribute("packet_sequence")?,
            timeout_timestamp: event.attribute("packet_timeout_timestamp")?,
            src_channel: event.attribute("packet_src_channel")?,
            dst_channel: event.attribute("packet_dst_channel")?,
            data: event.attribute("packet_data"),
        })
    }
}

impl Packet {
    fn send_packet_query(&self) -> String {
        format!(
            "\"send_packet.packet_sequence='{}' AND send_packet.packet_timeout_timestamp='{}' AND send_packet.packet_src_channel='{}' AND send_packet.packet_dst_channel='{}'\"",
            self.sequence, self.timeout_timestamp, self.src_channel, self.dst_channel
        )
    }

    /// The same filter in the REST gateway's `events` form, one parameter per attribute.
    fn send_packet_events(&self) -> Vec<(&'static str, String)> {
        [
            ("packet_sequence", &self.sequence),
            ("packet_timeout_timestamp", &self.timeout_timestamp),
            ("packet_src_channel", &self.src_channel),
            ("packet_dst_channel", &self.dst_channel),
        ]
        .into_iter()
        .map(|(key, value)| ("events", format!("send_packet.{key}={value}")))
        .collect()
    }

    fn sender(&self) -> Option<String> {
        let data = self.data.as_deref()?;
        serde_json::from_str::<PacketData>(data)
            .ok()
            .map(|d| d.sender)
    }
}

/// Messages from IBC chains are posted by wormchain. The wormchain transaction is
/// resolved first, then the IBC packet it received is traced back to the
/// downstream chain's originating transaction.
pub struct GatewayAdapter {
    client: RpcClient,
    settings: GatewaySettings,
    pools: Arc<ProviderPools>,
}

impl GatewayAdapter {
    pub fn new(client: RpcClient, settings: GatewaySettings, pools: Arc<ProviderPools>) -> Self {
        Self {
            client,
            settings,
            pools,
        }
    }

    /// Finds the downstream transaction that sent `packet`. Cosmos-family pools hold
    /// REST gateway urls, every other downstream pool a Tendermint RPC url.
    async fn find_downstream_tx(
        &self,
        chain_id: ChainId,
        packet: &Packet,
    ) -> Result<String, FetchError> {
        let pool = self
            .pools
            .get(chain_id)
            .ok_or_else(|| FetchError::Upstream(anyhow!("no provider pool for chain {chain_id}")))?;
        let rest = ChainFamily::of(chain_id) == Some(ChainFamily::Cosmos);

        let mut last_err = None;
        for endpoint in pool.list_by_score() {
            endpoint.until_ready().await;
            let hashes = if rest {
                self.search_rest(endpoint.url(), packet).await
            } else {
                self.search_tendermint(endpoint.url(), packet).await
            };
            match hashes {
                Ok(hashes) => {
                    return match hashes.as_slice() {
                        [single] => Ok(single.to_lowercase()),
                        hashes => Err(FetchError::not_found(format!(
                            "expected exactly one {chain_id} transaction for packet {}, got {}",
                            packet.sequence,
                            hashes.len()
                        ))),
                    };
                }
                Err(err) => {
                    tracing::warn!(
                        chain_id = %chain_id,
                        endpoint = endpoint.url(),
                        err = %err,
                        "downstream packet lookup failed"
                    );
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| FetchError::not_found("no downstream endpoints")))
    }

    async fn search_tendermint(&self, base: &str, packet: &Packet) -> Result<Vec<String>, FetchError> {
        let result: TxSearchResult = self
            .client
            .tendermint_get(&join_url(base, "tx_search"), &[("query", packet.send_packet_query())])
            .await?;
        Ok(result.txs.into_iter().map(|tx| tx.hash).collect())
    }

    async fn search_rest(&self, base: &str, packet: &Packet) -> Result<Vec<String>, FetchError> {
        let result: LcdTxSearchResult = self
            .client
            .get_with_query(
                &join_url(base, "cosmos/tx/v1beta1/txs"),
                &packet.send_packet_events(),
            )
            .await?;
        Ok(result.tx_responses.into_iter().map(|tx| tx.txhash).collect())
    }
}

#[async_trait]
impl ChainAdapter for GatewayAdapter {
    async fn fetch_tx(
        &self,
        endpoint_url: &str,
        request: &FetchRequest,
    ) -> Result<TxDetail, FetchError> {
        let hash = format!(
            "0x{}",
            request.tx_hash.trim_start_matches("0x").to_uppercase()
        );
        let tx: TendermintTx = self
            .client
            .tendermint_get(&join_url(endpoint_url, "tx"), &[("hash", hash.clone())])
            .await?;

        let from = tx
            .event_attribute("message", "sender")
            .ok_or_else(|| FetchError::not_found(format!("{hash}: missing sender")))?;

        // a message from a relayed chain must arrive as an ibc packet from that chain
        let relayed = request.chain_id != ChainId::WORMCHAIN;
        let attribute = match tx.recv_packet() {
            None if relayed => {
                return Err(FetchError::not_found(format!(
                    "{hash}: no ibc packet received from {}",
                    request.chain_id
                )));
            }
            None => None,
            Some(packet) => {
                let downstream = self
                    .settings
                    .find_chain(request.p2p_network, &packet.src_channel, &packet.dst_channel)
                    .ok_or_else(|| {
                        FetchError::not_found(format!(
                            "{hash}: unknown channel pair {}/{}",
                            packet.src_channel, packet.dst_channel
                        ))
                    })?;
                if relayed && downstream != request.chain_id {
                    return Err(FetchError::not_found(format!(
                        "{hash}: packet came from {downstream}, expected {}",
                        request.chain_id
                    )));
                }
                let origin_address = packet
                    .sender()
                    .ok_or_else(|| FetchError::not_found(format!("{hash}: missing packet sender")))?;
                let origin_tx_hash = self.find_downstream_tx(downstream, &packet).await?;
                Some(AttributeTxDetail {
                    origin_chain_id: downstream,
                    origin_tx_hash,
                    origin_address,
                })
            }
        };

        Ok(TxDetail {
            from,
            native_tx_hash: tx.hash.to_lowercase(),
            attribute,
            fee: None,
            block_timestamp: None,
        })
    }

    fn canonical_tx_hash(&self, tx_hash: &str) -> Option<String> {
        (!tx_hash.is_empty()).then(|| tx_hash.trim_start_matches("0x").to_lowercase())
    }

    fn pool_chain(&self, _chain_id: ChainId) -> ChainId {
        ChainId::WORMCHAIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::P2pNetwork,
        provider_pool::{EndpointConfig, ProviderPool},
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    fn wormchain_tx(src_channel: &str, dst_channel: &str) -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": -1,
            "result": {
                "hash": "AAAA",
                "height": "100",
                "tx_result": {
                    "code": 0,
                    "events": [
                        {"type": "message", "attributes": [
                            {"key": "sender", "value": "wormhole1relayer", "index": true}
                        ]},
                        {"type": "recv_packet", "attributes": [
                            {"key": "packet_data", "value": "{\"amount\":\"1\",\"denom\":\"uosmo\",\"receiver\":\"wormhole1contract\",\"sender\":\"osmo1origin\"}"},
                            {"key": "packet_timeout_timestamp", "value": "1700000000000000000"},
                            {"key": "packet_sequence", "value": "77"},
                            {"key": "packet_src_channel", "value": src_channel},
                            {"key": "packet_dst_channel", "value": dst_channel}
                        ]}
                    ]
                }
            }
        })
    }

    fn wormchain_tx_without_packet() -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": -1,
            "result": {
                "hash": "BBBB",
                "height": "101",
                "tx_result": {
                    "code": 0,
                    "events": [
                        {"type": "message", "attributes": [
                            {"key": "sender", "value": "wormhole1guardian", "index": true}
                        ]}
                    ]
                }
            }
        })
    }

    async fn mount_wormchain_tx(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/tx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn pools(chain_id: ChainId, url: &str) -> Arc<ProviderPools> {
        let mut pools = ProviderPools::default();
        pools.insert(
            ProviderPool::new(
                chain_id,
                vec![EndpointConfig {
                    url: url.to_string(),
                    priority: 1,
                    requests_per_minute: 60,
                }],
            )
            .unwrap(),
        );
        Arc::new(pools)
    }

    #[tokio::test]
    async fn resolves_origin_through_downstream_chain() {
        let wormchain = MockServer::start().await;
        let osmosis = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tx"))
            .and(query_param("hash", "0xAAAA"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(wormchain_tx("channel-2186", "channel-3")),
            )
            .mount(&wormchain)
            .await;
        Mock::given(method("GET"))
            .and(path("/tx_search"))
            .and(query_param(
                "query",
                "\"send_packet.packet_sequence='77' AND send_packet.packet_timeout_timestamp='1700000000000000000' AND send_packet.packet_src_channel='channel-2186' AND send_packet.packet_dst_channel='channel-3'\"",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": -1,
                "result": {"txs": [{"hash": "OSMOHASH", "height": "5"}], "total_count": "1"}
            })))
            .expect(1)
            .mount(&osmosis)
            .await;

        let adapter = GatewayAdapter::new(
            RpcClient::default(),
            GatewaySettings::default(),
            pools(ChainId::OSMOSIS, &osmosis.uri()),
        );
        let request = FetchRequest::new(ChainId::OSMOSIS, "aaaa", P2pNetwork::Mainnet);
        let detail = adapter.fetch_tx(&wormchain.uri(), &request).await.unwrap();

        assert_eq!(detail.from, "wormhole1relayer");
        assert_eq!(detail.native_tx_hash, "aaaa");
        assert_eq!(
            detail.attribute,
            Some(AttributeTxDetail {
                origin_chain_id: ChainId::OSMOSIS,
                origin_tx_hash: "osmohash".into(),
                origin_address: "osmo1origin".into(),
            })
        );
    }

    #[tokio::test]
    async fn unknown_channel_pair_is_not_found() {
        let wormchain = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tx"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(wormchain_tx("channel-1", "channel-2")),
            )
            .mount(&wormchain)
            .await;

        let adapter = GatewayAdapter::new(
            RpcClient::default(),
            GatewaySettings::default(),
            Arc::new(ProviderPools::default()),
        );
        let request = FetchRequest::new(ChainId::OSMOSIS, "aaaa", P2pNetwork::Mainnet);
        let err = adapter.fetch_tx(&wormchain.uri(), &request).await.unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[tokio::test]
    async fn rest_chains_search_by_events() {
        let wormchain = MockServer::start().await;
        let injective = MockServer::start().await;
        mount_wormchain_tx(&wormchain, wormchain_tx("channel-183", "channel-13")).await;
        Mock::given(method("GET"))
            .and(path("/cosmos/tx/v1beta1/txs"))
            .and(query_param("events", "send_packet.packet_sequence=77"))
            .and(query_param("events", "send_packet.packet_src_channel=channel-183"))
            .and(query_param("events", "send_packet.packet_dst_channel=channel-13"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "txs": [{}],
                "tx_responses": [{"txhash": "INJHASH", "height": "9"}],
                "pagination": null,
                "total": "1"
            })))
            .expect(1)
            .mount(&injective)
            .await;

        let adapter = GatewayAdapter::new(
            RpcClient::default(),
            GatewaySettings::default(),
            pools(ChainId::INJECTIVE, &injective.uri()),
        );
        let request = FetchRequest::new(ChainId::INJECTIVE, "aaaa", P2pNetwork::Mainnet);
        let detail = adapter.fetch_tx(&wormchain.uri(), &request).await.unwrap();

        let attribute = detail.attribute.unwrap();
        assert_eq!(attribute.origin_chain_id, ChainId::INJECTIVE);
        assert_eq!(attribute.origin_tx_hash, "injhash");
    }

    #[tokio::test]
    async fn relayed_chain_without_packet_is_not_found() {
        let wormchain = MockServer::start().await;
        mount_wormchain_tx(&wormchain, wormchain_tx_without_packet()).await;

        let adapter = GatewayAdapter::new(
            RpcClient::default(),
            GatewaySettings::default(),
            Arc::new(ProviderPools::default()),
        );
        let request = FetchRequest::new(ChainId::OSMOSIS, "bbbb", P2pNetwork::Mainnet);
        let err = adapter.fetch_tx(&wormchain.uri(), &request).await.unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[tokio::test]
    async fn wormchain_message_without_packet_has_no_attribute() {
        let wormchain = MockServer::start().await;
        mount_wormchain_tx(&wormchain, wormchain_tx_without_packet()).await;

        let adapter = GatewayAdapter::new(
            RpcClient::default(),
            GatewaySettings::default(),
            Arc::new(ProviderPools::default()),
        );
        let request = FetchRequest::new(ChainId::WORMCHAIN, "bbbb", P2pNetwork::Mainnet);
        let detail = adapter.fetch_tx(&wormchain.uri(), &request).await.unwrap();
        assert_eq!(detail.from, "wormhole1guardian");
        assert_eq!(detail.native_tx_hash, "bbbb");
        assert_eq!(detail.attribute, None);
    }

    #[tokio::test]
    async fn packet_from_another_chain_is_not_found() {
        let wormchain = MockServer::start().await;
        let osmosis = MockServer::start().await;
        // channel-2186/channel-3 belongs to osmosis
        mount_wormchain_tx(&wormchain, wormchain_tx("channel-2186", "channel-3")).await;
        Mock::given(method("GET"))
            .and(path("/tx_search"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&osmosis)
            .await;

        let adapter = GatewayAdapter::new(
            RpcClient::default(),
            GatewaySettings::default(),
            pools(ChainId::OSMOSIS, &osmosis.uri()),
        );
        let request = FetchRequest::new(ChainId::KUJIRA, "aaaa", P2pNetwork::Mainnet);
        let err = adapter.fetch_tx(&wormchain.uri(), &request).await.unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn send_packet_events_cover_packet_identity() {
        let packet = Packet {
            sequence: "5".into(),
            timeout_timestamp: "10".into(),
            src_channel: "channel-183".into(),
            dst_channel: "channel-13".into(),
            data: None,
        };
        assert_eq!(
            packet.send_packet_events(),
            vec![
                ("events", "send_packet.packet_sequence=5".to_string()),
                ("events", "send_packet.packet_timeout_timestamp=10".to_string()),
                ("events", "send_packet.packet_src_channel=channel-183".to_string()),
                ("events", "send_packet.packet_dst_channel=channel-13".to_string()),
            ]
        );
    }

    #[test]
    fn reads_base64_attributes() {
        let event = TendermintEvent {
            kind: "recv_packet".into(),
            attributes: vec![TendermintAttribute {
                key: STANDARD.encode("packet_sequence"),
                value: Some(STANDARD.encode("12")),
            }],
        };
        assert_eq!(event.attribute("packet_sequence"), Some("12".to_string()));
        assert_eq!(event.attribute("packet_src_channel"), None);
    }

    #[test]
    fn gateway_uses_wormchain_pool() {
        let adapter = GatewayAdapter::new(
            RpcClient::default(),
            GatewaySettings::default(),
            Arc::new(ProviderPools::default()),
        );
        assert_eq!(adapter.pool_chain(ChainId::KUJIRA), ChainId::WORMCHAIN);
    }
}
