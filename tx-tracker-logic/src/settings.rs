use crate::chain::{ChainId, P2pNetwork};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

/// RPC endpoints of a single chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChainRpcSettings {
    pub base_url: String,
    pub requests_per_minute: u32,
    /// Comma-separated list of fallback urls.
    #[serde(default)]
    pub fallback_urls: Option<String>,
    /// Comma-separated list of per-url limits, one for each of `fallback_urls`.
    #[serde(default)]
    pub fallback_requests_per_minute: Option<String>,
}

impl ChainRpcSettings {
    pub fn new(base_url: impl Into<String>, requests_per_minute: u32) -> Self {
        Self {
            base_url: base_url.into(),
            requests_per_minute,
            fallback_urls: None,
            fallback_requests_per_minute: None,
        }
    }
}

/// IBC channel pair connecting a downstream chain with wormchain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GatewayChannel {
    pub network: P2pNetwork,
    pub chain: ChainId,
    /// Channel on the downstream chain side.
    pub src_channel: String,
    /// Channel on the wormchain side.
    pub dst_channel: String,
}

impl GatewayChannel {
    fn new(network: P2pNetwork, chain: ChainId, src_channel: &str, dst_channel: &str) -> Self {
        Self {
            network,
            chain,
            src_channel: src_channel.to_string(),
            dst_channel: dst_channel.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GatewaySettings {
    pub channels: Vec<GatewayChannel>,
}

impl GatewaySettings {
    pub fn find_chain(
        &self,
        network: P2pNetwork,
        src_channel: &str,
        dst_channel: &str,
    ) -> Option<ChainId> {
        self.channels
            .iter()
            .find(|c| {
                c.network == network && c.src_channel == src_channel && c.dst_channel == dst_channel
            })
            .map(|c| c.chain)
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        use P2pNetwork::{Mainnet, Testnet};
        Self {
            channels: vec![
                GatewayChannel::new(Mainnet, ChainId::OSMOSIS, "channel-2186", "channel-3"),
                GatewayChannel::new(Mainnet, ChainId::KUJIRA, "channel-113", "channel-9"),
                GatewayChannel::new(Mainnet, ChainId::EVMOS, "channel-94", "channel-5"),
                GatewayChannel::new(Mainnet, ChainId::INJECTIVE, "channel-183", "channel-13"),
                GatewayChannel::new(Mainnet, ChainId::SEI, "channel-78", "channel-14"),
                GatewayChannel::new(Testnet, ChainId::OSMOSIS, "channel-3086", "channel-5"),
                GatewayChannel::new(Testnet, ChainId::KUJIRA, "channel-8", "channel-9"),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AptosSettings {
    pub core_bridge_account: String,
    pub event_creation_number: u64,
}

impl Default for AptosSettings {
    fn default() -> Self {
        Self {
            core_bridge_account:
                "0x5bc11445584a763c1fa7ed39081f1b920954da14e04b32440cba863d03e19625".to_string(),
            event_creation_number: 2,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorSettings {
    /// Total number of resolution attempts, including the first one.
    pub retry_attempts: usize,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub retry_delay: Duration,
    /// Upper bound of a single adapter call against a single endpoint.
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub call_timeout: Duration,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 2,
            retry_delay: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConsumerSettings {
    pub queue: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_visibility_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub visibility_timeout: Duration,
    #[serde(default = "default_polling_interval")]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub polling_interval: Duration,
}

impl ConsumerSettings {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            workers: default_workers(),
            batch_size: default_batch_size(),
            visibility_timeout: default_visibility_timeout(),
            polling_interval: default_polling_interval(),
        }
    }
}

fn default_workers() -> usize {
    10
}

fn default_batch_size() -> u64 {
    10
}

fn default_visibility_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_polling_interval() -> Duration {
    Duration::from_millis(500)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_gateway_chain_by_channel_pair() {
        let settings = GatewaySettings::default();
        assert_eq!(
            settings.find_chain(P2pNetwork::Mainnet, "channel-2186", "channel-3"),
            Some(ChainId::OSMOSIS)
        );
        assert_eq!(
            settings.find_chain(P2pNetwork::Testnet, "channel-3086", "channel-5"),
            Some(ChainId::OSMOSIS)
        );
        assert_eq!(
            settings.find_chain(P2pNetwork::Testnet, "channel-2186", "channel-3"),
            None
        );
    }

    #[test]
    fn processor_settings_use_seconds() {
        let settings: ProcessorSettings =
            serde_json::from_value(serde_json::json!({"retry_attempts": 3, "retry_delay": 1}))
                .unwrap();
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.retry_delay, Duration::from_secs(1));
        assert_eq!(settings.call_timeout, Duration::from_secs(30));
    }
}
