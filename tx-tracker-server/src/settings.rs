use anyhow::Context;
use blockscout_service_launcher::{
    database::{DatabaseConnectSettings, DatabaseSettings},
    launcher::ConfigSettings,
    tracing::{JaegerSettings, TracingSettings},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tx_tracker_logic::{
    ChainId, P2pNetwork,
    provider_pool::endpoint_configs,
    settings::{AptosSettings, ChainRpcSettings, ConsumerSettings, GatewaySettings, ProcessorSettings},
};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub p2p_network: P2pNetwork,
    /// RPC endpoints keyed by chain name, e.g. `ethereum` or `arbitrum_sepolia`.
    #[serde(default)]
    pub chains: BTreeMap<String, ChainRpcSettings>,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub aptos: AptosSettings,
    #[serde(default)]
    pub processor: ProcessorSettings,
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default = "default_source_consumer")]
    pub source_consumer: ConsumerSettings,
    #[serde(default = "default_target_consumer")]
    pub target_consumer: ConsumerSettings,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Relational,
    Document,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryBackend {
    #[default]
    Relational,
    Document,
    /// Writes to both stores; reads and errors come from `fan_out_primary`.
    FanOut,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositorySettings {
    pub backend: RepositoryBackend,
    pub fan_out_primary: StoreBackend,
}

fn default_source_consumer() -> ConsumerSettings {
    ConsumerSettings::new("source-events")
}

fn default_target_consumer() -> ConsumerSettings {
    ConsumerSettings::new("target-events")
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "TX_TRACKER";

    fn validate(&self) -> anyhow::Result<()> {
        let chains = self.chain_settings()?;
        for required in self.p2p_network.required_chains() {
            if !chains.iter().any(|(chain_id, _)| chain_id == required) {
                anyhow::bail!(
                    "chain '{required}' must be configured for {} network",
                    self.p2p_network
                );
            }
        }
        for (chain_id, settings) in &chains {
            endpoint_configs(*chain_id, settings)?;
            if settings.requests_per_minute == 0 {
                anyhow::bail!("chain '{chain_id}': requests_per_minute must be positive");
            }
        }
        if self.processor.retry_attempts == 0 {
            anyhow::bail!("processor.retry_attempts must be at least 1");
        }
        for consumer in [&self.source_consumer, &self.target_consumer] {
            if consumer.workers == 0 {
                anyhow::bail!("consumer '{}' must have at least one worker", consumer.queue);
            }
        }
        Ok(())
    }
}

impl Settings {
    pub fn default(database_url: String) -> Self {
        Self {
            tracing: Default::default(),
            jaeger: Default::default(),
            database: DatabaseSettings {
                connect: DatabaseConnectSettings::Url(database_url),
                create_database: Default::default(),
                run_migrations: Default::default(),
                connect_options: Default::default(),
            },
            p2p_network: Default::default(),
            chains: Default::default(),
            gateway: Default::default(),
            aptos: Default::default(),
            processor: Default::default(),
            repository: Default::default(),
            source_consumer: default_source_consumer(),
            target_consumer: default_target_consumer(),
        }
    }

    /// Configured chains with their names resolved to ids.
    pub fn chain_settings(&self) -> anyhow::Result<Vec<(ChainId, &ChainRpcSettings)>> {
        self.chains
            .iter()
            .map(|(name, settings)| {
                let chain_id = name
                    .parse::<ChainId>()
                    .ok()
                    .filter(|id| id.name().is_some())
                    .with_context(|| format!("unknown chain '{name}'"))?;
                Ok((chain_id, settings))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn with_chains(network: P2pNetwork, names: &[&str]) -> Settings {
        let mut settings = Settings::default("postgres://localhost/tx_tracker".into());
        settings.p2p_network = network;
        settings.chains = names
            .iter()
            .map(|name| (name.to_string(), ChainRpcSettings::new(format!("http://{name}"), 60)))
            .collect();
        settings
    }

    #[test]
    fn mainnet_requires_core_chains() {
        with_chains(P2pNetwork::Mainnet, &["solana", "ethereum", "wormchain"])
            .validate()
            .unwrap();
        let err = with_chains(P2pNetwork::Mainnet, &["solana", "ethereum"])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("wormchain"), "{err}");
    }

    #[test]
    fn testnet_requires_sepolia_chains() {
        let err = with_chains(P2pNetwork::Testnet, &["solana", "ethereum", "wormchain"])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("sepolia"), "{err}");
        with_chains(
            P2pNetwork::Testnet,
            &[
                "solana",
                "ethereum",
                "wormchain",
                "sepolia",
                "arbitrum_sepolia",
                "base_sepolia",
                "optimism_sepolia",
            ],
        )
        .validate()
        .unwrap();
    }

    #[test]
    fn rejects_mismatched_fallbacks() {
        let mut settings = with_chains(P2pNetwork::Mainnet, &["solana", "ethereum", "wormchain"]);
        let ethereum = settings.chains.get_mut("ethereum").unwrap();
        ethereum.fallback_urls = Some("http://a,http://b".into());
        ethereum.fallback_requests_per_minute = Some("10".into());
        settings.validate().unwrap_err();
    }

    #[test]
    fn rejects_unknown_chain_name() {
        let settings = with_chains(P2pNetwork::Mainnet, &["solana", "ethereum", "wormchain", "dogecoin"]);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("dogecoin"), "{err}");
    }

    #[test]
    fn deserializes_repository_backend() {
        let repository: RepositorySettings =
            serde_json::from_value(serde_json::json!({"backend": "fan_out", "fan_out_primary": "document"}))
                .unwrap();
        assert_eq!(repository.backend, RepositoryBackend::FanOut);
        assert_eq!(repository.fan_out_primary, StoreBackend::Document);
    }
}
