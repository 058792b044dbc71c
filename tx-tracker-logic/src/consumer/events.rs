use crate::{
    chain::ChainId,
    processor::{SourceTxParams, TargetTxParams},
    types::vaa_id,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

/// A signed or observed message whose source transaction must be resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceChainEvent {
    pub track_id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: SourceEventData,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEventData {
    pub id: String,
    #[serde(default)]
    pub vaa_id: Option<String>,
    pub chain_id: ChainId,
    pub emitter: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub sequence: u64,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub vaa_is_signed: bool,
}

impl SourceChainEvent {
    pub fn to_params(&self, overwrite: bool) -> SourceTxParams {
        let data = &self.data;
        SourceTxParams {
            track_id: self.track_id.clone(),
            source: self.source.clone(),
            id: data.id.clone(),
            vaa_id: data.vaa_id.clone(),
            chain_id: data.chain_id,
            emitter: data.emitter.clone(),
            sequence: data.sequence,
            tx_hash: data.tx_hash.clone().unwrap_or_default(),
            timestamp: data.timestamp,
            vaa_is_signed: data.vaa_is_signed,
            overwrite,
        }
    }
}

/// A redeem observed on a destination chain.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetChainEvent {
    pub track_id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub chain_id: ChainId,
    #[serde(default)]
    pub emitter: Option<String>,
    pub tx_hash: String,
    #[serde(default)]
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_time: Option<DateTime<Utc>>,
    pub attributes: TargetEventAttributes,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEventAttributes {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    pub status: String,
    pub emitter_chain: ChainId,
    pub emitter_address: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub sequence: u64,
}

impl TargetChainEvent {
    pub fn message_id(&self) -> String {
        let attributes = &self.attributes;
        vaa_id(
            attributes.emitter_chain,
            &attributes.emitter_address,
            &attributes.sequence.to_string(),
        )
    }

    pub fn to_params(&self) -> TargetTxParams {
        let id = self.message_id();
        TargetTxParams {
            track_id: self.track_id.clone(),
            source: self.source.clone(),
            vaa_id: Some(id.clone()),
            id,
            chain_id: self.chain_id,
            tx_hash: self.tx_hash.clone(),
            block_height: self.block_height,
            block_timestamp: self.block_time,
            method: self.attributes.method.clone(),
            from: self.attributes.from.clone(),
            to: self.attributes.to.clone(),
            status: self.attributes.status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_source_event() {
        let event: SourceChainEvent = serde_json::from_value(json!({
            "trackId": "pipeline-2/00ab/107429",
            "source": "pipeline",
            "type": "source-chain-event",
            "data": {
                "id": "2/00ab/107429",
                "chainId": 2,
                "emitter": "00ab",
                "sequence": "107429",
                "txHash": "abc123",
                "timestamp": "2024-01-12T08:00:00Z",
                "vaaIsSigned": true
            }
        }))
        .unwrap();
        let params = event.to_params(false);
        assert_eq!(params.chain_id, ChainId::ETHEREUM);
        assert_eq!(params.sequence, 107429);
        assert_eq!(params.tx_hash, "abc123");
        assert_eq!(params.vaa_id(), "2/00ab/107429");
        assert!(!params.overwrite);
    }

    #[test]
    fn missing_hash_decodes_as_empty() {
        let event: SourceChainEvent = serde_json::from_value(json!({
            "trackId": "t",
            "source": "pipeline",
            "type": "source-chain-event",
            "data": {"id": "1/00/5", "chainId": 1, "emitter": "00", "sequence": 5}
        }))
        .unwrap();
        assert_eq!(event.to_params(false).tx_hash, "");
        assert!(!event.data.vaa_is_signed);
    }

    #[test]
    fn decodes_target_event() {
        let event: TargetChainEvent = serde_json::from_value(json!({
            "trackId": "target-1",
            "source": "fly",
            "type": "target-chain-event",
            "chainId": 1,
            "txHash": "5xSig",
            "blockHeight": "250000000",
            "blockTime": "2024-01-12T08:00:00Z",
            "attributes": {
                "method": "completeWrapped",
                "status": "confirmed",
                "emitterChain": 2,
                "emitterAddress": "00ab",
                "sequence": 7
            }
        }))
        .unwrap();
        let params = event.to_params();
        assert_eq!(params.id, "2/00ab/7");
        assert_eq!(params.block_height, Some(250000000));
        assert_eq!(params.status, "confirmed");
    }
}
