use crate::{chain::ChainId, error::TrackerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Normalized result of resolving a transaction on any supported chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxDetail {
    /// Sender address in the chain's native format.
    pub from: String,
    /// Transaction hash in the chain's canonical casing and prefix.
    pub native_tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<AttributeTxDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<FeeDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_timestamp: Option<DateTime<Utc>>,
}

/// The true origin of a message relayed through a gateway chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeTxDetail {
    pub origin_chain_id: ChainId,
    pub origin_tx_hash: String,
    pub origin_address: String,
}

/// Fee components as decimal strings, in the chain's smallest unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeDetail {
    pub gas_used: String,
    pub gas_price: String,
    pub fee: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTxStatus {
    Confirmed,
    InternalError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetTxStatus {
    Confirmed,
    FailedToProcess,
    Unknown,
}

impl TargetTxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetTxStatus::Confirmed => "confirmed",
            TargetTxStatus::FailedToProcess => "failed-to-process",
            TargetTxStatus::Unknown => "unknown",
        }
    }

    /// Whether an incoming status may replace the one already stored.
    /// A lower-confidence observation never replaces a higher-confidence one.
    pub fn may_overwrite(self, existing: Option<TargetTxStatus>) -> bool {
        match (self, existing) {
            (TargetTxStatus::Confirmed, _) => true,
            (_, None) => true,
            (TargetTxStatus::FailedToProcess, Some(existing)) => {
                existing != TargetTxStatus::Confirmed
            }
            (TargetTxStatus::Unknown, Some(existing)) => existing == TargetTxStatus::Unknown,
        }
    }
}

impl fmt::Display for TargetTxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetTxStatus {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(TargetTxStatus::Confirmed),
            "failed-to-process" => Ok(TargetTxStatus::FailedToProcess),
            "unknown" => Ok(TargetTxStatus::Unknown),
            other => Err(TrackerError::InvalidStatus(other.to_string())),
        }
    }
}

/// Message id in the `chain/emitter/sequence` form.
pub fn vaa_id(chain: ChainId, emitter: &str, sequence: &str) -> String {
    format!("{}/{}/{}", chain.0, emitter, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use TargetTxStatus::*;

    #[rstest]
    #[case(Confirmed, None, true)]
    #[case(Confirmed, Some(Confirmed), true)]
    #[case(Confirmed, Some(FailedToProcess), true)]
    #[case(Confirmed, Some(Unknown), true)]
    #[case(FailedToProcess, None, true)]
    #[case(FailedToProcess, Some(Confirmed), false)]
    #[case(FailedToProcess, Some(FailedToProcess), true)]
    #[case(FailedToProcess, Some(Unknown), true)]
    #[case(Unknown, None, true)]
    #[case(Unknown, Some(Confirmed), false)]
    #[case(Unknown, Some(FailedToProcess), false)]
    #[case(Unknown, Some(Unknown), true)]
    fn status_transitions(
        #[case] incoming: TargetTxStatus,
        #[case] existing: Option<TargetTxStatus>,
        #[case] expected: bool,
    ) {
        assert_eq!(incoming.may_overwrite(existing), expected);
    }

    #[test]
    fn rejects_unknown_status_string() {
        let err = "completed".parse::<TargetTxStatus>().unwrap_err();
        assert!(matches!(err, TrackerError::InvalidStatus(s) if s == "completed"));
        assert_eq!("failed-to-process".parse::<TargetTxStatus>().unwrap(), FailedToProcess);
    }

    #[test]
    fn formats_vaa_id() {
        assert_eq!(vaa_id(ChainId::ETHEREUM, "00ab", "107429"), "2/00ab/107429");
    }
}
