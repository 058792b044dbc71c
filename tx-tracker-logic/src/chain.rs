use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Wormhole chain identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u16);

macro_rules! chains {
    ($($name:ident = $id:literal => $key:literal),* $(,)?) => {
        impl ChainId {
            $(pub const $name: ChainId = ChainId($id);)*

            const KNOWN: &'static [(ChainId, &'static str)] = &[$((ChainId($id), $key)),*];
        }
    };
}

chains! {
    SOLANA = 1 => "solana",
    ETHEREUM = 2 => "ethereum",
    TERRA = 3 => "terra",
    BSC = 4 => "bsc",
    POLYGON = 5 => "polygon",
    AVALANCHE = 6 => "avalanche",
    OASIS = 7 => "oasis",
    ALGORAND = 8 => "algorand",
    AURORA = 9 => "aurora",
    FANTOM = 10 => "fantom",
    KARURA = 11 => "karura",
    ACALA = 12 => "acala",
    KLAYTN = 13 => "klaytn",
    CELO = 14 => "celo",
    MOONBEAM = 16 => "moonbeam",
    TERRA2 = 18 => "terra2",
    INJECTIVE = 19 => "injective",
    OSMOSIS = 20 => "osmosis",
    SUI = 21 => "sui",
    APTOS = 22 => "aptos",
    ARBITRUM = 23 => "arbitrum",
    OPTIMISM = 24 => "optimism",
    GNOSIS = 25 => "gnosis",
    PYTHNET = 26 => "pythnet",
    XPLA = 28 => "xpla",
    BASE = 30 => "base",
    SEI = 32 => "sei",
    ROOTSTOCK = 33 => "rootstock",
    SCROLL = 34 => "scroll",
    MANTLE = 35 => "mantle",
    BLAST = 36 => "blast",
    XLAYER = 37 => "xlayer",
    LINEA = 38 => "linea",
    BERACHAIN = 39 => "berachain",
    WORMCHAIN = 3104 => "wormchain",
    COSMOSHUB = 4000 => "cosmoshub",
    EVMOS = 4001 => "evmos",
    KUJIRA = 4002 => "kujira",
    NEUTRON = 4003 => "neutron",
    CELESTIA = 4004 => "celestia",
    STARGAZE = 4005 => "stargaze",
    DYMENSION = 4007 => "dymension",
    PROVENANCE = 4008 => "provenance",
    SEPOLIA = 10002 => "sepolia",
    ARBITRUM_SEPOLIA = 10003 => "arbitrum_sepolia",
    BASE_SEPOLIA = 10004 => "base_sepolia",
    OPTIMISM_SEPOLIA = 10005 => "optimism_sepolia",
    HOLESKY = 10006 => "holesky",
    POLYGON_SEPOLIA = 10007 => "polygon_sepolia",
}

impl ChainId {
    /// The oracle network publishes messages that have no on-chain origin transaction.
    pub fn is_oracle_network(self) -> bool {
        self == ChainId::PYTHNET
    }

    pub fn name(self) -> Option<&'static str> {
        Self::KNOWN
            .iter()
            .find_map(|(id, name)| (*id == self).then_some(*name))
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::KNOWN
            .iter()
            .find_map(|(id, known)| (*known == name).then_some(*id))
    }

    pub fn known() -> impl Iterator<Item = ChainId> {
        Self::KNOWN.iter().map(|(id, _)| *id)
    }

    pub fn family(self) -> Option<ChainFamily> {
        ChainFamily::of(self)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for ChainId {
    type Err = anyhow::Error;

    /// Accepts either the numeric id or the lowercase chain name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<u16>() {
            return Ok(ChainId(id));
        }
        ChainId::from_name(s).ok_or_else(|| anyhow::anyhow!("unknown chain: {s}"))
    }
}

/// Group of chains sharing a single upstream protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    Evm,
    Solana,
    Cosmos,
    Aptos,
    Sui,
    Algorand,
    /// Chains whose messages are relayed through wormchain over IBC.
    Gateway,
}

impl ChainFamily {
    pub fn of(chain: ChainId) -> Option<Self> {
        let family = match chain {
            ChainId::SOLANA => Self::Solana,
            ChainId::ETHEREUM
            | ChainId::BSC
            | ChainId::POLYGON
            | ChainId::AVALANCHE
            | ChainId::OASIS
            | ChainId::AURORA
            | ChainId::FANTOM
            | ChainId::KARURA
            | ChainId::ACALA
            | ChainId::KLAYTN
            | ChainId::CELO
            | ChainId::MOONBEAM
            | ChainId::ARBITRUM
            | ChainId::OPTIMISM
            | ChainId::GNOSIS
            | ChainId::BASE
            | ChainId::ROOTSTOCK
            | ChainId::SCROLL
            | ChainId::MANTLE
            | ChainId::BLAST
            | ChainId::XLAYER
            | ChainId::LINEA
            | ChainId::BERACHAIN
            | ChainId::SEPOLIA
            | ChainId::ARBITRUM_SEPOLIA
            | ChainId::BASE_SEPOLIA
            | ChainId::OPTIMISM_SEPOLIA
            | ChainId::HOLESKY
            | ChainId::POLYGON_SEPOLIA => Self::Evm,
            ChainId::TERRA | ChainId::TERRA2 | ChainId::INJECTIVE | ChainId::XPLA => Self::Cosmos,
            ChainId::APTOS => Self::Aptos,
            ChainId::SUI => Self::Sui,
            ChainId::ALGORAND => Self::Algorand,
            ChainId::WORMCHAIN
            | ChainId::OSMOSIS
            | ChainId::SEI
            | ChainId::COSMOSHUB
            | ChainId::EVMOS
            | ChainId::KUJIRA
            | ChainId::NEUTRON
            | ChainId::CELESTIA
            | ChainId::STARGAZE
            | ChainId::DYMENSION
            | ChainId::PROVENANCE => Self::Gateway,
            _ => return None,
        };
        Some(family)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum P2pNetwork {
    #[default]
    Mainnet,
    Testnet,
    Devnet,
}

impl P2pNetwork {
    /// Chains that must have a provider pool configured before the service starts.
    pub fn required_chains(self) -> &'static [ChainId] {
        match self {
            P2pNetwork::Mainnet | P2pNetwork::Devnet => {
                &[ChainId::SOLANA, ChainId::ETHEREUM, ChainId::WORMCHAIN]
            }
            P2pNetwork::Testnet => &[
                ChainId::SOLANA,
                ChainId::ETHEREUM,
                ChainId::WORMCHAIN,
                ChainId::SEPOLIA,
                ChainId::ARBITRUM_SEPOLIA,
                ChainId::BASE_SEPOLIA,
                ChainId::OPTIMISM_SEPOLIA,
            ],
        }
    }
}

impl fmt::Display for P2pNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            P2pNetwork::Mainnet => "mainnet",
            P2pNetwork::Testnet => "testnet",
            P2pNetwork::Devnet => "devnet",
        };
        f.write_str(s)
    }
}
