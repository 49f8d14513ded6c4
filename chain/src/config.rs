use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Height of the genesis block.
pub const GENESIS_HEIGHT: u64 = 0;
/// Lowest height `getblock` is asked for; genesis is never fetched.
pub const FIRST_FETCHABLE_HEIGHT: u64 = GENESIS_HEIGHT + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown network {0:?}, expected \"mainnet\" or \"testnet\"")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            _ => Err(UnknownNetwork(s.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

impl Network {
    pub fn config(self) -> ChainConfig {
        match self {
            Network::Mainnet => MAINNET_CONFIG,
            Network::Testnet => TESTNET_CONFIG,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub network: Network,
    /// Public JSON-RPC seed endpoints.
    pub endpoints: &'static [&'static str],
}

impl ChainConfig {
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.to_string()).collect()
    }
}

pub const MAINNET_CONFIG: ChainConfig = ChainConfig {
    network: Network::Mainnet,
    endpoints: &[
        "https://seed1.ngd.network:10331",
        "https://seed2.ngd.network:10331",
        "https://seed3.ngd.network:10331",
        "https://seed4.ngd.network:10331",
        "https://seed5.ngd.network:10331",
        "https://seed6.ngd.network:10331",
        "https://seed7.ngd.network:10331",
        "https://seed8.ngd.network:10331",
        "https://seed9.ngd.network:10331",
        "https://seed10.ngd.network:10331",
        "https://seed1.cityofzion.io:443",
        "https://seed2.cityofzion.io:443",
        "https://seed3.cityofzion.io:443",
        "https://seed4.cityofzion.io:443",
        "https://seed5.cityofzion.io:443",
    ],
};

pub const TESTNET_CONFIG: ChainConfig = ChainConfig {
    network: Network::Testnet,
    endpoints: &[
        "https://seed1.ngd.network:20331",
        "https://seed2.ngd.network:20331",
        "https://seed3.ngd.network:20331",
        "https://seed4.ngd.network:20331",
        "https://seed5.ngd.network:20331",
        "https://test1.cityofzion.io:443",
        "https://test2.cityofzion.io:443",
        "https://test3.cityofzion.io:443",
    ],
};
