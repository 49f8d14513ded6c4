pub mod config;

pub use config::{ChainConfig, Network, UnknownNetwork, MAINNET_CONFIG, TESTNET_CONFIG};
