use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Height;

/// A transaction as returned inside a verbose `getblock` response.
///
/// Only the identifying fields are typed; everything else the peer sends is
/// kept verbatim in `extra` so it can be persisted without loss.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A block as returned by a verbose `getblock` call.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub version: u32,
    #[serde(
        rename = "previousblockhash",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub previous_block_hash: Option<String>,
    #[serde(rename = "merkleroot", default)]
    pub merkle_root: String,
    #[serde(default)]
    pub time: u64,
    pub index: Height,
    #[serde(default)]
    pub tx: Vec<Transaction>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    pub fn height(&self) -> Height {
        self.index
    }

    pub fn transaction_count(&self) -> usize {
        self.tx.len()
    }
}
