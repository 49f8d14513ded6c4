use serde::{Deserialize, Serialize};

use crate::{Block, Height};

/// Provenance attached to every stored block.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSource {
    /// Endpoint of the peer the block was fetched from.
    pub source: String,
    pub user_agent: Option<String>,
}

/// One stored copy of a block.
///
/// Several records may exist for the same height when blocks are stored
/// redundantly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub height: Height,
    pub source: String,
    pub user_agent: Option<String>,
    /// Name of the component that wrote this record.
    pub created_by: String,
    pub payload: Block,
}

impl BlockRecord {
    pub fn new(height: Height, payload: Block, source: BlockSource, created_by: &str) -> Self {
        Self {
            height,
            source: source.source,
            user_agent: source.user_agent,
            created_by: created_by.to_string(),
            payload,
        }
    }
}

/// Number of stored records at one height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightCount {
    pub height: Height,
    pub count: usize,
}
