use std::collections::BTreeMap;

use async_trait::async_trait;
use containers::{Block, BlockRecord, BlockSource, Height, HeightCount};
use parking_lot::RwLock;
use tracing::debug;

use crate::{BlockStorage, Result, StorageError};

const CREATED_BY: &str = "syncer";

/// In-memory block storage.
///
/// Records are kept per height in insertion order; pruning drops the newest
/// copies first.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blocks: RwLock<BTreeMap<Height, Vec<BlockRecord>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct heights stored.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// All records stored at `height`.
    pub fn records(&self, height: Height) -> Vec<BlockRecord> {
        self.blocks.read().get(&height).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl BlockStorage for MemoryStorage {
    async fn get_block_count(&self) -> Result<Height> {
        self.blocks
            .read()
            .keys()
            .next_back()
            .copied()
            .ok_or(StorageError::Empty)
    }

    async fn get_block(&self, height: Height) -> Result<Block> {
        self.blocks
            .read()
            .get(&height)
            .and_then(|records| records.first())
            .map(|record| record.payload.clone())
            .ok_or(StorageError::NotFound(height))
    }

    async fn count_block_redundancy(&self, height: Height) -> Result<usize> {
        Ok(self.blocks.read().get(&height).map_or(0, Vec::len))
    }

    async fn analyze_blocks(&self, start: Height, end: Height) -> Result<Vec<HeightCount>> {
        if end < start {
            return Ok(Vec::new());
        }

        Ok(self
            .blocks
            .read()
            .range(start..=end)
            .filter(|(_, records)| !records.is_empty())
            .map(|(height, records)| HeightCount {
                height: *height,
                count: records.len(),
            })
            .collect())
    }

    async fn set_block(&self, height: Height, block: Block, source: BlockSource) -> Result<()> {
        let record = BlockRecord::new(height, block, source, CREATED_BY);
        self.blocks.write().entry(height).or_default().push(record);
        Ok(())
    }

    async fn prune_block(&self, height: Height, redundancy_size: usize) -> Result<()> {
        let mut blocks = self.blocks.write();
        let Some(records) = blocks.get_mut(&height) else {
            return Ok(());
        };

        if records.len() > redundancy_size {
            debug!(
                height = height.0,
                stored = records.len(),
                keep = redundancy_size,
                "Pruning redundant block records"
            );
            records.truncate(redundancy_size);
        }

        if records.is_empty() {
            blocks.remove(&height);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(height: u64) -> Block {
        Block {
            index: Height(height),
            ..Default::default()
        }
    }

    fn source(endpoint: &str) -> BlockSource {
        BlockSource {
            source: endpoint.to_string(),
            user_agent: Some("/test:1.0/".to_string()),
        }
    }

    #[tokio::test]
    async fn test_empty_storage_has_no_block_count() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.get_block_count().await,
            Err(StorageError::Empty)
        ));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_set_and_get_block() {
        let storage = MemoryStorage::new();
        storage
            .set_block(Height(3), block(3), source("http://a"))
            .await
            .unwrap();
        storage
            .set_block(Height(9), block(9), source("http://b"))
            .await
            .unwrap();

        assert_eq!(storage.get_block_count().await.unwrap(), Height(9));
        assert_eq!(storage.get_block(Height(3)).await.unwrap().index, Height(3));
        assert!(matches!(
            storage.get_block(Height(4)).await,
            Err(StorageError::NotFound(Height(4)))
        ));

        let records = storage.records(Height(9));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "http://b");
        assert_eq!(records[0].created_by, CREATED_BY);
    }

    #[tokio::test]
    async fn test_analyze_blocks_groups_by_height() {
        let storage = MemoryStorage::new();
        storage.set_block(Height(1), block(1), source("http://a")).await.unwrap();
        storage.set_block(Height(1), block(1), source("http://b")).await.unwrap();
        storage.set_block(Height(2), block(2), source("http://a")).await.unwrap();
        storage.set_block(Height(7), block(7), source("http://a")).await.unwrap();

        let counts = storage.analyze_blocks(Height(1), Height(3)).await.unwrap();
        assert_eq!(
            counts,
            vec![
                HeightCount { height: Height(1), count: 2 },
                HeightCount { height: Height(2), count: 1 },
            ]
        );

        assert!(storage
            .analyze_blocks(Height(5), Height(4))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_oldest_records() {
        let storage = MemoryStorage::new();
        for endpoint in ["http://a", "http://b", "http://c"] {
            storage.set_block(Height(5), block(5), source(endpoint)).await.unwrap();
        }

        storage.prune_block(Height(5), 1).await.unwrap();
        assert_eq!(storage.count_block_redundancy(Height(5)).await.unwrap(), 1);
        assert_eq!(storage.records(Height(5))[0].source, "http://a");

        // Pruning an absent height is a no-op.
        storage.prune_block(Height(6), 1).await.unwrap();
        assert_eq!(storage.count_block_redundancy(Height(6)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_to_zero_forgets_height() {
        let storage = MemoryStorage::new();
        storage.set_block(Height(2), block(2), source("http://a")).await.unwrap();

        storage.prune_block(Height(2), 0).await.unwrap();
        assert!(storage.is_empty());
    }
}
