use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use containers::{Block, BlockSource, Height, HeightCount};
use storage::{BlockStorage, MemoryStorage, StorageError};
use tokio::sync::broadcast;

use super::{SyncerConfig, SyncerEvent};
use crate::mesh::{Mesh, MeshConfig};
use crate::testing::{MockTransport, mock_node};


/// Syncer config with timers pushed out of the way.
fn test_config() -> SyncerConfig {
    SyncerConfig {
        enqueue_block_interval: Duration::from_secs(3600),
        verify_blocks_interval: Duration::from_secs(3600),
        retry_enqueue_delay: Duration::from_secs(5),
        ..SyncerConfig::default()
    }
}

/// A mesh whose nodes have each answered one height probe.
async fn active_mesh(heights: &[u64]) -> (Arc<Mesh>, Vec<Arc<MockTransport>>) {
    let mut nodes = Vec::new();
    let mut transports = Vec::new();
    for (index, height) in heights.iter().enumerate() {
        let (node, transport) = mock_node(&format!("http://node-{index}"), *height);
        node.get_block_count().await.unwrap();
        nodes.push(node);
        transports.push(transport);
    }
    let mesh = Mesh::new(nodes, MeshConfig::default()).unwrap();
    (Arc::new(mesh), transports)
}

fn source() -> BlockSource {
    BlockSource {
        source: "http://seed".to_string(),
        user_agent: None,
    }
}

async fn store_copies(storage: &impl BlockStorage, height: u64, copies: usize) {
    for _ in 0..copies {
        let block = Block {
            index: Height(height),
            ..Default::default()
        };
        storage.set_block(Height(height), block, source()).await.unwrap();
    }
}

fn drain_events(events: &mut broadcast::Receiver<SyncerEvent>) -> Vec<SyncerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn store_inits(events: &[SyncerEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| match event {
            SyncerEvent::StoreBlockInit { height } => Some(height.0),
            _ => None,
        })
        .collect()
}

/// Memory storage whose range analysis takes a while.
#[derive(Debug, Default)]
struct SlowStorage {
    inner: MemoryStorage,
    delay: Duration,
}

#[async_trait]
impl BlockStorage for SlowStorage {
    async fn get_block_count(&self) -> storage::Result<Height> {
        self.inner.get_block_count().await
    }

    async fn get_block(&self, height: Height) -> storage::Result<Block> {
        self.inner.get_block(height).await
    }

    async fn count_block_redundancy(&self, height: Height) -> storage::Result<usize> {
        self.inner.count_block_redundancy(height).await
    }

    async fn analyze_blocks(
        &self,
        start: Height,
        end: Height,
    ) -> storage::Result<Vec<HeightCount>> {
        tokio::time::sleep(self.delay).await;
        self.inner.analyze_blocks(start, end).await
    }

    async fn set_block(
        &self,
        height: Height,
        block: Block,
        source: BlockSource,
    ) -> storage::Result<()> {
        self.inner.set_block(height, block, source).await
    }

    async fn prune_block(&self, height: Height, redundancy_size: usize) -> storage::Result<()> {
        self.inner.prune_block(height, redundancy_size).await
    }
}

/// Memory storage whose operations can be switched to fail with a backend error.
#[derive(Debug, Default)]
struct FaultyStorage {
    inner: MemoryStorage,
    fail_get_block_count: AtomicBool,
    fail_analyze_blocks: AtomicBool,
    fail_set_block: AtomicBool,
}

impl FaultyStorage {
    fn check(flag: &AtomicBool, operation: &str) -> storage::Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("{operation} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl BlockStorage for FaultyStorage {
    async fn get_block_count(&self) -> storage::Result<Height> {
        Self::check(&self.fail_get_block_count, "get_block_count")?;
        self.inner.get_block_count().await
    }

    async fn get_block(&self, height: Height) -> storage::Result<Block> {
        self.inner.get_block(height).await
    }

    async fn count_block_redundancy(&self, height: Height) -> storage::Result<usize> {
        self.inner.count_block_redundancy(height).await
    }

    async fn analyze_blocks(
        &self,
        start: Height,
        end: Height,
    ) -> storage::Result<Vec<HeightCount>> {
        Self::check(&self.fail_analyze_blocks, "analyze_blocks")?;
        self.inner.analyze_blocks(start, end).await
    }

    async fn set_block(
        &self,
        height: Height,
        block: Block,
        source: BlockSource,
    ) -> storage::Result<()> {
        Self::check(&self.fail_set_block, "set_block")?;
        self.inner.set_block(height, block, source).await
    }

    async fn prune_block(&self, height: Height, redundancy_size: usize) -> storage::Result<()> {
        self.inner.prune_block(height, redundancy_size).await
    }
}
