/// Block storage used by the syncer.
///
/// The syncer only ever talks to storage through [`BlockStorage`], so any
/// backend (document store, key-value store, memory) can be plugged in.
/// [`MemoryStorage`] is the reference backend.
use async_trait::async_trait;
use containers::{Block, BlockSource, Height, HeightCount};

pub mod memory;

pub use memory::MemoryStorage;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage holds no blocks")]
    Empty,
    #[error("no block stored at height {0}")]
    NotFound(Height),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait BlockStorage: Send + Sync {
    /// Highest stored height.
    ///
    /// Fails with [`StorageError::Empty`] when nothing is stored yet.
    async fn get_block_count(&self) -> Result<Height>;

    /// First stored copy of the block at `height`.
    async fn get_block(&self, height: Height) -> Result<Block>;

    /// Number of records stored at `height`.
    async fn count_block_redundancy(&self, height: Height) -> Result<usize>;

    /// Record count per represented height in `[start, end]`, ascending by height.
    ///
    /// Heights with no records are absent from the result.
    async fn analyze_blocks(&self, start: Height, end: Height) -> Result<Vec<HeightCount>>;

    /// Append one record for `height`.
    async fn set_block(&self, height: Height, block: Block, source: BlockSource) -> Result<()>;

    /// Delete records at `height` until at most `redundancy_size` remain.
    async fn prune_block(&self, height: Height, redundancy_size: usize) -> Result<()>;
}
