/// Syncer configuration.
use std::time::Duration;

use chain::config::FIRST_FETCHABLE_HEIGHT;
use containers::Height;

/// The only block redundancy currently supported.
pub const SUPPORTED_BLOCK_REDUNDANCY: usize = 1;

/// Interval between enqueue ticks.
pub const DEFAULT_ENQUEUE_BLOCK_INTERVAL: Duration = Duration::from_secs(5);

/// Interval between verification passes.
pub const DEFAULT_VERIFY_BLOCKS_INTERVAL: Duration = Duration::from_secs(60);

/// Delay before a failed store task is scheduled again.
pub const DEFAULT_RETRY_ENQUEUE_DELAY: Duration = Duration::from_secs(5);

/// Enqueueing pauses while this many store tasks are waiting.
pub const DEFAULT_MAX_STORE_QUEUE_LENGTH: usize = 1000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block redundancy {0} is not supported, only {SUPPORTED_BLOCK_REDUNDANCY} is")]
    UnsupportedBlockRedundancy(usize),
    #[error("min height {0} is below the first fetchable height {FIRST_FETCHABLE_HEIGHT}")]
    MinHeightTooLow(Height),
    #[error("max height {max} is below min height {min}")]
    InvalidHeightRange { min: Height, max: Height },
    #[error("{0} concurrency must be at least 1")]
    ZeroConcurrency(&'static str),
}

/// Queue priorities. Lower values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priorities {
    /// Heights scheduled by the enqueue loop.
    pub standard_enqueue_block: u32,
    /// Heights whose previous store attempt failed.
    pub retry_enqueue_block: u32,
    /// Heights the verification pass found missing.
    pub missing_enqueue_store_block: u32,
    /// The seed height owed a fetch when storage starts out empty.
    pub seed_enqueue_block: u32,
    pub enqueue_prune_block: u32,
}

impl Default for Priorities {
    fn default() -> Self {
        Self {
            standard_enqueue_block: 5,
            retry_enqueue_block: 8,
            missing_enqueue_store_block: 1,
            seed_enqueue_block: 5,
            enqueue_prune_block: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncerConfig {
    pub min_height: Height,
    pub max_height: Height,
    pub block_redundancy: usize,
    /// Ask storage before fetching and skip heights already stored.
    pub check_redundancy_before_store_block: bool,
    pub to_sync_incremental: bool,
    pub to_sync_for_missing_blocks: bool,
    pub to_prune_redundant_blocks: bool,
    pub store_queue_concurrency: usize,
    pub prune_queue_concurrency: usize,
    pub enqueue_block_interval: Duration,
    pub verify_blocks_interval: Duration,
    pub max_store_queue_length: usize,
    pub retry_enqueue_delay: Duration,
    pub priorities: Priorities,
    pub max_prune_chunk_size: usize,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            min_height: Height(FIRST_FETCHABLE_HEIGHT),
            max_height: Height::MAX,
            block_redundancy: SUPPORTED_BLOCK_REDUNDANCY,
            check_redundancy_before_store_block: true,
            to_sync_incremental: true,
            to_sync_for_missing_blocks: true,
            to_prune_redundant_blocks: true,
            store_queue_concurrency: 30,
            prune_queue_concurrency: 10,
            enqueue_block_interval: DEFAULT_ENQUEUE_BLOCK_INTERVAL,
            verify_blocks_interval: DEFAULT_VERIFY_BLOCKS_INTERVAL,
            max_store_queue_length: DEFAULT_MAX_STORE_QUEUE_LENGTH,
            retry_enqueue_delay: DEFAULT_RETRY_ENQUEUE_DELAY,
            priorities: Priorities::default(),
            max_prune_chunk_size: 1000,
        }
    }
}

impl SyncerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_redundancy != SUPPORTED_BLOCK_REDUNDANCY {
            return Err(ConfigError::UnsupportedBlockRedundancy(self.block_redundancy));
        }
        if self.min_height.0 < FIRST_FETCHABLE_HEIGHT {
            return Err(ConfigError::MinHeightTooLow(self.min_height));
        }
        if self.max_height < self.min_height {
            return Err(ConfigError::InvalidHeightRange {
                min: self.min_height,
                max: self.max_height,
            });
        }
        if self.store_queue_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency("store queue"));
        }
        if self.prune_queue_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency("prune queue"));
        }
        Ok(())
    }
}
