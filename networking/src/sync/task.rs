use containers::Height;

/// Work item consumed by the store and prune workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTask {
    /// Fetch the block at `height` from the mesh and persist it.
    StoreBlock { height: Height },
    /// Trim stored copies at `height` down to `redundancy_size`.
    PruneBlock {
        height: Height,
        redundancy_size: usize,
    },
}

impl SyncTask {
    pub fn height(&self) -> Height {
        match self {
            SyncTask::StoreBlock { height } | SyncTask::PruneBlock { height, .. } => *height,
        }
    }
}

/// Notifications published by the syncer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncerEvent {
    Start,
    Stop,
    StoreBlockInit {
        height: Height,
    },
    StoreBlockComplete {
        height: Height,
        is_success: bool,
        is_skipped: bool,
    },
    BlockVerificationInit,
    MissingBlocks {
        count: usize,
    },
    ExcessiveBlocks {
        count: usize,
    },
    BlockVerificationComplete {
        is_success: bool,
        is_skipped: bool,
    },
    UpToDate,
    QueueWorkerComplete {
        is_success: bool,
        task: SyncTask,
    },
}
