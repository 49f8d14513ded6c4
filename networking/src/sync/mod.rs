/// Block synchronisation into storage.
///
/// This module keeps a storage backend filled with every block between a
/// configured minimum and maximum height. It includes:
///
/// - **Task Queue**: Priority queue shared by a fixed pool of async workers
/// - **Sync Task**: Store and prune work items plus the events the syncer publishes
/// - **Syncer**: Drives the enqueue loop, the store and prune workers, the retry
///   listener and the periodic verification pass
///
/// ## Flow
///
/// 1. The write pointer is seeded from the storage block count
/// 2. Each enqueue tick schedules heights up to the highest node in the mesh
/// 3. Store workers fetch each block from the optimal node and persist it
/// 4. Failed heights come back at the retry priority after a delay
/// 5. Verification re-schedules gaps and prunes over-stored heights
///
/// ## State Machine
///
/// - **STOPPED**: Timers disarmed, queues still drain
/// - **RUNNING**: Enqueue and verification timers armed
/// - **CLOSED**: Queues closed, terminal
pub mod config;
pub mod queue;
pub mod service;
pub mod states;
pub mod task;

pub use config::*;
pub use queue::TaskQueue;
pub use service::{SyncError, Syncer};
pub use states::SyncerState;
pub use task::{SyncTask, SyncerEvent};

#[cfg(test)]
mod tests;
