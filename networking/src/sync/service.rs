/// The syncer: keeps storage filled with every block in the configured window.
///
/// Two timers drive it once started:
///
/// 1. **Enqueue loop**: advances the write pointer towards the highest height
///    known to the mesh, scheduling one store task per height while the store
///    queue has room. The queue length is the only brake.
/// 2. **Verification pass**: diffs storage against `[min_height, write pointer]`,
///    re-schedules missing heights at the most urgent priority and schedules
///    prune tasks for heights stored too many times.
///
/// Store and prune tasks are consumed by two fixed worker pools. A failed
/// store task publishes a failure event; the syncer listens to its own events
/// and schedules the height again after a delay. There is no attempt cap, the
/// verification pass guarantees eventual convergence.
///
/// ## Write pointer
///
/// The write pointer is the highest height scheduled so far. It only ever
/// moves up and is only moved by [`Syncer::enqueue_store_block`].
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use containers::{BlockSource, Height};
use parking_lot::Mutex;
use storage::{BlockStorage, StorageError};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    config::{ConfigError, SyncerConfig},
    queue::TaskQueue,
    states::SyncerState,
    task::{SyncTask, SyncerEvent},
};
use crate::mesh::Mesh;
use crate::node::NodeError;
use crate::timer::spawn_interval;

const EVENT_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("invalid syncer configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("syncer is closed")]
    Closed,
    #[error("no active node has reached height {0}")]
    NoValidNode(Height),
    #[error("fetching block {height} from {endpoint} failed: {source}")]
    Fetch {
        height: Height,
        endpoint: String,
        source: NodeError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

#[derive(Debug, Default)]
struct WritePointer {
    height: Height,
    /// Height seeded from an empty storage that still has to be scheduled.
    seed: Option<Height>,
}

pub struct Syncer {
    mesh: Arc<Mesh>,
    storage: Arc<dyn BlockStorage>,
    config: SyncerConfig,
    state: Mutex<SyncerState>,
    write_pointer: Mutex<WritePointer>,
    store_queue: Arc<TaskQueue<SyncTask>>,
    prune_queue: Arc<TaskQueue<SyncTask>>,
    is_verifying_blocks: AtomicBool,
    events: broadcast::Sender<SyncerEvent>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    retry_listener: Mutex<Option<JoinHandle<()>>>,
}

impl Syncer {
    pub fn new(
        mesh: Arc<Mesh>,
        storage: Arc<dyn BlockStorage>,
        config: SyncerConfig,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            mesh,
            storage,
            config,
            state: Mutex::new(SyncerState::default()),
            write_pointer: Mutex::new(WritePointer::default()),
            store_queue: Arc::new(TaskQueue::new()),
            prune_queue: Arc::new(TaskQueue::new()),
            is_verifying_blocks: AtomicBool::new(false),
            events,
            timers: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            retry_listener: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SyncerConfig {
        &self.config
    }

    pub fn state(&self) -> SyncerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SyncerState::Running
    }

    pub fn write_pointer(&self) -> Height {
        self.write_pointer.lock().height
    }

    pub fn store_queue_len(&self) -> usize {
        self.store_queue.len()
    }

    pub fn prune_queue_len(&self) -> usize {
        self.prune_queue.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SyncerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn transition(&self, target: SyncerState) -> Result<bool, SyncError> {
        let mut state = self.state.lock();
        if *state == target {
            return Ok(false);
        }
        if !state.can_transition_to(target) {
            return Err(SyncError::Closed);
        }
        *state = target;
        Ok(true)
    }

    /// Seed the write pointer from storage and arm the timers.
    pub async fn start(self: &Arc<Self>) -> Result<(), SyncError> {
        if self.state() == SyncerState::Closed {
            return Err(SyncError::Closed);
        }
        if self.is_running() {
            warn!("Syncer already running");
            return Ok(());
        }

        self.spawn_workers();
        self.init_write_pointer().await;

        if !self.transition(SyncerState::Running)? {
            return Ok(());
        }
        info!(
            write_pointer = self.write_pointer().0,
            min_height = self.config.min_height.0,
            max_height = self.config.max_height.0,
            "Syncer started"
        );
        self.emit(SyncerEvent::Start);

        let mut timers = self.timers.lock();
        if self.config.to_sync_incremental {
            timers.push(spawn_interval(
                Arc::downgrade(self),
                self.config.enqueue_block_interval,
                |syncer: Arc<Syncer>| async move { syncer.do_enqueue_store_block() },
            ));
        }
        timers.push(spawn_interval(
            Arc::downgrade(self),
            self.config.verify_blocks_interval,
            |syncer: Arc<Syncer>| async move { syncer.verify_blocks().await },
        ));

        Ok(())
    }

    /// Disarm the timers. Queued and in-flight tasks keep draining.
    pub fn stop(&self) {
        for timer in self.timers.lock().drain(..) {
            timer.abort();
        }
        if let Ok(true) = self.transition(SyncerState::Stopped) {
            info!(write_pointer = self.write_pointer().0, "Syncer stopped");
            self.emit(SyncerEvent::Stop);
        }
    }

    /// Stop and close both queues. Waiting tasks are dropped; in-flight
    /// tasks finish. The mesh and storage are left open.
    pub fn close(&self) {
        self.stop();
        self.store_queue.close();
        self.prune_queue.close();
        if let Some(listener) = self.retry_listener.lock().take() {
            listener.abort();
        }
        // Workers exit on their own once the queues report closed.
        self.workers.lock().clear();
        let _ = self.transition(SyncerState::Closed);
        info!("Syncer closed");
    }

    fn spawn_workers(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }

        for _ in 0..self.config.store_queue_concurrency {
            workers.push(self.spawn_worker(self.store_queue.clone()));
        }
        for _ in 0..self.config.prune_queue_concurrency {
            workers.push(self.spawn_worker(self.prune_queue.clone()));
        }
        *self.retry_listener.lock() = Some(self.spawn_retry_listener());
    }

    fn spawn_worker(self: &Arc<Self>, queue: Arc<TaskQueue<SyncTask>>) -> JoinHandle<()> {
        let syncer = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(task) = queue.pop().await {
                let Some(syncer) = syncer.upgrade() else {
                    break;
                };
                syncer.run_worker_task(task).await;
            }
        })
    }

    /// Re-schedule heights whose store task failed.
    fn spawn_retry_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let syncer = Arc::downgrade(self);
        let mut events = self.subscribe();
        let delay = self.config.retry_enqueue_delay;
        let priority = self.config.priorities.retry_enqueue_block;

        tokio::spawn(async move {
            loop {
                let height = match events.recv().await {
                    Ok(SyncerEvent::StoreBlockComplete {
                        height,
                        is_success: false,
                        ..
                    }) => height,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Retry listener lagged, verification will recover");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let syncer = syncer.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(syncer) = syncer.upgrade() {
                        debug!(height = height.0, priority, "Retrying block");
                        syncer.enqueue_store_block(height, priority);
                    }
                });
            }
        })
    }

    async fn run_worker_task(&self, task: SyncTask) {
        let result = match task {
            SyncTask::StoreBlock { height } => self.store_block(height).await,
            SyncTask::PruneBlock {
                height,
                redundancy_size,
            } => self.prune_block(height, redundancy_size).await,
        };

        if let Err(err) = &result {
            warn!(?task, error = %err, "Queue worker task failed");
        }
        self.emit(SyncerEvent::QueueWorkerComplete {
            is_success: result.is_ok(),
            task,
        });
    }

    async fn init_write_pointer(&self) {
        let (height, seed) = match self.storage.get_block_count().await {
            Ok(height) => (height, None),
            Err(err) => {
                debug!(error = %err, "No stored blocks, assuming empty storage");
                (self.config.min_height, Some(self.config.min_height))
            }
        };

        let mut pointer = self.write_pointer.lock();
        if height > pointer.height {
            pointer.height = height;
            pointer.seed = seed;
        }
    }

    /// Schedule `height` for storage and raise the write pointer to it if needed.
    pub fn enqueue_store_block(&self, height: Height, priority: u32) {
        {
            let mut pointer = self.write_pointer.lock();
            if height > pointer.height {
                pointer.height = height;
            }
            if pointer.seed == Some(height) {
                pointer.seed = None;
            }
        }

        if !self.store_queue.push(SyncTask::StoreBlock { height }, priority) {
            debug!(height = height.0, "Store queue closed, dropping task");
        }
    }

    fn enqueue_prune_block(&self, height: Height, redundancy_size: usize) {
        let task = SyncTask::PruneBlock {
            height,
            redundancy_size,
        };
        if !self
            .prune_queue
            .push(task, self.config.priorities.enqueue_prune_block)
        {
            debug!(height = height.0, "Prune queue closed, dropping task");
        }
    }

    fn has_store_queue_room(&self) -> bool {
        self.store_queue.len() < self.config.max_store_queue_length
    }

    /// Next height for the enqueue loop, or `None` once the target is reached.
    fn next_pointer_height(&self, target: Height) -> Option<Height> {
        let pointer = self.write_pointer.lock();
        if pointer.height >= target || !self.has_store_queue_room() {
            return None;
        }
        Some(pointer.height.next())
    }

    /// One enqueue tick.
    pub fn do_enqueue_store_block(&self) {
        let max_height = self.config.max_height;
        if self.write_pointer() >= max_height {
            return;
        }

        let Some(node_height) = self
            .mesh
            .get_highest_node(true)
            .and_then(|node| node.block_height())
        else {
            error!("No active node with a known height, skipping enqueue");
            return;
        };
        let target = max_height.min(node_height);

        let seed = self.write_pointer.lock().seed;
        if let Some(seed) = seed {
            if seed <= target && self.has_store_queue_room() {
                self.enqueue_store_block(seed, self.config.priorities.seed_enqueue_block);
            }
        }

        let mut enqueued = 0usize;
        while let Some(height) = self.next_pointer_height(target) {
            self.enqueue_store_block(height, self.config.priorities.standard_enqueue_block);
            enqueued += 1;
        }

        if enqueued > 0 {
            debug!(
                enqueued,
                write_pointer = self.write_pointer().0,
                node_height = node_height.0,
                queue_length = self.store_queue.len(),
                "Enqueued blocks"
            );
        }
    }

    async fn store_block(&self, height: Height) -> Result<(), SyncError> {
        self.emit(SyncerEvent::StoreBlockInit { height });

        match self.fetch_and_store_block(height).await {
            Ok(is_skipped) => {
                self.emit(SyncerEvent::StoreBlockComplete {
                    height,
                    is_success: true,
                    is_skipped,
                });
                Ok(())
            }
            Err(err) => {
                self.emit(SyncerEvent::StoreBlockComplete {
                    height,
                    is_success: false,
                    is_skipped: false,
                });
                Err(err)
            }
        }
    }

    /// Returns whether the height was skipped as already stored.
    async fn fetch_and_store_block(&self, height: Height) -> Result<bool, SyncError> {
        if self.config.check_redundancy_before_store_block {
            let redundancy = self.storage.count_block_redundancy(height).await?;
            if redundancy >= self.config.block_redundancy {
                debug!(height = height.0, redundancy, "Block already stored, skipping");
                return Ok(true);
            }
        }

        let node = self
            .mesh
            .get_optimal_node(height, true)
            .ok_or(SyncError::NoValidNode(height))?;

        let block = node
            .get_block(height)
            .await
            .map_err(|source| SyncError::Fetch {
                height,
                endpoint: node.endpoint().to_string(),
                source,
            })?;

        let source = BlockSource {
            source: node.endpoint().to_string(),
            user_agent: node.user_agent(),
        };
        self.storage.set_block(height, block, source).await?;

        Ok(false)
    }

    async fn prune_block(&self, height: Height, redundancy_size: usize) -> Result<(), SyncError> {
        self.storage.prune_block(height, redundancy_size).await?;
        debug!(height = height.0, redundancy_size, "Pruned block");
        Ok(())
    }

    /// Run one verification pass unless one is already running.
    pub async fn verify_blocks(&self) {
        if self
            .is_verifying_blocks
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous verification still running, skipping");
            self.emit(SyncerEvent::BlockVerificationComplete {
                is_success: false,
                is_skipped: true,
            });
            return;
        }

        self.emit(SyncerEvent::BlockVerificationInit);
        let result = self.run_verification().await;
        self.is_verifying_blocks.store(false, Ordering::Release);

        if let Err(err) = &result {
            warn!(error = %err, "Block verification failed");
        }
        self.emit(SyncerEvent::BlockVerificationComplete {
            is_success: result.is_ok(),
            is_skipped: false,
        });
    }

    async fn run_verification(&self) -> Result<(), SyncError> {
        let start = self.config.min_height;
        let end = self.config.max_height.min(self.write_pointer());

        let counts = if end < start {
            Vec::new()
        } else {
            self.storage.analyze_blocks(start, end).await?
        };
        let represented: HashSet<Height> = counts.iter().map(|c| c.height).collect();

        let missing: Vec<Height> = start
            .up_to(end)
            .filter(|height| !represented.contains(height))
            .collect();
        self.emit(SyncerEvent::MissingBlocks {
            count: missing.len(),
        });
        if !missing.is_empty() {
            info!(count = missing.len(), start = start.0, end = end.0, "Found missing blocks");
            if self.config.to_sync_for_missing_blocks {
                let priority = self.config.priorities.missing_enqueue_store_block;
                for height in &missing {
                    self.enqueue_store_block(*height, priority);
                }
            }
        }

        let redundancy = self.config.block_redundancy;
        let excessive: Vec<Height> = counts
            .iter()
            .filter(|c| c.count > redundancy)
            .map(|c| c.height)
            .collect();
        self.emit(SyncerEvent::ExcessiveBlocks {
            count: excessive.len(),
        });
        if !excessive.is_empty() {
            info!(count = excessive.len(), "Found excessive blocks");
            if self.config.to_prune_redundant_blocks {
                for height in excessive.iter().take(self.config.max_prune_chunk_size) {
                    self.enqueue_prune_block(*height, redundancy);
                }
            }
        }

        if redundancy > 1 {
            return Err(SyncError::NotImplemented(
                "verification of insufficiently redundant blocks",
            ));
        }

        if missing.is_empty() && self.is_at_ceiling() {
            info!(write_pointer = self.write_pointer().0, "Blocks up to date");
            self.emit(SyncerEvent::UpToDate);
        }

        Ok(())
    }

    /// Whether the write pointer has reached `max_height` or the best node's height.
    fn is_at_ceiling(&self) -> bool {
        let pointer = self.write_pointer();
        if pointer >= self.config.max_height {
            return true;
        }
        self.mesh
            .get_highest_node(true)
            .and_then(|node| node.block_height())
            .is_some_and(|height| pointer >= height)
    }
}

impl Drop for Syncer {
    fn drop(&mut self) {
        self.store_queue.close();
        self.prune_queue.close();
        for handle in self
            .timers
            .get_mut()
            .drain(..)
            .chain(self.workers.get_mut().drain(..))
            .chain(self.retry_listener.get_mut().take())
        {
            handle.abort();
        }
    }
}
