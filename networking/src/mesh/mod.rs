/// Pool of RPC peers with benchmarking and peer-selection policies.
///
/// The mesh owns a fixed set of [`Node`]s. It keeps their health fresh by
/// pinging a random node periodically and keeps user agents populated, and
/// answers "which node should I ask?" for the syncer.
///
/// Readiness latches: once enough distinct nodes have each been seen active at
/// least once, the mesh stays ready for the rest of its life. The nodes need
/// not be active at the same time.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use containers::Height;
use futures::future::join_all;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::node::{Node, NodeConfig, NodeError};
use crate::timer::spawn_interval;

pub mod config;

pub use config::MeshConfig;

#[cfg(test)]
mod tests;

const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("mesh requires at least one node")]
    NoNodes,
    #[error("failed to create node {endpoint}: {source}")]
    Node {
        endpoint: String,
        source: NodeError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshEvent {
    Ready,
}

pub struct Mesh {
    nodes: Vec<Arc<Node>>,
    config: MeshConfig,
    is_ready: AtomicBool,
    events: broadcast::Sender<MeshEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Mesh {
    pub fn new(nodes: Vec<Arc<Node>>, config: MeshConfig) -> Result<Self, MeshError> {
        if nodes.is_empty() {
            return Err(MeshError::NoNodes);
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            nodes,
            config,
            is_ready: AtomicBool::new(false),
            events,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Build a mesh of HTTP nodes, one per endpoint.
    pub fn from_endpoints(
        endpoints: &[String],
        node_config: NodeConfig,
        config: MeshConfig,
    ) -> Result<Self, MeshError> {
        let nodes = endpoints
            .iter()
            .map(|endpoint| {
                Node::new(endpoint.clone(), node_config.clone())
                    .map(Arc::new)
                    .map_err(|source| MeshError::Node {
                        endpoint: endpoint.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(nodes, config)
    }

    /// Seed node health and start the background timers.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        info!(nodes = self.nodes.len(), "Starting mesh");

        for node in &self.nodes {
            node.start();
        }

        let mesh = Arc::downgrade(self);
        tasks.push(tokio::spawn(async move {
            let Some(mesh) = mesh.upgrade() else {
                return;
            };
            mesh.ping_all().await;
            if mesh.config.to_fetch_user_agent {
                mesh.refresh_user_agents().await;
            }
        }));

        if self.config.to_benchmark {
            tasks.push(spawn_interval(
                Arc::downgrade(self),
                self.config.benchmark_interval,
                |mesh: Arc<Mesh>| async move { mesh.perform_benchmark().await },
            ));
        }
        if self.config.to_fetch_user_agent {
            tasks.push(spawn_interval(
                Arc::downgrade(self),
                self.config.fetch_missing_user_agent_interval,
                |mesh: Arc<Mesh>| async move { mesh.fetch_missing_user_agents().await },
            ));
            tasks.push(spawn_interval(
                Arc::downgrade(self),
                self.config.refresh_user_agent_interval,
                |mesh: Arc<Mesh>| async move { mesh.refresh_user_agents().await },
            ));
        }
    }

    /// Stop the mesh timers and the nodes' log truncation. Nodes stay usable.
    pub fn close(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        for node in &self.nodes {
            node.close();
        }
        info!("Mesh closed");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn active_nodes(&self) -> Vec<Arc<Node>> {
        self.pool(true).cloned().collect()
    }

    /// Whether enough nodes have ever been seen active. Latches once true.
    pub fn is_ready(&self) -> bool {
        self.check_readiness();
        self.is_ready.load(Ordering::Acquire)
    }

    fn check_readiness(&self) {
        if self.is_ready.load(Ordering::Acquire) {
            return;
        }
        let active = self
            .nodes
            .iter()
            .filter(|node| node.has_been_active())
            .count();
        if active < self.config.min_active_nodes_required {
            return;
        }
        if self
            .is_ready
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(active_nodes = active, "Mesh is ready");
            let _ = self.events.send(MeshEvent::Ready);
        }
    }

    async fn ping(&self, node: &Node) {
        if let Err(err) = node.get_block_count().await {
            debug!(endpoint = %node.endpoint(), error = %err, "Ping failed");
        }
        self.check_readiness();
    }

    /// Probe every node's height once.
    pub async fn ping_all(&self) {
        join_all(self.nodes.iter().map(|node| self.ping(node))).await;
    }

    async fn perform_benchmark(&self) {
        let node = self.nodes.choose(&mut rand::thread_rng()).cloned();
        if let Some(node) = node {
            self.ping(&node).await;
        }
    }

    async fn fetch_user_agent(&self, node: &Node) {
        if let Err(err) = node.get_version().await {
            warn!(endpoint = %node.endpoint(), error = %err, "Failed to fetch user agent");
        }
        self.check_readiness();
    }

    async fn fetch_missing_user_agents(&self) {
        let missing = self.nodes.iter().filter(|node| node.user_agent().is_none());
        join_all(missing.map(|node| self.fetch_user_agent(node))).await;
    }

    async fn refresh_user_agents(&self) {
        join_all(self.nodes.iter().map(|node| self.fetch_user_agent(node))).await;
    }

    fn pool(&self, active_only: bool) -> impl Iterator<Item = &Arc<Node>> + '_ {
        self.nodes
            .iter()
            .filter(move |node| !active_only || node.is_active() == Some(true))
    }

    /// Node with the lowest known latency.
    pub fn get_fastest_node(&self, active_only: bool) -> Option<Arc<Node>> {
        self.pool(active_only)
            .filter_map(|node| node.latency().map(|latency| (latency, node)))
            .min_by_key(|(latency, _)| *latency)
            .map(|(_, node)| node.clone())
    }

    /// Node reporting the greatest block height.
    pub fn get_highest_node(&self, active_only: bool) -> Option<Arc<Node>> {
        self.pool(active_only)
            .filter_map(|node| node.block_height().map(|height| (height, node)))
            .max_by_key(|(height, _)| *height)
            .map(|(_, node)| node.clone())
    }

    pub fn get_random_node(&self, active_only: bool) -> Option<Arc<Node>> {
        let pool: Vec<&Arc<Node>> = self.pool(active_only).collect();
        pool.choose(&mut rand::thread_rng()).map(|node| (*node).clone())
    }

    /// Best node to fetch `height` from.
    ///
    /// Only nodes known to have reached `height` qualify. Among those, idle
    /// nodes (fewer in-flight requests than the threshold) are preferred and
    /// the fastest idle node wins. When every qualified node is busy a random
    /// qualified node is returned rather than none.
    pub fn get_optimal_node(&self, height: Height, active_only: bool) -> Option<Arc<Node>> {
        let qualified: Vec<&Arc<Node>> = self
            .pool(active_only)
            .filter(|node| node.block_height().is_some_and(|h| h >= height))
            .collect();
        if qualified.is_empty() {
            return None;
        }

        let idle: Vec<&Arc<Node>> = qualified
            .iter()
            .copied()
            .filter(|node| node.pending_requests() < self.config.pending_requests_threshold)
            .collect();
        if idle.is_empty() {
            return qualified
                .choose(&mut rand::thread_rng())
                .map(|node| (*node).clone());
        }

        idle.into_iter()
            .min_by_key(|node| node.latency().unwrap_or(u64::MAX))
            .cloned()
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
