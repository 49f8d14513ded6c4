/// Single RPC peer with health and latency tracking.
///
/// Every call made through a [`Node`] is bookkept on the peer: in-flight
/// request count, active/inactive state, last-seen time and, for height
/// probes, a latency benchmark. Errors are never retried here; they are
/// recorded on the peer and handed back to the caller unchanged.
///
/// ## Benchmarking
///
/// A `getblockcount` call arms a benchmark unless one is already running.
/// Overlapping probes collapse into a single latency measurement, taken by
/// the call that armed it.
use std::collections::VecDeque;
use std::sync::Arc;

use chain::config::FIRST_FETCHABLE_HEIGHT;
use containers::{Block, Height, Version};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::rpc::{GET_BLOCK, GET_BLOCK_COUNT, GET_VERSION, HttpTransport, RpcError, RpcTransport};
use crate::timer::spawn_interval;

pub mod config;

pub use config::NodeConfig;


#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("block height {0} is below the first fetchable height")]
    InvalidHeight(Height),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("unexpected {method} response: {source}")]
    Decode {
        method: &'static str,
        source: serde_json::Error,
    },
}

/// One benchmarked call in the reliability log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLogEntry {
    pub timestamp: Instant,
    pub is_success: bool,
    /// Round trip in milliseconds; absent for failed calls.
    pub latency: Option<u64>,
}

#[derive(Debug, Default)]
struct NodeState {
    /// `None` until the first call completes.
    is_active: Option<bool>,
    /// Set by the first successful call and never cleared.
    has_been_active: bool,
    latency: Option<u64>,
    block_height: Option<Height>,
    pending_requests: usize,
    last_seen: Option<Instant>,
    last_ping: Option<Instant>,
    user_agent: Option<String>,
    is_benchmarking: bool,
    request_log: VecDeque<RequestLogEntry>,
}

impl NodeState {
    fn reliability(&self) -> Option<f64> {
        if self.request_log.is_empty() {
            return None;
        }
        let successes = self.request_log.iter().filter(|e| e.is_success).count();
        Some(successes as f64 / self.request_log.len() as f64)
    }

    fn shaped_latency(&self) -> Option<u64> {
        let latencies: Vec<u64> = self
            .request_log
            .iter()
            .filter(|e| e.is_success)
            .filter_map(|e| e.latency)
            .collect();

        if latencies.is_empty() {
            return self.latency;
        }
        let total: u64 = latencies.iter().sum();
        Some((total as f64 / latencies.len() as f64).round() as u64)
    }
}

/// Point-in-time view of a node's health attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStats {
    pub endpoint: String,
    pub is_active: Option<bool>,
    pub latency: Option<u64>,
    pub shaped_latency: Option<u64>,
    pub reliability: Option<f64>,
    pub block_height: Option<Height>,
    pub pending_requests: usize,
    pub user_agent: Option<String>,
    pub last_seen: Option<Instant>,
    pub last_ping: Option<Instant>,
}

/// Marks one call as in flight until it is finished or dropped.
///
/// A dropped (cancelled) call counts as a failure.
struct InFlight<'a> {
    node: &'a Node,
    benchmark_start: Option<Instant>,
    is_finished: bool,
}

impl InFlight<'_> {
    fn finish(mut self, is_success: bool) {
        self.is_finished = true;
        self.node.on_query_complete(self.benchmark_start, is_success);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.is_finished {
            self.node.on_query_complete(self.benchmark_start, false);
        }
    }
}

pub struct Node {
    endpoint: String,
    config: NodeConfig,
    transport: Arc<dyn RpcTransport>,
    state: Mutex<NodeState>,
    truncation_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("endpoint", &self.endpoint)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Node {
    /// Create a node talking JSON-RPC over HTTP to `endpoint`.
    pub fn new(endpoint: impl Into<String>, config: NodeConfig) -> Result<Self, NodeError> {
        let endpoint = endpoint.into();
        let transport = HttpTransport::new(endpoint.clone(), config.timeout)?;
        Ok(Self::with_transport(endpoint, Arc::new(transport), config))
    }

    pub fn with_transport(
        endpoint: impl Into<String>,
        transport: Arc<dyn RpcTransport>,
        config: NodeConfig,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            transport,
            state: Mutex::new(NodeState::default()),
            truncation_task: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Start purging expired reliability-log entries periodically.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.truncation_task.lock();
        if task.is_some() {
            return;
        }

        *task = Some(spawn_interval(
            Arc::downgrade(self),
            self.config.truncate_request_log_interval,
            |node: Arc<Node>| async move { node.truncate_request_log() },
        ));
    }

    pub fn close(&self) {
        if let Some(task) = self.truncation_task.lock().take() {
            task.abort();
        }
    }

    /// Issue an arbitrary RPC call with health bookkeeping.
    pub async fn query(&self, method: &str, params: Vec<Value>) -> Result<Value, NodeError> {
        let in_flight = self.on_query_init(method);
        let result = self.transport.call(method, params).await;
        in_flight.finish(result.is_ok());

        if let Err(err) = &result {
            debug!(endpoint = %self.endpoint, method, error = %err, "RPC call failed");
        }
        Ok(result?)
    }

    async fn query_as<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<T, NodeError> {
        let value = self.query(method, params).await?;
        serde_json::from_value(value).map_err(|source| NodeError::Decode { method, source })
    }

    /// Fetch the verbose block at `height`.
    pub async fn get_block(&self, height: Height) -> Result<Block, NodeError> {
        if height.0 < FIRST_FETCHABLE_HEIGHT {
            return Err(NodeError::InvalidHeight(height));
        }
        self.query_as(GET_BLOCK, vec![json!(height.0), json!(1)]).await
    }

    /// Fetch the serialized (hex) block at `height`.
    pub async fn get_raw_block(&self, height: Height) -> Result<String, NodeError> {
        if height.0 < FIRST_FETCHABLE_HEIGHT {
            return Err(NodeError::InvalidHeight(height));
        }
        self.query_as(GET_BLOCK, vec![json!(height.0), json!(0)]).await
    }

    /// Current chain height according to this peer.
    pub async fn get_block_count(&self) -> Result<Height, NodeError> {
        let count: u64 = self.query_as(GET_BLOCK_COUNT, vec![]).await?;
        let height = Height(count);
        self.state.lock().block_height = Some(height);
        Ok(height)
    }

    pub async fn get_version(&self) -> Result<Version, NodeError> {
        let version: Version = self.query_as(GET_VERSION, vec![]).await?;
        self.state.lock().user_agent = Some(version.user_agent.clone());
        Ok(version)
    }

    fn on_query_init(&self, method: &str) -> InFlight<'_> {
        let mut state = self.state.lock();
        state.pending_requests += 1;

        let benchmark_start = if method == GET_BLOCK_COUNT && !state.is_benchmarking {
            state.is_benchmarking = true;
            Some(Instant::now())
        } else {
            None
        };

        InFlight {
            node: self,
            benchmark_start,
            is_finished: false,
        }
    }

    fn on_query_complete(&self, benchmark_start: Option<Instant>, is_success: bool) {
        let now = Instant::now();
        let mut state = self.state.lock();

        state.pending_requests = state.pending_requests.saturating_sub(1);
        state.last_ping = Some(now);
        if is_success {
            state.is_active = Some(true);
            state.has_been_active = true;
            state.last_seen = Some(now);
        } else {
            state.is_active = Some(false);
        }

        let Some(start) = benchmark_start else {
            return;
        };
        state.is_benchmarking = false;

        let elapsed = now.duration_since(start).as_millis() as u64;
        let latency = is_success.then_some(elapsed);
        if let Some(latency) = latency {
            state.latency = Some(latency);
        }
        if self.config.to_log_reliability {
            state.request_log.push_back(RequestLogEntry {
                timestamp: now,
                is_success,
                latency,
            });
        }

        trace!(endpoint = %self.endpoint, latency = ?latency, is_success, "Benchmark complete");
    }

    /// Drop reliability-log entries older than the configured TTL.
    pub fn truncate_request_log(&self) {
        let Some(cutoff) = Instant::now().checked_sub(self.config.request_log_ttl) else {
            return;
        };
        let mut state = self.state.lock();
        let before = state.request_log.len();
        // Entries are appended in time order.
        while state
            .request_log
            .front()
            .is_some_and(|entry| entry.timestamp < cutoff)
        {
            state.request_log.pop_front();
        }

        let purged = before - state.request_log.len();
        if purged > 0 {
            trace!(endpoint = %self.endpoint, purged, "Truncated request log");
        }
    }

    /// Ratio of successful to total reliability-log entries.
    pub fn reliability(&self) -> Option<f64> {
        self.state.lock().reliability()
    }

    /// Rounded average latency of successful logged calls, or the last raw
    /// latency when nothing successful is logged.
    pub fn shaped_latency(&self) -> Option<u64> {
        self.state.lock().shaped_latency()
    }

    pub fn is_active(&self) -> Option<bool> {
        self.state.lock().is_active
    }

    /// Whether any call to this node has ever succeeded.
    pub fn has_been_active(&self) -> bool {
        self.state.lock().has_been_active
    }

    /// Last benchmarked round trip in milliseconds.
    pub fn latency(&self) -> Option<u64> {
        self.state.lock().latency
    }

    pub fn block_height(&self) -> Option<Height> {
        self.state.lock().block_height
    }

    pub fn pending_requests(&self) -> usize {
        self.state.lock().pending_requests
    }

    pub fn user_agent(&self) -> Option<String> {
        self.state.lock().user_agent.clone()
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.state.lock().last_seen
    }

    pub fn request_log(&self) -> Vec<RequestLogEntry> {
        self.state.lock().request_log.iter().copied().collect()
    }

    pub fn snapshot(&self) -> NodeStats {
        let state = self.state.lock();
        NodeStats {
            endpoint: self.endpoint.clone(),
            is_active: state.is_active,
            latency: state.latency,
            shaped_latency: state.shaped_latency(),
            reliability: state.reliability(),
            block_height: state.block_height,
            pending_requests: state.pending_requests,
            user_agent: state.user_agent.clone(),
            last_seen: state.last_seen,
            last_ping: state.last_ping,
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(task) = self.truncation_task.get_mut().take() {
            task.abort();
        }
    }
}
