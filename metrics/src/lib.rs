pub mod server;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    // Mesh
    active_nodes: IntGauge,
    node_latency: HistogramVec,
    // Syncer
    write_pointer: IntGauge,
    store_queue_length: IntGauge,
    store_blocks: IntCounterVec,
    block_verifications: IntCounterVec,
    missing_blocks: IntCounter,
    excessive_blocks: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let active_nodes = IntGauge::with_opts(Opts::new(
            "chain_mirror_active_nodes",
            "Number of mesh nodes that answered their last request",
        ))?;
        registry.register(Box::new(active_nodes.clone()))?;

        let node_latency = HistogramVec::new(
            HistogramOpts::new(
                "chain_mirror_node_latency_seconds",
                "Shaped getblockcount latency per node",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["endpoint"],
        )?;
        registry.register(Box::new(node_latency.clone()))?;

        let write_pointer = IntGauge::with_opts(Opts::new(
            "chain_mirror_write_pointer",
            "Highest height scheduled for storage",
        ))?;
        registry.register(Box::new(write_pointer.clone()))?;

        let store_queue_length = IntGauge::with_opts(Opts::new(
            "chain_mirror_store_queue_length",
            "Store tasks waiting for a worker",
        ))?;
        registry.register(Box::new(store_queue_length.clone()))?;

        let store_blocks = IntCounterVec::new(
            Opts::new(
                "chain_mirror_store_blocks_total",
                "Total number of completed store tasks",
            ),
            &["result"],
        )?;
        registry.register(Box::new(store_blocks.clone()))?;

        let block_verifications = IntCounterVec::new(
            Opts::new(
                "chain_mirror_block_verifications_total",
                "Total number of verification passes",
            ),
            &["result"],
        )?;
        registry.register(Box::new(block_verifications.clone()))?;

        let missing_blocks = IntCounter::with_opts(Opts::new(
            "chain_mirror_missing_blocks_total",
            "Total number of missing heights found by verification",
        ))?;
        registry.register(Box::new(missing_blocks.clone()))?;

        let excessive_blocks = IntCounter::with_opts(Opts::new(
            "chain_mirror_excessive_blocks_total",
            "Total number of over-stored heights found by verification",
        ))?;
        registry.register(Box::new(excessive_blocks.clone()))?;

        Ok(Self {
            registry,
            active_nodes,
            node_latency,
            write_pointer,
            store_queue_length,
            store_blocks,
            block_verifications,
            missing_blocks,
            excessive_blocks,
        })
    }

    pub fn gather(&self) -> prometheus::Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    // Mesh
    pub fn set_active_nodes(&self, v: i64) {
        self.active_nodes.set(v);
    }

    pub fn observe_node_latency(&self, endpoint: &str, seconds: f64) {
        self.node_latency.with_label_values(&[endpoint]).observe(seconds);
    }

    // Syncer
    pub fn set_write_pointer(&self, v: i64) {
        self.write_pointer.set(v);
    }

    pub fn set_store_queue_length(&self, v: i64) {
        self.store_queue_length.set(v);
    }

    /// `result` is one of `stored`, `skipped` or `failed`.
    pub fn inc_store_block(&self, result: &str) {
        self.store_blocks.with_label_values(&[result]).inc();
    }

    pub fn inc_block_verification(&self, result: &str) {
        self.block_verifications.with_label_values(&[result]).inc();
    }

    pub fn inc_missing_blocks(&self, count: u64) {
        self.missing_blocks.inc_by(count);
    }

    pub fn inc_excessive_blocks(&self, count: u64) {
        self.excessive_blocks.inc_by(count);
    }
}

pub type SharedMetrics = Arc<Metrics>;
