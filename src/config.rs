//! Optional YAML configuration for the client.
//!
//! Every field may be omitted; omitted fields keep the component defaults.
//! Durations are given in milliseconds.
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use containers::Height;
use networking::{MeshConfig, NodeConfig, SyncerConfig};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub network: Option<String>,
    pub endpoints: Vec<String>,
    pub node: NodeSection,
    pub mesh: MeshSection,
    pub syncer: SyncerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeSection {
    pub timeout_ms: Option<u64>,
    pub to_log_reliability: Option<bool>,
    pub truncate_request_log_interval_ms: Option<u64>,
    pub request_log_ttl_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshSection {
    pub min_active_nodes_required: Option<usize>,
    pub pending_requests_threshold: Option<usize>,
    pub to_benchmark: Option<bool>,
    pub to_fetch_user_agent: Option<bool>,
    pub benchmark_interval_ms: Option<u64>,
    pub fetch_missing_user_agent_interval_ms: Option<u64>,
    pub refresh_user_agent_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncerSection {
    pub min_height: Option<u64>,
    pub max_height: Option<u64>,
    pub block_redundancy: Option<usize>,
    pub check_redundancy_before_store_block: Option<bool>,
    pub to_sync_incremental: Option<bool>,
    pub to_sync_for_missing_blocks: Option<bool>,
    pub to_prune_redundant_blocks: Option<bool>,
    pub store_queue_concurrency: Option<usize>,
    pub prune_queue_concurrency: Option<usize>,
    pub enqueue_block_interval_ms: Option<u64>,
    pub verify_blocks_interval_ms: Option<u64>,
    pub max_store_queue_length: Option<usize>,
    pub retry_enqueue_delay_ms: Option<u64>,
    pub max_prune_chunk_size: Option<usize>,
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn node_config(&self) -> NodeConfig {
        let section = &self.node;
        let mut config = NodeConfig::default();
        set_ms(&mut config.timeout, section.timeout_ms);
        set(&mut config.to_log_reliability, section.to_log_reliability);
        set_ms(
            &mut config.truncate_request_log_interval,
            section.truncate_request_log_interval_ms,
        );
        set_ms(&mut config.request_log_ttl, section.request_log_ttl_ms);
        config
    }

    pub fn mesh_config(&self) -> MeshConfig {
        let section = &self.mesh;
        let mut config = MeshConfig::default();
        set(
            &mut config.min_active_nodes_required,
            section.min_active_nodes_required,
        );
        set(
            &mut config.pending_requests_threshold,
            section.pending_requests_threshold,
        );
        set(&mut config.to_benchmark, section.to_benchmark);
        set(&mut config.to_fetch_user_agent, section.to_fetch_user_agent);
        set_ms(&mut config.benchmark_interval, section.benchmark_interval_ms);
        set_ms(
            &mut config.fetch_missing_user_agent_interval,
            section.fetch_missing_user_agent_interval_ms,
        );
        set_ms(
            &mut config.refresh_user_agent_interval,
            section.refresh_user_agent_interval_ms,
        );
        config
    }

    pub fn syncer_config(&self) -> SyncerConfig {
        let section = &self.syncer;
        let mut config = SyncerConfig::default();
        set(&mut config.min_height, section.min_height.map(Height));
        set(&mut config.max_height, section.max_height.map(Height));
        set(&mut config.block_redundancy, section.block_redundancy);
        set(
            &mut config.check_redundancy_before_store_block,
            section.check_redundancy_before_store_block,
        );
        set(&mut config.to_sync_incremental, section.to_sync_incremental);
        set(
            &mut config.to_sync_for_missing_blocks,
            section.to_sync_for_missing_blocks,
        );
        set(
            &mut config.to_prune_redundant_blocks,
            section.to_prune_redundant_blocks,
        );
        set(
            &mut config.store_queue_concurrency,
            section.store_queue_concurrency,
        );
        set(
            &mut config.prune_queue_concurrency,
            section.prune_queue_concurrency,
        );
        set_ms(
            &mut config.enqueue_block_interval,
            section.enqueue_block_interval_ms,
        );
        set_ms(
            &mut config.verify_blocks_interval,
            section.verify_blocks_interval_ms,
        );
        set(&mut config.max_store_queue_length, section.max_store_queue_length);
        set_ms(&mut config.retry_enqueue_delay, section.retry_enqueue_delay_ms);
        set(&mut config.max_prune_chunk_size, section.max_prune_chunk_size);
        config
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn set_ms(target: &mut Duration, millis: Option<u64>) {
    set(target, millis.map(Duration::from_millis));
}
