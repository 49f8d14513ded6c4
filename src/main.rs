use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chain::Network;
use clap::Parser;
use containers::Height;
use metrics::server::{run_metrics_server, MetricsServerConfig};
use metrics::{Metrics, SharedMetrics};
use networking::{Mesh, MeshEvent, Syncer, SyncerEvent};
use storage::MemoryStorage;
use tokio::sync::broadcast::error::RecvError;
use tokio::task;
use tracing::{error, info, warn};

use crate::config::ClientConfig;

mod config;

const METRICS_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
struct Args {
    /// Chain whose public seed nodes are used when no endpoint is given.
    #[arg(short, long)]
    network: Option<Network>,

    /// JSON-RPC endpoint to sync from. May be repeated.
    #[arg(short, long = "endpoint")]
    endpoints: Vec<String>,

    /// YAML file overriding node, mesh and syncer settings.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    min_height: Option<u64>,

    #[arg(long)]
    max_height: Option<u64>,

    #[arg(long, default_value = "127.0.0.1")]
    metrics_address: IpAddr,

    #[arg(long, default_value_t = 9090)]
    metrics_port: u16,

    #[arg(long)]
    no_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let client_config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    let network = match (args.network, client_config.network.as_deref()) {
        (Some(network), _) => network,
        (None, Some(name)) => name.parse().context("invalid network in config file")?,
        (None, None) => Network::Mainnet,
    };

    let endpoints = if !args.endpoints.is_empty() {
        args.endpoints.clone()
    } else if !client_config.endpoints.is_empty() {
        client_config.endpoints.clone()
    } else {
        network.config().endpoints()
    };

    let mut syncer_config = client_config.syncer_config();
    if let Some(min_height) = args.min_height {
        syncer_config.min_height = Height(min_height);
    }
    if let Some(max_height) = args.max_height {
        syncer_config.max_height = Height(max_height);
    }

    info!(
        %network,
        nodes = endpoints.len(),
        min_height = syncer_config.min_height.0,
        max_height = syncer_config.max_height.0,
        "Starting chain mirror"
    );

    let mesh = Arc::new(
        Mesh::from_endpoints(
            &endpoints,
            client_config.node_config(),
            client_config.mesh_config(),
        )
        .context("failed to build mesh")?,
    );
    let storage = Arc::new(MemoryStorage::new());
    let syncer = Arc::new(
        Syncer::new(mesh.clone(), storage, syncer_config).context("failed to create syncer")?,
    );

    if !args.no_metrics {
        let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
        let server_config = MetricsServerConfig {
            metrics_address: args.metrics_address,
            metrics_port: args.metrics_port,
        };

        let server_metrics = metrics.clone();
        task::spawn(async move {
            if let Err(err) = run_metrics_server(server_config, server_metrics).await {
                error!(error = %err, "Metrics server exited");
            }
        });
        spawn_event_metrics(&syncer, metrics.clone());
        spawn_sampled_metrics(&mesh, &syncer, metrics);
    }

    let mut mesh_events = mesh.subscribe();
    task::spawn(async move {
        if let Ok(MeshEvent::Ready) = mesh_events.recv().await {
            info!("Mesh ready");
        }
    });

    mesh.start();
    syncer.start().await.context("failed to start syncer")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!(write_pointer = syncer.write_pointer().0, "Shutting down");

    syncer.close();
    mesh.close();

    Ok(())
}

/// Count store and verification outcomes as the syncer reports them.
fn spawn_event_metrics(syncer: &Syncer, metrics: SharedMetrics) {
    let mut events = syncer.subscribe();

    task::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Metrics fell behind syncer events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                SyncerEvent::StoreBlockComplete {
                    is_success,
                    is_skipped,
                    ..
                } => {
                    let result = match (is_success, is_skipped) {
                        (true, true) => "skipped",
                        (true, false) => "stored",
                        (false, _) => "failed",
                    };
                    metrics.inc_store_block(result);
                }
                SyncerEvent::BlockVerificationComplete {
                    is_success,
                    is_skipped,
                } => {
                    let result = match (is_success, is_skipped) {
                        (_, true) => "skipped",
                        (true, false) => "success",
                        (false, false) => "failure",
                    };
                    metrics.inc_block_verification(result);
                }
                SyncerEvent::MissingBlocks { count } => metrics.inc_missing_blocks(count as u64),
                SyncerEvent::ExcessiveBlocks { count } => {
                    metrics.inc_excessive_blocks(count as u64)
                }
                SyncerEvent::UpToDate => info!("Storage is up to date"),
                _ => {}
            }
        }
    });
}

/// Sample gauges and node latencies that have no event of their own.
fn spawn_sampled_metrics(mesh: &Arc<Mesh>, syncer: &Arc<Syncer>, metrics: SharedMetrics) {
    let mesh = Arc::downgrade(mesh);
    let syncer = Arc::downgrade(syncer);

    task::spawn(async move {
        let mut ticker = tokio::time::interval(METRICS_SAMPLE_INTERVAL);
        loop {
            ticker.tick().await;
            let (Some(mesh), Some(syncer)) = (mesh.upgrade(), syncer.upgrade()) else {
                break;
            };

            metrics.set_active_nodes(mesh.active_nodes().len() as i64);
            metrics.set_write_pointer(syncer.write_pointer().0 as i64);
            metrics.set_store_queue_length(syncer.store_queue_len() as i64);
            for node in mesh.nodes() {
                if let Some(latency) = node.shaped_latency() {
                    metrics.observe_node_latency(node.endpoint(), latency as f64 / 1000.0);
                }
            }
        }
    });
}
