use std::sync::Arc;
use std::time::Duration;

use containers::Height;

use super::{Mesh, MeshConfig, MeshError, MeshEvent};
use crate::node::Node;
use crate::rpc::{GET_BLOCK_COUNT, GET_VERSION};
use crate::testing::{MockTransport, mock_node};

/// A node that has answered one height probe with the given latency.
async fn probed_node(endpoint: &str, height: u64, latency_ms: u64) -> (Arc<Node>, Arc<MockTransport>) {
    let (node, transport) = mock_node(endpoint, height);
    transport.set_delay(Duration::from_millis(latency_ms));
    node.get_block_count().await.unwrap();
    (node, transport)
}

/// Park `requests` slow calls on `node` so it looks busy.
async fn occupy(node: &Arc<Node>, transport: &MockTransport, requests: usize) {
    transport.set_delay(Duration::from_secs(3600));
    for _ in 0..requests {
        let node = node.clone();
        tokio::spawn(async move {
            let _ = node.get_block(Height(1)).await;
        });
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(node.pending_requests(), requests);
}

#[test]
fn test_empty_mesh_is_rejected() {
    let result = Mesh::new(Vec::new(), MeshConfig::default());
    assert!(matches!(result, Err(MeshError::NoNodes)));
}

#[tokio::test(start_paused = true)]
async fn test_highest_and_optimal_nodes() {
    let (a, _) = probed_node("http://a", 10, 50).await;
    let (b, _) = probed_node("http://b", 15, 80).await;
    let (c, _) = probed_node("http://c", 12, 30).await;
    let mesh = Mesh::new(vec![a.clone(), b.clone(), c.clone()], MeshConfig::default()).unwrap();

    let highest = mesh.get_highest_node(true).unwrap();
    assert_eq!(highest.endpoint(), "http://b");

    let optimal = mesh.get_optimal_node(Height(12), true).unwrap();
    assert_eq!(optimal.endpoint(), "http://c");

    let optimal = mesh.get_optimal_node(Height(13), true).unwrap();
    assert_eq!(optimal.endpoint(), "http://b");

    let fastest = mesh.get_fastest_node(true).unwrap();
    assert_eq!(fastest.endpoint(), "http://c");
}

#[tokio::test(start_paused = true)]
async fn test_optimal_node_never_below_height() {
    let (a, _) = probed_node("http://a", 10, 5).await;
    let (b, _) = probed_node("http://b", 20, 50).await;
    let mesh = Mesh::new(vec![a, b], MeshConfig::default()).unwrap();

    for h in 1..=25 {
        match mesh.get_optimal_node(Height(h), true) {
            Some(node) => assert!(node.block_height().unwrap() >= Height(h)),
            None => assert!(h > 20),
        }
    }
    assert!(mesh.get_optimal_node(Height(21), true).is_none());
}

#[tokio::test]
async fn test_selection_on_inactive_pool() {
    let (a, ta) = mock_node("http://a", 10);
    let (b, _) = mock_node("http://b", 10);
    let mesh = Mesh::new(vec![a.clone(), b], MeshConfig::default()).unwrap();

    // Nothing has been probed yet.
    assert!(mesh.get_fastest_node(true).is_none());
    assert!(mesh.get_highest_node(true).is_none());
    assert!(mesh.get_random_node(true).is_none());
    assert!(mesh.get_optimal_node(Height(1), true).is_none());

    ta.set_failing(true);
    let _ = a.get_block_count().await;
    assert_eq!(a.is_active(), Some(false));
    assert!(mesh.get_fastest_node(true).is_none());
    assert!(mesh.get_highest_node(true).is_none());
    assert!(mesh.active_nodes().is_empty());
}

#[tokio::test]
async fn test_inactive_nodes_count_when_not_active_only() {
    let (a, ta) = mock_node("http://a", 40);
    a.get_block_count().await.unwrap();
    ta.set_failing(true);
    let _ = a.get_block_count().await;

    let mesh = Mesh::new(vec![a], MeshConfig::default()).unwrap();
    assert!(mesh.get_highest_node(true).is_none());
    assert_eq!(
        mesh.get_highest_node(false).unwrap().block_height(),
        Some(Height(40))
    );
    assert!(mesh.get_random_node(false).is_some());
    assert!(mesh.get_optimal_node(Height(40), false).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_optimal_node_skips_busy_fast_node() {
    let (fast, fast_transport) = probed_node("http://fast", 100, 10).await;
    let (slow, _) = probed_node("http://slow", 100, 90).await;
    let config = MeshConfig {
        pending_requests_threshold: 2,
        ..Default::default()
    };
    let mesh = Mesh::new(vec![fast.clone(), slow], config).unwrap();

    assert_eq!(mesh.get_optimal_node(Height(50), true).unwrap().endpoint(), "http://fast");

    occupy(&fast, &fast_transport, 2).await;
    assert_eq!(mesh.get_optimal_node(Height(50), true).unwrap().endpoint(), "http://slow");
}

#[tokio::test(start_paused = true)]
async fn test_optimal_node_falls_back_when_all_busy() {
    let (a, ta) = probed_node("http://a", 100, 10).await;
    let (b, tb) = probed_node("http://b", 100, 20).await;
    let (low, _) = probed_node("http://low", 10, 1).await;
    let config = MeshConfig {
        pending_requests_threshold: 1,
        ..Default::default()
    };
    let mesh = Mesh::new(vec![a.clone(), b.clone(), low], config).unwrap();

    occupy(&a, &ta, 1).await;
    occupy(&b, &tb, 1).await;

    for _ in 0..20 {
        let node = mesh.get_optimal_node(Height(50), true).unwrap();
        assert_ne!(node.endpoint(), "http://low");
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_seeds_health_and_becomes_ready() {
    let (a, _) = mock_node("http://a", 10);
    let (b, tb) = mock_node("http://b", 12);
    tb.set_failing(true);
    let config = MeshConfig {
        min_active_nodes_required: 1,
        ..Default::default()
    };
    let mesh = Arc::new(Mesh::new(vec![a.clone(), b.clone()], config).unwrap());
    let mut events = mesh.subscribe();
    assert!(!mesh.is_ready());

    mesh.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(mesh.is_ready());
    assert_eq!(events.recv().await.unwrap(), MeshEvent::Ready);
    assert_eq!(a.block_height(), Some(Height(10)));
    assert_eq!(a.user_agent().as_deref(), Some("/mock:1.0/"));
    assert_eq!(b.is_active(), Some(false));
    assert_eq!(b.user_agent(), None);

    mesh.close();
}

#[tokio::test(start_paused = true)]
async fn test_readiness_needs_enough_active_nodes_and_latches() {
    let (a, ta) = mock_node("http://a", 10);
    let (b, tb) = mock_node("http://b", 10);
    tb.set_failing(true);
    let config = MeshConfig {
        min_active_nodes_required: 2,
        to_benchmark: false,
        to_fetch_user_agent: false,
        ..Default::default()
    };
    let mesh = Arc::new(Mesh::new(vec![a, b], config).unwrap());

    mesh.ping_all().await;
    assert!(!mesh.is_ready());

    tb.set_failing(false);
    mesh.ping_all().await;
    assert!(mesh.is_ready());

    ta.set_failing(true);
    tb.set_failing(true);
    mesh.ping_all().await;
    assert!(mesh.active_nodes().is_empty());
    assert!(mesh.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_readiness_counts_nodes_active_at_different_times() {
    let (a, ta) = mock_node("http://a", 10);
    let (b, tb) = mock_node("http://b", 10);
    let config = MeshConfig {
        min_active_nodes_required: 2,
        to_benchmark: false,
        to_fetch_user_agent: false,
        ..Default::default()
    };
    let mesh = Arc::new(Mesh::new(vec![a.clone(), b.clone()], config).unwrap());
    let mut events = mesh.subscribe();

    tb.set_failing(true);
    a.get_block_count().await.unwrap();
    assert!(!mesh.is_ready());

    ta.set_failing(true);
    tb.set_failing(false);
    let _ = a.get_block_count().await;
    b.get_block_count().await.unwrap();

    // Never both active at once, yet each has answered.
    assert_eq!(mesh.active_nodes().len(), 1);
    assert!(mesh.is_ready());
    assert_eq!(events.try_recv().unwrap(), MeshEvent::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_benchmark_timer_pings_periodically() {
    let (a, ta) = mock_node("http://a", 10);
    let config = MeshConfig {
        benchmark_interval: Duration::from_secs(2),
        to_fetch_user_agent: false,
        ..Default::default()
    };
    let mesh = Arc::new(Mesh::new(vec![a], config).unwrap());

    mesh.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ta.calls(GET_BLOCK_COUNT), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(ta.calls(GET_BLOCK_COUNT), 6);

    mesh.close();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(ta.calls(GET_BLOCK_COUNT), 6);
}

#[tokio::test(start_paused = true)]
async fn test_missing_user_agents_are_refetched() {
    let (a, ta) = mock_node("http://a", 10);
    ta.set_failing(true);
    let config = MeshConfig {
        to_benchmark: false,
        fetch_missing_user_agent_interval: Duration::from_secs(5),
        refresh_user_agent_interval: Duration::from_secs(3600),
        ..Default::default()
    };
    let mesh = Arc::new(Mesh::new(vec![a.clone()], config).unwrap());

    mesh.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(a.user_agent(), None);

    ta.set_failing(false);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(a.user_agent().as_deref(), Some("/mock:1.0/"));

    let calls = ta.calls(GET_VERSION);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(ta.calls(GET_VERSION), calls);

    mesh.close();
}
