/// Mesh configuration.
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Active nodes needed before the mesh reports ready.
    pub min_active_nodes_required: usize,
    /// Nodes at or above this many in-flight requests are passed over by
    /// [`super::Mesh::get_optimal_node`] while an idler candidate exists.
    pub pending_requests_threshold: usize,
    pub to_benchmark: bool,
    pub to_fetch_user_agent: bool,
    pub benchmark_interval: Duration,
    pub fetch_missing_user_agent_interval: Duration,
    pub refresh_user_agent_interval: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            min_active_nodes_required: 1,
            pending_requests_threshold: 5,
            to_benchmark: true,
            to_fetch_user_agent: true,
            benchmark_interval: Duration::from_secs(2),
            fetch_missing_user_agent_interval: Duration::from_secs(5),
            refresh_user_agent_interval: Duration::from_secs(5 * 60),
        }
    }
}
