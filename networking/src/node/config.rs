/// Node configuration.
use std::time::Duration;

/// Per-request timeout applied by the HTTP transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often expired reliability-log entries are purged.
pub const DEFAULT_TRUNCATE_REQUEST_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Reliability-log entries older than this are purged.
pub const DEFAULT_REQUEST_LOG_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub timeout: Duration,
    /// Record every benchmarked call in the reliability log.
    pub to_log_reliability: bool,
    pub truncate_request_log_interval: Duration,
    pub request_log_ttl: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            to_log_reliability: true,
            truncate_request_log_interval: DEFAULT_TRUNCATE_REQUEST_LOG_INTERVAL,
            request_log_ttl: DEFAULT_REQUEST_LOG_TTL,
        }
    }
}
