//! Scripted peers for unit tests.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::node::{Node, NodeConfig};
use crate::rpc::{GET_BLOCK, GET_BLOCK_COUNT, GET_VERSION, RpcError, RpcTransport};

#[derive(Debug)]
struct MockState {
    block_height: u64,
    user_agent: String,
    is_failing: bool,
    delay: Option<Duration>,
    calls: Vec<String>,
}

/// A peer whose answers are controlled by the test.
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new(block_height: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                block_height,
                user_agent: "/mock:1.0/".to_string(),
                is_failing: false,
                delay: None,
                calls: Vec::new(),
            }),
        })
    }

    pub fn set_failing(&self, is_failing: bool) {
        self.state.lock().is_failing = is_failing;
    }

    pub fn set_block_height(&self, block_height: u64) {
        self.state.lock().block_height = block_height;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|called| called.as_str() == method)
            .count()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(method.to_string());
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if state.is_failing {
            return Err(RpcError::Transport("connection refused".to_string()));
        }

        match method {
            GET_BLOCK_COUNT => Ok(json!(state.block_height)),
            GET_VERSION => Ok(json!({ "port": 10333, "nonce": 1, "useragent": state.user_agent })),
            GET_BLOCK => {
                let height = params.first().and_then(Value::as_u64).unwrap_or_default();
                if height > state.block_height {
                    return Err(RpcError::Remote {
                        code: -100,
                        message: "Unknown block".to_string(),
                    });
                }
                Ok(json!({
                    "hash": format!("0x{height:064x}"),
                    "size": 100,
                    "index": height,
                    "time": 1_500_000_000 + height,
                    "tx": [],
                }))
            }
            _ => Err(RpcError::Remote {
                code: -32601,
                message: "Method not found".to_string(),
            }),
        }
    }
}

pub fn mock_node(endpoint: &str, block_height: u64) -> (Arc<Node>, Arc<MockTransport>) {
    mock_node_with_config(endpoint, block_height, NodeConfig::default())
}

pub fn mock_node_with_config(
    endpoint: &str,
    block_height: u64,
    config: NodeConfig,
) -> (Arc<Node>, Arc<MockTransport>) {
    let transport = MockTransport::new(block_height);
    let node = Arc::new(Node::with_transport(endpoint, transport.clone(), config));
    (node, transport)
}
