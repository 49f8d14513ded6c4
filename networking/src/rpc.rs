/// JSON-RPC transport used by [`crate::node::Node`].
///
/// The transport only moves requests and responses; health bookkeeping lives
/// in the node wrapping it.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::trace;

pub const GET_BLOCK: &str = "getblock";
pub const GET_BLOCK_COUNT: &str = "getblockcount";
pub const GET_VERSION: &str = "getversion";

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("request timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("response carried no result")]
    MissingResult,
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Issues a single JSON-RPC call against one endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, RpcError> {
        if let Some(error) = self.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        self.result.ok_or(RpcError::MissingResult)
    }
}

/// JSON-RPC 2.0 over HTTP POST.
#[derive(Debug)]
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RpcError::Transport(err.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RpcError::Timeout
        } else {
            RpcError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        trace!(endpoint = %self.endpoint, method, id, "Sending RPC request");

        let response: RpcResponse = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_with_result() {
        let response: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":2983201}"#).unwrap();
        assert_eq!(response.into_result().unwrap(), json!(2983201));
    }

    #[test]
    fn test_response_with_error() {
        let response: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-100,"message":"Unknown block"}}"#,
        )
        .unwrap();
        match response.into_result() {
            Err(RpcError::Remote { code, message }) => {
                assert_eq!(code, -100);
                assert_eq!(message, "Unknown block");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_response_without_result() {
        let response: RpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(matches!(response.into_result(), Err(RpcError::MissingResult)));
    }
}
