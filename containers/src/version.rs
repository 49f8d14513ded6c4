use serde::{Deserialize, Serialize};

/// Response of the `getversion` RPC method.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Version {
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub nonce: u64,
    #[serde(rename = "useragent")]
    pub user_agent: String,
}
