pub mod mesh;
pub mod node;
pub mod rpc;
pub mod sync;

mod timer;

#[cfg(test)]
mod testing;

pub use mesh::{Mesh, MeshConfig, MeshError, MeshEvent};
pub use node::{Node, NodeConfig, NodeError, NodeStats};
pub use rpc::{HttpTransport, RpcError, RpcTransport};
pub use sync::{SyncError, Syncer, SyncerConfig, SyncerEvent};
