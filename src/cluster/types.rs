use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

/// A cluster member as seen by the local node.
///
/// `rpc_addr` serves every HTTP capability; `transfer_addr` accepts
/// transfer-protocol streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub rpc_addr: SocketAddr,
    pub transfer_addr: SocketAddr,
    pub state: NodeState,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

impl Node {
    pub fn alive(id: NodeId, rpc_addr: SocketAddr, transfer_addr: SocketAddr) -> Self {
        Self {
            id,
            rpc_addr,
            transfer_addr,
            state: NodeState::Alive,
            last_seen: Some(Instant::now()),
        }
    }
}
