//! In-memory collaborators for unit tests.

use parking_lot::RwLock;
use std::net::SocketAddr;

use super::election::LeaderElection;
use super::membership::Membership;
use super::types::{Node, NodeId};

pub fn test_node(id: &str) -> Node {
    let unbound: SocketAddr = "127.0.0.1:1".parse().unwrap();
    Node::alive(NodeId::from(id), unbound, unbound)
}

pub struct StaticMembership {
    local: RwLock<Node>,
    members: RwLock<Vec<Node>>,
    settled: RwLock<bool>,
}

impl StaticMembership {
    /// `members` must include `local`.
    pub fn new(local: Node, members: Vec<Node>) -> Self {
        Self {
            local: RwLock::new(local),
            members: RwLock::new(members),
            settled: RwLock::new(true),
        }
    }

    pub fn set_alive(&self, members: Vec<Node>) {
        *self.members.write() = members;
    }

    pub fn remove(&self, id: &NodeId) {
        self.members.write().retain(|n| &n.id != id);
    }

    pub fn set_settled(&self, settled: bool) {
        *self.settled.write() = settled;
    }
}

impl Membership for StaticMembership {
    fn local_node(&self) -> Node {
        self.local.read().clone()
    }

    fn alive_members(&self) -> Vec<Node> {
        let mut members = self.members.read().clone();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members
    }

    fn node(&self, id: &NodeId) -> Option<Node> {
        self.members.read().iter().find(|n| &n.id == id).cloned()
    }

    fn is_settled(&self) -> bool {
        *self.settled.read()
    }
}

pub struct StaticLeader(pub RwLock<Option<NodeId>>);

impl StaticLeader {
    pub fn new(leader: Option<&str>) -> Self {
        Self(RwLock::new(leader.map(NodeId::from)))
    }

    pub fn set(&self, leader: Option<&str>) {
        *self.0.write() = leader.map(NodeId::from);
    }
}

impl LeaderElection for StaticLeader {
    fn current_leader(&self) -> Option<NodeId> {
        self.0.read().clone()
    }
}
