use std::sync::Arc;

use super::membership::Membership;
use super::types::NodeId;

/// Names the node currently hosting the metadata service.
pub trait LeaderElection: Send + Sync + 'static {
    /// `None` while an election is in progress.
    fn current_leader(&self) -> Option<NodeId>;
}

/// The alive node with the smallest id leads.
///
/// No leader is reported until membership has settled, so a freshly started
/// node does not briefly elect itself before it has heard from its peers.
pub struct LowestIdElection {
    membership: Arc<dyn Membership>,
}

impl LowestIdElection {
    pub fn new(membership: Arc<dyn Membership>) -> Self {
        Self { membership }
    }
}

impl LeaderElection for LowestIdElection {
    fn current_leader(&self) -> Option<NodeId> {
        if !self.membership.is_settled() {
            return None;
        }
        self.membership
            .alive_members()
            .into_iter()
            .map(|node| node.id)
            .min()
    }
}
