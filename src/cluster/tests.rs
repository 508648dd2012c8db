//! Cluster Boundary Tests
//!
//! Covers node identity, the heartbeat membership view before any probe has
//! run, and the lowest-id leader rule.

#[cfg(test)]
mod tests {
    use crate::cluster::election::{LeaderElection, LowestIdElection};
    use crate::cluster::membership::{HeartbeatMembership, Membership};
    use crate::cluster::testing::{StaticMembership, test_node};
    use crate::cluster::types::{Node, NodeId, NodeState};
    use crate::config::{ClusterConfig, PeerConfig};
    use std::sync::Arc;

    // ============================================================
    // NODE ID TESTS
    // ============================================================

    #[test]
    fn test_node_id_is_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
    }

    #[test]
    fn test_node_id_orders_lexicographically() {
        let mut ids = vec![NodeId::from("node-c"), NodeId::from("node-a"), NodeId::from("node-b")];
        ids.sort();
        assert_eq!(ids[0], NodeId::from("node-a"));
        assert_eq!(ids[2], NodeId::from("node-c"));
    }

    #[test]
    fn test_node_serialization_skips_last_seen() {
        let node = test_node("n1");
        let json = serde_json::to_string(&node).unwrap();
        let restored: Node = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, node.id);
        assert_eq!(restored.state, NodeState::Alive);
        assert!(restored.last_seen.is_none());
    }

    // ============================================================
    // HEARTBEAT MEMBERSHIP TESTS
    // ============================================================

    fn cluster_config(peers: &[&str]) -> ClusterConfig {
        ClusterConfig {
            peers: peers
                .iter()
                .enumerate()
                .map(|(i, id)| PeerConfig {
                    id: id.to_string(),
                    rpc_addr: format!("127.0.0.1:{}", 17000 + i).parse().unwrap(),
                    transfer_addr: format!("127.0.0.1:{}", 17100 + i).parse().unwrap(),
                })
                .collect(),
            heartbeat_interval_ms: 100,
            suspect_timeout_ms: 500,
            dead_timeout_ms: 1000,
        }
    }

    #[test]
    fn test_unprobed_peers_are_not_alive() {
        let local = test_node("a");
        let membership = HeartbeatMembership::new(local, &cluster_config(&["a", "b", "c"]));

        let alive = membership.alive_members();
        assert_eq!(alive.len(), 1, "only the local node is known alive");
        assert_eq!(alive[0].id, NodeId::from("a"));
        assert!(!membership.is_settled());
    }

    #[test]
    fn test_peer_lookup_excludes_self_entry() {
        let local = test_node("a");
        let membership = HeartbeatMembership::new(local, &cluster_config(&["a", "b"]));

        let b = membership.node(&NodeId::from("b")).unwrap();
        assert_eq!(b.state, NodeState::Suspect);
        assert_eq!(b.rpc_addr.port(), 17001);
        assert_eq!(membership.node(&NodeId::from("a")).unwrap().state, NodeState::Alive);
        assert!(membership.node(&NodeId::from("z")).is_none());
    }

    #[test]
    fn test_single_node_is_settled_immediately() {
        let membership = HeartbeatMembership::new(test_node("solo"), &cluster_config(&[]));
        assert!(membership.is_settled());
    }

    // ============================================================
    // ELECTION TESTS
    // ============================================================

    #[test]
    fn test_lowest_alive_id_leads() {
        let membership = Arc::new(StaticMembership::new(
            test_node("n2"),
            vec![test_node("n3"), test_node("n2"), test_node("n1")],
        ));
        let election = LowestIdElection::new(membership.clone());
        assert_eq!(election.current_leader(), Some(NodeId::from("n1")));

        membership.remove(&NodeId::from("n1"));
        assert_eq!(election.current_leader(), Some(NodeId::from("n2")));
    }

    #[test]
    fn test_no_leader_before_membership_settles() {
        let membership = Arc::new(StaticMembership::new(test_node("n1"), vec![test_node("n1")]));
        membership.set_settled(false);
        let election = LowestIdElection::new(membership.clone());

        assert_eq!(election.current_leader(), None);
        membership.set_settled(true);
        assert_eq!(election.current_leader(), Some(NodeId::from("n1")));
    }
}
