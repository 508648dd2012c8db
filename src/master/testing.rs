//! Fixtures for exercising file masters without a full node.

use std::sync::Arc;
use std::time::Duration;

use super::file_master::{MasterContext, MasterRegistry};
use crate::cluster::testing::{StaticLeader, StaticMembership};
use crate::cluster::types::Node;
use crate::config::{StorageDirs, TimeoutConfig};
use crate::metadata::remote::LeaderLink;
use crate::node::report::ReplicaReport;
use crate::rpc::RpcClient;
use crate::transfer::progress::{TransmissionIdGenerator, TransmissionTracker};

pub fn short_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        metadata_query_secs: 5,
        read_secs: 5,
        write_secs: 10,
        delete_secs: 5,
        upload_wait_secs: 5,
        write_check_secs: 10,
        get_wait_secs: 10,
        replicate_pull_secs: 5,
    }
}

/// Context for `local`, resolving peers through a static member list.
pub fn test_context(
    local: Node,
    members: Vec<Node>,
    dirs: StorageDirs,
    tracker: Arc<TransmissionTracker>,
    timeouts: TimeoutConfig,
) -> Arc<MasterContext> {
    let local_id = local.id.clone();
    let membership = Arc::new(StaticMembership::new(local, members));
    let leader = Arc::new(StaticLeader::new(Some(local_id.0.as_str())));
    let rpc = RpcClient::new();
    Arc::new(MasterContext {
        membership: membership.clone(),
        rpc: rpc.clone(),
        leader: LeaderLink::new(membership, leader, rpc, Duration::from_secs(2)),
        tracker,
        ids: TransmissionIdGenerator::new(format!("FM-{local_id}")),
        report: Arc::new(ReplicaReport::new(local_id, dirs.sdfs.clone())),
        dirs,
        timeouts,
        masters: Arc::new(MasterRegistry::new()),
    })
}
