use futures::future::join_all;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{RwLock, watch};

use super::types::{ClusterInfo, ClusterView, FileIndex, FileInfo, FileStatus, NodeToFiles};
use crate::cluster::election::LeaderElection;
use crate::cluster::membership::Membership;
use crate::cluster::types::{Node, NodeId};
use crate::config::ReplicationConfig;
use crate::error::{Result, SdfsError};
use crate::node::protocol::ENDPOINT_NODE_UPDATE;
use crate::rpc::{Ack, RpcClient};
use crate::transfer::types::validate_file_name;

/// Leader-hosted authority over which nodes hold which files.
///
/// Every operation checks the role first, so a node that lost leadership
/// refuses requests instead of answering from a stale map.
pub struct MetadataService {
    pub(super) membership: Arc<dyn Membership>,
    pub(super) election: Arc<dyn LeaderElection>,
    pub(super) rpc: RpcClient,
    pub(super) replication: ReplicationConfig,

    pub(super) metadata: RwLock<FileIndex>,
    pub(super) tombstones: Mutex<BTreeSet<String>>,
    /// Names created by `put` since the current reconciliation snapshot began.
    pub(super) recent_puts: Mutex<BTreeSet<String>>,
    /// Names tombstoned since the current reconciliation snapshot began.
    pub(super) recent_deletes: Mutex<BTreeSet<String>>,
    /// Puts whose assignment is still being pushed, by file name.
    puts_in_flight: Mutex<BTreeMap<String, watch::Receiver<()>>>,
}

impl MetadataService {
    pub fn new(
        membership: Arc<dyn Membership>,
        election: Arc<dyn LeaderElection>,
        rpc: RpcClient,
        replication: ReplicationConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            membership,
            election,
            rpc,
            replication,
            metadata: RwLock::new(FileIndex::new()),
            tombstones: Mutex::new(BTreeSet::new()),
            recent_puts: Mutex::new(BTreeSet::new()),
            recent_deletes: Mutex::new(BTreeSet::new()),
            puts_in_flight: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn is_leader(&self) -> bool {
        self.election.current_leader() == Some(self.membership.local_id())
    }

    fn ensure_leader(&self) -> Result<()> {
        match self.election.current_leader() {
            None => Err(SdfsError::LeaderUnavailable(
                "election in progress".to_string(),
            )),
            Some(leader) if leader != self.membership.local_id() => Err(
                SdfsError::LeaderUnavailable(format!("not leader; current leader is {leader}")),
            ),
            Some(_) => Ok(()),
        }
    }

    fn check_name(&self, file_name: &str) -> Result<()> {
        self.ensure_leader()?;
        if file_name.is_empty() {
            return Err(SdfsError::InvalidArgument("file name is empty".to_string()));
        }
        if self.is_tombstoned(file_name) {
            return Err(SdfsError::NotFound(format!("{file_name} is being deleted")));
        }
        Ok(())
    }

    pub fn is_tombstoned(&self, file_name: &str) -> bool {
        self.tombstones.lock().contains(file_name)
    }

    pub(super) fn tombstone_snapshot(&self) -> BTreeSet<String> {
        self.tombstones.lock().clone()
    }

    async fn lookup(&self, file_name: &str) -> Result<ClusterView> {
        self.check_name(file_name)?;
        let metadata = self.metadata.read().await;
        metadata
            .get(file_name)
            .map(ClusterView::from)
            .ok_or_else(|| SdfsError::NotFound(format!("{file_name} does not exist")))
    }

    pub async fn get(&self, file_name: &str) -> Result<ClusterView> {
        self.lookup(file_name).await
    }

    pub async fn list(&self, file_name: &str) -> Result<ClusterView> {
        self.lookup(file_name).await
    }

    /// Resolves the replica set a delete must go through; the primary
    /// performs the delete itself.
    pub async fn delete(&self, file_name: &str) -> Result<ClusterView> {
        self.lookup(file_name).await
    }

    /// Returns the replica set of `file_name`, allocating one if it is new.
    pub async fn put(&self, file_name: &str) -> Result<ClusterView> {
        validate_file_name(file_name)?;

        let (cluster, node_files, _in_flight) = loop {
            self.check_name(file_name)?;
            let mut pending = {
                let mut metadata = self.metadata.write().await;
                let pending = self.puts_in_flight.lock().get(file_name).cloned();
                match pending {
                    Some(pending) => pending,
                    None => {
                        if let Some(existing) = metadata.get(file_name) {
                            return Ok(ClusterView::from(existing));
                        }
                        let cluster = self.allocate_cluster(file_name, &metadata)?;
                        metadata.insert(cluster.clone());
                        self.recent_puts.lock().insert(file_name.to_string());
                        let in_flight = InFlightPut::register(self, file_name);
                        break (cluster, metadata.to_node_files(), in_flight);
                    }
                }
            };
            // Answer only once the first put's members know their roles.
            let _ = pending.changed().await;
        };

        tracing::info!(
            "Allocated {} on {} node(s), master {:?}",
            file_name,
            cluster.size(),
            cluster.master.as_ref().map(|m| &m.node_id)
        );

        let targets: Vec<NodeId> = cluster.members().map(|m| m.node_id.clone()).collect();
        let results = self.push_assignment(&node_files, &targets).await;

        let master_id = cluster.master.as_ref().map(|m| m.node_id.clone());
        for (node_id, result) in results {
            if let Err(e) = result {
                if Some(&node_id) == master_id.as_ref() {
                    return Err(e);
                }
                tracing::warn!("Servant {} missed assignment for {}: {}", node_id, file_name, e);
            }
        }
        Ok(ClusterView::from(&cluster))
    }

    fn allocate_cluster(&self, file_name: &str, metadata: &FileIndex) -> Result<ClusterInfo> {
        let candidates = self.membership.alive_members();
        let chosen = least_loaded(&candidates, &metadata.load_by_node(), self.replication.factor);
        let mut chosen = chosen.into_iter();

        let master = chosen
            .next()
            .ok_or_else(|| SdfsError::Internal("no alive nodes to host the file".to_string()))?;

        let mut cluster = ClusterInfo::new(file_name);
        cluster.insert(FileInfo::master(file_name, master, FileStatus::PendingUpload));
        for servant in chosen {
            cluster.insert(FileInfo::servant(
                file_name,
                servant,
                FileStatus::WaitingReplication,
            ));
        }
        Ok(cluster)
    }

    /// Sorted names of every live file matching `pattern`.
    pub async fn search(&self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_leader()?;
        if pattern.is_empty() {
            return Err(SdfsError::InvalidArgument("empty search pattern".to_string()));
        }
        let regex = Regex::new(pattern)
            .map_err(|e| SdfsError::InvalidArgument(format!("bad pattern {pattern:?}: {e}")))?;

        let metadata = self.metadata.read().await;
        Ok(metadata
            .file_names()
            .filter(|name| regex.is_match(name))
            .cloned()
            .collect())
    }

    /// Stops surveillance of `file_name` ahead of its deletion.
    pub async fn request_tombstone(&self, file_name: &str) -> Result<()> {
        self.ensure_leader()?;
        let mut metadata = self.metadata.write().await;
        if metadata.remove(file_name).is_none() {
            return Err(SdfsError::NotFound(format!(
                "tombstone requested for unknown file {file_name}"
            )));
        }
        self.tombstones.lock().insert(file_name.to_string());
        self.recent_deletes.lock().insert(file_name.to_string());
        self.recent_puts.lock().remove(file_name);
        tracing::info!("Tombstoned {}", file_name);
        Ok(())
    }

    pub async fn release_tombstone(&self, file_name: &str) -> Result<()> {
        self.ensure_leader()?;
        if self.tombstones.lock().remove(file_name) {
            tracing::info!("Released tombstone for {}", file_name);
        }
        Ok(())
    }

    /// Sends `node_files` to each target concurrently, each call bounded by
    /// the push timeout.
    pub(super) async fn push_assignment(
        &self,
        node_files: &NodeToFiles,
        targets: &[NodeId],
    ) -> Vec<(NodeId, Result<()>)> {
        let timeout = self.replication.push_timeout();
        let pushes = targets.iter().map(|node_id| async move {
            let result = match self.membership.node(node_id) {
                Some(node) => self
                    .rpc
                    .post_json::<_, Ack>(node.rpc_addr, ENDPOINT_NODE_UPDATE, node_files, timeout)
                    .await
                    .map(|_| ()),
                None => Err(SdfsError::ConnectionFailure(format!(
                    "no address known for node {node_id}"
                ))),
            };
            (node_id.clone(), result)
        });
        join_all(pushes).await
    }

    /// Snapshot of the current view, for diagnostics and tests.
    pub async fn snapshot(&self) -> FileIndex {
        self.metadata.read().await.clone()
    }
}

/// Marks a put whose assignment push is running. Dropping it wakes every put
/// of the same name waiting on it.
struct InFlightPut<'a> {
    service: &'a MetadataService,
    file_name: String,
    _done: watch::Sender<()>,
}

impl<'a> InFlightPut<'a> {
    fn register(service: &'a MetadataService, file_name: &str) -> Self {
        let (done, pending) = watch::channel(());
        service
            .puts_in_flight
            .lock()
            .insert(file_name.to_string(), pending);
        Self {
            service,
            file_name: file_name.to_string(),
            _done: done,
        }
    }
}

impl Drop for InFlightPut<'_> {
    fn drop(&mut self) {
        self.service.puts_in_flight.lock().remove(&self.file_name);
    }
}

/// Picks up to `count` nodes, fewest hosted files first, ties by node id.
pub(super) fn least_loaded(
    candidates: &[Node],
    load: &BTreeMap<NodeId, usize>,
    count: usize,
) -> Vec<NodeId> {
    let mut ranked: Vec<(usize, &NodeId)> = candidates
        .iter()
        .map(|node| (load.get(&node.id).copied().unwrap_or(0), &node.id))
        .collect();
    ranked.sort();
    ranked.dedup_by(|a, b| a.1 == b.1);
    ranked
        .into_iter()
        .take(count)
        .map(|(_, id)| id.clone())
        .collect()
}
