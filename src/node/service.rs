use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;

use super::protocol::SendRequest;
use super::report::ReplicaReport;
use crate::cluster::types::NodeId;
use crate::error::{Result, SdfsError};
use crate::master::file_master::{FileMaster, MasterContext, remove_if_present};
use crate::master::protocol::{ENDPOINT_FILE_REPLICATE, ReplicateRequest};
use crate::metadata::types::{
    ClusterInfo, FileIndex, FileInfo, FileStatus, MetadataReport, NodeToFiles,
};
use crate::rpc::Ack;
use crate::transfer::sender::send_file;
use crate::transfer::types::{FrameHeader, validate_file_name};

/// Per-node host of file masters and of the local replica report.
pub struct NodeFileService {
    ctx: Arc<MasterContext>,
}

impl NodeFileService {
    pub fn new(ctx: Arc<MasterContext>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    pub fn context(&self) -> &Arc<MasterContext> {
        &self.ctx
    }

    fn report(&self) -> &ReplicaReport {
        &self.ctx.report
    }

    fn local_id(&self) -> NodeId {
        self.ctx.membership.local_id()
    }

    /// The file master for `file_name`, if this node is its primary.
    pub fn master(&self, file_name: &str) -> Result<Arc<FileMaster>> {
        self.ctx
            .masters
            .get(file_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                SdfsError::NotFound(format!("this node is not the primary of {file_name}"))
            })
    }

    pub fn is_master_of(&self, file_name: &str) -> bool {
        self.ctx.masters.contains_key(file_name)
    }

    pub async fn report_metadata(&self) -> MetadataReport {
        self.report().snapshot().await
    }

    fn create_master(&self, file_name: &str, servants: Vec<NodeId>) {
        tracing::info!("Hosting file master for {} ({} servant(s))", file_name, servants.len());
        let master = FileMaster::new(file_name, servants, self.ctx.clone());
        self.ctx.masters.insert(file_name.to_string(), master);
    }

    /// Applies an assignment pushed by the leader. Fails if any replica this
    /// node was told to pull could not be copied.
    pub async fn update_metadata(&self, node_files: &NodeToFiles) -> Result<()> {
        let local_id = self.local_id();
        let Some(assigned) = node_files.get(&local_id) else {
            return Ok(());
        };
        let index = FileIndex::from_node_files(node_files);

        let mut pulls: Vec<(String, NodeId)> = Vec::new();
        for (file_name, info) in assigned {
            let Some(cluster) = index.get(file_name) else {
                continue;
            };
            let servants: Vec<NodeId> = cluster
                .servant_ids()
                .into_iter()
                .filter(|id| *id != local_id)
                .collect();

            let pull = match self.report().get(file_name) {
                Some(current) => self.apply_known(&current, info, cluster, servants).await,
                None => self.apply_new(info, cluster, servants).await,
            };
            if let Some(master_id) = pull {
                pulls.push((file_name.clone(), master_id));
            }
        }

        self.pull_replicas(pulls).await
    }

    /// Reconciles an entry this node already holds with its new assignment.
    /// Returns the master to pull from when this servant still lacks the file.
    async fn apply_known(
        &self,
        current: &FileInfo,
        assigned: &FileInfo,
        cluster: &ClusterInfo,
        servants: Vec<NodeId>,
    ) -> Option<NodeId> {
        let name = &assigned.file_name;
        match (current.is_master, assigned.is_master) {
            (true, true) => match self.ctx.masters.get(name) {
                Some(master) => master.update_servants(servants),
                None => self.create_master(name, servants),
            },
            (false, true) => {
                tracing::info!("Promoted to master of {}", name);
                self.report().set_master(name, true);
                self.create_master(name, servants);
            }
            (true, false) => {
                tracing::info!("Demoted from master of {}", name);
                self.report().set_master(name, false);
                self.ctx.masters.remove(name);
            }
            (false, false) => {
                // A failed pull leaves the entry waiting; every push retries it.
                if current.status != FileStatus::WaitingReplication {
                    return None;
                }
                let master = cluster.master.as_ref()?;
                if master.status == FileStatus::Complete && !self.on_disk(name).await {
                    tracing::debug!("Retrying replica pull of {} from {}", name, master.node_id);
                    return Some(master.node_id.clone());
                }
            }
        }
        None
    }

    async fn on_disk(&self, file_name: &str) -> bool {
        tokio::fs::try_exists(self.ctx.dirs.sdfs.join(file_name))
            .await
            .unwrap_or(false)
    }

    /// Records an entry this node did not know about. Returns the master to
    /// pull a copy from, if one is needed.
    async fn apply_new(
        &self,
        assigned: &FileInfo,
        cluster: &ClusterInfo,
        servants: Vec<NodeId>,
    ) -> Option<NodeId> {
        let name = &assigned.file_name;
        if assigned.is_master {
            self.report().upsert(assigned.clone());
            self.create_master(name, servants);
            return None;
        }

        let master = cluster.master.as_ref();
        if master.is_some_and(|m| m.status == FileStatus::PendingDelete) {
            tracing::debug!("Ignoring {}: its master is deleting it", name);
            return None;
        }

        let on_disk = self.on_disk(name).await;
        let mut entry = assigned.clone();
        entry.status = if on_disk {
            FileStatus::Complete
        } else {
            FileStatus::WaitingReplication
        };
        self.report().upsert(entry);

        match master {
            Some(m) if m.status == FileStatus::Complete && !on_disk => Some(m.node_id.clone()),
            // A master still awaiting its upload fans out to servants itself.
            _ => None,
        }
    }

    async fn pull_replicas(&self, pulls: Vec<(String, NodeId)>) -> Result<()> {
        if pulls.is_empty() {
            return Ok(());
        }
        let target = self.ctx.membership.local_node().transfer_addr;
        let timeout = self.ctx.timeouts.replicate_pull();

        let calls = pulls.iter().map(|(file_name, master_id)| async move {
            let result = match self.ctx.membership.node(master_id) {
                Some(master) => self
                    .ctx
                    .rpc
                    .post_json::<_, Ack>(
                        master.rpc_addr,
                        ENDPOINT_FILE_REPLICATE,
                        &ReplicateRequest {
                            file_name: file_name.clone(),
                            target_transfer_addr: target,
                        },
                        timeout,
                    )
                    .await
                    .map(|_| ()),
                None => Err(SdfsError::ConnectionFailure(format!(
                    "master {master_id} of {file_name} is unknown"
                ))),
            };
            (file_name, result)
        });

        let mut failed = Vec::new();
        for (file_name, result) in join_all(calls).await {
            if let Err(e) = result {
                tracing::warn!("Pulling replica of {} failed: {}", file_name, e);
                failed.push(file_name.clone());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(SdfsError::Remote(format!(
                "replication pull failed for {}",
                failed.join(", ")
            )))
        }
    }

    /// Removes a local replica at its primary's request. Absent files are fine.
    pub async fn delete_local(&self, file_name: &str) -> Result<()> {
        validate_file_name(file_name)?;
        self.report().set_status(file_name, FileStatus::PendingDelete);
        remove_if_present(&self.ctx.dirs.sdfs.join(file_name)).await?;
        self.report().remove(file_name);
        tracing::debug!("Deleted local replica of {}", file_name);
        Ok(())
    }

    /// Serves a read on behalf of the primary from this node's replica.
    pub async fn send_to_client(&self, req: &SendRequest) -> Result<()> {
        validate_file_name(&req.file_name)?;
        let header = FrameHeader::new(
            req.transmission_id.clone(),
            req.remote_file_name.clone(),
            req.tag,
            req.mode,
        );
        send_file(
            &self.ctx.dirs.sdfs.join(&req.file_name),
            req.target_transfer_addr,
            &header,
        )
        .await?;
        Ok(())
    }

    pub fn transfer_addr(&self) -> SocketAddr {
        self.ctx.membership.local_node().transfer_addr
    }
}
