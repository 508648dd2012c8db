use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use super::protocol::ReadRequest;
use crate::arbiter::scheduler::{AccessArbiter, AccessKind};
use crate::cluster::membership::Membership;
use crate::cluster::types::{Node, NodeId};
use crate::config::{StorageDirs, TimeoutConfig};
use crate::error::{Result, SdfsError};
use crate::metadata::protocol::FileNameRequest;
use crate::metadata::remote::LeaderLink;
use crate::metadata::types::FileStatus;
use crate::node::protocol::{ENDPOINT_NODE_DELETE_LOCAL, ENDPOINT_NODE_SEND, SendRequest};
use crate::node::report::ReplicaReport;
use crate::rpc::{Ack, RpcClient};
use crate::transfer::progress::{TransmissionIdGenerator, TransmissionTracker};
use crate::transfer::sender::send_file;
use crate::transfer::types::{FrameHeader, ReceiverTag, WriteMode};

pub type MasterRegistry = DashMap<String, Arc<FileMaster>>;

/// Everything a file master borrows from its hosting node.
pub struct MasterContext {
    pub membership: Arc<dyn Membership>,
    pub rpc: RpcClient,
    pub leader: LeaderLink,
    pub tracker: Arc<TransmissionTracker>,
    pub ids: TransmissionIdGenerator,
    pub dirs: StorageDirs,
    pub timeouts: TimeoutConfig,
    pub report: Arc<ReplicaReport>,
    pub masters: Arc<MasterRegistry>,
}

/// Coordinator for one file this node holds the primary replica of.
pub struct FileMaster {
    file_name: String,
    arbiter: AccessArbiter,
    servants: RwLock<Vec<NodeId>>,
    ctx: Arc<MasterContext>,
}

impl FileMaster {
    pub fn new(file_name: &str, servants: Vec<NodeId>, ctx: Arc<MasterContext>) -> Arc<Self> {
        Arc::new(Self {
            file_name: file_name.to_string(),
            arbiter: AccessArbiter::new(file_name),
            servants: RwLock::new(servants),
            ctx,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn servants(&self) -> Vec<NodeId> {
        self.servants.read().clone()
    }

    pub fn update_servants(&self, servants: Vec<NodeId>) {
        *self.servants.write() = servants;
    }

    fn local_path(&self) -> PathBuf {
        self.ctx.dirs.sdfs.join(&self.file_name)
    }

    /// Servants that membership can currently resolve to an address.
    fn servant_nodes(&self) -> Vec<Node> {
        self.servants()
            .iter()
            .filter_map(|id| self.ctx.membership.node(id))
            .collect()
    }

    /// Admits a read and starts the transfer. Returns once it is dispatched;
    /// the requester learns completion from its own tracker.
    pub async fn read(self: &Arc<Self>, req: ReadRequest) -> Result<()> {
        if !tokio::fs::try_exists(self.local_path()).await.unwrap_or(false) {
            return Err(SdfsError::NotFound(format!(
                "{} has no local copy yet",
                self.file_name
            )));
        }
        let guard = self
            .arbiter
            .acquire(AccessKind::Read, self.ctx.timeouts.read())
            .await?;

        let master = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = master.serve_read(&req).await {
                tracing::warn!(
                    "Read of {} for {} failed: {}",
                    master.file_name,
                    req.transmission_id,
                    e
                );
            }
        });
        Ok(())
    }

    /// Offloads to a random servant when possible, otherwise sends directly.
    async fn serve_read(&self, req: &ReadRequest) -> Result<()> {
        let servant = self.servant_nodes().choose(&mut rand::thread_rng()).cloned();

        if let Some(servant) = servant {
            let send = SendRequest {
                file_name: self.file_name.clone(),
                transmission_id: req.transmission_id.clone(),
                target_transfer_addr: req.requester_transfer_addr,
                remote_file_name: req.local_output_name.clone(),
                tag: req.tag,
                mode: req.mode,
            };
            match self
                .ctx
                .rpc
                .post_json::<_, Ack>(servant.rpc_addr, ENDPOINT_NODE_SEND, &send, self.ctx.timeouts.read())
                .await
            {
                Ok(_) => {
                    tracing::debug!("{} served {} from servant {}", self.file_name, req.transmission_id, servant.id);
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(
                        "Servant {} could not serve {} ({}); sending from primary",
                        servant.id,
                        self.file_name,
                        e
                    );
                }
            }
        }

        let header = FrameHeader::new(
            req.transmission_id.clone(),
            req.local_output_name.clone(),
            req.tag,
            req.mode,
        );
        send_file(&self.local_path(), req.requester_transfer_addr, &header).await?;
        Ok(())
    }

    /// Admits a write and returns the transmission id the client must upload
    /// under. Fan-out to servants runs in the background, holding the
    /// admission until it finishes.
    pub async fn write(self: &Arc<Self>) -> Result<String> {
        let guard = self
            .arbiter
            .acquire(AccessKind::Write, self.ctx.timeouts.write())
            .await?;
        let transmission_id = self.ctx.ids.next_id(&self.file_name);

        let master = self.clone();
        let id = transmission_id.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let limit = master.ctx.timeouts.write();
            let outcome = match tokio::time::timeout(limit, master.execute_write(&id)).await {
                Ok(result) => result,
                Err(_) => Err(SdfsError::Timeout(format!("write {id} exceeded {limit:?}"))),
            };
            match outcome {
                Ok(()) => tracing::info!("Write {} of {} replicated", id, master.file_name),
                Err(e) => tracing::warn!("Write {} of {} failed: {}", id, master.file_name, e),
            }
        });

        Ok(transmission_id)
    }

    async fn execute_write(&self, transmission_id: &str) -> Result<()> {
        self.ctx
            .tracker
            .wait_local(transmission_id, self.ctx.timeouts.upload_wait())
            .await?;
        self.ctx.report.set_status(&self.file_name, FileStatus::Complete);

        let local = self.local_path();
        let servants = self.servant_nodes();
        let sends = servants.iter().map(|servant| {
            let header = FrameHeader::new(
                transmission_id,
                self.file_name.clone(),
                ReceiverTag::SdfsStorage,
                WriteMode::Truncate,
            );
            let local = local.clone();
            async move {
                let result = send_file(&local, servant.transfer_addr, &header).await;
                (servant.id.clone(), result)
            }
        });

        let mut first_error = None;
        for (servant, result) in join_all(sends).await {
            if let Err(e) = result {
                tracing::warn!("Replicating {} to {} failed: {}", self.file_name, servant, e);
                first_error.get_or_insert(e);
            }
        }

        // Marked either way so the client stops waiting; the error says how it went.
        self.ctx.tracker.mark_global(transmission_id);
        match first_error {
            None => Ok(()),
            Some(e) => Err(SdfsError::PartialReplicationFailure(format!(
                "{}: {}",
                self.file_name, e
            ))),
        }
    }

    pub async fn check_write_completed(&self, transmission_id: &str) -> Result<()> {
        self.ctx
            .tracker
            .wait_global(transmission_id, self.ctx.timeouts.write_check())
            .await
    }

    /// Pushes the local copy to a recovering servant.
    pub async fn replicate(&self, target: SocketAddr) -> Result<()> {
        let _guard = self
            .arbiter
            .acquire(AccessKind::Read, self.ctx.timeouts.read())
            .await?;
        let header = FrameHeader::new(
            self.ctx.ids.next_id(&self.file_name),
            self.file_name.clone(),
            ReceiverTag::SdfsStorage,
            WriteMode::Truncate,
        );
        let sent = send_file(&self.local_path(), target, &header).await?;
        tracing::info!("Replicated {} ({} bytes) to {}", self.file_name, sent, target);
        Ok(())
    }

    /// Deletes every replica. The leader stops repairing the file first; if
    /// that request fails nothing is removed.
    pub async fn delete(&self) -> Result<()> {
        let _guard = self
            .arbiter
            .acquire(AccessKind::Write, self.ctx.timeouts.delete())
            .await?;

        self.ctx.leader.request_tombstone(&self.file_name).await?;

        remove_if_present(&self.local_path()).await?;
        self.ctx
            .report
            .set_status(&self.file_name, FileStatus::PendingDelete);

        let timeout = self.ctx.timeouts.delete();
        let request = FileNameRequest::new(&self.file_name);
        let servants = self.servant_nodes();
        let deletes = servants.iter().map(|servant| {
            let request = &request;
            async move {
                let result = self
                    .ctx
                    .rpc
                    .post_json::<_, Ack>(servant.rpc_addr, ENDPOINT_NODE_DELETE_LOCAL, request, timeout)
                    .await;
                (servant.id.clone(), result)
            }
        });
        for (servant, result) in join_all(deletes).await {
            if let Err(e) = result {
                tracing::warn!(
                    "Servant {} did not delete {}; its copy is orphaned: {}",
                    servant,
                    self.file_name,
                    e
                );
            }
        }

        self.ctx.report.remove(&self.file_name);
        self.ctx.masters.remove(&self.file_name);

        self.ctx.leader.release_tombstone(&self.file_name).await?;
        tracing::info!("Deleted {} from every reachable replica", self.file_name);
        Ok(())
    }
}

pub(crate) async fn remove_if_present(path: &std::path::Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SdfsError::Io(e)),
    }
}
