use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::membership::Membership;
use crate::cluster::types::{Node, NodeId};
use crate::config::TimeoutConfig;
use crate::error::{Result, SdfsError};
use crate::master::protocol::{
    CheckWriteRequest, ENDPOINT_FILE_DELETE, ENDPOINT_FILE_READ, ENDPOINT_FILE_WRITE,
    ENDPOINT_FILE_WRITE_CHECK, ReadRequest, WriteResponse,
};
use crate::metadata::protocol::{
    ENDPOINT_METADATA_DELETE, ENDPOINT_METADATA_GET, ENDPOINT_METADATA_LIST,
    ENDPOINT_METADATA_PUT, ENDPOINT_METADATA_SEARCH, FileNameRequest, SearchRequest,
};
use crate::metadata::remote::LeaderLink;
use crate::metadata::types::{ClusterView, FileStatus};
use crate::rpc::{Ack, RpcClient};
use crate::transfer::progress::{TransmissionIdGenerator, TransmissionTracker};
use crate::transfer::sender::send_file;
use crate::transfer::types::{FrameHeader, ReceiverTag, WriteMode};

/// Rounds a GET waits for a master that is still receiving its upload.
const UPLOAD_IN_PROGRESS_RETRIES: u32 = 5;
const UPLOAD_IN_PROGRESS_BACKOFF: Duration = Duration::from_secs(1);

/// Drives GET/PUT/DELETE/LIST/SEARCH from this node.
///
/// Files fetched here arrive through this node's own transfer receiver, so
/// completion is observed on the local tracker.
pub struct SdfsClient {
    leader: LeaderLink,
    membership: Arc<dyn Membership>,
    rpc: RpcClient,
    tracker: Arc<TransmissionTracker>,
    ids: TransmissionIdGenerator,
    timeouts: TimeoutConfig,
}

impl SdfsClient {
    pub fn new(
        leader: LeaderLink,
        membership: Arc<dyn Membership>,
        rpc: RpcClient,
        tracker: Arc<TransmissionTracker>,
        timeouts: TimeoutConfig,
    ) -> Arc<Self> {
        let ids = TransmissionIdGenerator::new(format!("CL-{}", membership.local_id()));
        Arc::new(Self {
            leader,
            membership,
            rpc,
            tracker,
            ids,
            timeouts,
        })
    }

    fn margin(&self, d: Duration) -> Duration {
        d + self.timeouts.metadata_query()
    }

    fn resolve(&self, node_id: &NodeId) -> Result<Node> {
        self.membership.node(node_id).ok_or_else(|| {
            SdfsError::ConnectionFailure(format!("node {node_id} is not a known member"))
        })
    }

    fn master_of(view: &ClusterView) -> Result<NodeId> {
        view.master
            .as_ref()
            .map(|m| m.node_id.clone())
            .ok_or_else(|| SdfsError::NotFound(format!("{} has no master", view.file_name)))
    }

    async fn query(&self, endpoint: &str, file_name: &str) -> Result<ClusterView> {
        if file_name.is_empty() {
            return Err(SdfsError::InvalidArgument("file name is empty".to_string()));
        }
        self.leader
            .call(endpoint, &FileNameRequest::new(file_name))
            .await
    }

    pub async fn list(&self, sdfs_name: &str) -> Result<ClusterView> {
        self.query(ENDPOINT_METADATA_LIST, sdfs_name).await
    }

    pub async fn search(&self, pattern: &str) -> Result<Vec<String>> {
        if pattern.is_empty() {
            return Err(SdfsError::InvalidArgument("empty search pattern".to_string()));
        }
        self.leader
            .call(
                ENDPOINT_METADATA_SEARCH,
                &SearchRequest {
                    pattern: pattern.to_string(),
                },
            )
            .await
    }

    /// Fetches `sdfs_name` into `local_name` under the tag's directory,
    /// replacing whatever was there.
    pub async fn get(&self, sdfs_name: &str, local_name: &str, tag: ReceiverTag) -> Result<()> {
        self.fetch(sdfs_name, local_name, tag, WriteMode::Truncate)
            .await
    }

    async fn fetch(
        &self,
        sdfs_name: &str,
        local_name: &str,
        tag: ReceiverTag,
        mode: WriteMode,
    ) -> Result<()> {
        if local_name.is_empty() {
            return Err(SdfsError::InvalidArgument("local file name is empty".to_string()));
        }

        let mut retries = UPLOAD_IN_PROGRESS_RETRIES;
        let master_id = loop {
            let view = self.query(ENDPOINT_METADATA_GET, sdfs_name).await?;
            let master = view
                .master
                .as_ref()
                .ok_or_else(|| SdfsError::NotFound(format!("{sdfs_name} has no master")))?;
            if master.status == FileStatus::Complete {
                break master.node_id.clone();
            }
            if retries == 0 {
                return Err(SdfsError::Timeout(format!(
                    "{sdfs_name} is still being uploaded; retry later"
                )));
            }
            retries -= 1;
            tokio::time::sleep(UPLOAD_IN_PROGRESS_BACKOFF).await;
        };

        let master = self.resolve(&master_id)?;
        let transmission_id = self.ids.next_id(sdfs_name);
        let request = ReadRequest {
            file_name: sdfs_name.to_string(),
            transmission_id: transmission_id.clone(),
            requester_transfer_addr: self.membership.local_node().transfer_addr,
            local_output_name: local_name.to_string(),
            tag,
            mode,
        };
        let _: Ack = self
            .rpc
            .post_json(
                master.rpc_addr,
                ENDPOINT_FILE_READ,
                &request,
                self.margin(self.timeouts.read()),
            )
            .await?;

        self.tracker
            .wait_local(&transmission_id, self.timeouts.get_wait())
            .await?;
        tracing::info!("Fetched {} into {} ({:?})", sdfs_name, local_name, tag);
        Ok(())
    }

    /// Uploads `local_path` as `sdfs_name` and waits until every servant
    /// has a copy.
    pub async fn put(&self, local_path: &Path, sdfs_name: &str) -> Result<ClusterView> {
        if sdfs_name.is_empty() {
            return Err(SdfsError::InvalidArgument("file name is empty".to_string()));
        }
        let is_file = tokio::fs::metadata(local_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(SdfsError::NotFound(format!(
                "{} is not a readable file",
                local_path.display()
            )));
        }

        let view = self.query(ENDPOINT_METADATA_PUT, sdfs_name).await?;
        let master = self.resolve(&Self::master_of(&view)?)?;

        let WriteResponse { transmission_id } = self
            .rpc
            .post_json(
                master.rpc_addr,
                ENDPOINT_FILE_WRITE,
                &FileNameRequest::new(sdfs_name),
                self.margin(self.timeouts.write()),
            )
            .await?;

        let header = FrameHeader::new(
            transmission_id.clone(),
            sdfs_name,
            ReceiverTag::SdfsStorage,
            WriteMode::Truncate,
        );
        send_file(local_path, master.transfer_addr, &header).await?;

        let _: Ack = self
            .rpc
            .post_json(
                master.rpc_addr,
                ENDPOINT_FILE_WRITE_CHECK,
                &CheckWriteRequest {
                    file_name: sdfs_name.to_string(),
                    transmission_id,
                },
                self.margin(self.timeouts.write_check()),
            )
            .await?;

        tracing::info!("Stored {} as {}", local_path.display(), sdfs_name);
        Ok(view)
    }

    pub async fn delete(&self, sdfs_name: &str) -> Result<()> {
        let view = self.query(ENDPOINT_METADATA_DELETE, sdfs_name).await?;
        let master = self.resolve(&Self::master_of(&view)?)?;

        let _: Ack = self
            .rpc
            .post_json(
                master.rpc_addr,
                ENDPOINT_FILE_DELETE,
                &FileNameRequest::new(sdfs_name),
                self.margin(self.timeouts.delete() * 2),
            )
            .await?;
        tracing::info!("Deleted {}", sdfs_name);
        Ok(())
    }

    /// Appends each file, in order, to `local_name`.
    pub async fn fetch_and_concat(
        &self,
        sdfs_names: &[String],
        local_name: &str,
        tag: ReceiverTag,
    ) -> Result<()> {
        for name in sdfs_names {
            self.fetch(name, local_name, tag, WriteMode::Append).await?;
        }
        Ok(())
    }

    /// Appends every file whose name starts with `prefix`, in name order.
    pub async fn fetch_and_concat_with_prefix(
        &self,
        prefix: &str,
        local_name: &str,
        tag: ReceiverTag,
    ) -> Result<Vec<String>> {
        let pattern = prefix_pattern(prefix)?;
        let names = self.search(&pattern).await?;
        self.fetch_and_concat(&names, local_name, tag).await?;
        Ok(names)
    }
}

/// `^{prefix}.*`, rejecting an empty prefix or one that is not a valid regex.
pub fn prefix_pattern(prefix: &str) -> Result<String> {
    if prefix.is_empty() {
        return Err(SdfsError::InvalidArgument("empty prefix".to_string()));
    }
    let pattern = format!("^{prefix}.*");
    Regex::new(&pattern)
        .map_err(|_| SdfsError::InvalidArgument(format!("illegal regex character in {prefix:?}")))?;
    Ok(pattern)
}
