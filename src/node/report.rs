use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::cluster::types::NodeId;
use crate::metadata::types::{FileInfo, FileStatus, MetadataReport};

/// The replicas this node believes it holds, keyed by file name.
pub struct ReplicaReport {
    node_id: NodeId,
    sdfs_dir: PathBuf,
    entries: RwLock<BTreeMap<String, FileInfo>>,
}

impl ReplicaReport {
    pub fn new(node_id: NodeId, sdfs_dir: PathBuf) -> Self {
        Self {
            node_id,
            sdfs_dir,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, file_name: &str) -> Option<FileInfo> {
        self.entries.read().get(file_name).cloned()
    }

    pub fn upsert(&self, mut info: FileInfo) {
        info.node_id = self.node_id.clone();
        self.entries.write().insert(info.file_name.clone(), info);
    }

    pub fn set_status(&self, file_name: &str, status: FileStatus) {
        if let Some(entry) = self.entries.write().get_mut(file_name) {
            entry.status = status;
        }
    }

    pub fn set_master(&self, file_name: &str, is_master: bool) {
        if let Some(entry) = self.entries.write().get_mut(file_name) {
            entry.is_master = is_master;
        }
    }

    pub fn remove(&self, file_name: &str) -> Option<FileInfo> {
        self.entries.write().remove(file_name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current entries, after promoting pending ones whose replica has
    /// landed on disk to `Complete`.
    pub async fn snapshot(&self) -> MetadataReport {
        let pending: Vec<String> = self
            .entries
            .read()
            .values()
            .filter(|e| {
                matches!(
                    e.status,
                    FileStatus::PendingUpload | FileStatus::WaitingReplication
                )
            })
            .map(|e| e.file_name.clone())
            .collect();

        let mut landed = Vec::new();
        for name in pending {
            if tokio::fs::try_exists(self.sdfs_dir.join(&name))
                .await
                .unwrap_or(false)
            {
                landed.push(name);
            }
        }

        let mut entries = self.entries.write();
        for name in landed {
            if let Some(entry) = entries.get_mut(&name)
                && matches!(
                    entry.status,
                    FileStatus::PendingUpload | FileStatus::WaitingReplication
                )
            {
                tracing::debug!("Replica of {} is complete on disk", name);
                entry.status = FileStatus::Complete;
            }
        }

        MetadataReport {
            node_id: self.node_id.clone(),
            entries: entries.values().cloned().collect(),
        }
    }
}
