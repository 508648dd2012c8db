use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::cluster::types::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    /// Master waiting for the client upload.
    PendingUpload,
    /// Servant waiting for a copy from its master.
    WaitingReplication,
    Complete,
    /// The master is executing a delete.
    PendingDelete,
}

/// One replica of one file on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_name: String,
    pub node_id: NodeId,
    pub is_master: bool,
    pub status: FileStatus,
}

impl FileInfo {
    pub fn master(file_name: &str, node_id: NodeId, status: FileStatus) -> Self {
        Self {
            file_name: file_name.to_string(),
            node_id,
            is_master: true,
            status,
        }
    }

    pub fn servant(file_name: &str, node_id: NodeId, status: FileStatus) -> Self {
        Self {
            file_name: file_name.to_string(),
            node_id,
            is_master: false,
            status,
        }
    }
}

/// The replica set of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub file_name: String,
    pub master: Option<FileInfo>,
    /// Ordered by node id, never two entries for the same node.
    pub servants: Vec<FileInfo>,
}

impl ClusterInfo {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            master: None,
            servants: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        usize::from(self.master.is_some()) + self.servants.len()
    }

    /// Master first, then servants.
    pub fn members(&self) -> impl Iterator<Item = &FileInfo> {
        self.master.iter().chain(self.servants.iter())
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.members().any(|info| &info.node_id == node_id)
    }

    pub fn servant_ids(&self) -> Vec<NodeId> {
        self.servants.iter().map(|s| s.node_id.clone()).collect()
    }

    pub fn is_pending_delete(&self) -> bool {
        self.members().any(|info| info.status == FileStatus::PendingDelete)
    }

    /// Adds `info` as the master, or as a servant when a master is already
    /// present. Returns false if the node is already a member.
    pub fn insert(&mut self, mut info: FileInfo) -> bool {
        if self.contains(&info.node_id) {
            return false;
        }
        if info.is_master && self.master.is_none() {
            self.master = Some(info);
            return true;
        }
        info.is_master = false;
        let pos = self
            .servants
            .binary_search_by(|s| s.node_id.cmp(&info.node_id))
            .unwrap_or_else(|pos| pos);
        self.servants.insert(pos, info);
        true
    }

    /// Promotes the lowest-ordered Complete servant. Returns the new master's id.
    pub fn promote_servant(&mut self) -> Option<NodeId> {
        if self.master.is_some() {
            return None;
        }
        let pos = self
            .servants
            .iter()
            .position(|s| s.status == FileStatus::Complete)?;
        let mut promoted = self.servants.remove(pos);
        promoted.is_master = true;
        let id = promoted.node_id.clone();
        self.master = Some(promoted);
        Some(id)
    }
}

/// What a caller sees of a replica set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterView {
    pub file_name: String,
    pub master: Option<FileInfo>,
    pub servants: Vec<FileInfo>,
}

impl From<&ClusterInfo> for ClusterView {
    fn from(cluster: &ClusterInfo) -> Self {
        Self {
            file_name: cluster.file_name.clone(),
            master: cluster.master.clone(),
            servants: cluster.servants.clone(),
        }
    }
}

/// node -> file -> replica, the shape reports arrive in and assignments are pushed in.
pub type NodeToFiles = BTreeMap<NodeId, BTreeMap<String, FileInfo>>;

/// Replicas held by one node, as reported to the leader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataReport {
    pub node_id: NodeId,
    pub entries: Vec<FileInfo>,
}

/// file -> replica set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndex(pub BTreeMap<String, ClusterInfo>);

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file_name: &str) -> Option<&ClusterInfo> {
        self.0.get(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.0.contains_key(file_name)
    }

    pub fn insert(&mut self, cluster: ClusterInfo) {
        self.0.insert(cluster.file_name.clone(), cluster);
    }

    pub fn remove(&mut self, file_name: &str) -> Option<ClusterInfo> {
        self.0.remove(file_name)
    }

    pub fn file_names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &ClusterInfo> {
        self.0.values()
    }

    pub fn clusters_mut(&mut self) -> impl Iterator<Item = &mut ClusterInfo> {
        self.0.values_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Groups per-node entries by file. A second master claim for the same
    /// file is kept as a servant.
    pub fn from_node_files(node_files: &NodeToFiles) -> Self {
        let mut index = FileIndex::new();
        for (node_id, files) in node_files {
            for (file_name, info) in files {
                let mut info = info.clone();
                info.node_id = node_id.clone();
                let cluster = index
                    .0
                    .entry(file_name.clone())
                    .or_insert_with(|| ClusterInfo::new(file_name.clone()));
                if info.is_master && cluster.master.is_some() {
                    tracing::warn!(
                        "Multiple masters claimed for {}; keeping {:?}, demoting {}",
                        file_name,
                        cluster.master.as_ref().map(|m| &m.node_id),
                        node_id
                    );
                }
                cluster.insert(info);
            }
        }
        index
    }

    pub fn to_node_files(&self) -> NodeToFiles {
        let mut node_files = NodeToFiles::new();
        for (file_name, cluster) in &self.0 {
            for info in cluster.members() {
                node_files
                    .entry(info.node_id.clone())
                    .or_default()
                    .insert(file_name.clone(), info.clone());
            }
        }
        node_files
    }

    /// Compiles node reports, leaving out tombstoned names.
    pub fn from_reports(reports: &[MetadataReport], tombstones: &BTreeSet<String>) -> Self {
        let mut node_files = NodeToFiles::new();
        for report in reports {
            let files = node_files.entry(report.node_id.clone()).or_default();
            for entry in &report.entries {
                if tombstones.contains(&entry.file_name) {
                    continue;
                }
                files.insert(entry.file_name.clone(), entry.clone());
            }
        }
        Self::from_node_files(&node_files)
    }

    /// How many files each node hosts in this index.
    pub fn load_by_node(&self) -> BTreeMap<NodeId, usize> {
        let mut load = BTreeMap::new();
        for cluster in self.0.values() {
            for info in cluster.members() {
                *load.entry(info.node_id.clone()).or_insert(0) += 1;
            }
        }
        load
    }
}
