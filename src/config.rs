//! Node configuration.
//!
//! Values are layered with `figment`: built-in defaults, then an optional TOML
//! file, then `SDFS_`-prefixed environment variables (`__` separates sections,
//! e.g. `SDFS_REPLICATION__FACTOR=4`). Components treat these values as opaque
//! inputs and never reinterpret them.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SdfsError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub cluster: ClusterConfig,
    pub storage: StorageConfig,
    pub replication: ReplicationConfig,
    pub timeouts: TimeoutConfig,
    pub tracker: TrackerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Stable node identity. Generated at startup when empty.
    pub id: String,
    /// HTTP listener for every RPC capability (metadata, file, node, client).
    pub rpc_addr: SocketAddr,
    /// TCP listener for the transfer protocol.
    pub transfer_addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: String,
    pub rpc_addr: SocketAddr,
    pub transfer_addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub peers: Vec<PeerConfig>,
    pub heartbeat_interval_ms: u64,
    pub suspect_timeout_ms: u64,
    pub dead_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub sdfs_subdir: String,
    pub local_subdir: String,
    pub job_input_subdir: String,
    pub job_output_subdir: String,
    /// Wipe the replica directory at startup; replicas of a restarted node are
    /// considered lost and get re-replicated by reconciliation.
    pub clear_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    pub factor: usize,
    pub reconcile_period_ms: u64,
    pub report_collection_timeout_ms: u64,
    pub push_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub metadata_query_secs: u64,
    pub read_secs: u64,
    pub write_secs: u64,
    pub delete_secs: u64,
    pub upload_wait_secs: u64,
    pub write_check_secs: u64,
    pub get_wait_secs: u64,
    pub replicate_pull_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `pretty` or `json`.
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                id: String::new(),
                rpc_addr: SocketAddr::from(([127, 0, 0, 1], 7000)),
                transfer_addr: SocketAddr::from(([127, 0, 0, 1], 7100)),
            },
            cluster: ClusterConfig {
                peers: Vec::new(),
                heartbeat_interval_ms: 1000,
                suspect_timeout_ms: 5000,
                dead_timeout_ms: 10_000,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("./sdfs-data"),
                sdfs_subdir: "sdfs".to_string(),
                local_subdir: "local".to_string(),
                job_input_subdir: "job_input".to_string(),
                job_output_subdir: "job_output".to_string(),
                clear_on_start: true,
            },
            replication: ReplicationConfig {
                factor: 4,
                reconcile_period_ms: 2000,
                report_collection_timeout_ms: 2000,
                push_timeout_ms: 60_000,
            },
            timeouts: TimeoutConfig {
                metadata_query_secs: 10,
                read_secs: 120,
                write_secs: 240,
                delete_secs: 60,
                upload_wait_secs: 120,
                write_check_secs: 300,
                get_wait_secs: 180,
                replicate_pull_secs: 60,
            },
            tracker: TrackerConfig {
                retention_secs: 600,
                sweep_interval_secs: 30,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "pretty".to_string(),
            },
        }
    }
}

impl Config {
    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file_exact(path));
        }
        figment
            .merge(Env::prefixed("SDFS_").split("__"))
            .extract()
            .map_err(|e| SdfsError::InvalidArgument(format!("bad configuration: {e}")))
    }

    pub fn storage_dirs(&self) -> StorageDirs {
        let root = &self.storage.data_dir;
        StorageDirs {
            sdfs: root.join(&self.storage.sdfs_subdir),
            local: root.join(&self.storage.local_subdir),
            job_input: root.join(&self.storage.job_input_subdir),
            job_output: root.join(&self.storage.job_output_subdir),
        }
    }
}

impl ReplicationConfig {
    pub fn reconcile_period(&self) -> Duration {
        Duration::from_millis(self.reconcile_period_ms)
    }

    pub fn collection_timeout(&self) -> Duration {
        Duration::from_millis(self.report_collection_timeout_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

impl TimeoutConfig {
    pub fn metadata_query(&self) -> Duration {
        Duration::from_secs(self.metadata_query_secs)
    }
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }
    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }
    pub fn upload_wait(&self) -> Duration {
        Duration::from_secs(self.upload_wait_secs)
    }
    pub fn write_check(&self) -> Duration {
        Duration::from_secs(self.write_check_secs)
    }
    pub fn get_wait(&self) -> Duration {
        Duration::from_secs(self.get_wait_secs)
    }
    pub fn replicate_pull(&self) -> Duration {
        Duration::from_secs(self.replicate_pull_secs)
    }
}

/// Destination directory for each receiver tag.
#[derive(Debug, Clone)]
pub struct StorageDirs {
    pub sdfs: PathBuf,
    pub local: PathBuf,
    pub job_input: PathBuf,
    pub job_output: PathBuf,
}

impl StorageDirs {
    /// Every directory rooted at `root`, using the default subdirectory names.
    pub fn under(root: &Path) -> Self {
        Self {
            sdfs: root.join("sdfs"),
            local: root.join("local"),
            job_input: root.join("job_input"),
            job_output: root.join("job_output"),
        }
    }

    pub async fn create_all(&self) -> Result<()> {
        for dir in [&self.sdfs, &self.local, &self.job_input, &self.job_output] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Removes every regular file in the replica directory.
    pub async fn clear_sdfs(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.sdfs).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_extract() {
        let config = Config::load(None).expect("defaults must extract");
        assert_eq!(config.replication.factor, 4);
        assert_eq!(config.timeouts.metadata_query(), Duration::from_secs(10));
    }

    #[test]
    fn test_storage_dirs_follow_data_dir() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/tmp/node-a");
        let dirs = config.storage_dirs();
        assert_eq!(dirs.sdfs, PathBuf::from("/tmp/node-a/sdfs"));
        assert_eq!(dirs.job_output, PathBuf::from("/tmp/node-a/job_output"));
    }

    #[tokio::test]
    async fn test_clear_sdfs_keeps_other_dirs() {
        let root = tempfile::tempdir().unwrap();
        let dirs = StorageDirs::under(root.path());
        dirs.create_all().await.unwrap();
        tokio::fs::write(dirs.sdfs.join("a.txt"), b"a").await.unwrap();
        tokio::fs::write(dirs.local.join("b.txt"), b"b").await.unwrap();

        dirs.clear_sdfs().await.unwrap();

        assert!(!dirs.sdfs.join("a.txt").exists());
        assert!(dirs.local.join("b.txt").exists());
    }
}
