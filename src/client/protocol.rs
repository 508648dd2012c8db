//! Client Facade Protocol
//!
//! Endpoints through which the `sdfs` command line asks a node to run a
//! client operation on its behalf. Local paths are resolved on that node.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transfer::types::ReceiverTag;

pub const ENDPOINT_SDFS_PUT: &str = "/sdfs/put";
pub const ENDPOINT_SDFS_GET: &str = "/sdfs/get";
pub const ENDPOINT_SDFS_DELETE: &str = "/sdfs/delete";
pub const ENDPOINT_SDFS_LS: &str = "/sdfs/ls";
pub const ENDPOINT_SDFS_SEARCH: &str = "/sdfs/search";
pub const ENDPOINT_SDFS_FETCH_PREFIX: &str = "/sdfs/fetch_prefix";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutFileRequest {
    pub local_path: PathBuf,
    pub sdfs_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileRequest {
    pub sdfs_name: String,
    pub local_name: String,
    /// Defaults to the node's local-files directory.
    #[serde(default)]
    pub tag: Option<ReceiverTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchPrefixRequest {
    pub prefix: String,
    pub local_name: String,
    #[serde(default)]
    pub tag: Option<ReceiverTag>,
}
