//! Metadata Service Protocol
//!
//! Endpoints hosted by the leader and the request bodies they accept.
//! Replica-set answers use [`super::types::ClusterView`].

use serde::{Deserialize, Serialize};

pub const ENDPOINT_METADATA_GET: &str = "/metadata/get";
pub const ENDPOINT_METADATA_PUT: &str = "/metadata/put";
pub const ENDPOINT_METADATA_DELETE: &str = "/metadata/delete";
pub const ENDPOINT_METADATA_LIST: &str = "/metadata/list";
pub const ENDPOINT_METADATA_SEARCH: &str = "/metadata/search";
pub const ENDPOINT_TOMBSTONE_REQUEST: &str = "/metadata/tombstone/request";
pub const ENDPOINT_TOMBSTONE_RELEASE: &str = "/metadata/tombstone/release";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNameRequest {
    pub file_name: String,
}

impl FileNameRequest {
    pub fn new(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub pattern: String,
}
