//! Primary Replica Protocol
//!
//! Operations a client (or a recovering servant) sends to the node that
//! masters a file. The node routes each one to its local `FileMaster`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::transfer::types::{ReceiverTag, WriteMode};

pub const ENDPOINT_FILE_READ: &str = "/file/read";
pub const ENDPOINT_FILE_WRITE: &str = "/file/write";
pub const ENDPOINT_FILE_WRITE_CHECK: &str = "/file/write/check";
pub const ENDPOINT_FILE_DELETE: &str = "/file/delete";
pub const ENDPOINT_FILE_REPLICATE: &str = "/file/replicate";

/// Asks the primary to stream `file_name` back to the requester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    pub file_name: String,
    /// Allocated by the requester; it watches its own tracker for this id.
    pub transmission_id: String,
    pub requester_transfer_addr: SocketAddr,
    pub local_output_name: String,
    pub tag: ReceiverTag,
    pub mode: WriteMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub transmission_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckWriteRequest {
    pub file_name: String,
    pub transmission_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub file_name: String,
    pub target_transfer_addr: SocketAddr,
}
