//! Node File Service Protocol
//!
//! Calls every node answers: metadata reports for the leader, pushed
//! assignments, local deletes ordered by a primary, and servant-side reads.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::transfer::types::{ReceiverTag, WriteMode};

pub const ENDPOINT_NODE_REPORT: &str = "/node/report";
pub const ENDPOINT_NODE_UPDATE: &str = "/node/update";
pub const ENDPOINT_NODE_DELETE_LOCAL: &str = "/node/delete_local";
pub const ENDPOINT_NODE_SEND: &str = "/node/send";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportRequest {}

/// A primary asking one of its servants to serve a read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub file_name: String,
    pub transmission_id: String,
    pub target_transfer_addr: SocketAddr,
    pub remote_file_name: String,
    pub tag: ReceiverTag,
    pub mode: WriteMode,
}
