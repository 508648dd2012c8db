use axum::{Json, extract::Extension};
use std::sync::Arc;

use super::protocol::{ReportRequest, SendRequest};
use super::service::NodeFileService;
use crate::error::SdfsError;
use crate::master::protocol::{CheckWriteRequest, ReadRequest, ReplicateRequest, WriteResponse};
use crate::metadata::protocol::FileNameRequest;
use crate::metadata::types::{MetadataReport, NodeToFiles};
use crate::rpc::Ack;

// --- Node endpoints ---

pub async fn handle_report(
    Extension(node): Extension<Arc<NodeFileService>>,
    Json(_req): Json<ReportRequest>,
) -> Json<MetadataReport> {
    Json(node.report_metadata().await)
}

pub async fn handle_update(
    Extension(node): Extension<Arc<NodeFileService>>,
    Json(node_files): Json<NodeToFiles>,
) -> Result<Json<Ack>, SdfsError> {
    node.update_metadata(&node_files).await?;
    Ok(Json(Ack::ok()))
}

pub async fn handle_delete_local(
    Extension(node): Extension<Arc<NodeFileService>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<Ack>, SdfsError> {
    node.delete_local(&req.file_name).await?;
    Ok(Json(Ack::ok()))
}

pub async fn handle_send(
    Extension(node): Extension<Arc<NodeFileService>>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Ack>, SdfsError> {
    node.send_to_client(&req).await?;
    Ok(Json(Ack::ok()))
}

// --- Primary replica endpoints, routed to the local file master ---

pub async fn handle_file_read(
    Extension(node): Extension<Arc<NodeFileService>>,
    Json(req): Json<ReadRequest>,
) -> Result<Json<Ack>, SdfsError> {
    let master = node.master(&req.file_name)?;
    master.read(req).await?;
    Ok(Json(Ack::ok()))
}

pub async fn handle_file_write(
    Extension(node): Extension<Arc<NodeFileService>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<WriteResponse>, SdfsError> {
    let master = node.master(&req.file_name)?;
    let transmission_id = master.write().await?;
    Ok(Json(WriteResponse { transmission_id }))
}

pub async fn handle_file_write_check(
    Extension(node): Extension<Arc<NodeFileService>>,
    Json(req): Json<CheckWriteRequest>,
) -> Result<Json<Ack>, SdfsError> {
    let master = node.master(&req.file_name)?;
    master.check_write_completed(&req.transmission_id).await?;
    Ok(Json(Ack::ok()))
}

pub async fn handle_file_delete(
    Extension(node): Extension<Arc<NodeFileService>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<Ack>, SdfsError> {
    let master = node.master(&req.file_name)?;
    master.delete().await?;
    Ok(Json(Ack::ok()))
}

pub async fn handle_file_replicate(
    Extension(node): Extension<Arc<NodeFileService>>,
    Json(req): Json<ReplicateRequest>,
) -> Result<Json<Ack>, SdfsError> {
    let master = node.master(&req.file_name)?;
    master.replicate(req.target_transfer_addr).await?;
    Ok(Json(Ack::ok()))
}
