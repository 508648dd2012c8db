use axum::{Json, extract::Extension};
use std::sync::Arc;

use super::protocol::{FileNameRequest, SearchRequest};
use super::service::MetadataService;
use super::types::ClusterView;
use crate::error::SdfsError;
use crate::rpc::Ack;

pub async fn handle_get(
    Extension(service): Extension<Arc<MetadataService>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<ClusterView>, SdfsError> {
    service.get(&req.file_name).await.map(Json)
}

pub async fn handle_put(
    Extension(service): Extension<Arc<MetadataService>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<ClusterView>, SdfsError> {
    service.put(&req.file_name).await.map(Json)
}

pub async fn handle_delete(
    Extension(service): Extension<Arc<MetadataService>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<ClusterView>, SdfsError> {
    service.delete(&req.file_name).await.map(Json)
}

pub async fn handle_list(
    Extension(service): Extension<Arc<MetadataService>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<ClusterView>, SdfsError> {
    service.list(&req.file_name).await.map(Json)
}

pub async fn handle_search(
    Extension(service): Extension<Arc<MetadataService>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<String>>, SdfsError> {
    service.search(&req.pattern).await.map(Json)
}

pub async fn handle_request_tombstone(
    Extension(service): Extension<Arc<MetadataService>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<Ack>, SdfsError> {
    service.request_tombstone(&req.file_name).await?;
    Ok(Json(Ack::ok()))
}

pub async fn handle_release_tombstone(
    Extension(service): Extension<Arc<MetadataService>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<Ack>, SdfsError> {
    service.release_tombstone(&req.file_name).await?;
    Ok(Json(Ack::ok()))
}
