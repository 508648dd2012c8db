use axum::{Json, extract::Extension};
use std::sync::Arc;

use super::library::SdfsClient;
use super::protocol::{FetchPrefixRequest, GetFileRequest, PutFileRequest};
use crate::error::SdfsError;
use crate::metadata::protocol::{FileNameRequest, SearchRequest};
use crate::metadata::types::ClusterView;
use crate::rpc::Ack;
use crate::transfer::types::ReceiverTag;

pub async fn handle_sdfs_put(
    Extension(client): Extension<Arc<SdfsClient>>,
    Json(req): Json<PutFileRequest>,
) -> Result<Json<ClusterView>, SdfsError> {
    client.put(&req.local_path, &req.sdfs_name).await.map(Json)
}

pub async fn handle_sdfs_get(
    Extension(client): Extension<Arc<SdfsClient>>,
    Json(req): Json<GetFileRequest>,
) -> Result<Json<Ack>, SdfsError> {
    let tag = req.tag.unwrap_or(ReceiverTag::ClientLocal);
    client.get(&req.sdfs_name, &req.local_name, tag).await?;
    Ok(Json(Ack::ok()))
}

pub async fn handle_sdfs_delete(
    Extension(client): Extension<Arc<SdfsClient>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<Ack>, SdfsError> {
    client.delete(&req.file_name).await?;
    Ok(Json(Ack::ok()))
}

pub async fn handle_sdfs_ls(
    Extension(client): Extension<Arc<SdfsClient>>,
    Json(req): Json<FileNameRequest>,
) -> Result<Json<ClusterView>, SdfsError> {
    client.list(&req.file_name).await.map(Json)
}

pub async fn handle_sdfs_search(
    Extension(client): Extension<Arc<SdfsClient>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<String>>, SdfsError> {
    client.search(&req.pattern).await.map(Json)
}

pub async fn handle_sdfs_fetch_prefix(
    Extension(client): Extension<Arc<SdfsClient>>,
    Json(req): Json<FetchPrefixRequest>,
) -> Result<Json<Vec<String>>, SdfsError> {
    let tag = req.tag.unwrap_or(ReceiverTag::ClientLocal);
    client
        .fetch_and_concat_with_prefix(&req.prefix, &req.local_name, tag)
        .await
        .map(Json)
}
