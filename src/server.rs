//! Node assembly.
//!
//! Wires the transfer receiver, node file service, metadata service and
//! client library together and serves every HTTP capability from one router.
//! Background loops (reconciliation, tracker sweep, heartbeats) are started by
//! the caller so tests can drive cycles by hand.

use axum::{
    Json, Router,
    extract::Extension,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::client::handlers as client_handlers;
use crate::client::library::SdfsClient;
use crate::client::protocol::*;
use crate::cluster::election::LeaderElection;
use crate::cluster::membership::{ENDPOINT_HEALTH, Membership};
use crate::cluster::types::NodeId;
use crate::config::Config;
use crate::error::Result;
use crate::master::file_master::{MasterContext, MasterRegistry};
use crate::master::protocol::*;
use crate::metadata::handlers as metadata_handlers;
use crate::metadata::protocol::*;
use crate::metadata::remote::LeaderLink;
use crate::metadata::service::MetadataService;
use crate::node::handlers as node_handlers;
use crate::node::protocol::*;
use crate::node::report::ReplicaReport;
use crate::node::service::NodeFileService;
use crate::rpc::RpcClient;
use crate::transfer::progress::{TransmissionIdGenerator, TransmissionTracker};
use crate::transfer::receiver::TransferReceiver;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub node_id: NodeId,
}

/// Handles on a running node's services.
pub struct SdfsNode {
    pub metadata: Arc<MetadataService>,
    pub files: Arc<NodeFileService>,
    pub client: Arc<SdfsClient>,
    pub tracker: Arc<TransmissionTracker>,
    pub rpc_addr: SocketAddr,
    pub transfer_addr: SocketAddr,
}

async fn handle_health(
    Extension(membership): Extension<Arc<dyn Membership>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        node_id: membership.local_id(),
    })
}

pub fn build_router(
    membership: Arc<dyn Membership>,
    metadata: Arc<MetadataService>,
    files: Arc<NodeFileService>,
    client: Arc<SdfsClient>,
) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(handle_health))
        // Metadata service (answers only on the leader)
        .route(ENDPOINT_METADATA_GET, post(metadata_handlers::handle_get))
        .route(ENDPOINT_METADATA_PUT, post(metadata_handlers::handle_put))
        .route(ENDPOINT_METADATA_DELETE, post(metadata_handlers::handle_delete))
        .route(ENDPOINT_METADATA_LIST, post(metadata_handlers::handle_list))
        .route(ENDPOINT_METADATA_SEARCH, post(metadata_handlers::handle_search))
        .route(
            ENDPOINT_TOMBSTONE_REQUEST,
            post(metadata_handlers::handle_request_tombstone),
        )
        .route(
            ENDPOINT_TOMBSTONE_RELEASE,
            post(metadata_handlers::handle_release_tombstone),
        )
        // Primary replica
        .route(ENDPOINT_FILE_READ, post(node_handlers::handle_file_read))
        .route(ENDPOINT_FILE_WRITE, post(node_handlers::handle_file_write))
        .route(
            ENDPOINT_FILE_WRITE_CHECK,
            post(node_handlers::handle_file_write_check),
        )
        .route(ENDPOINT_FILE_DELETE, post(node_handlers::handle_file_delete))
        .route(
            ENDPOINT_FILE_REPLICATE,
            post(node_handlers::handle_file_replicate),
        )
        // Node file service
        .route(ENDPOINT_NODE_REPORT, post(node_handlers::handle_report))
        .route(ENDPOINT_NODE_UPDATE, post(node_handlers::handle_update))
        .route(
            ENDPOINT_NODE_DELETE_LOCAL,
            post(node_handlers::handle_delete_local),
        )
        .route(ENDPOINT_NODE_SEND, post(node_handlers::handle_send))
        // Client facade
        .route(ENDPOINT_SDFS_PUT, post(client_handlers::handle_sdfs_put))
        .route(ENDPOINT_SDFS_GET, post(client_handlers::handle_sdfs_get))
        .route(ENDPOINT_SDFS_DELETE, post(client_handlers::handle_sdfs_delete))
        .route(ENDPOINT_SDFS_LS, post(client_handlers::handle_sdfs_ls))
        .route(ENDPOINT_SDFS_SEARCH, post(client_handlers::handle_sdfs_search))
        .route(
            ENDPOINT_SDFS_FETCH_PREFIX,
            post(client_handlers::handle_sdfs_fetch_prefix),
        )
        .layer(Extension(membership))
        .layer(Extension(metadata))
        .layer(Extension(files))
        .layer(Extension(client))
}

/// Prepares storage, starts the transfer receiver and serves the router on
/// the given listeners.
pub async fn start_node(
    config: &Config,
    membership: Arc<dyn Membership>,
    election: Arc<dyn LeaderElection>,
    rpc_listener: TcpListener,
    transfer_listener: TcpListener,
) -> Result<SdfsNode> {
    let local_id = membership.local_id();
    let dirs = config.storage_dirs();
    dirs.create_all().await?;
    if config.storage.clear_on_start {
        dirs.clear_sdfs().await?;
    }

    let tracker = Arc::new(TransmissionTracker::new());
    let transfer_addr =
        TransferReceiver::new(dirs.clone(), tracker.clone()).listen(transfer_listener)?;

    let rpc = RpcClient::new();
    let leader = LeaderLink::new(
        membership.clone(),
        election.clone(),
        rpc.clone(),
        config.timeouts.metadata_query(),
    );

    let ctx = Arc::new(MasterContext {
        membership: membership.clone(),
        rpc: rpc.clone(),
        leader: leader.clone(),
        tracker: tracker.clone(),
        ids: TransmissionIdGenerator::new(format!("FM-{local_id}")),
        dirs: dirs.clone(),
        timeouts: config.timeouts.clone(),
        report: Arc::new(ReplicaReport::new(local_id.clone(), dirs.sdfs.clone())),
        masters: Arc::new(MasterRegistry::new()),
    });
    let files = NodeFileService::new(ctx);

    let metadata = MetadataService::new(
        membership.clone(),
        election,
        rpc.clone(),
        config.replication.clone(),
    );
    let client = SdfsClient::new(
        leader,
        membership.clone(),
        rpc,
        tracker.clone(),
        config.timeouts.clone(),
    );

    let app = build_router(membership, metadata.clone(), files.clone(), client.clone());
    let rpc_addr = rpc_listener.local_addr()?;
    tracing::info!("Node {} serving RPC on {}", local_id, rpc_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(rpc_listener, app).await {
            tracing::error!("RPC server stopped: {}", e);
        }
    });

    Ok(SdfsNode {
        metadata,
        files,
        client,
        tracker,
        rpc_addr,
        transfer_addr,
    })
}
