use serde::Serialize;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use super::protocol::{
    ENDPOINT_TOMBSTONE_RELEASE, ENDPOINT_TOMBSTONE_REQUEST, FileNameRequest,
};
use crate::cluster::election::LeaderElection;
use crate::cluster::membership::Membership;
use crate::error::{Result, SdfsError};
use crate::rpc::{Ack, RpcClient};

/// Calls into the metadata service on whichever node currently leads.
#[derive(Clone)]
pub struct LeaderLink {
    membership: Arc<dyn Membership>,
    election: Arc<dyn LeaderElection>,
    rpc: RpcClient,
    timeout: Duration,
}

impl LeaderLink {
    pub fn new(
        membership: Arc<dyn Membership>,
        election: Arc<dyn LeaderElection>,
        rpc: RpcClient,
        timeout: Duration,
    ) -> Self {
        Self {
            membership,
            election,
            rpc,
            timeout,
        }
    }

    /// Fails fast with `LeaderUnavailable` while no leader is known.
    pub fn leader_addr(&self) -> Result<SocketAddr> {
        let leader = self.election.current_leader().ok_or_else(|| {
            SdfsError::LeaderUnavailable("election in progress".to_string())
        })?;
        self.membership
            .node(&leader)
            .map(|node| node.rpc_addr)
            .ok_or_else(|| SdfsError::LeaderUnavailable(format!("leader {leader} is not reachable")))
    }

    pub async fn call<T, R>(&self, endpoint: &str, payload: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let addr = self.leader_addr()?;
        self.rpc.post_json(addr, endpoint, payload, self.timeout).await
    }

    pub async fn request_tombstone(&self, file_name: &str) -> Result<()> {
        let _: Ack = self
            .call(ENDPOINT_TOMBSTONE_REQUEST, &FileNameRequest::new(file_name))
            .await?;
        Ok(())
    }

    pub async fn release_tombstone(&self, file_name: &str) -> Result<()> {
        let _: Ack = self
            .call(ENDPOINT_TOMBSTONE_RELEASE, &FileNameRequest::new(file_name))
            .await?;
        Ok(())
    }
}
