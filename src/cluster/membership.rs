use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::types::{Node, NodeId, NodeState};
use crate::config::ClusterConfig;

pub const ENDPOINT_HEALTH: &str = "/health";

/// Source of truth for which nodes are reachable.
pub trait Membership: Send + Sync + 'static {
    fn local_node(&self) -> Node;

    /// Alive members, the local node included.
    fn alive_members(&self) -> Vec<Node>;

    /// Looks up any known member regardless of state.
    fn node(&self, id: &NodeId) -> Option<Node>;

    fn local_id(&self) -> NodeId {
        self.local_node().id
    }

    /// False while the view is still converging after startup.
    fn is_settled(&self) -> bool {
        true
    }
}

/// Membership over a configured peer list, kept fresh by HTTP health probes.
///
/// A peer that stops answering moves Alive -> Suspect after
/// `suspect_timeout` and Suspect -> Dead after `dead_timeout`; any successful
/// probe brings it straight back to Alive.
pub struct HeartbeatMembership {
    local: Node,
    members: Arc<DashMap<NodeId, Node>>,
    http_client: reqwest::Client,
    interval: Duration,
    suspect_timeout: Duration,
    dead_timeout: Duration,
    settled: AtomicBool,
}

impl HeartbeatMembership {
    pub fn new(local: Node, config: &ClusterConfig) -> Arc<Self> {
        let members = Arc::new(DashMap::new());
        for peer in &config.peers {
            let id = NodeId(peer.id.clone());
            if id == local.id {
                continue;
            }
            members.insert(
                id.clone(),
                Node {
                    id,
                    rpc_addr: peer.rpc_addr,
                    transfer_addr: peer.transfer_addr,
                    // Unknown until the first probe answers.
                    state: NodeState::Suspect,
                    last_seen: Some(Instant::now()),
                },
            );
        }

        Arc::new(Self {
            local,
            members,
            http_client: reqwest::Client::new(),
            interval: Duration::from_millis(config.heartbeat_interval_ms),
            suspect_timeout: Duration::from_millis(config.suspect_timeout_ms),
            dead_timeout: Duration::from_millis(config.dead_timeout_ms),
            settled: AtomicBool::new(config.peers.is_empty()),
        })
    }

    pub async fn start(self: Arc<Self>) {
        tracing::info!(
            "Starting heartbeat membership with {} peer(s)",
            self.members.len()
        );
        let service = self.clone();
        tokio::spawn(async move {
            service.probe_loop().await;
        });
    }

    async fn probe_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;

            let peers: Vec<Node> = self
                .members
                .iter()
                .map(|entry| entry.value().clone())
                .collect();

            let probes = peers.into_iter().map(|peer| {
                let client = self.http_client.clone();
                let timeout = self.interval;
                async move {
                    let url = format!("http://{}{}", peer.rpc_addr, ENDPOINT_HEALTH);
                    let ok = matches!(
                        client.get(url).timeout(timeout).send().await,
                        Ok(resp) if resp.status().is_success()
                    );
                    (peer.id, ok)
                }
            });

            let results = futures::future::join_all(probes).await;
            let now = Instant::now();
            for (id, ok) in results {
                self.record_probe(&id, ok, now);
            }

            if !self.settled.swap(true, Ordering::AcqRel) {
                tracing::info!(
                    "Membership settled: {} alive node(s)",
                    self.alive_members().len()
                );
            }
        }
    }

    fn record_probe(&self, id: &NodeId, ok: bool, now: Instant) {
        let Some(mut member) = self.members.get_mut(id) else {
            return;
        };

        if ok {
            if member.state != NodeState::Alive {
                tracing::info!("Node {} at {} is alive", member.id, member.rpc_addr);
            }
            member.state = NodeState::Alive;
            member.last_seen = Some(now);
            return;
        }

        let elapsed = member
            .last_seen
            .map(|seen| now.duration_since(seen))
            .unwrap_or_default();

        match member.state {
            NodeState::Alive if elapsed > self.suspect_timeout => {
                tracing::warn!("Node {} suspected (no contact for {:?})", member.id, elapsed);
                member.state = NodeState::Suspect;
            }
            NodeState::Suspect if elapsed > self.dead_timeout => {
                tracing::warn!("Node {} declared dead (no contact for {:?})", member.id, elapsed);
                member.state = NodeState::Dead;
            }
            _ => {}
        }
    }
}

impl Membership for HeartbeatMembership {
    fn local_node(&self) -> Node {
        self.local.clone()
    }

    fn alive_members(&self) -> Vec<Node> {
        let mut alive: Vec<Node> = self
            .members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect();
        alive.push(self.local.clone());
        alive.sort_by(|a, b| a.id.cmp(&b.id));
        alive
    }

    /// True once every peer has been probed at least once.
    fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    fn node(&self, id: &NodeId) -> Option<Node> {
        if *id == self.local.id {
            return Some(self.local.clone());
        }
        self.members.get(id).map(|entry| entry.value().clone())
    }
}
