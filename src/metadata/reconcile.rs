use futures::future::join_all;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

use super::service::{MetadataService, least_loaded};
use super::types::{FileIndex, FileInfo, FileStatus, MetadataReport};
use crate::cluster::types::{Node, NodeId};
use crate::node::protocol::{ENDPOINT_NODE_REPORT, ReportRequest};

/// What one reconciliation cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub reports: usize,
    pub files: usize,
    pub promoted: usize,
    pub recruited: usize,
    pub orphaned: usize,
    pub pushes_failed: usize,
}

impl MetadataService {
    /// Spawns the periodic collect/repair/push loop. Cycles only run while
    /// this node leads.
    pub async fn start(self: Arc<Self>) {
        let period = self.replication.reconcile_period();
        tracing::info!("Starting reconciliation loop every {:?}", period);

        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !service.is_leader() {
                    continue;
                }
                let summary = service.reconcile_once().await;
                if summary.promoted + summary.recruited + summary.orphaned > 0 {
                    tracing::info!(
                        "Reconciled {} file(s) from {} report(s): {} promoted, {} recruited, {} orphaned",
                        summary.files,
                        summary.reports,
                        summary.promoted,
                        summary.recruited,
                        summary.orphaned
                    );
                }
            }
        });
    }

    /// One full cycle: collect reports, rebuild, repair, persist, push.
    pub async fn reconcile_once(&self) -> CycleSummary {
        self.recent_puts.lock().clear();
        self.recent_deletes.lock().clear();

        let reports = self.collect_reports().await;
        let tombstones = self.tombstone_snapshot();
        let mut index = FileIndex::from_reports(&reports, &tombstones);

        let reporters: Vec<NodeId> = reports.iter().map(|r| r.node_id.clone()).collect();
        let mut summary = CycleSummary {
            reports: reports.len(),
            ..CycleSummary::default()
        };
        self.check_and_repair(&mut index, &reporters, &mut summary);

        {
            let mut metadata = self.metadata.write().await;
            // Reports collected before a delete finished still list the file.
            for name in self.recent_deletes.lock().iter() {
                index.remove(name);
            }
            let carried: Vec<String> = self
                .recent_puts
                .lock()
                .iter()
                .filter(|name| !index.contains(name))
                .cloned()
                .collect();
            // Tombstones may have changed since the snapshot above.
            let tombstones = self.tombstone_snapshot();
            for name in carried {
                if let Some(cluster) = metadata.get(&name)
                    && !tombstones.contains(&name)
                {
                    tracing::debug!("Carrying over {} created during the cycle", name);
                    index.insert(cluster.clone());
                }
            }
            for name in &tombstones {
                index.remove(name);
            }
            *metadata = index.clone();
        }
        summary.files = index.len();

        let node_files = index.to_node_files();
        let targets: Vec<NodeId> = node_files.keys().cloned().collect();
        for (node_id, result) in self.push_assignment(&node_files, &targets).await {
            if let Err(e) = result {
                summary.pushes_failed += 1;
                tracing::warn!("Pushing assignment to {} failed: {}", node_id, e);
            }
        }
        summary
    }

    /// Asks every alive node, self included, for its replicas. Nodes that do
    /// not answer within the collection timeout are left out of the round.
    async fn collect_reports(&self) -> Vec<MetadataReport> {
        let timeout = self.replication.collection_timeout();
        let nodes: Vec<Node> = self.membership.alive_members();

        let calls = nodes.iter().map(|node| async move {
            let result = self
                .rpc
                .post_json::<_, MetadataReport>(
                    node.rpc_addr,
                    ENDPOINT_NODE_REPORT,
                    &ReportRequest::default(),
                    timeout,
                )
                .await;
            (node, result)
        });

        let mut reports = Vec::with_capacity(nodes.len());
        for (node, result) in join_all(calls).await {
            match result {
                Ok(mut report) => {
                    // Trust the address we dialed over the id the node claims.
                    report.node_id = node.id.clone();
                    reports.push(report);
                }
                Err(e) => tracing::debug!("No report from {}: {}", node.id, e),
            }
        }
        reports
    }

    fn check_and_repair(
        &self,
        index: &mut FileIndex,
        reporters: &[NodeId],
        summary: &mut CycleSummary,
    ) {
        let factor = self.replication.factor;
        let mut load = index.load_by_node();
        let candidates: Vec<Node> = self
            .membership
            .alive_members()
            .into_iter()
            .filter(|node| reporters.contains(&node.id))
            .collect();

        for cluster in index.clusters_mut() {
            if cluster.is_pending_delete() {
                continue;
            }

            if cluster.master.is_none() {
                match cluster.promote_servant() {
                    Some(new_master) => {
                        tracing::info!("Promoted {} to master of {}", new_master, cluster.file_name);
                        summary.promoted += 1;
                    }
                    None => {
                        tracing::warn!(
                            "{} has no master and no complete replica; leaving it orphaned",
                            cluster.file_name
                        );
                        summary.orphaned += 1;
                        continue;
                    }
                }
            }

            if cluster.size() >= factor {
                continue;
            }
            let free: Vec<Node> = candidates
                .iter()
                .filter(|node| !cluster.contains(&node.id))
                .cloned()
                .collect();
            let needed = factor - cluster.size();
            let recruits = least_loaded(&free, &load, needed);
            if recruits.len() < needed {
                tracing::warn!(
                    "Only {} of {} replacement replica(s) available for {}",
                    recruits.len(),
                    needed,
                    cluster.file_name
                );
            }
            let file_name = cluster.file_name.clone();
            for node_id in recruits {
                *load.entry(node_id.clone()).or_insert(0) += 1;
                cluster.insert(FileInfo::servant(
                    &file_name,
                    node_id,
                    FileStatus::WaitingReplication,
                ));
                summary.recruited += 1;
            }
        }
    }
}
