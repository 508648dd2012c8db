use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::error::{Result, SdfsError};

/// Completion level of a transmission. Absent from the tracker means "not yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransmissionStatus {
    /// All bytes landed and were fsynced on this node.
    LocallyComplete,
    /// The primary finished fanning the file out to its servants.
    GloballyComplete,
}

#[derive(Debug, Clone, Copy)]
struct Record {
    status: TransmissionStatus,
    updated_at: Instant,
}

/// Completion records keyed by transmission id.
///
/// Status only moves forward; repeating a completion is a no-op. Waiters
/// park on a shared `Notify` and re-check their id after every change.
#[derive(Default)]
pub struct TransmissionTracker {
    records: DashMap<String, Record>,
    changed: Notify,
}

impl TransmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_local(&self, transmission_id: &str) {
        self.advance(transmission_id, TransmissionStatus::LocallyComplete);
    }

    pub fn mark_global(&self, transmission_id: &str) {
        self.advance(transmission_id, TransmissionStatus::GloballyComplete);
    }

    fn advance(&self, transmission_id: &str, status: TransmissionStatus) {
        let now = Instant::now();
        self.records
            .entry(transmission_id.to_string())
            .and_modify(|record| {
                if status > record.status {
                    record.status = status;
                    record.updated_at = now;
                }
            })
            .or_insert(Record {
                status,
                updated_at: now,
            });
        tracing::debug!("Transmission {} -> {:?}", transmission_id, status);
        self.changed.notify_waiters();
    }

    pub fn status(&self, transmission_id: &str) -> Option<TransmissionStatus> {
        self.records.get(transmission_id).map(|r| r.status)
    }

    pub fn is_local_complete(&self, transmission_id: &str) -> bool {
        self.status(transmission_id).is_some()
    }

    pub fn is_global_complete(&self, transmission_id: &str) -> bool {
        self.status(transmission_id) == Some(TransmissionStatus::GloballyComplete)
    }

    pub async fn wait_local(&self, transmission_id: &str, timeout: Duration) -> Result<()> {
        if self
            .wait_until(timeout, || self.is_local_complete(transmission_id))
            .await
        {
            return Ok(());
        }
        Err(SdfsError::Timeout(format!(
            "transmission {transmission_id} not received within {timeout:?}"
        )))
    }

    pub async fn wait_global(&self, transmission_id: &str, timeout: Duration) -> Result<()> {
        if self
            .wait_until(timeout, || self.is_global_complete(transmission_id))
            .await
        {
            return Ok(());
        }
        Err(SdfsError::Timeout(format!(
            "transmission {transmission_id} not replicated within {timeout:?}"
        )))
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn() -> bool) -> bool {
        let waiting = async {
            loop {
                let notified = self.changed.notified();
                tokio::pin!(notified);
                // Register before checking so a change in between is not missed.
                notified.as_mut().enable();
                if done() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, waiting).await.is_ok()
    }

    /// Drops records older than `retention`. Returns how many were removed.
    pub fn sweep(&self, retention: Duration) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| record.updated_at.elapsed() < retention);
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub async fn start_sweeper(self: Arc<Self>, every: Duration, retention: Duration) {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let evicted = tracker.sweep(retention);
                if evicted > 0 {
                    tracing::debug!("Evicted {} transmission record(s)", evicted);
                }
            }
        });
    }
}

/// Produces `"{service}-{file}-{counter}"` ids, unique per service instance.
pub struct TransmissionIdGenerator {
    service: String,
    counter: AtomicU64,
}

impl TransmissionIdGenerator {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self, file_name: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", self.service, file_name, n)
    }
}
