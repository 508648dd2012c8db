use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{Result, SdfsError};

pub const MAX_READERS: usize = 2;
pub const STARVATION_BOUND: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessKind {
    Read,
    Write,
}

struct Waiter {
    id: u64,
    kind: AccessKind,
    /// Reads admitted past this writer while it was queued.
    skips: u32,
    grant: oneshot::Sender<AccessGuard>,
}

#[derive(Default)]
struct ArbiterState {
    readers: usize,
    writer: bool,
    queue: VecDeque<Waiter>,
    next_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArbiterStats {
    pub readers: usize,
    pub writing: bool,
    pub queued: usize,
}

pub struct AccessArbiter {
    file_name: String,
    state: Arc<Mutex<ArbiterState>>,
}

/// Held for the duration of an admitted operation.
pub struct AccessGuard {
    state: Arc<Mutex<ArbiterState>>,
    kind: AccessKind,
    armed: bool,
}

impl AccessGuard {
    pub fn kind(&self) -> AccessKind {
        self.kind
    }
}

impl Drop for AccessGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        state.release(self.kind);
        state.dispatch(&self.state);
    }
}

impl AccessArbiter {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            state: Arc::new(Mutex::new(ArbiterState::default())),
        }
    }

    /// Queues a request and waits up to `timeout` for admission.
    pub async fn acquire(&self, kind: AccessKind, timeout: Duration) -> Result<AccessGuard> {
        let (tx, mut rx) = oneshot::channel();
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.queue.push_back(Waiter {
                id,
                kind,
                skips: 0,
                grant: tx,
            });
            state.dispatch(&self.state);
            id
        };

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(guard)) => Ok(guard),
            Ok(Err(_)) => Err(SdfsError::Internal(format!(
                "arbiter for {} dropped a pending request",
                self.file_name
            ))),
            Err(_) => {
                let expired = {
                    let mut state = self.state.lock();
                    match state.queue.iter().position(|w| w.id == id) {
                        Some(pos) => {
                            state.queue.remove(pos);
                            state.dispatch(&self.state);
                            true
                        }
                        None => false,
                    }
                };
                if !expired {
                    // Granted between the deadline and taking the lock.
                    if let Ok(guard) = rx.try_recv() {
                        return Ok(guard);
                    }
                }
                tracing::debug!(
                    "{:?} access to {} expired after {:?}",
                    kind,
                    self.file_name,
                    timeout
                );
                Err(SdfsError::Timeout(format!(
                    "{kind:?} access to {} not granted within {timeout:?}",
                    self.file_name
                )))
            }
        }
    }

    pub fn stats(&self) -> ArbiterStats {
        let state = self.state.lock();
        ArbiterStats {
            readers: state.readers,
            writing: state.writer,
            queued: state.queue.len(),
        }
    }
}

impl ArbiterState {
    fn release(&mut self, kind: AccessKind) {
        match kind {
            AccessKind::Read => self.readers = self.readers.saturating_sub(1),
            AccessKind::Write => self.writer = false,
        }
    }

    fn first_writer(&self) -> Option<usize> {
        self.queue.iter().position(|w| w.kind == AccessKind::Write)
    }

    /// Admits as many queued requests as the rules allow.
    fn dispatch(&mut self, handle: &Arc<Mutex<ArbiterState>>) {
        // Requesters that went away without expiring are dropped up front.
        self.queue.retain(|w| !w.grant.is_closed());

        while let Some(head) = self.queue.front() {
            let next = match head.kind {
                AccessKind::Read => {
                    if let Some(pos) = self.first_writer()
                        && self.queue[pos].skips >= STARVATION_BOUND
                    {
                        // The starved writer goes before any further read.
                        if self.writer || self.readers > 0 {
                            break;
                        }
                        pos
                    } else if self.writer || self.readers >= MAX_READERS {
                        break;
                    } else {
                        0
                    }
                }
                AccessKind::Write => {
                    if !self.writer && self.readers == 0 {
                        0
                    } else if !self.writer
                        && self.readers < MAX_READERS
                        && head.skips < STARVATION_BOUND
                        && let Some(pos) = self.queue.iter().position(|w| w.kind == AccessKind::Read)
                    {
                        pos
                    } else {
                        break;
                    }
                }
            };

            let Some(waiter) = self.queue.remove(next) else {
                break;
            };
            self.grant(waiter, handle);
        }
    }

    fn grant(&mut self, waiter: Waiter, handle: &Arc<Mutex<ArbiterState>>) {
        match waiter.kind {
            AccessKind::Read => self.readers += 1,
            AccessKind::Write => self.writer = true,
        }

        let guard = AccessGuard {
            state: handle.clone(),
            kind: waiter.kind,
            armed: true,
        };
        if let Err(mut guard) = waiter.grant.send(guard) {
            // Requester gave up; undo without re-entering the lock via Drop.
            guard.armed = false;
            self.release(waiter.kind);
            return;
        }

        if waiter.kind == AccessKind::Read
            && let Some(pos) = self.first_writer()
        {
            self.queue[pos].skips += 1;
        }
    }
}
