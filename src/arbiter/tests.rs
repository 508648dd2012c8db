//! Access Arbiter Tests
//!
//! Exercises reader concurrency, writer exclusion, the starvation bound and
//! request expiry.

#[cfg(test)]
mod tests {
    use crate::arbiter::scheduler::{AccessArbiter, AccessKind, MAX_READERS, STARVATION_BOUND};
    use crate::error::SdfsError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const LONG: Duration = Duration::from_secs(5);

    async fn wait_for_queued(arbiter: &AccessArbiter, queued: usize) {
        for _ in 0..200 {
            if arbiter.stats().queued == queued {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("queue never reached {queued}");
    }

    // ============================================================
    // READER CONCURRENCY
    // ============================================================

    #[tokio::test]
    async fn test_at_most_two_concurrent_reads() {
        let arbiter = Arc::new(AccessArbiter::new("f"));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let arbiter = arbiter.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = arbiter.acquire(AccessKind::Read, LONG).await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), MAX_READERS);
        assert_eq!(arbiter.stats().readers, 0);
    }

    #[tokio::test]
    async fn test_third_reader_waits_for_release() {
        let arbiter = AccessArbiter::new("f");
        let r1 = arbiter.acquire(AccessKind::Read, LONG).await.unwrap();
        let _r2 = arbiter.acquire(AccessKind::Read, LONG).await.unwrap();

        let err = arbiter
            .acquire(AccessKind::Read, Duration::from_millis(30))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SdfsError::Timeout(_)));

        drop(r1);
        let r3 = arbiter.acquire(AccessKind::Read, Duration::from_millis(100)).await;
        assert!(r3.is_ok());
    }

    // ============================================================
    // WRITER EXCLUSION
    // ============================================================

    #[tokio::test]
    async fn test_writer_excludes_readers() {
        let arbiter = Arc::new(AccessArbiter::new("f"));
        let write = arbiter.acquire(AccessKind::Write, LONG).await.unwrap();
        assert!(arbiter.stats().writing);

        let reader = {
            let arbiter = arbiter.clone();
            tokio::spawn(async move { arbiter.acquire(AccessKind::Read, LONG).await.map(|_| ()) })
        };
        wait_for_queued(&arbiter, 1).await;
        assert_eq!(arbiter.stats().readers, 0);

        drop(write);
        reader.await.unwrap().unwrap();
        assert!(!arbiter.stats().writing);
    }

    #[tokio::test]
    async fn test_writer_admitted_after_readers_drain() {
        let arbiter = Arc::new(AccessArbiter::new("f"));
        let read = arbiter.acquire(AccessKind::Read, LONG).await.unwrap();

        let writer = {
            let arbiter = arbiter.clone();
            tokio::spawn(async move {
                let guard = arbiter.acquire(AccessKind::Write, LONG).await.unwrap();
                guard.kind()
            })
        };
        wait_for_queued(&arbiter, 1).await;

        drop(read);
        assert_eq!(writer.await.unwrap(), AccessKind::Write);
    }

    // ============================================================
    // STARVATION BOUND
    // ============================================================

    #[tokio::test]
    async fn test_queued_writer_skipped_at_most_four_times() {
        let arbiter = Arc::new(AccessArbiter::new("f"));
        let held = arbiter.acquire(AccessKind::Read, LONG).await.unwrap();

        let writer = {
            let arbiter = arbiter.clone();
            tokio::spawn(async move { arbiter.acquire(AccessKind::Write, LONG).await.map(|_| ()) })
        };
        wait_for_queued(&arbiter, 1).await;

        let mut admitted = 0;
        for _ in 0..(STARVATION_BOUND + 2) {
            match arbiter.acquire(AccessKind::Read, Duration::from_millis(30)).await {
                Ok(guard) => {
                    admitted += 1;
                    drop(guard);
                }
                Err(e) => assert!(matches!(e, SdfsError::Timeout(_))),
            }
        }
        assert_eq!(admitted, STARVATION_BOUND);
        assert_eq!(arbiter.stats().queued, 1, "only the writer remains queued");

        drop(held);
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_starved_writer_overtakes_reads_queued_ahead() {
        let arbiter = Arc::new(AccessArbiter::new("f"));
        let held_a = arbiter.acquire(AccessKind::Read, LONG).await.unwrap();
        let held_b = arbiter.acquire(AccessKind::Read, LONG).await.unwrap();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        let kinds = [AccessKind::Read; 5]
            .into_iter()
            .chain([AccessKind::Write])
            .enumerate();
        for (i, kind) in kinds {
            let waiter = arbiter.clone();
            let order = order.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = waiter.acquire(kind, LONG).await.unwrap();
                order.lock().push(i);
            }));
            wait_for_queued(&arbiter, i + 1).await;
        }

        // Four reads pass the queued writer, which then blocks the fifth.
        drop(held_a);
        wait_for_queued(&arbiter, 2).await;
        drop(held_b);

        for task in tasks {
            tokio::time::timeout(LONG, task).await.unwrap().unwrap();
        }
        let order = order.lock().clone();
        assert_eq!(order, vec![0, 1, 2, 3, 5, 4]);
    }

    // ============================================================
    // EXPIRY
    // ============================================================

    #[tokio::test]
    async fn test_expired_request_leaves_queue_intact() {
        let arbiter = Arc::new(AccessArbiter::new("f"));
        let write = arbiter.acquire(AccessKind::Write, LONG).await.unwrap();

        let patient = {
            let arbiter = arbiter.clone();
            tokio::spawn(async move { arbiter.acquire(AccessKind::Write, LONG).await.map(|_| ()) })
        };
        wait_for_queued(&arbiter, 1).await;

        let err = arbiter
            .acquire(AccessKind::Read, Duration::from_millis(20))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SdfsError::Timeout(_)));
        assert_eq!(arbiter.stats().queued, 1);

        drop(write);
        patient.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_request_does_not_leak_a_slot() {
        let arbiter = Arc::new(AccessArbiter::new("f"));
        let write = arbiter.acquire(AccessKind::Write, LONG).await.unwrap();

        let abandoned = {
            let arbiter = arbiter.clone();
            tokio::spawn(async move {
                let _ = arbiter.acquire(AccessKind::Write, LONG).await;
            })
        };
        wait_for_queued(&arbiter, 1).await;
        abandoned.abort();
        let _ = abandoned.await;

        drop(write);
        let again = arbiter.acquire(AccessKind::Write, Duration::from_millis(200)).await;
        assert!(again.is_ok());
    }
}
