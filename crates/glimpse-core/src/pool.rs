//! Worker-pool manager and lifecycle.
//!
//! All scheduler bookkeeping (pool phase, checked-out page count, admission
//! queue) lives behind one mutex owned by [`SchedulerContext`], constructed
//! once per build and passed by reference everywhere; there is no global
//! state. The lock is never held across an await, so registry and queue
//! mutations stay atomic the way they were in a single-threaded host.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, oneshot};

use crate::coalesce::CoalescingRegistry;
use crate::error::AppError;
use crate::options::Options;
use crate::traits::BrowserBackend;

pub(crate) struct WaitingBatch {
    pub(crate) seq: u64,
    pub(crate) slots: usize,
    pub(crate) signal: oneshot::Sender<()>,
}

pub(crate) enum PoolPhase<B: BrowserBackend> {
    Absent,
    /// The first caller is launching; everyone else parks a sender here.
    Launching(Vec<oneshot::Sender<Result<(), String>>>),
    Ready(Vec<Arc<B::Worker>>),
}

pub(crate) struct SchedState<B: BrowserBackend> {
    pub(crate) phase: PoolPhase<B>,
    pub(crate) active_pages: usize,
    pub(crate) queue: VecDeque<WaitingBatch>,
    /// Freed capacity accumulated since the head batch enqueued.
    pub(crate) freed: usize,
    pub(crate) next_seq: u64,
    rng: u64,
}

/// Owns the browser pool, the admission queue, and the coalescing registry
/// for one document build (or several, in keep-warm mode).
pub struct SchedulerContext<B: BrowserBackend> {
    pub(crate) backend: B,
    pub(crate) state: Mutex<SchedState<B>>,
    pub(crate) registry: CoalescingRegistry,
    pages_per_worker: usize,
    keep_warm: bool,
}

/// Exclusive hold on one worker page between checkout and checkin.
pub struct PageLease<B: BrowserBackend> {
    page: B::Page,
}

impl<B: BrowserBackend> PageLease<B> {
    pub fn page(&self) -> &B::Page {
        &self.page
    }
}

impl<B: BrowserBackend> SchedulerContext<B> {
    pub fn new(backend: B, options: &Options) -> Self {
        // Clock-seeded, good enough for load spreading.
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self {
            backend,
            state: Mutex::new(SchedState {
                phase: PoolPhase::Absent,
                active_pages: 0,
                queue: VecDeque::new(),
                freed: 0,
                next_seq: 0,
                rng: seed | 1,
            }),
            registry: CoalescingRegistry::new(),
            pages_per_worker: options.pages_per_worker,
            keep_warm: options.keep_warm,
        }
    }

    /// Total worker-page slots, zero until the pool is ready.
    pub(crate) fn capacity_locked(&self, state: &SchedState<B>) -> usize {
        match &state.phase {
            PoolPhase::Ready(workers) => workers.len() * self.pages_per_worker,
            _ => 0,
        }
    }

    /// Idempotent lazy pool initialization with single-initializer
    /// semantics: only the first caller launches workers, concurrent
    /// callers await a one-shot "pool ready" signal. Any launch failure
    /// fails the whole initialization, leaving no partial pool.
    pub async fn ensure_pool(&self, pool_size: usize, launch_args: &[String]) -> Result<(), AppError> {
        let wait_rx = {
            let mut state = self.state.lock().await;
            match &mut state.phase {
                PoolPhase::Ready(workers) => {
                    if workers.len() < pool_size {
                        tracing::warn!(
                            have = workers.len(),
                            requested = pool_size,
                            "Pool already launched with fewer workers, reusing it"
                        );
                    }
                    return Ok(());
                }
                PoolPhase::Launching(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                PoolPhase::Absent => {
                    state.phase = PoolPhase::Launching(Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = wait_rx {
            return match rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(msg)) => Err(AppError::PoolLaunch(msg)),
                Err(_) => Err(AppError::PoolLaunch("pool initializer dropped".into())),
            };
        }

        // We are the initializer.
        let mut workers = Vec::with_capacity(pool_size);
        for n in 0..pool_size.max(1) {
            match self.backend.launch(launch_args).await {
                Ok(worker) => workers.push(Arc::new(worker)),
                Err(e) => {
                    let msg = format!("worker {n}: {e}");
                    let waiters = {
                        let mut state = self.state.lock().await;
                        match std::mem::replace(&mut state.phase, PoolPhase::Absent) {
                            PoolPhase::Launching(waiters) => waiters,
                            _ => Vec::new(),
                        }
                    };
                    for tx in waiters {
                        let _ = tx.send(Err(msg.clone()));
                    }
                    // Already-launched workers must not leak.
                    for worker in &workers {
                        self.backend.close_worker(worker).await;
                    }
                    return Err(AppError::PoolLaunch(msg));
                }
            }
        }

        let waiters = {
            let mut state = self.state.lock().await;
            let launched = workers.len();
            let waiters =
                match std::mem::replace(&mut state.phase, PoolPhase::Ready(workers)) {
                    PoolPhase::Launching(waiters) => waiters,
                    _ => Vec::new(),
                };
            tracing::debug!(workers = launched, "Browser pool launched");
            waiters
        };
        for tx in waiters {
            let _ = tx.send(Ok(()));
        }
        Ok(())
    }

    /// Check out one page from a uniformly random worker.
    ///
    /// Does not block on capacity; that is the admission controller's job,
    /// so this must only be reached after admission succeeded.
    pub async fn checkout(&self) -> Result<PageLease<B>, AppError> {
        let worker = {
            let mut state = self.state.lock().await;
            let idx = {
                // xorshift64; uniform-random selection spreads load without
                // round-robin coordination.
                let x = &mut state.rng;
                *x ^= *x << 13;
                *x ^= *x >> 7;
                *x ^= *x << 17;
                *x
            };
            let PoolPhase::Ready(workers) = &state.phase else {
                return Err(AppError::Page("checkout before pool ready".into()));
            };
            let worker = Arc::clone(&workers[(idx % workers.len() as u64) as usize]);
            state.active_pages += 1;
            worker
        };

        match self.backend.new_page(&worker).await {
            Ok(page) => Ok(PageLease { page }),
            Err(e) => {
                // Roll the slot back and re-run the release pass so a
                // waiting batch is not stranded by the failed open.
                let mut state = self.state.lock().await;
                state.active_pages -= 1;
                self.release_locked(&mut state, 1);
                Err(e)
            }
        }
    }

    /// Close the page, free its slot, and admit waiting batches.
    pub async fn checkin(&self, lease: PageLease<B>) {
        self.backend.close_page(lease.page).await;
        let mut state = self.state.lock().await;
        state.active_pages -= 1;
        self.release_locked(&mut state, 1);
    }

    /// Tear the pool down once no task holds a page and nothing waits.
    /// A no-op in keep-warm mode, where the pool intentionally outlives the
    /// build. Returns whether the workers were actually closed.
    pub async fn teardown(&self) -> bool {
        let workers = {
            let mut state = self.state.lock().await;
            if state.active_pages != 0 || !state.queue.is_empty() {
                return false;
            }
            if self.keep_warm {
                return false;
            }
            match std::mem::replace(&mut state.phase, PoolPhase::Absent) {
                PoolPhase::Ready(workers) => workers,
                other => {
                    state.phase = other;
                    return false;
                }
            }
        };
        for worker in &workers {
            self.backend.close_worker(worker).await;
        }
        true
    }

    #[cfg(test)]
    pub(crate) async fn active_pages(&self) -> usize {
        self.state.lock().await.active_pages
    }

    #[cfg(test)]
    pub(crate) async fn pool_ready(&self) -> bool {
        matches!(self.state.lock().await.phase, PoolPhase::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockBackend;

    fn ctx(backend: MockBackend, pool_size: usize, pages: usize) -> SchedulerContext<MockBackend> {
        let options = Options::default()
            .with_pool_size(pool_size)
            .with_pages_per_worker(pages);
        SchedulerContext::new(backend, &options)
    }

    #[tokio::test]
    async fn ensure_pool_is_idempotent() {
        let backend = MockBackend::new();
        let ctx = ctx(backend.clone(), 2, 5);

        ctx.ensure_pool(2, &[]).await.unwrap();
        ctx.ensure_pool(2, &[]).await.unwrap();
        ctx.ensure_pool(3, &[]).await.unwrap();

        assert_eq!(backend.launches(), 2, "second and third calls reuse the pool");
        assert!(ctx.pool_ready().await);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_initializer() {
        let backend = MockBackend::new().with_launch_delay(std::time::Duration::from_millis(20));
        let ctx = Arc::new(ctx(backend.clone(), 2, 5));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move { ctx.ensure_pool(2, &[]).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(backend.launches(), 2, "only the first caller launches");
    }

    #[tokio::test]
    async fn launch_failure_is_fatal_and_leaves_no_partial_pool() {
        let backend = MockBackend::new().fail_launch_after(1);
        let ctx = ctx(backend.clone(), 3, 5);

        let err = ctx.ensure_pool(3, &[]).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!ctx.pool_ready().await);
        // the worker that did launch before the failure was closed again
        assert_eq!(backend.closed_workers(), backend.launches());
    }

    #[tokio::test]
    async fn launch_failure_reaches_waiting_callers() {
        let backend = MockBackend::new()
            .with_launch_delay(std::time::Duration::from_millis(20))
            .fail_launch_after(0);
        let ctx = Arc::new(ctx(backend.clone(), 2, 5));

        let waiter = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                // lose the race for the initializer slot
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                ctx.ensure_pool(2, &[]).await
            })
        };
        let leader = ctx.ensure_pool(2, &[]).await;

        assert!(leader.unwrap_err().is_fatal());
        assert!(waiter.await.unwrap().unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn checkout_checkin_tracks_active_pages() {
        let backend = MockBackend::new();
        let ctx = ctx(backend.clone(), 1, 5);
        ctx.ensure_pool(1, &[]).await.unwrap();

        let a = ctx.checkout().await.unwrap();
        let b = ctx.checkout().await.unwrap();
        assert_eq!(ctx.active_pages().await, 2);

        ctx.checkin(a).await;
        assert_eq!(ctx.active_pages().await, 1);
        ctx.checkin(b).await;
        assert_eq!(ctx.active_pages().await, 0);
        assert_eq!(backend.closed_pages(), 2);
    }

    #[tokio::test]
    async fn failed_page_open_rolls_back_the_slot() {
        let backend = MockBackend::new().with_page_failures(1);
        let ctx = ctx(backend.clone(), 1, 5);
        ctx.ensure_pool(1, &[]).await.unwrap();

        assert!(ctx.checkout().await.is_err());
        assert_eq!(ctx.active_pages().await, 0);
    }

    #[tokio::test]
    async fn teardown_closes_all_workers_when_drained() {
        let backend = MockBackend::new();
        let ctx = ctx(backend.clone(), 2, 5);
        ctx.ensure_pool(2, &[]).await.unwrap();

        let lease = ctx.checkout().await.unwrap();
        ctx.teardown().await;
        assert!(ctx.pool_ready().await, "teardown is refused while pages are out");

        ctx.checkin(lease).await;
        ctx.teardown().await;
        assert!(!ctx.pool_ready().await);
        assert_eq!(backend.closed_workers(), 2);
    }

    #[tokio::test]
    async fn keep_warm_skips_teardown() {
        let backend = MockBackend::new();
        let options = Options::default().with_pool_size(1).with_keep_warm(true);
        let ctx = SchedulerContext::new(backend.clone(), &options);
        ctx.ensure_pool(1, &[]).await.unwrap();

        ctx.teardown().await;
        assert!(ctx.pool_ready().await);
        assert_eq!(backend.closed_workers(), 0);
    }
}
