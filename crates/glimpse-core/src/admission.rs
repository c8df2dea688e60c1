//! Batch admission control.
//!
//! Batches are gated against pool capacity before their tasks start, and
//! released strictly in enqueue order as pages check back in. A later,
//! smaller batch never jumps an earlier larger one even when it would fit;
//! greedy FIFO is the documented fairness trade-off.

use tokio::sync::oneshot;

use crate::pool::{SchedState, SchedulerContext, WaitingBatch};
use crate::traits::BrowserBackend;

/// Batches below this size always proceed immediately; queueing overhead is
/// not worth it for trivial bursts.
const SMALL_BATCH_THRESHOLD: usize = 3;

impl<B: BrowserBackend> SchedulerContext<B> {
    /// Admit a batch of `batch_size` tasks, suspending until enough pages
    /// have been checked back in when the pool is saturated.
    pub async fn admit(&self, batch_size: usize) {
        let rx = {
            let mut state = self.state.lock().await;
            if batch_size < SMALL_BATCH_THRESHOLD {
                return;
            }
            let capacity = self.capacity_locked(&state);
            // A batch larger than the whole pool can never see more free
            // slots than capacity, so its claim is capped there: once the
            // pool is fully free the batch proceeds and its tasks contend
            // for pages as they finish. Without the cap such a batch would
            // wait on releases that no running task can ever produce.
            let slots = batch_size.min(capacity);
            if capacity.saturating_sub(state.active_pages) >= slots {
                return;
            }

            if state.queue.is_empty() {
                // Stale credit from a drained queue must not count toward
                // this batch.
                state.freed = 0;
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(WaitingBatch {
                seq,
                slots,
                signal: tx,
            });
            tracing::debug!(%seq, %slots, "Batch queued for capacity");
            rx
        };

        // Signal loss only happens when the context is dropped mid-build;
        // proceeding is as good as anything then.
        let _ = rx.await;
    }

    /// Credit freed slots and wake every satisfiable batch at the head of
    /// the queue. One check-in may release several small batches in a row.
    pub(crate) fn release_locked(&self, state: &mut SchedState<B>, freed: usize) {
        state.freed += freed;
        while let Some(head) = state.queue.front() {
            if state.freed < head.slots {
                break;
            }
            let batch = state
                .queue
                .pop_front()
                .expect("front() just returned Some");
            state.freed -= batch.slots;
            tracing::debug!(seq = batch.seq, slots = batch.slots, "Batch released");
            let _ = batch.signal.send(());
        }
        if state.queue.is_empty() {
            state.freed = 0;
        }
    }

    #[cfg(test)]
    pub(crate) async fn release_for_test(&self, freed: usize) {
        let mut state = self.state.lock().await;
        self.release_locked(&mut state, freed);
    }

    #[cfg(test)]
    pub(crate) async fn queued_batches(&self) -> usize {
        self.state.lock().await.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::options::Options;
    use crate::pool::SchedulerContext;
    use crate::testutil::MockBackend;

    async fn ready_ctx(pool_size: usize, pages: usize) -> Arc<SchedulerContext<MockBackend>> {
        let options = Options::default()
            .with_pool_size(pool_size)
            .with_pages_per_worker(pages);
        let ctx = Arc::new(SchedulerContext::new(MockBackend::new(), &options));
        ctx.ensure_pool(pool_size, &[]).await.unwrap();
        ctx
    }

    async fn is_admitted(ctx: &Arc<SchedulerContext<MockBackend>>, batch: usize) -> bool {
        let ctx = Arc::clone(ctx);
        timeout(Duration::from_millis(50), async move { ctx.admit(batch).await })
            .await
            .is_ok()
    }

    #[tokio::test]
    async fn small_batches_never_queue() {
        // capacity 1, but a 2-task batch is below the threshold
        let ctx = ready_ctx(1, 1).await;
        let _a = ctx.checkout().await.unwrap();
        assert!(is_admitted(&ctx, 2).await);
    }

    #[tokio::test]
    async fn batch_within_free_capacity_is_immediate() {
        let ctx = ready_ctx(2, 5).await;
        assert!(is_admitted(&ctx, 5).await, "5 tasks fit capacity 10");
        assert!(is_admitted(&ctx, 10).await);
    }

    #[tokio::test]
    async fn saturated_pool_queues_the_batch() {
        let ctx = ready_ctx(1, 4).await;
        let _hold = ctx.checkout().await.unwrap();
        assert!(!is_admitted(&ctx, 4).await, "4 tasks exceed 3 free slots");
        assert_eq!(ctx.queued_batches().await, 1);
    }

    #[tokio::test]
    async fn batch_wakes_after_cumulative_releases() {
        let ctx = ready_ctx(1, 4).await;
        let mut leases = Vec::new();
        for _ in 0..4 {
            leases.push(ctx.checkout().await.unwrap());
        }

        let admitted = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.admit(4).await })
        };
        tokio::task::yield_now().await;

        for _ in 0..3 {
            ctx.release_for_test(1).await;
            assert!(!admitted.is_finished());
        }
        ctx.release_for_test(1).await;
        timeout(Duration::from_millis(100), admitted)
            .await
            .expect("batch released after 4 cumulative slots")
            .unwrap();
    }

    #[tokio::test]
    async fn batches_release_in_fifo_order() {
        let ctx = ready_ctx(1, 4).await;
        let mut leases = Vec::new();
        for _ in 0..4 {
            leases.push(ctx.checkout().await.unwrap());
        }

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for (name, slots) in [("big", 4usize), ("small", 3usize)] {
            let ctx = Arc::clone(&ctx);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                ctx.admit(slots).await;
                order.lock().unwrap().push(name);
            }));
            // deterministic enqueue order
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // 3 slots would satisfy "small", but "big" is ahead: nobody moves.
        ctx.release_for_test(3).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(order.lock().unwrap().is_empty());

        // 3 more slots satisfy "big"; its surplus plus 3 further slots then
        // free "small".
        ctx.release_for_test(3).await;
        ctx.release_for_test(3).await;
        for h in handles {
            timeout(Duration::from_millis(100), h).await.unwrap().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec!["big", "small"]);
    }

    #[tokio::test]
    async fn oversized_batch_is_admitted_on_an_idle_pool() {
        let ctx = ready_ctx(1, 4).await;
        assert!(
            is_admitted(&ctx, 5).await,
            "a batch larger than the pool proceeds once the pool is free"
        );
    }

    #[tokio::test]
    async fn oversized_batch_queues_at_pool_capacity() {
        let ctx = ready_ctx(1, 4).await;
        let _hold = ctx.checkout().await.unwrap();

        let admitted = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.admit(9).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(ctx.queued_batches().await, 1);

        // the claim was capped at 4 slots, so 3 releases are not enough
        ctx.release_for_test(3).await;
        assert!(!admitted.is_finished());
        ctx.release_for_test(1).await;
        timeout(Duration::from_millis(100), admitted)
            .await
            .expect("capped batch released once the whole pool freed")
            .unwrap();
    }

    #[tokio::test]
    async fn one_release_can_wake_multiple_batches() {
        let ctx = ready_ctx(1, 1).await;
        let _hold = ctx.checkout().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let c = Arc::clone(&ctx);
            handles.push(tokio::spawn(async move { c.admit(3).await }));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ctx.queued_batches().await, 2);

        ctx.release_for_test(6).await;
        for h in handles {
            timeout(Duration::from_millis(100), h).await.unwrap().unwrap();
        }
        assert_eq!(ctx.queued_batches().await, 0);
    }

    #[tokio::test]
    async fn stale_credit_does_not_leak_into_a_new_batch() {
        let ctx = ready_ctx(1, 2).await;
        let _hold = ctx.checkout().await.unwrap();

        // drain a queue once, leaving surplus credit behind
        let admitted = {
            let c = Arc::clone(&ctx);
            tokio::spawn(async move { c.admit(3).await })
        };
        tokio::task::yield_now().await;
        ctx.release_for_test(5).await;
        timeout(Duration::from_millis(100), admitted).await.unwrap().unwrap();

        // a fresh batch past free capacity must wait for fresh releases
        assert!(!is_admitted(&ctx, 3).await);
    }
}
