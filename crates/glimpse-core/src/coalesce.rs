//! Request coalescing (singleflight): at most one in-flight fetch per
//! unique key and render kind. Late joiners await the leader's result
//! instead of re-fetching.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::model::{FetchOutcome, RenderKind};

enum Entry {
    /// A leader is fetching; senders resolve every waiting follower.
    Pending(Vec<oneshot::Sender<FetchOutcome>>),
    /// Terminal for the key (except evicted preview failures).
    Done(FetchOutcome),
}

/// What `begin` handed back to the caller.
pub enum Claim {
    /// Caller owns the fetch and must call [`CoalescingRegistry::complete`].
    Leader,
    /// A fetch is in flight; await the receiver for its outcome.
    Follower(oneshot::Receiver<FetchOutcome>),
    /// The key already completed; reuse the stored outcome.
    Done(FetchOutcome),
}

/// Per-kind key→state maps. Card and preview results for the same URL are
/// independent fetches, so the maps never interfere.
#[derive(Default)]
pub struct CoalescingRegistry {
    cards: Mutex<HashMap<String, Entry>>,
    previews: Mutex<HashMap<String, Entry>>,
}

impl CoalescingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: RenderKind) -> &Mutex<HashMap<String, Entry>> {
        match kind {
            RenderKind::Card => &self.cards,
            RenderKind::Preview => &self.previews,
        }
    }

    /// Atomically claim a key: absent → the caller leads, pending → the
    /// caller follows, done → the stored outcome is returned immediately.
    pub fn begin(&self, kind: RenderKind, key: &str) -> Claim {
        let mut map = self.map(kind).lock().expect("coalescing registry poisoned");
        match map.get_mut(key) {
            None => {
                map.insert(key.to_string(), Entry::Pending(Vec::new()));
                Claim::Leader
            }
            Some(Entry::Pending(waiters)) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Claim::Follower(rx)
            }
            Some(Entry::Done(outcome)) => Claim::Done(outcome.clone()),
        }
    }

    /// Leader-only: publish the outcome, waking every follower with an
    /// identical value.
    ///
    /// A failed preview evicts the key after the broadcast so a strictly
    /// later request re-attempts the capture; followers that already joined
    /// still observe the failure. Card failures stay `Done`: the page was
    /// tried once this build, and the persistent cache gate (not the
    /// registry) decides whether it is retried next build.
    pub fn complete(&self, kind: RenderKind, key: &str, outcome: FetchOutcome) {
        let mut map = self.map(kind).lock().expect("coalescing registry poisoned");
        let waiters = match map.remove(key) {
            Some(Entry::Pending(waiters)) => waiters,
            // complete without a begin, or double complete: nothing to wake
            _ => Vec::new(),
        };
        for tx in waiters {
            // a follower may have been dropped; that is not our problem
            let _ = tx.send(outcome.clone());
        }
        let evict = kind == RenderKind::Preview && !outcome.success;
        if !evict {
            map.insert(key.to_string(), Entry::Done(outcome));
        }
    }

    #[cfg(test)]
    fn is_absent(&self, kind: RenderKind, key: &str) -> bool {
        !self.map(kind).lock().unwrap().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(html: &str) -> FetchOutcome {
        FetchOutcome {
            html: html.to_string(),
            success: true,
        }
    }

    fn failed(html: &str) -> FetchOutcome {
        FetchOutcome {
            html: html.to_string(),
            success: false,
        }
    }

    #[tokio::test]
    async fn first_claim_leads_second_follows() {
        let reg = CoalescingRegistry::new();
        assert!(matches!(reg.begin(RenderKind::Card, "k"), Claim::Leader));
        let Claim::Follower(rx) = reg.begin(RenderKind::Card, "k") else {
            panic!("expected follower");
        };

        reg.complete(RenderKind::Card, "k", ok("<div/>"));
        let outcome = rx.await.unwrap();
        assert_eq!(outcome.html, "<div/>");
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn all_followers_receive_identical_outcome() {
        let reg = CoalescingRegistry::new();
        assert!(matches!(reg.begin(RenderKind::Preview, "k"), Claim::Leader));
        let rxs: Vec<_> = (0..4)
            .map(|_| match reg.begin(RenderKind::Preview, "k") {
                Claim::Follower(rx) => rx,
                _ => panic!("expected follower"),
            })
            .collect();

        reg.complete(RenderKind::Preview, "k", ok("<img/>"));
        for rx in rxs {
            assert_eq!(rx.await.unwrap().html, "<img/>");
        }
    }

    #[test]
    fn done_is_terminal_for_successful_keys() {
        let reg = CoalescingRegistry::new();
        assert!(matches!(reg.begin(RenderKind::Card, "k"), Claim::Leader));
        reg.complete(RenderKind::Card, "k", ok("cached"));

        match reg.begin(RenderKind::Card, "k") {
            Claim::Done(outcome) => assert_eq!(outcome.html, "cached"),
            _ => panic!("expected done"),
        }
    }

    #[test]
    fn kinds_do_not_share_keys() {
        let reg = CoalescingRegistry::new();
        assert!(matches!(reg.begin(RenderKind::Card, "k"), Claim::Leader));
        // same key, other kind: still a fresh leader
        assert!(matches!(reg.begin(RenderKind::Preview, "k"), Claim::Leader));
    }

    #[tokio::test]
    async fn failed_preview_is_evicted_but_followers_see_the_failure() {
        let reg = CoalescingRegistry::new();
        assert!(matches!(reg.begin(RenderKind::Preview, "k"), Claim::Leader));
        let Claim::Follower(rx) = reg.begin(RenderKind::Preview, "k") else {
            panic!("expected follower");
        };

        reg.complete(RenderKind::Preview, "k", failed("<a/>"));

        // the follower that joined during the attempt observes the failure
        let outcome = rx.await.unwrap();
        assert!(!outcome.success);

        // a strictly later requester gets a fresh attempt
        assert!(reg.is_absent(RenderKind::Preview, "k"));
        assert!(matches!(reg.begin(RenderKind::Preview, "k"), Claim::Leader));
    }

    #[test]
    fn failed_card_stays_done() {
        let reg = CoalescingRegistry::new();
        assert!(matches!(reg.begin(RenderKind::Card, "k"), Claim::Leader));
        reg.complete(RenderKind::Card, "k", failed("fallback"));

        match reg.begin(RenderKind::Card, "k") {
            Claim::Done(outcome) => assert!(!outcome.success),
            _ => panic!("card failures are terminal within a build"),
        }
    }
}
