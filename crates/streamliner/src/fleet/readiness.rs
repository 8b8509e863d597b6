//! Fleet-wide build readiness
//!
//! Keeps the first wave of callers for a model from triggering concurrent
//! remote fetches: the first caller claims the build, every other caller for
//! that name waits until the claimant's call completes. Only enabled when the
//! configured builder is remote.
//!
//! Map states: absent = never requested, `false` = build in flight,
//! `true` = built at least once somewhere in the fleet.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
pub struct ReadinessMap {
    states: DashMap<String, bool>,
    changed: Notify,
}

enum Observed {
    Claimed,
    Ready,
    InFlight,
}

/// Outcome of `ensure_ready`.
pub enum Readiness {
    /// The model was already built somewhere.
    Ready,
    /// This caller builds it; resolve the claim when the call finishes.
    Claimed(BuildClaim),
}

impl ReadinessMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, model_name: &str) -> Option<bool> {
        self.states.get(model_name).map(|state| *state)
    }

    /// Claim the build for an unseen name, or wait until an in-flight build
    /// completes. Waiters are released in no particular order.
    pub async fn ensure_ready(self: &Arc<Self>, model_name: &str) -> Readiness {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before inspecting the map so a completion in between is not lost.
            notified.as_mut().enable();

            match self.observe(model_name) {
                Observed::Claimed => {
                    debug!("Claimed first build of {}", model_name);
                    return Readiness::Claimed(BuildClaim {
                        map: Arc::clone(self),
                        model_name: model_name.to_string(),
                        completed: false,
                    });
                }
                Observed::Ready => return Readiness::Ready,
                Observed::InFlight => {}
            }

            debug!("Waiting for in-flight build of {}", model_name);
            notified.await;
        }
    }

    /// Atomically inspect the entry, claiming it when vacant.
    fn observe(&self, model_name: &str) -> Observed {
        match self.states.entry(model_name.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(false);
                Observed::Claimed
            }
            Entry::Occupied(occupied) if *occupied.get() => Observed::Ready,
            Entry::Occupied(_) => Observed::InFlight,
        }
    }

    fn complete(&self, model_name: &str) {
        self.states.insert(model_name.to_string(), true);
        self.changed.notify_waiters();
    }

    fn withdraw(&self, model_name: &str) {
        self.states.remove(model_name);
        self.changed.notify_waiters();
    }
}

/// First-build responsibility for one model name. Dropping an unresolved
/// claim withdraws it so a waiting caller can take over.
pub struct BuildClaim {
    map: Arc<ReadinessMap>,
    model_name: String,
    completed: bool,
}

impl BuildClaim {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn complete(mut self) {
        self.completed = true;
        self.map.complete(&self.model_name);
    }
}

impl Drop for BuildClaim {
    fn drop(&mut self) {
        if !self.completed {
            debug!("Withdrawing build claim for {}", self.model_name);
            self.map.withdraw(&self.model_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_caller_claims() {
        let map = Arc::new(ReadinessMap::new());
        assert_eq!(map.state("clip"), None);

        let claim = match map.ensure_ready("clip").await {
            Readiness::Claimed(claim) => claim,
            Readiness::Ready => panic!("unseen model reported ready"),
        };
        assert_eq!(map.state("clip"), Some(false));
        claim.complete();
        assert_eq!(map.state("clip"), Some(true));
        assert!(matches!(map.ensure_ready("clip").await, Readiness::Ready));
    }

    #[tokio::test]
    async fn test_second_caller_waits_for_completion() {
        let map = Arc::new(ReadinessMap::new());
        let claim = match map.ensure_ready("clip").await {
            Readiness::Claimed(claim) => claim,
            Readiness::Ready => panic!("unseen model reported ready"),
        };

        let waiter = {
            let map = Arc::clone(&map);
            tokio::spawn(async move { matches!(map.ensure_ready("clip").await, Readiness::Ready) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        claim.complete();
        let ready = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter not released")
            .unwrap();
        assert!(ready);
    }

    #[tokio::test]
    async fn test_dropped_claim_hands_over() {
        let map = Arc::new(ReadinessMap::new());
        let claim = match map.ensure_ready("clip").await {
            Readiness::Claimed(claim) => claim,
            Readiness::Ready => panic!("unseen model reported ready"),
        };

        let waiter = {
            let map = Arc::clone(&map);
            tokio::spawn(async move {
                match map.ensure_ready("clip").await {
                    Readiness::Claimed(claim) => {
                        claim.complete();
                        true
                    }
                    Readiness::Ready => false,
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(claim);

        let took_over = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter not released")
            .unwrap();
        assert!(took_over);
        assert_eq!(map.state("clip"), Some(true));
    }

    #[tokio::test]
    async fn test_names_are_independent() {
        let map = Arc::new(ReadinessMap::new());
        let _alpha = map.ensure_ready("alpha").await;
        let beta = tokio::time::timeout(Duration::from_secs(1), map.ensure_ready("beta"))
            .await
            .expect("unrelated name blocked");
        assert!(matches!(beta, Readiness::Claimed(_)));
    }
}
