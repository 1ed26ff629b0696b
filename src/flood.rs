//! Escalating bans for clients that keep hitting their quota.
//!
//! Each rejection by the quota limiter adds a violation; a client whose
//! count reaches the threshold is banned until forgiveness brings it back
//! under. Counts live in the shared store under the `banned` namespace.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::storage::{SharedStore, StoreResult};

const NAMESPACE: &str = "banned";

#[derive(Clone)]
pub struct FloodGuard {
    store: Arc<dyn SharedStore>,
    threshold: Option<u64>,
}

impl FloodGuard {
    /// `threshold` of `None` disables banning entirely.
    pub fn new(store: Arc<dyn SharedStore>, threshold: Option<u64>) -> Self {
        Self { store, threshold }
    }

    pub fn is_active(&self) -> bool {
        self.threshold.is_some()
    }

    /// Record a quota violation.
    pub async fn report(&self, id: &str) -> StoreResult<()> {
        let Some(threshold) = self.threshold else {
            return Ok(());
        };

        let count = self.store.incr_hash_int(NAMESPACE, id).await?;
        if count == threshold as i64 {
            warn!("Banning {} after {} rate limit violations", id, count);
        } else {
            debug!("Violation {} of {} for {}", count, threshold, id);
        }
        Ok(())
    }

    /// Pay back one violation for a well-behaved request.
    pub async fn decrease(&self, id: &str) -> StoreResult<()> {
        if self.violations(id).await? == 0 {
            return Ok(());
        }

        // Racing decrements may overshoot; anything at or below zero is cleared
        let left = self.store.decr_hash_int(NAMESPACE, id).await?;
        if left <= 0 {
            self.store.del_hash_field(NAMESPACE, id).await?;
        }
        Ok(())
    }

    /// Current violation count, never negative.
    pub async fn violations(&self, id: &str) -> StoreResult<u64> {
        let count = self.store.get_hash_int(NAMESPACE, id).await?;
        Ok(count.max(0) as u64)
    }

    pub async fn has_violation(&self, id: &str) -> StoreResult<bool> {
        Ok(self.violations(id).await? > 0)
    }

    pub async fn is_banned(&self, id: &str) -> StoreResult<bool> {
        match self.threshold {
            Some(threshold) => Ok(self.violations(id).await? >= threshold),
            None => Ok(false),
        }
    }

    /// Decay every tracked count by one, clamping to the threshold first.
    /// Identities that reach zero are dropped. Returns how many were dropped.
    pub async fn forgive(&self) -> StoreResult<usize> {
        let Some(threshold) = self.threshold else {
            return Ok(0);
        };

        let tracked = self.store.get_all_hash_int(NAMESPACE).await?;
        let mut cleared = 0;
        for id in tracked.keys() {
            if self
                .store
                .decay_hash_int(NAMESPACE, id, threshold as i64)
                .await?
                == 0
            {
                cleared += 1;
            }
        }

        debug!(
            "Forgave {} tracked clients ({} cleared)",
            tracked.len(),
            cleared
        );
        Ok(cleared)
    }
}
