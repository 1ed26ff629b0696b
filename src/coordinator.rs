//! Cross-process "only one of us does this" flags.
//!
//! Worker processes started together race to write their owner token into
//! the shared store; the one whose compare-and-set succeeds runs the setup.
//! With a lease the flag expires unless renewed, so a crashed holder is
//! replaced. Renewal and release only succeed while the stored token is
//! still ours.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::{SharedStore, StoreResult};

#[derive(Clone)]
pub struct ProcessCoordinator {
    store: Arc<dyn SharedStore>,
    flag: String,
    owner: String,
    lease: Option<Duration>,
}

impl ProcessCoordinator {
    /// `lease` of `None` makes a claim permanent for the store's lifetime.
    pub fn new(store: Arc<dyn SharedStore>, flag: impl Into<String>, lease: Option<Duration>) -> Self {
        Self {
            store,
            flag: format!("coordinator:{}", flag.into()),
            owner: uuid::Uuid::new_v4().to_string(),
            lease,
        }
    }

    /// Atomically claim the unset flag. True for the winner.
    pub async fn try_claim(&self) -> StoreResult<bool> {
        self.store
            .compare_and_set_str(&self.flag, None, Some(self.owner.as_str()), self.lease)
            .await
    }

    /// Extend a claim we hold. False if it lapsed or someone else holds it.
    pub async fn renew(&self) -> StoreResult<bool> {
        let owner = Some(self.owner.as_str());
        self.store
            .compare_and_set_str(&self.flag, owner, owner, self.lease)
            .await
    }

    /// Clear the flag if we still hold it.
    pub async fn release(&self) -> StoreResult<bool> {
        self.store
            .compare_and_set_str(&self.flag, Some(self.owner.as_str()), None, None)
            .await
    }

    /// Run `setup` only if this process wins the claim. Returns whether it ran.
    pub async fn run_once<F, Fut>(&self, setup: F) -> StoreResult<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<()>>,
    {
        if !self.try_claim().await? {
            tracing::debug!("{} already claimed by another process", self.flag);
            return Ok(false);
        }
        setup().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_setup_runs_once_across_workers() {
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let coordinator = ProcessCoordinator::new(store.clone(), "setup", None);
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .run_once(|| async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lease_expires_without_renewal() {
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let leader = ProcessCoordinator::new(store.clone(), "jobs", Some(Duration::from_millis(30)));
        let standby = ProcessCoordinator::new(store, "jobs", Some(Duration::from_millis(30)));

        assert!(leader.try_claim().await.unwrap());
        assert!(!standby.try_claim().await.unwrap());
        assert!(leader.renew().await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!leader.renew().await.unwrap());
        assert!(standby.try_claim().await.unwrap());
    }

    #[tokio::test]
    async fn test_release_allows_new_claim() {
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let coordinator = ProcessCoordinator::new(store, "jobs", None);

        assert!(coordinator.try_claim().await.unwrap());
        assert!(coordinator.release().await.unwrap());
        assert!(coordinator.try_claim().await.unwrap());
    }

    #[tokio::test]
    async fn test_lapsed_leader_cannot_renew_over_new_holder() {
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let lease = Some(Duration::from_millis(30));
        let stale = ProcessCoordinator::new(store.clone(), "jobs", lease);
        let fresh = ProcessCoordinator::new(store, "jobs", lease);

        assert!(stale.try_claim().await.unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(fresh.try_claim().await.unwrap());

        assert!(!stale.renew().await.unwrap());
        assert!(fresh.renew().await.unwrap());

        // Nor can it clear the flag out from under the new holder
        assert!(!stale.release().await.unwrap());
        assert!(!stale.try_claim().await.unwrap());
        assert!(fresh.renew().await.unwrap());
    }
}
