//! Periodic governance jobs: ban forgiveness and secret rotation.
//!
//! Every process runs a scheduler task, but only the holder of the
//! coordinator lease executes jobs. Standbys keep trying to claim the
//! lease so a crashed leader is replaced within one lease period.
//!
//! Forgiveness only runs while a flood threshold is configured, rotation
//! only while secrets are handed out.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::coordinator::ProcessCoordinator;
use crate::flood::FloodGuard;
use crate::secret::SecretChallenge;

pub struct Scheduler {
    coordinator: ProcessCoordinator,
    flood: FloodGuard,
    secrets: SecretChallenge,
    forgive_every: Duration,
    rotate_every: Option<Duration>,
    /// How often to renew or retry the lease.
    heartbeat: Duration,
}

/// Stops the scheduler task when asked.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
}

struct Deadlines {
    forgive: Instant,
    rotate: Instant,
}

impl Scheduler {
    pub fn new(
        coordinator: ProcessCoordinator,
        flood: FloodGuard,
        secrets: SecretChallenge,
        forgive_every: Duration,
        rotate_every: Option<Duration>,
        lease: Duration,
    ) -> Self {
        Self {
            coordinator,
            flood,
            secrets,
            forgive_every,
            rotate_every,
            heartbeat: (lease / 2).max(Duration::from_millis(10)),
        }
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        SchedulerHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut leading = false;
        let mut deadlines = self.deadlines_from(Instant::now());

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let held = if leading {
                self.coordinator.renew().await
            } else {
                self.coordinator.try_claim().await
            };

            match held {
                Ok(true) if !leading => {
                    info!("Acquired scheduler lease");
                    leading = true;
                    deadlines = self.deadlines_from(Instant::now());
                    if let Err(e) = self.secrets.ensure_seeded().await {
                        warn!("Failed to seed secrets: {}", e);
                    }
                }
                Ok(true) => {}
                Ok(false) => {
                    if leading {
                        info!("Lost scheduler lease");
                    }
                    leading = false;
                }
                Err(e) => {
                    warn!("Scheduler lease check failed: {}", e);
                    continue;
                }
            }

            if leading {
                self.run_due(&mut deadlines).await;
            }
        }

        if leading {
            if let Err(e) = self.coordinator.release().await {
                warn!("Failed to release scheduler lease: {}", e);
            }
        }
        debug!("Scheduler stopped");
    }

    fn deadlines_from(&self, now: Instant) -> Deadlines {
        Deadlines {
            forgive: now + self.forgive_every,
            rotate: now + self.rotate_every.unwrap_or_default(),
        }
    }

    async fn run_due(&self, deadlines: &mut Deadlines) {
        let now = Instant::now();

        if self.flood.is_active() && now >= deadlines.forgive {
            deadlines.forgive = now + self.forgive_every;
            match self.flood.forgive().await {
                Ok(cleared) => debug!("Forgiveness pass cleared {} clients", cleared),
                Err(e) => warn!("Forgiveness pass failed: {}", e),
            }
        }

        if let Some(every) = self.rotate_every {
            if now >= deadlines.rotate {
                deadlines.rotate = now + every;
                if let Err(e) = self.secrets.rotate().await {
                    warn!("Secret rotation failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, SharedStore};
    use std::sync::Arc;

    fn scheduler(store: Arc<dyn SharedStore>, lease: Duration) -> Scheduler {
        Scheduler::new(
            ProcessCoordinator::new(store.clone(), "scheduler", Some(lease)),
            FloodGuard::new(store.clone(), Some(5)),
            SecretChallenge::new(store, 1.0),
            Duration::from_millis(40),
            Some(Duration::from_millis(40)),
            lease,
        )
    }

    #[tokio::test]
    async fn test_leader_seeds_rotates_and_forgives() {
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        store.set_hash_int("banned", "1.2.3.4", 2).await.unwrap();

        let handle = scheduler(store.clone(), Duration::from_millis(40)).spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let first = store.get_str("secret_1").await.unwrap();
        assert!(first.is_some());

        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.stop().await;

        assert_ne!(store.get_str("secret_1").await.unwrap(), first);
        assert!(store.get_all_hash_int("banned").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_standby_takes_over_after_leader_stops() {
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let lease = Duration::from_millis(40);

        let leader = scheduler(store.clone(), lease).spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let standby = scheduler(store.clone(), lease).spawn();
        leader.stop().await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        let outsider = ProcessCoordinator::new(store, "scheduler", Some(lease));
        assert!(!outsider.try_claim().await.unwrap());
        standby.stop().await;
    }

    #[tokio::test]
    async fn test_disabled_jobs_do_not_run() {
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        store.set_hash_int("banned", "1.2.3.4", 2).await.unwrap();
        let lease = Duration::from_millis(40);

        let handle = Scheduler::new(
            ProcessCoordinator::new(store.clone(), "scheduler", Some(lease)),
            FloodGuard::new(store.clone(), None),
            SecretChallenge::new(store.clone(), 1.0),
            Duration::from_millis(40),
            None,
            lease,
        )
        .spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let seeded = store.get_str("secret_1").await.unwrap();
        assert!(seeded.is_some());

        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.stop().await;

        assert_eq!(store.get_str("secret_1").await.unwrap(), seeded);
        assert_eq!(store.get_hash_int("banned", "1.2.3.4").await.unwrap(), 2);
    }
}
