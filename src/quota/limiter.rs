use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::cost::CostModel;
use super::tier::{build_tiers, QuotaTier};
use crate::clock::Clock;
use crate::config::Settings;
use crate::keys::ApiKeyQuota;
use crate::storage::{SharedStore, StoreResult};

/// Outcome of testing or charging a client's tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    /// The first tier that would overflow, e.g. `"10 per 1 minute"`.
    Exceeded { limit: String },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }
}

/// Multi-tier moving-window limiter with deduct-on-completion accounting.
#[derive(Clone)]
pub struct QuotaLimiter {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    tiers: Vec<QuotaTier>,
    cost: CostModel,
    default_char_limit: i64,
}

impl QuotaLimiter {
    pub fn new(
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        tiers: Vec<QuotaTier>,
        cost: CostModel,
        default_char_limit: i64,
    ) -> Self {
        Self {
            store,
            clock,
            tiers,
            cost,
            default_char_limit,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            store,
            clock,
            build_tiers(settings),
            CostModel::new(settings.time_cost_unit()),
            settings.char_limit,
        )
    }

    /// Bounded tiers for this caller with their `(count, window)`.
    fn active(&self, key: Option<&ApiKeyQuota>) -> Vec<(&QuotaTier, u64, Duration)> {
        let key_limit = key.map(|k| k.req_limit);
        self.tiers
            .iter()
            .filter_map(|tier| {
                tier.limit(key_limit)
                    .map(|(count, window)| (tier, count, window))
            })
            .collect()
    }

    /// Would one more unit fit in every tier? Records nothing.
    pub async fn check(
        &self,
        identity: &str,
        key: Option<&ApiKeyQuota>,
    ) -> StoreResult<QuotaDecision> {
        let now_ms = self.clock.now_ms();
        for (tier, count, window) in self.active(key) {
            let used = self
                .store
                .window_count(&tier.storage_key(identity), window, now_ms)
                .await?;
            if used + 1 > count {
                debug!("{} is at {}/{} for {}", identity, used, count, tier.kind);
                return Ok(QuotaDecision::Exceeded {
                    limit: tier.describe(count),
                });
            }
        }
        Ok(QuotaDecision::Allowed)
    }

    /// Charge `cost` units to every tier, stopping at the first that overflows.
    pub async fn deduct(
        &self,
        identity: &str,
        key: Option<&ApiKeyQuota>,
        cost: u64,
    ) -> StoreResult<QuotaDecision> {
        let now_ms = self.clock.now_ms();
        for (tier, count, window) in self.active(key) {
            let recorded = self
                .store
                .window_hit(&tier.storage_key(identity), window, count, cost, now_ms)
                .await?;
            if !recorded {
                debug!(
                    "{} overflowed {} with a cost of {}",
                    identity,
                    tier.describe(count),
                    cost
                );
                return Ok(QuotaDecision::Exceeded {
                    limit: tier.describe(count),
                });
            }
        }
        Ok(QuotaDecision::Allowed)
    }

    /// Units a finished request consumes.
    pub fn request_cost(&self, base: u64, elapsed: Duration) -> u64 {
        self.cost.cost(base, elapsed)
    }

    /// The key's character limit if it has one, else the global default.
    /// `-1` means unlimited.
    pub fn char_limit(&self, key: Option<&ApiKeyQuota>) -> i64 {
        key.and_then(|k| k.char_limit)
            .unwrap_or(self.default_char_limit)
    }
}
