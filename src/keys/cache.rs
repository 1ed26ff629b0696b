//! Short-lived cache in front of an API key lookup.
//!
//! Unknown keys are cached too, so a client hammering with a bad key does
//! not reach the database on every request.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{ApiKeyLookup, ApiKeyQuota, KeyError};

/// A cached value with expiration time.
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn get(&self) -> Option<T> {
        if self.is_expired() {
            None
        } else {
            Some(self.value.clone())
        }
    }
}

/// Wraps a lookup with a bounded TTL cache.
pub struct CachedLookup<L> {
    inner: L,
    entries: RwLock<HashMap<String, CacheEntry<Option<ApiKeyQuota>>>>,
    ttl: Duration,
    capacity: usize,
}

impl<L: ApiKeyLookup> CachedLookup<L> {
    pub fn new(inner: L, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// `Some(result)` on a fresh hit, `None` on a miss.
    fn cached(&self, key: &str) -> Option<Option<ApiKeyQuota>> {
        self.entries
            .read()
            .ok()
            .and_then(|guard| guard.get(key).and_then(|e| e.get()))
    }

    fn store(&self, key: &str, value: Option<ApiKeyQuota>) {
        if let Ok(mut guard) = self.entries.write() {
            if guard.len() >= self.capacity && !guard.contains_key(key) {
                guard.retain(|_, entry| !entry.is_expired());
            }
            if guard.len() >= self.capacity && !guard.contains_key(key) {
                let oldest = guard
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    guard.remove(&oldest);
                }
            }
            guard.insert(key.to_string(), CacheEntry::new(value, self.ttl));
        }
    }
}

#[async_trait]
impl<L: ApiKeyLookup> ApiKeyLookup for CachedLookup<L> {
    async fn lookup(&self, key: &str) -> Result<Option<ApiKeyQuota>, KeyError> {
        if let Some(hit) = self.cached(key) {
            return Ok(hit);
        }

        let result = self.inner.lookup(key).await?;
        self.store(key, result);
        Ok(result)
    }
}
