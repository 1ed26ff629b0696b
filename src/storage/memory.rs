//! In-memory shared store for single-process operation.
//!
//! State lives behind a single lock so every operation is atomic within
//! the process. Nothing is shared with other processes and nothing
//! survives a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{SharedStore, StoreResult};

#[derive(Debug, Clone)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone)]
struct ScalarEntry {
    value: Scalar,
    expires_at: Option<Instant>,
}

impl ScalarEntry {
    fn new(value: Scalar, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| Instant::now() >= at)
            .unwrap_or(false)
    }
}

/// How often idle windows and expired scalars are swept, in store time.
const SWEEP_EVERY_MS: i64 = 60_000;

#[derive(Debug)]
struct Window {
    span_ms: i64,
    /// (timestamp ms, units) in insertion order.
    entries: VecDeque<(i64, u64)>,
}

impl Window {
    fn is_idle(&self, now_ms: i64) -> bool {
        self.entries
            .back()
            .map_or(true, |(ts, _)| *ts <= now_ms - self.span_ms)
    }
}

#[derive(Debug, Default)]
struct State {
    scalars: HashMap<String, ScalarEntry>,
    hashes: HashMap<String, HashMap<String, i64>>,
    windows: HashMap<String, Window>,
    last_sweep_ms: i64,
}

impl State {
    fn scalar(&self, key: &str) -> Option<&Scalar> {
        self.scalars
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| &entry.value)
    }

    fn scalar_string(&self, key: &str) -> Option<String> {
        match self.scalar(key)? {
            Scalar::Str(s) => Some(s.clone()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        }
    }

    fn put_scalar(&mut self, key: &str, value: Scalar, ttl: Option<Duration>) {
        self.scalars.retain(|_, entry| !entry.is_expired());
        self.scalars
            .insert(key.to_string(), ScalarEntry::new(value, ttl));
    }

    /// Drop expired entries from `key` and return the units left. An emptied
    /// window is removed.
    fn prune_window(&mut self, key: &str, window: Duration, now_ms: i64) -> u64 {
        let cutoff = now_ms - window.as_millis() as i64;
        let Some(slot) = self.windows.get_mut(key) else {
            return 0;
        };
        while slot.entries.front().is_some_and(|(ts, _)| *ts <= cutoff) {
            slot.entries.pop_front();
        }
        if slot.entries.is_empty() {
            self.windows.remove(key);
            return 0;
        }
        slot.entries.iter().map(|(_, units)| units).sum()
    }

    /// Forget windows nobody has hit within their span and scalars whose
    /// TTL passed. Runs at most once per `SWEEP_EVERY_MS`.
    fn sweep(&mut self, now_ms: i64) {
        if now_ms - self.last_sweep_ms < SWEEP_EVERY_MS {
            return;
        }
        self.last_sweep_ms = now_ms;
        self.windows.retain(|_, slot| !slot.is_idle(now_ms));
        self.scalars.retain(|_, entry| !entry.is_expired());
    }
}

/// In-memory shared store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.state.read().await.scalar(key).is_some())
    }

    async fn get_bool(&self, key: &str) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(match state.scalar(key) {
            Some(Scalar::Bool(b)) => *b,
            Some(Scalar::Int(i)) => *i != 0,
            Some(Scalar::Str(s)) => !s.is_empty() && s != "0",
            None => false,
        })
    }

    async fn set_bool(&self, key: &str, value: bool, ttl: Option<Duration>) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.put_scalar(key, Scalar::Bool(value), ttl);
        Ok(())
    }

    async fn compare_and_set_str(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.scalar_string(key).as_deref() != expected {
            return Ok(false);
        }
        match new {
            Some(value) => state.put_scalar(key, Scalar::Str(value.to_string()), ttl),
            None => {
                state.scalars.remove(key);
            }
        }
        Ok(true)
    }

    async fn get_int(&self, key: &str) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(match state.scalar(key) {
            Some(Scalar::Int(i)) => *i,
            Some(Scalar::Bool(b)) => i64::from(*b),
            Some(Scalar::Str(s)) => s.parse().unwrap_or(0),
            None => 0,
        })
    }

    async fn set_int(&self, key: &str, value: i64) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.put_scalar(key, Scalar::Int(value), None);
        Ok(())
    }

    async fn get_str(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.state.read().await.scalar_string(key))
    }

    async fn set_str(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.put_scalar(key, Scalar::Str(value.to_string()), None);
        Ok(())
    }

    async fn incr_hash_int(&self, ns: &str, key: &str) -> StoreResult<i64> {
        let mut state = self.state.write().await;
        let counter = state
            .hashes
            .entry(ns.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn decr_hash_int(&self, ns: &str, key: &str) -> StoreResult<i64> {
        let mut state = self.state.write().await;
        let counter = state
            .hashes
            .entry(ns.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert(0);
        *counter -= 1;
        Ok(*counter)
    }

    async fn get_hash_int(&self, ns: &str, key: &str) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .hashes
            .get(ns)
            .and_then(|fields| fields.get(key))
            .copied()
            .unwrap_or(0))
    }

    async fn set_hash_int(&self, ns: &str, key: &str, value: i64) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .hashes
            .entry(ns.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get_all_hash_int(&self, ns: &str) -> StoreResult<HashMap<String, i64>> {
        let state = self.state.read().await;
        Ok(state.hashes.get(ns).cloned().unwrap_or_default())
    }

    async fn del_hash_field(&self, ns: &str, key: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(fields) = state.hashes.get_mut(ns) {
            fields.remove(key);
        }
        Ok(())
    }

    async fn decay_hash_int(&self, ns: &str, key: &str, cap: i64) -> StoreResult<i64> {
        let mut state = self.state.write().await;
        let Some(fields) = state.hashes.get_mut(ns) else {
            return Ok(0);
        };
        let Some(current) = fields.get(key).copied() else {
            return Ok(0);
        };

        let next = current.min(cap) - 1;
        if next <= 0 {
            fields.remove(key);
            Ok(0)
        } else {
            fields.insert(key.to_string(), next);
            Ok(next)
        }
    }

    async fn window_hit(
        &self,
        key: &str,
        window: Duration,
        limit: u64,
        cost: u64,
        now_ms: i64,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        state.sweep(now_ms);
        let used = state.prune_window(key, window, now_ms);
        if used.saturating_add(cost) > limit {
            return Ok(false);
        }
        let span_ms = window.as_millis() as i64;
        let slot = state.windows.entry(key.to_string()).or_insert_with(|| Window {
            span_ms,
            entries: VecDeque::new(),
        });
        slot.span_ms = slot.span_ms.max(span_ms);
        slot.entries.push_back((now_ms, cost));
        Ok(true)
    }

    async fn window_count(&self, key: &str, window: Duration, now_ms: i64) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        Ok(state.prune_window(key, window, now_ms))
    }
}
