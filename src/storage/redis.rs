//! Redis-backed shared store for multi-process deployments.
//!
//! Compound operations run as Lua scripts so each one is atomic across
//! every worker talking to the same Redis instance.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::backend::{SharedStore, StorageError, StoreResult};

/// Key prefix for all governance data in Redis.
const KEY_PREFIX: &str = "transgate:";

/// Redis-backed shared store.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis (e.g., "redis://localhost:6379").
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StorageError::InvalidUri(format!("{}: {}", redis_url, e)))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::Unavailable(format!("Redis connection error: {}", e)))?;

        Ok(Self { conn })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }

    fn hash_key(&self, ns: &str) -> String {
        format!("{}hash:{}", KEY_PREFIX, ns)
    }

    fn window_key(&self, key: &str) -> String {
        format!("{}window:{}", KEY_PREFIX, key)
    }
}

fn command_error(e: redis::RedisError) -> StorageError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        StorageError::Unavailable(e.to_string())
    } else {
        StorageError::Command(e.to_string())
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(self.key(key)).await.map_err(command_error)
    }

    async fn get_bool(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.key(key)).await.map_err(command_error)?;
        Ok(value.is_some_and(|v| !v.is_empty() && v != "0"))
    }

    async fn set_bool(&self, key: &str, value: bool, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(bool_str(value));
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn compare_and_set_str(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();

        // Returns 1 if swapped, 0 otherwise
        let script = Script::new(
            r#"
            local key = KEYS[1]
            local current = redis.call('GET', key)

            if ARGV[1] == '1' then
                if current ~= ARGV[2] then
                    return 0
                end
            elseif current then
                return 0
            end

            if ARGV[3] ~= '1' then
                redis.call('DEL', key)
                return 1
            end
            local ttl_ms = tonumber(ARGV[5])
            if ttl_ms > 0 then
                redis.call('SET', key, ARGV[4], 'PX', ttl_ms)
            else
                redis.call('SET', key, ARGV[4])
            end
            return 1
        "#,
        );

        let ttl_ms = ttl.map(|t| t.as_millis().max(1) as i64).unwrap_or(0);
        let swapped: i64 = script
            .key(self.key(key))
            .arg(bool_str(expected.is_some()))
            .arg(expected.unwrap_or(""))
            .arg(bool_str(new.is_some()))
            .arg(new.unwrap_or(""))
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(swapped == 1)
    }

    async fn get_int(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.key(key)).await.map_err(command_error)?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    async fn set_int(&self, key: &str, value: i64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.key(key), value)
            .await
            .map_err(command_error)
    }

    async fn get_str(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(self.key(key)).await.map_err(command_error)
    }

    async fn set_str(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.key(key), value)
            .await
            .map_err(command_error)
    }

    async fn incr_hash_int(&self, ns: &str, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        conn.hincr(self.hash_key(ns), key, 1i64)
            .await
            .map_err(command_error)
    }

    async fn decr_hash_int(&self, ns: &str, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        conn.hincr(self.hash_key(ns), key, -1i64)
            .await
            .map_err(command_error)
    }

    async fn get_hash_int(&self, ns: &str, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .hget(self.hash_key(ns), key)
            .await
            .map_err(command_error)?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    async fn set_hash_int(&self, ns: &str, key: &str, value: i64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(self.hash_key(ns), key, value)
            .await
            .map_err(command_error)
    }

    async fn get_all_hash_int(&self, ns: &str) -> StoreResult<HashMap<String, i64>> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn
            .hgetall(self.hash_key(ns))
            .await
            .map_err(command_error)?;

        raw.into_iter()
            .map(|(field, value)| {
                value
                    .parse::<i64>()
                    .map(|v| (field, v))
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn del_hash_field(&self, ns: &str, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(self.hash_key(ns), key)
            .await
            .map_err(command_error)
    }

    async fn decay_hash_int(&self, ns: &str, key: &str, cap: i64) -> StoreResult<i64> {
        let mut conn = self.conn.clone();

        // Returns the value left behind (0 when the field was removed)
        let script = Script::new(
            r#"
            local hash = KEYS[1]
            local field = ARGV[1]
            local cap = tonumber(ARGV[2])

            local current = tonumber(redis.call('HGET', hash, field))
            if not current then
                return 0
            end

            local next = math.min(current, cap) - 1
            if next <= 0 then
                redis.call('HDEL', hash, field)
                return 0
            end
            redis.call('HSET', hash, field, next)
            return next
        "#,
        );

        script
            .key(self.hash_key(ns))
            .arg(key)
            .arg(cap)
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn window_hit(
        &self,
        key: &str,
        window: Duration,
        limit: u64,
        cost: u64,
        now_ms: i64,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();

        // Members are "<now_ms>:<nonce>:<units>" scored by timestamp.
        // Returns 1 if the units were recorded, 0 if the window is full.
        let script = Script::new(
            r#"
            local key = KEYS[1]
            local now_ms = tonumber(ARGV[1])
            local window_ms = tonumber(ARGV[2])
            local limit = tonumber(ARGV[3])
            local cost = tonumber(ARGV[4])
            local member = ARGV[5]

            redis.call('ZREMRANGEBYSCORE', key, '-inf', now_ms - window_ms)

            local used = 0
            for _, m in ipairs(redis.call('ZRANGE', key, 0, -1)) do
                used = used + (tonumber(string.match(m, ':(%d+)$')) or 0)
            end

            if used + cost > limit then
                return 0
            end

            redis.call('ZADD', key, now_ms, member)
            redis.call('PEXPIRE', key, window_ms)
            return 1
        "#,
        );

        let member = format!("{}:{}:{}", now_ms, uuid::Uuid::new_v4().simple(), cost);
        let recorded: i64 = script
            .key(self.window_key(key))
            .arg(now_ms)
            .arg(window.as_millis() as i64)
            .arg(limit)
            .arg(cost)
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(recorded == 1)
    }

    async fn window_count(&self, key: &str, window: Duration, now_ms: i64) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let cutoff_ms = now_ms - window.as_millis() as i64;

        // Exclusive lower bound matches the prune in window_hit
        let entries: Vec<String> = conn
            .zrangebyscore(self.window_key(key), format!("({}", cutoff_ms), "+inf")
            .await
            .map_err(command_error)?;

        Ok(entries
            .iter()
            .filter_map(|m| m.rsplit(':').next())
            .filter_map(|units| units.parse::<u64>().ok())
            .sum())
    }
}
