//! Store whose backend is always down, for exercising lenient failure paths.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::backend::{SharedStore, StorageError, StoreResult};

#[derive(Debug, Default)]
pub struct UnavailableStore;

fn down<T>() -> StoreResult<T> {
    Err(StorageError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl SharedStore for UnavailableStore {
    async fn exists(&self, _key: &str) -> StoreResult<bool> {
        down()
    }

    async fn get_bool(&self, _key: &str) -> StoreResult<bool> {
        down()
    }

    async fn set_bool(&self, _key: &str, _value: bool, _ttl: Option<Duration>) -> StoreResult<()> {
        down()
    }

    async fn compare_and_set_str(
        &self,
        _key: &str,
        _expected: Option<&str>,
        _new: Option<&str>,
        _ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        down()
    }

    async fn get_int(&self, _key: &str) -> StoreResult<i64> {
        down()
    }

    async fn set_int(&self, _key: &str, _value: i64) -> StoreResult<()> {
        down()
    }

    async fn get_str(&self, _key: &str) -> StoreResult<Option<String>> {
        down()
    }

    async fn set_str(&self, _key: &str, _value: &str) -> StoreResult<()> {
        down()
    }

    async fn incr_hash_int(&self, _ns: &str, _key: &str) -> StoreResult<i64> {
        down()
    }

    async fn decr_hash_int(&self, _ns: &str, _key: &str) -> StoreResult<i64> {
        down()
    }

    async fn get_hash_int(&self, _ns: &str, _key: &str) -> StoreResult<i64> {
        down()
    }

    async fn set_hash_int(&self, _ns: &str, _key: &str, _value: i64) -> StoreResult<()> {
        down()
    }

    async fn get_all_hash_int(&self, _ns: &str) -> StoreResult<HashMap<String, i64>> {
        down()
    }

    async fn del_hash_field(&self, _ns: &str, _key: &str) -> StoreResult<()> {
        down()
    }

    async fn decay_hash_int(&self, _ns: &str, _key: &str, _cap: i64) -> StoreResult<i64> {
        down()
    }

    async fn window_hit(
        &self,
        _key: &str,
        _window: Duration,
        _limit: u64,
        _cost: u64,
        _now_ms: i64,
    ) -> StoreResult<bool> {
        down()
    }

    async fn window_count(&self, _key: &str, _window: Duration, _now_ms: i64) -> StoreResult<u64> {
        down()
    }
}
