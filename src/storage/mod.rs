//! Shared state store used by every governance component.
//!
//! The backend is chosen from a URI: `memory://` keeps state in-process,
//! `redis://host:port/db` shares it across worker processes (requires the
//! `redis-backend` feature).

mod backend;
mod memory;
#[cfg(feature = "redis-backend")]
mod redis;
#[cfg(test)]
mod unavailable;

use std::sync::Arc;

pub use backend::{SharedStore, StorageError, StoreResult};
pub use memory::InMemoryStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStore;
#[cfg(test)]
pub(crate) use unavailable::UnavailableStore;

/// Open the shared store named by `uri`.
pub async fn open_store(uri: &str) -> StoreResult<Arc<dyn SharedStore>> {
    let scheme = uri.split_once("://").map(|(scheme, _)| scheme);

    match scheme {
        Some("memory") => {
            tracing::debug!("Using in-memory shared store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        Some("redis") | Some("rediss") => open_redis(uri).await,
        _ => Err(StorageError::InvalidUri(format!(
            "unsupported storage URI '{}' (expected memory:// or redis://)",
            uri
        ))),
    }
}

#[cfg(feature = "redis-backend")]
async fn open_redis(uri: &str) -> StoreResult<Arc<dyn SharedStore>> {
    tracing::debug!("Connecting to Redis shared store");
    Ok(Arc::new(RedisStore::connect(uri).await?))
}

#[cfg(not(feature = "redis-backend"))]
async fn open_redis(uri: &str) -> StoreResult<Arc<dyn SharedStore>> {
    Err(StorageError::InvalidUri(format!(
        "'{}' requires building with the redis-backend feature",
        uri
    )))
}
