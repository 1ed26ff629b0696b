//! API key lookup.
//!
//! Keys come either from a local SQLite database or from a remote
//! authority, always behind a short cache.

mod cache;
mod local;
mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use cache::CachedLookup;
pub use local::{ApiKeyRecord, LocalKeyStore};
pub use remote::RemoteKeyAuthority;

use crate::config::Settings;

const LOCAL_CACHE_SIZE: usize = 1000;
const LOCAL_CACHE_TTL: Duration = Duration::from_secs(30);
const REMOTE_CACHE_SIZE: usize = 1000;
const REMOTE_CACHE_TTL: Duration = Duration::from_secs(600);

/// Per-key limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiKeyQuota {
    /// Scales every quota tier.
    pub req_limit: i64,
    /// Overrides the global character limit when set.
    pub char_limit: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Key database error: {0}")]
    Database(String),
    #[error("Key authority error: {0}")]
    Remote(String),
}

impl From<rusqlite::Error> for KeyError {
    fn from(e: rusqlite::Error) -> Self {
        KeyError::Database(e.to_string())
    }
}

/// Resolves an API key to its limits; `None` for unknown keys.
#[async_trait]
pub trait ApiKeyLookup: Send + Sync {
    async fn lookup(&self, key: &str) -> Result<Option<ApiKeyQuota>, KeyError>;
}

/// Build the configured lookup, or `None` when API keys are disabled.
pub fn from_settings(settings: &Settings) -> Result<Option<Arc<dyn ApiKeyLookup>>, KeyError> {
    if !settings.api_keys {
        return Ok(None);
    }

    if let Some(url) = settings.api_keys_remote.as_deref() {
        tracing::info!("Validating API keys against {}", url);
        let remote = RemoteKeyAuthority::new(url)?;
        return Ok(Some(Arc::new(CachedLookup::new(
            remote,
            REMOTE_CACHE_SIZE,
            REMOTE_CACHE_TTL,
        ))));
    }

    tracing::info!(
        "Using API key database at {}",
        settings.api_keys_db_path.display()
    );
    let local = LocalKeyStore::open(&settings.api_keys_db_path)?;
    Ok(Some(Arc::new(CachedLookup::new(
        local,
        LOCAL_CACHE_SIZE,
        LOCAL_CACHE_TTL,
    ))))
}
