//! SQLite-backed API key store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{ApiKeyLookup, ApiKeyQuota, KeyError};

/// A stored API key and its limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub api_key: String,
    pub req_limit: i64,
    pub char_limit: Option<i64>,
}

/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct LocalKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl LocalKeyStore {
    /// Open (creating if needed) the key database at `path`.
    pub fn open(path: &Path) -> Result<Self, KeyError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| KeyError::Database(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, for tests and throwaway servers.
    pub fn open_in_memory() -> Result<Self, KeyError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, KeyError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS api_keys (
                api_key TEXT NOT NULL PRIMARY KEY,
                req_limit INTEGER NOT NULL,
                char_limit INTEGER DEFAULT NULL
            );",
        )?;

        // Databases created before per-key character limits lack the column
        let has_char_limit = conn
            .prepare("PRAGMA table_info(api_keys)")?
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?
            .iter()
            .any(|name| name == "char_limit");
        if !has_char_limit {
            tracing::info!("Upgrading api_keys table with char_limit column");
            conn.execute_batch("ALTER TABLE api_keys ADD COLUMN char_limit INTEGER DEFAULT NULL;")?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, KeyError> {
        self.conn
            .lock()
            .map_err(|_| KeyError::Database("connection lock poisoned".to_string()))
    }

    /// Insert or replace a key. A missing key is generated; a `char_limit`
    /// of zero is stored as no limit.
    pub fn add(
        &self,
        req_limit: i64,
        api_key: Option<String>,
        char_limit: Option<i64>,
    ) -> Result<ApiKeyRecord, KeyError> {
        let record = ApiKeyRecord {
            api_key: api_key.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            req_limit,
            char_limit: char_limit.filter(|limit| *limit != 0),
        };

        self.conn()?.execute(
            "INSERT OR REPLACE INTO api_keys (api_key, req_limit, char_limit) VALUES (?1, ?2, ?3)",
            params![record.api_key, record.req_limit, record.char_limit],
        )?;
        Ok(record)
    }

    /// Returns true if a key was deleted.
    pub fn remove(&self, api_key: &str) -> Result<bool, KeyError> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM api_keys WHERE api_key = ?1", params![api_key])?;
        Ok(deleted > 0)
    }

    pub fn all(&self) -> Result<Vec<ApiKeyRecord>, KeyError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT api_key, req_limit, char_limit FROM api_keys ORDER BY api_key")?;
        let records = stmt
            .query_map([], |row| {
                Ok(ApiKeyRecord {
                    api_key: row.get(0)?,
                    req_limit: row.get(1)?,
                    char_limit: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn find(&self, api_key: &str) -> Result<Option<ApiKeyQuota>, KeyError> {
        let quota = self
            .conn()?
            .query_row(
                "SELECT req_limit, char_limit FROM api_keys WHERE api_key = ?1",
                params![api_key],
                |row| {
                    Ok(ApiKeyQuota {
                        req_limit: row.get(0)?,
                        char_limit: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(quota)
    }
}

#[async_trait]
impl ApiKeyLookup for LocalKeyStore {
    async fn lookup(&self, key: &str) -> Result<Option<ApiKeyQuota>, KeyError> {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.find(&key))
            .await
            .map_err(|e| KeyError::Database(format!("lookup task failed: {}", e)))?
    }
}
