//! API keys validated by a remote HTTP authority.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ApiKeyLookup, ApiKeyQuota, KeyError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct AuthorityResponse {
    error: Option<String>,
    req_limit: Option<i64>,
    char_limit: Option<i64>,
}

/// POSTs `api_key=<key>` to a configured URL.
///
/// The authority answers `{"error": ...}` for unknown keys and
/// `{"req_limit": n, "char_limit": m|null}` otherwise.
pub struct RemoteKeyAuthority {
    client: reqwest::Client,
    url: String,
}

impl RemoteKeyAuthority {
    pub fn new(url: impl Into<String>) -> Result<Self, KeyError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| KeyError::Remote(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ApiKeyLookup for RemoteKeyAuthority {
    async fn lookup(&self, key: &str) -> Result<Option<ApiKeyQuota>, KeyError> {
        let response: AuthorityResponse = self
            .client
            .post(&self.url)
            .form(&[("api_key", key)])
            .send()
            .await
            .map_err(|e| KeyError::Remote(e.to_string()))?
            .json()
            .await
            .map_err(|e| KeyError::Remote(format!("invalid response: {}", e)))?;

        if let Some(error) = response.error {
            tracing::debug!("Key authority rejected key: {}", error);
            return Ok(None);
        }

        let req_limit = response
            .req_limit
            .ok_or_else(|| KeyError::Remote("response missing req_limit".to_string()))?;

        Ok(Some(ApiKeyQuota {
            req_limit,
            char_limit: response.char_limit,
        }))
    }
}
