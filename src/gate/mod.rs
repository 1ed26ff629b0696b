//! Admission control wrapped around every protected endpoint.
//!
//! A request passes, in order: the ban check, API key resolution, the
//! quota pre-check, violation pay-back, and (for keyless callers under a
//! secret policy) the secret challenge. Once the handler has run its real
//! cost is charged to the quota windows.
//!
//! Store and key lookup failures are logged and let the request through.

mod identity;
mod middleware;
mod params;
mod rejection;

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

pub use identity::client_identity;
pub use middleware::{access_check, MAX_BODY_BYTES};
pub use params::RequestFields;
pub use rejection::Denial;

use crate::config::{ConfigError, Settings};
use crate::flood::FloodGuard;
use crate::keys::{ApiKeyLookup, ApiKeyQuota};
use crate::metrics::RequestMetrics;
use crate::quota::{QuotaDecision, QuotaLimiter};
use crate::secret::SecretChallenge;

/// Endpoints wrapped by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedEndpoint {
    Translate,
    Detect,
}

impl ProtectedEndpoint {
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/').rsplit('/').next()? {
            "translate" => Some(ProtectedEndpoint::Translate),
            "detect" => Some(ProtectedEndpoint::Detect),
            _ => None,
        }
    }
}

/// Quota units a handler reports for its request, read back from the
/// response extensions. Defaults to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseCost(pub u64);

/// Attached to admitted requests for the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub identity: String,
    pub key: Option<ApiKeyQuota>,
    /// Effective character limit; `-1` means unlimited.
    pub char_limit: i64,
}

/// What the gate needs to know about an inbound request.
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub identity: String,
    pub endpoint: ProtectedEndpoint,
    pub origin: Option<String>,
    pub fields: RequestFields,
}

/// Key and secret requirements.
#[derive(Debug, Clone, Default)]
pub struct GatePolicy {
    pub api_keys: bool,
    pub origin: Option<Regex>,
    pub require_secret: bool,
    pub under_attack: bool,
    pub get_api_key_link: Option<String>,
}

impl GatePolicy {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            api_keys: settings.api_keys,
            origin: settings.origin_pattern()?,
            require_secret: settings.require_api_key_secret,
            under_attack: settings.under_attack,
            get_api_key_link: settings.get_api_key_link.clone(),
        })
    }

    /// Origin must match the pattern from its first character.
    fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match &self.origin {
            Some(pattern) => pattern
                .find(origin.unwrap_or(""))
                .is_some_and(|m| m.start() == 0),
            None => true,
        }
    }

    fn secret_required(&self, origin: Option<&str>) -> bool {
        self.under_attack
            || (self.api_keys && (self.require_secret || !self.origin_allowed(origin)))
    }
}

pub struct AccessGate {
    flood: FloodGuard,
    quota: QuotaLimiter,
    secrets: SecretChallenge,
    keys: Option<Arc<dyn ApiKeyLookup>>,
    policy: GatePolicy,
    metrics: Option<Arc<RequestMetrics>>,
}

impl AccessGate {
    pub fn new(
        flood: FloodGuard,
        quota: QuotaLimiter,
        secrets: SecretChallenge,
        keys: Option<Arc<dyn ApiKeyLookup>>,
        policy: GatePolicy,
    ) -> Self {
        Self {
            flood,
            quota,
            secrets,
            keys,
            policy,
            metrics: None,
        }
    }

    /// Record duration and in-flight metrics for every gated request.
    pub fn with_metrics(mut self, metrics: Arc<RequestMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn flood(&self) -> &FloodGuard {
        &self.flood
    }

    pub fn quota(&self) -> &QuotaLimiter {
        &self.quota
    }

    pub fn secrets(&self) -> &SecretChallenge {
        &self.secrets
    }

    pub fn metrics(&self) -> Option<&RequestMetrics> {
        self.metrics.as_deref()
    }

    /// Decide whether the request may reach its handler.
    pub async fn admit(&self, request: &GateRequest) -> Result<Admission, Denial> {
        let id = request.identity.as_str();

        match self.flood.is_banned(id).await {
            Ok(true) => {
                debug!("Rejecting banned client {}", id);
                return Err(Denial::Banned);
            }
            Ok(false) => {}
            Err(e) => warn!("Ban check failed for {}: {}", id, e),
        }

        let (key, lookup_failed) = self.resolve_key(request).await?;

        match self.quota.check(id, key.as_ref()).await {
            Ok(QuotaDecision::Exceeded { limit }) => {
                self.report(id).await;
                return Err(Denial::QuotaExceeded { limit });
            }
            Ok(QuotaDecision::Allowed) => {}
            Err(e) => warn!("Quota check failed for {}: {}", id, e),
        }

        match self.flood.has_violation(id).await {
            Ok(true) => {
                if let Err(e) = self.flood.decrease(id).await {
                    warn!("Failed to decrease violations for {}: {}", id, e);
                }
            }
            Ok(false) => {}
            Err(e) => warn!("Violation check failed for {}: {}", id, e),
        }

        if key.is_none() && !lookup_failed && self.policy.secret_required(request.origin.as_deref())
        {
            self.challenge(request).await?;
        }

        Ok(Admission {
            identity: request.identity.clone(),
            key,
            char_limit: self.quota.char_limit(key.as_ref()),
        })
    }

    /// The caller's key limits, and whether the lookup itself failed.
    async fn resolve_key(
        &self,
        request: &GateRequest,
    ) -> Result<(Option<ApiKeyQuota>, bool), Denial> {
        let (Some(keys), Some(api_key)) = (&self.keys, request.fields.api_key.as_deref()) else {
            return Ok((None, false));
        };

        match keys.lookup(api_key).await {
            Ok(Some(quota)) => Ok((Some(quota), false)),
            Ok(None) => {
                debug!("Unknown API key from {}", request.identity);
                Err(Denial::InvalidKey)
            }
            Err(e) => {
                warn!("API key lookup failed for {}: {}", request.identity, e);
                Ok((None, true))
            }
        }
    }

    async fn challenge(&self, request: &GateRequest) -> Result<(), Denial> {
        let secret = request.fields.secret.as_deref().unwrap_or("");

        match self.secrets.secret_match(secret).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => {
                warn!("Secret check failed for {}: {}", request.identity, e);
                return Ok(());
            }
        }

        match self.secrets.secret_bogus_match(secret).await {
            Ok(true) => {
                debug!("Honeypot secret from {}", request.identity);
                return Err(Denial::Decoy(request.endpoint));
            }
            Ok(false) => {}
            Err(e) => warn!("Honeypot check failed for {}: {}", request.identity, e),
        }

        Err(Denial::KeyRequired {
            link: self.policy.get_api_key_link.clone(),
        })
    }

    /// Charge a finished request. Overflowing a tier reports a violation.
    pub async fn settle(
        &self,
        identity: &str,
        key: Option<&ApiKeyQuota>,
        base_cost: u64,
        elapsed: Duration,
    ) -> Result<(), Denial> {
        let cost = self.quota.request_cost(base_cost, elapsed);
        match self.quota.deduct(identity, key, cost).await {
            Ok(QuotaDecision::Allowed) => Ok(()),
            Ok(QuotaDecision::Exceeded { limit }) => {
                self.report(identity).await;
                Err(Denial::QuotaExceeded { limit })
            }
            Err(e) => {
                warn!("Failed to charge {} units to {}: {}", cost, identity, e);
                Ok(())
            }
        }
    }

    async fn report(&self, id: &str) {
        if let Err(e) = self.flood.report(id).await {
            warn!("Failed to record violation for {}: {}", id, e);
        }
    }
}
