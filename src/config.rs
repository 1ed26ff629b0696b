//! Deployment configuration.
//!
//! Every option can be given as a flag or a `TRANSGATE_*` environment
//! variable (a `.env` file is loaded first). Numeric limits use `-1` for
//! "disabled".

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};
use regex::Regex;

/// Errors raised while validating configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported shared storage URI '{0}' (expected memory:// or redis://)")]
    UnsupportedStorage(String),
    #[error("shared storage '{0}' requires building with the redis-backend feature")]
    BackendNotCompiled(String),
    #[error("invalid --require-api-key-origin pattern: {0}")]
    InvalidOriginPattern(#[from] regex::Error),
    #[error("--bogus-match-probability must be between 0 and 1, got {0}")]
    InvalidProbability(f64),
    #[error("--{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Server and governance settings.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Address to bind to
    #[arg(long, env = "TRANSGATE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "TRANSGATE_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Maximum characters per translation request
    #[arg(long, env = "TRANSGATE_CHAR_LIMIT", default_value_t = -1, allow_negative_numbers = true)]
    pub char_limit: i64,

    /// Default requests per minute per client
    #[arg(long, env = "TRANSGATE_REQ_LIMIT", default_value_t = -1, allow_negative_numbers = true)]
    pub req_limit: i64,

    /// Default requests per hour per client
    #[arg(long, env = "TRANSGATE_HOURLY_REQ_LIMIT", default_value_t = -1, allow_negative_numbers = true)]
    pub hourly_req_limit: i64,

    /// Number of extra hourly tiers with a decaying allowance
    #[arg(long, env = "TRANSGATE_HOURLY_REQ_LIMIT_DECAY", default_value_t = 0)]
    pub hourly_req_limit_decay: u32,

    /// API key limit multiplier for the hourly tiers
    #[arg(long, env = "TRANSGATE_HOURLY_REQ_LIMIT_MULTIPLIER", default_value_t = 60)]
    pub hourly_req_limit_multiplier: u64,

    /// Default requests per day per client
    #[arg(long, env = "TRANSGATE_DAILY_REQ_LIMIT", default_value_t = -1, allow_negative_numbers = true)]
    pub daily_req_limit: i64,

    /// API key limit multiplier for the daily tier
    #[arg(long, env = "TRANSGATE_DAILY_REQ_LIMIT_MULTIPLIER", default_value_t = 1440)]
    pub daily_req_limit_multiplier: u64,

    /// Rate limit violations before a client is banned
    #[arg(long, env = "TRANSGATE_REQ_FLOOD_THRESHOLD", default_value_t = -1, allow_negative_numbers = true)]
    pub req_flood_threshold: i64,

    /// Seconds of processing time counted as one extra request
    #[arg(long, env = "TRANSGATE_REQ_TIME_COST", default_value_t = -1, allow_negative_numbers = true)]
    pub req_time_cost: i64,

    /// Maximum texts per batch request
    #[arg(long, env = "TRANSGATE_BATCH_LIMIT", default_value_t = -1, allow_negative_numbers = true)]
    pub batch_limit: i64,

    /// Maximum number of alternative translations
    #[arg(long, env = "TRANSGATE_ALTERNATIVES_LIMIT", default_value_t = -1, allow_negative_numbers = true)]
    pub alternatives_limit: i64,

    /// Require API keys for protected endpoints
    #[arg(long, env = "TRANSGATE_API_KEYS")]
    pub api_keys: bool,

    /// SQLite database holding API keys
    #[arg(long, env = "TRANSGATE_API_KEYS_DB_PATH", default_value = "db/api_keys.db")]
    pub api_keys_db_path: PathBuf,

    /// Remote endpoint that validates API keys instead of the local database
    #[arg(long, env = "TRANSGATE_API_KEYS_REMOTE")]
    pub api_keys_remote: Option<String>,

    /// Link shown to clients that need an API key
    #[arg(long, env = "TRANSGATE_GET_API_KEY_LINK")]
    pub get_api_key_link: Option<String>,

    /// Origin pattern allowed to call without an API key
    #[arg(long, env = "TRANSGATE_REQUIRE_API_KEY_ORIGIN")]
    pub require_api_key_origin: Option<String>,

    /// Require the rotating secret from clients without an API key
    #[arg(long, env = "TRANSGATE_REQUIRE_API_KEY_SECRET")]
    pub require_api_key_secret: bool,

    /// Require the rotating secret from every client without an API key
    #[arg(long, env = "TRANSGATE_UNDER_ATTACK")]
    pub under_attack: bool,

    /// Shared state backend (memory:// or redis://host:port/db)
    #[arg(long, env = "TRANSGATE_SHARED_STORAGE", default_value = "memory://")]
    pub shared_storage: String,

    /// Minutes between ban forgiveness passes
    #[arg(long, env = "TRANSGATE_FORGIVE_INTERVAL", default_value_t = 10)]
    pub forgive_interval: u64,

    /// Minutes between secret rotations
    #[arg(long, env = "TRANSGATE_SECRET_ROTATION_INTERVAL", default_value_t = 30)]
    pub secret_rotation_interval: u64,

    /// Probability that a non-matching secret is checked against the honeypot
    #[arg(long, env = "TRANSGATE_BOGUS_MATCH_PROBABILITY", default_value_t = 0.5)]
    pub bogus_match_probability: f64,

    /// Seconds a scheduler leader holds its lease
    #[arg(long, env = "TRANSGATE_COORDINATOR_LEASE", default_value_t = 60)]
    pub coordinator_lease: u64,

    /// Only offer these language codes
    #[arg(long, env = "TRANSGATE_LOAD_ONLY", value_delimiter = ',')]
    pub load_only: Vec<String>,

    /// Do not serve the web UI
    #[arg(long, env = "TRANSGATE_DISABLE_WEB_UI")]
    pub disable_web_ui: bool,

    /// Path prefix for every route
    #[arg(long, env = "TRANSGATE_URL_PREFIX", default_value = "")]
    pub url_prefix: String,

    /// Milliseconds the web UI waits before translating
    #[arg(long, env = "TRANSGATE_FRONTEND_TIMEOUT", default_value_t = 500)]
    pub frontend_timeout: u64,

    /// Expose Prometheus metrics at /metrics
    #[arg(long, env = "TRANSGATE_METRICS")]
    pub metrics: bool,

    /// Bearer token required to scrape /metrics
    #[arg(long, env = "TRANSGATE_METRICS_AUTH_TOKEN")]
    pub metrics_auth_token: Option<String>,
}

#[derive(Parser)]
struct DefaultsOnly {
    #[command(flatten)]
    settings: Settings,
}

impl Default for Settings {
    fn default() -> Self {
        DefaultsOnly::parse_from(["transgate"]).settings
    }
}

impl Settings {
    /// Check settings that can only fail at startup and normalize the rest.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        match self.shared_storage.split_once("://").map(|(s, _)| s) {
            Some("memory") => {}
            Some("redis") | Some("rediss") => {
                if !cfg!(feature = "redis-backend") {
                    return Err(ConfigError::BackendNotCompiled(self.shared_storage));
                }
            }
            _ => return Err(ConfigError::UnsupportedStorage(self.shared_storage)),
        }

        self.origin_pattern()?;

        if !(0.0..=1.0).contains(&self.bogus_match_probability) {
            return Err(ConfigError::InvalidProbability(self.bogus_match_probability));
        }
        if self.forgive_interval == 0 {
            return Err(ConfigError::ZeroInterval("forgive-interval"));
        }
        if self.secret_rotation_interval == 0 {
            return Err(ConfigError::ZeroInterval("secret-rotation-interval"));
        }
        if self.coordinator_lease == 0 {
            return Err(ConfigError::ZeroInterval("coordinator-lease"));
        }

        let prefix = self.url_prefix.trim_end_matches('/');
        self.url_prefix = if prefix.is_empty() || prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{}", prefix)
        };

        self.api_keys_remote = self.api_keys_remote.filter(|s| !s.is_empty());
        self.get_api_key_link = self.get_api_key_link.filter(|s| !s.is_empty());
        self.require_api_key_origin = self.require_api_key_origin.filter(|s| !s.is_empty());
        self.metrics_auth_token = self.metrics_auth_token.filter(|s| !s.is_empty());

        Ok(self)
    }

    /// Compiled origin allow-list, if one is configured.
    pub fn origin_pattern(&self) -> Result<Option<Regex>, ConfigError> {
        match self.require_api_key_origin.as_deref() {
            Some(pattern) if !pattern.is_empty() => Ok(Some(Regex::new(pattern)?)),
            _ => Ok(None),
        }
    }

    pub fn flood_threshold(&self) -> Option<u64> {
        positive(self.req_flood_threshold)
    }

    pub fn time_cost_unit(&self) -> Option<Duration> {
        positive(self.req_time_cost).map(Duration::from_secs)
    }

    pub fn forgive_every(&self) -> Duration {
        Duration::from_secs(self.forgive_interval * 60)
    }

    /// Whether browsers are handed the shared secret at all.
    pub fn secrets_required(&self) -> bool {
        self.require_api_key_secret || self.under_attack
    }

    /// Rotation period, or `None` when no secret is ever handed out.
    pub fn rotate_every(&self) -> Option<Duration> {
        self.secrets_required()
            .then(|| Duration::from_secs(self.secret_rotation_interval * 60))
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.coordinator_lease)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `Some(n)` for a configured limit, `None` for `-1`/`0`.
pub fn positive(value: i64) -> Option<u64> {
    (value > 0).then_some(value as u64)
}
