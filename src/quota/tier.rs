//! Tier descriptors built once from configuration.

use std::fmt;
use std::time::Duration;

use crate::config::{positive, Settings};

/// Decay applied per extra hour of window length.
const HOURLY_DECAY: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    Minute,
    /// Window of `n` hours.
    Hourly(u32),
    Daily,
}

impl TierKind {
    pub fn window(&self) -> Duration {
        match self {
            TierKind::Minute => Duration::from_secs(60),
            TierKind::Hourly(n) => Duration::from_secs(3600 * u64::from(*n)),
            TierKind::Daily => Duration::from_secs(86_400),
        }
    }

    fn slug(&self) -> String {
        match self {
            TierKind::Minute => "minute".to_string(),
            TierKind::Hourly(n) => format!("hour{}", n),
            TierKind::Daily => "day".to_string(),
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierKind::Minute => write!(f, "1 minute"),
            TierKind::Hourly(n) => write!(f, "{} hour", n),
            TierKind::Daily => write!(f, "1 day"),
        }
    }
}

/// One independent moving-window limit.
#[derive(Debug, Clone)]
pub struct QuotaTier {
    pub kind: TierKind,
    /// Configured count for callers without an API key; `None` is unbounded.
    base: Option<u64>,
    /// Scale applied to an API key's `req_limit`.
    key_multiplier: u64,
    decay: f64,
}

impl QuotaTier {
    pub fn new(kind: TierKind, base: Option<u64>, key_multiplier: u64, decay: f64) -> Self {
        Self {
            kind,
            base,
            key_multiplier,
            decay,
        }
    }

    /// Effective `(count, window)` for a caller, or `None` if unbounded.
    ///
    /// A key limit of zero or less leaves the tier unbounded for that key.
    pub fn limit(&self, key_req_limit: Option<i64>) -> Option<(u64, Duration)> {
        let count = match key_req_limit {
            Some(req_limit) => positive(req_limit)?.saturating_mul(self.key_multiplier),
            None => self.base?,
        };
        let effective = (count as f64 * self.decay).floor() as u64;
        Some((effective, self.kind.window()))
    }

    /// Human readable rule, e.g. `"10 per 1 minute"`.
    pub fn describe(&self, count: u64) -> String {
        format!("{} per {}", count, self.kind)
    }

    pub fn storage_key(&self, identity: &str) -> String {
        format!("quota:{}:{}", self.kind.slug(), identity)
    }
}

/// Minute tier always, hourly tiers `1..=decay+1` and a daily tier when configured.
pub fn build_tiers(settings: &Settings) -> Vec<QuotaTier> {
    let mut tiers = vec![QuotaTier::new(
        TierKind::Minute,
        positive(settings.req_limit),
        1,
        1.0,
    )];

    if let Some(hourly) = positive(settings.hourly_req_limit) {
        for n in 1..=settings.hourly_req_limit_decay + 1 {
            let scale = u64::from(n);
            tiers.push(QuotaTier::new(
                TierKind::Hourly(n),
                Some(hourly * scale),
                settings.hourly_req_limit_multiplier * scale,
                HOURLY_DECAY.powi(n as i32 - 1),
            ));
        }
    }

    if let Some(daily) = positive(settings.daily_req_limit) {
        tiers.push(QuotaTier::new(
            TierKind::Daily,
            Some(daily),
            settings.daily_req_limit_multiplier,
            1.0,
        ));
    }

    tiers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly_settings(decay: u32) -> Settings {
        Settings {
            req_limit: 10,
            hourly_req_limit: 100,
            hourly_req_limit_decay: decay,
            daily_req_limit: 1000,
            ..Settings::default()
        }
    }

    #[test]
    fn test_tiers_from_settings() {
        let tiers = build_tiers(&hourly_settings(2));
        let kinds: Vec<TierKind> = tiers.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TierKind::Minute,
                TierKind::Hourly(1),
                TierKind::Hourly(2),
                TierKind::Hourly(3),
                TierKind::Daily
            ]
        );
    }

    #[test]
    fn test_only_minute_tier_by_default() {
        let tiers = build_tiers(&Settings::default());
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers[0].limit(None), None);
        assert_eq!(
            tiers[0].limit(Some(5)),
            Some((5, Duration::from_secs(60)))
        );
    }

    #[test]
    fn test_first_hour_has_no_decay() {
        let tiers = build_tiers(&hourly_settings(2));
        let hour1 = &tiers[1];

        assert_eq!(hour1.limit(None), Some((100, Duration::from_secs(3600))));
        // Key: 2 * 60 * 1
        assert_eq!(hour1.limit(Some(2)), Some((120, Duration::from_secs(3600))));
        assert_eq!(hour1.describe(100), "100 per 1 hour");
    }

    #[test]
    fn test_third_hour_is_discounted() {
        let tiers = build_tiers(&hourly_settings(2));
        let hour3 = &tiers[3];

        // 100 * 3 * 0.5625 = 168.75
        assert_eq!(hour3.limit(None), Some((168, Duration::from_secs(3 * 3600))));
        // 2 * (60 * 3) * 0.5625 = 202.5
        assert_eq!(hour3.limit(Some(2)), Some((202, Duration::from_secs(3 * 3600))));
    }

    #[test]
    fn test_daily_tier_uses_key_multiplier() {
        let tiers = build_tiers(&hourly_settings(0));
        let daily = tiers.last().unwrap();

        assert_eq!(daily.kind, TierKind::Daily);
        assert_eq!(daily.limit(None), Some((1000, Duration::from_secs(86_400))));
        assert_eq!(daily.limit(Some(3)), Some((4320, Duration::from_secs(86_400))));
        assert_eq!(daily.describe(1000), "1000 per 1 day");
    }

    #[test]
    fn test_nonpositive_key_limit_is_unbounded() {
        let tiers = build_tiers(&hourly_settings(0));
        assert_eq!(tiers[0].limit(Some(-1)), None);
    }
}
