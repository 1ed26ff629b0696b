//! Per-client request quotas.
//!
//! A client is held to several moving windows at once (a minute, one or
//! more decaying hour windows, a day). Requests are checked before they
//! run and charged their real cost after they finish.

mod cost;
mod limiter;
mod tier;

pub use cost::CostModel;
pub use limiter::{QuotaDecision, QuotaLimiter};
pub use tier::{build_tiers, QuotaTier, TierKind};
