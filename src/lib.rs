//! Transgate - translation API server with request governance.
//!
//! Every translation request passes an access gate that enforces
//! moving-window quotas, bans flooding clients, resolves API keys and
//! challenges keyless web clients with a rotating secret. Governance
//! state lives in a shared store so several worker processes agree on it.

pub mod cli;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod flood;
pub mod gate;
pub mod keys;
pub mod metrics;
pub mod quota;
pub mod scheduler;
pub mod secret;
pub mod server;
pub mod storage;
