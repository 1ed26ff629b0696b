//! HTTP server for the translation API.
//!
//! Provides:
//! - `/translate` and `/detect` behind the access gate
//! - `/languages` and `/frontend/settings` for clients
//! - The web UI page and its secret-bearing script
//! - `/metrics` for Prometheus when enabled

pub mod engine;
mod handlers;
mod routes;

pub use handlers::ApiError;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::coordinator::ProcessCoordinator;
use crate::flood::FloodGuard;
use crate::gate::{AccessGate, GatePolicy};
use crate::keys;
use crate::metrics::RequestMetrics;
use crate::quota::QuotaLimiter;
use crate::scheduler::Scheduler;
use crate::secret::SecretChallenge;
use crate::storage::{open_store, SharedStore};

use engine::{PassthroughEngine, TranslationEngine};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub gate: Arc<AccessGate>,
    pub engine: Arc<dyn TranslationEngine>,
}

impl AppState {
    /// Wire the gate against `store`. Settings must already be validated.
    pub fn new(
        settings: Settings,
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        engine: Arc<dyn TranslationEngine>,
    ) -> anyhow::Result<Self> {
        let mut gate = AccessGate::new(
            FloodGuard::new(store.clone(), settings.flood_threshold()),
            QuotaLimiter::from_settings(&settings, store.clone(), clock),
            SecretChallenge::new(store, settings.bogus_match_probability),
            keys::from_settings(&settings)?,
            GatePolicy::from_settings(&settings)?,
        );
        if settings.metrics {
            gate = gate.with_metrics(Arc::new(RequestMetrics::new()?));
        }

        Ok(Self {
            settings: Arc::new(settings),
            gate: Arc::new(gate),
            engine,
        })
    }
}

/// Start the web server and run until Ctrl-C.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let settings = settings.validate()?;
    let store = open_store(&settings.shared_storage).await?;

    let secrets = SecretChallenge::new(store.clone(), settings.bogus_match_probability);
    let setup = ProcessCoordinator::new(store.clone(), "setup", Some(settings.lease()));
    let seeded = setup
        .run_once(|| async { secrets.ensure_seeded().await })
        .await?;
    if seeded {
        tracing::info!("Seeded shared state");
    }

    let scheduler = Scheduler::new(
        ProcessCoordinator::new(store.clone(), "scheduler", Some(settings.lease())),
        FloodGuard::new(store.clone(), settings.flood_threshold()),
        secrets,
        settings.forgive_every(),
        settings.rotate_every(),
        settings.lease(),
    )
    .spawn();

    let engine: Arc<dyn TranslationEngine> = Arc::new(PassthroughEngine::new(&settings.load_only));
    let addr: SocketAddr = settings.bind_addr().parse()?;
    let state = AppState::new(settings, store, Arc::new(SystemClock), engine)?;
    let app = create_router(state);

    tracing::info!("Starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    })
    .await;

    scheduler.stop().await;
    served?;
    Ok(())
}
