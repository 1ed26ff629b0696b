//! Router configuration for the translation server.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;
use crate::gate::access_check;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Only these pass through the access gate
    let gated = Router::new()
        .route("/translate", post(handlers::translate))
        .route("/detect", post(handlers::detect))
        .route_layer(from_fn_with_state(state.gate.clone(), access_check));

    let mut open = Router::new()
        .route("/languages", get(handlers::languages).post(handlers::languages))
        .route("/frontend/settings", get(handlers::frontend_settings));
    if !state.settings.disable_web_ui {
        open = open
            .route("/", get(handlers::index))
            .route("/js/app.js", get(handlers::app_js));
    }
    if state.settings.metrics {
        open = open.route("/metrics", get(handlers::metrics));
    }

    let prefix = state.settings.url_prefix.clone();
    let app = gated
        .merge(open)
        .layer(CorsLayer::permissive())
        .with_state(state);

    if prefix.is_empty() {
        app
    } else {
        Router::new().nest(&prefix, app)
    }
}
