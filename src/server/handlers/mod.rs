//! HTTP request handlers for the translation server.

mod api;
mod frontend;
mod metrics;
mod payload;

pub use api::{detect, languages, translate};
pub use frontend::{app_js, frontend_settings, index};
pub use metrics::metrics;
pub use payload::ApiError;
