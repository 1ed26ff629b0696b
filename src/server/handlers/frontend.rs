//! Web UI entry points.
//!
//! The page sets a marker cookie; the script served afterwards embeds the
//! real API secret only for browsers that carry it. Everything else gets
//! the decoy secret.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::server::AppState;

const MARKER_COOKIE: &str = "r";

fn has_marker_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| name == MARKER_COOKIE && !value.is_empty())
}

/// Serve the translation page.
pub async fn index(State(state): State<AppState>) -> Response {
    if state.settings.disable_web_ui {
        return StatusCode::NOT_FOUND.into_response();
    }

    let prefix = &state.settings.url_prefix;
    let page = Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Transgate</title>\n</head>\n<body>\n<div id=\"app\"></div>\n\
         <script src=\"{}/js/app.js\"></script>\n</body>\n</html>\n",
        prefix
    ));

    if state.settings.secrets_required() {
        let cookie = format!("{}=1; Path=/", MARKER_COOKIE);
        ([(header::SET_COOKIE, cookie)], page).into_response()
    } else {
        page.into_response()
    }
}

/// Serve the page script with the API secret embedded.
pub async fn app_js(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.settings.disable_web_ui {
        return StatusCode::NOT_FOUND.into_response();
    }

    let settings = &state.settings;
    let secrets = state.gate.secrets();

    let (secret_expr, fallback) = if settings.secrets_required() {
        let from_browser =
            headers.contains_key(header::USER_AGENT) && has_marker_cookie(&headers);
        let js = if from_browser {
            secrets.current_secret_js().await
        } else {
            secrets.bogus_secret_js().await
        };
        match (js, secrets.bogus_secret_b64().await) {
            (Ok(js), Ok(b64)) => (js, b64),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Cannot load API secret for app.js: {}", e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    } else {
        ("\"\"".to_string(), String::new())
    };

    let body = format!(
        "var apiUrlPrefix = {};\nvar apiKeyLink = {};\nvar apiSecret = {};\nvar apiSecretFallback = {};\n",
        json!(settings.url_prefix),
        json!(settings.get_api_key_link.as_deref().unwrap_or("")),
        secret_expr,
        json!(fallback),
    );

    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, max-age=0",
            ),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "-1"),
            (header::LAST_MODIFIED, "Thu, 01 Jan 1970 00:00:00 GMT"),
        ],
        body,
    )
        .into_response()
}

/// Settings the web UI reads on load.
pub async fn frontend_settings(State(state): State<AppState>) -> impl IntoResponse {
    let settings = &state.settings;
    let engine = &state.engine;

    let pick = |preferred: &str, fallback: usize| {
        engine
            .language(preferred)
            .or_else(|| engine.languages().get(fallback))
            .or_else(|| engine.languages().first())
            .map(|l| json!({ "code": l.code, "name": l.name }))
    };

    Json(json!({
        "charLimit": settings.char_limit,
        "frontendTimeout": settings.frontend_timeout,
        "apiKeys": settings.api_keys,
        "keyRequired": settings.api_keys && settings.require_api_key_origin.is_some(),
        "suggestions": false,
        "filesTranslation": false,
        "supportedFilesFormat": [],
        "language": {
            "source": pick("en", 0),
            "target": pick("es", 1),
        },
    }))
}
