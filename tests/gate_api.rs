//! End-to-end tests of the governed translation API.
//!
//! Requests go through the full router: access gate middleware, handlers
//! and cost settlement, backed by the in-memory store and a manual clock.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use regex::Regex;
use serde_json::{json, Value};
use tower::ServiceExt;

use transgate::clock::ManualClock;
use transgate::config::Settings;
use transgate::keys::LocalKeyStore;
use transgate::server::engine::PassthroughEngine;
use transgate::server::{create_router, AppState};
use transgate::storage::InMemoryStore;

const CLIENT: &str = "198.51.100.7";

struct Harness {
    app: Router,
    state: AppState,
    clock: ManualClock,
    _dir: tempfile::TempDir,
}

async fn harness(settings: Settings) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("api_keys.db");
    let keys = LocalKeyStore::open(&db_path).unwrap();
    keys.add(100, Some("good-key".into()), None).unwrap();

    let settings = Settings {
        api_keys_db_path: db_path,
        bogus_match_probability: 1.0,
        ..settings
    }
    .validate()
    .unwrap();

    let clock = ManualClock::new(1_700_000_000_000);
    let engine = Arc::new(PassthroughEngine::new(&settings.load_only));
    let state = AppState::new(
        settings,
        Arc::new(InMemoryStore::new()),
        Arc::new(clock.clone()),
        engine,
    )
    .unwrap();
    state.gate.secrets().ensure_seeded().await.unwrap();

    Harness {
        app: create_router(state.clone()),
        state,
        clock,
        _dir: dir,
    }
}

impl Harness {
    async fn translate(&self, body: Value) -> Response {
        let request = Request::post("/translate")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", CLIENT)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Response {
        let mut request = Request::get(uri);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

fn hello() -> Value {
    json!({ "q": "hello", "source": "en", "target": "es" })
}

fn hello_with(field: &str, value: &str) -> Value {
    let mut body = hello();
    body[field] = json!(value);
    body
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Evaluate the `apiSecret` expression from app.js.
fn decode_secret(script: &str) -> String {
    let line = script
        .lines()
        .find(|l| l.starts_with("var apiSecret ="))
        .unwrap();
    let assign = Regex::new(r"\w+\[(\d+)\]=String\.fromCharCode\((\d+)([+\-^])(\d+)\)").unwrap();

    let mut chars: Vec<(usize, char)> = assign
        .captures_iter(line)
        .map(|caps| {
            let a: u32 = caps[2].parse().unwrap();
            let b: u32 = caps[4].parse().unwrap();
            let code = match &caps[3] {
                "+" => a + b,
                "-" => a - b,
                _ => a ^ b,
            };
            (caps[1].parse().unwrap(), char::from_u32(code).unwrap())
        })
        .collect();
    chars.sort_by_key(|(i, _)| *i);
    chars.into_iter().map(|(_, c)| c).collect()
}

fn secret_settings() -> Settings {
    Settings {
        api_keys: true,
        require_api_key_secret: true,
        get_api_key_link: Some("https://example.com/keys".into()),
        ..Settings::default()
    }
}

#[tokio::test]
async fn steady_client_is_never_rejected() {
    let h = harness(Settings {
        req_limit: 10,
        req_flood_threshold: 3,
        ..Settings::default()
    })
    .await;

    for _ in 0..10 {
        let response = h.translate(hello()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["translatedText"], "hello");
        h.clock.advance(Duration::from_secs(60));
    }
    assert_eq!(h.state.gate.flood().violations(CLIENT).await.unwrap(), 0);
}

#[tokio::test]
async fn exceeding_the_minute_tier_records_one_violation() {
    let h = harness(Settings {
        req_limit: 2,
        req_flood_threshold: 3,
        ..Settings::default()
    })
    .await;

    assert_eq!(h.translate(hello()).await.status(), StatusCode::OK);
    assert_eq!(h.translate(hello()).await.status(), StatusCode::OK);

    let response = h.translate(hello()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body_json(response).await["error"],
        "Slowdown: 2 per 1 minute"
    );
    assert_eq!(h.state.gate.flood().violations(CLIENT).await.unwrap(), 1);
    assert!(!h.state.gate.flood().is_banned(CLIENT).await.unwrap());
}

#[tokio::test]
async fn banned_client_is_refused_without_charge() {
    let h = harness(Settings {
        req_limit: 1,
        req_flood_threshold: 2,
        ..Settings::default()
    })
    .await;

    assert_eq!(h.translate(hello()).await.status(), StatusCode::OK);
    assert_eq!(
        h.translate(hello()).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(
        h.translate(hello()).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert!(h.state.gate.flood().is_banned(CLIENT).await.unwrap());

    // Quota has long recovered, the ban still applies
    h.clock.advance(Duration::from_secs(300));
    for _ in 0..3 {
        let response = h.translate(hello()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["error"],
            "Too many request limits violations"
        );
    }

    assert!(h
        .state
        .gate
        .quota()
        .check(CLIENT, None)
        .await
        .unwrap()
        .is_allowed());
    assert_eq!(h.state.gate.flood().violations(CLIENT).await.unwrap(), 2);
}

#[tokio::test]
async fn browser_secret_is_admitted_and_stale_secret_is_not() {
    let h = harness(secret_settings()).await;

    let page = h.get("/", &[]).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert_eq!(
        page.headers().get(header::SET_COOKIE).unwrap(),
        "r=1; Path=/"
    );

    let script = h
        .get(
            "/js/app.js",
            &[("user-agent", "Mozilla/5.0"), ("cookie", "r=1")],
        )
        .await;
    assert_eq!(
        script.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store, no-cache, must-revalidate, max-age=0"
    );
    let secret = decode_secret(&body_text(script).await);
    assert_eq!(
        Some(secret.clone()),
        h.state.gate.secrets().current_secret().await.unwrap()
    );

    let response = h.translate(hello_with("secret", &secret)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["translatedText"], "hello");

    // One rotation keeps the old secret valid, the second retires it
    h.state.gate.secrets().rotate().await.unwrap();
    assert_eq!(
        h.translate(hello_with("secret", &secret)).await.status(),
        StatusCode::OK
    );
    h.state.gate.secrets().rotate().await.unwrap();

    let response = h.translate(hello_with("secret", &secret)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Visit https://example.com/keys to get an API key"
    );
}

#[tokio::test]
async fn scripted_client_gets_the_honeypot() {
    let h = harness(secret_settings()).await;

    // No cookie and no user agent: the script carries the decoy
    let script = body_text(h.get("/js/app.js", &[]).await).await;
    let bogus = h.state.gate.secrets().bogus_secret().await.unwrap().unwrap();
    assert_eq!(decode_secret(&script), bogus);
    assert!(script.contains(&format!(
        "var apiSecretFallback = \"{}\";",
        BASE64.encode(&bogus)
    )));

    let response = h.translate(hello_with("secret", &bogus)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_ne!(body["translatedText"], "hello");
    assert_eq!(body["alternatives"], json!([]));
    assert_eq!(body["detectedLanguage"]["language"], "en");
}

#[tokio::test]
async fn api_keys_are_resolved() {
    let h = harness(secret_settings()).await;

    let response = h.translate(hello_with("api_key", "nope")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Invalid API key");

    // A valid key needs no secret
    let response = h.translate(hello_with("api_key", "good-key")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn char_limit_is_enforced_after_admission() {
    let h = harness(Settings {
        char_limit: 3,
        ..Settings::default()
    })
    .await;

    let response = h.translate(hello()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Invalid request: request (5) exceeds text limit (3)"
    );
}

#[tokio::test]
async fn frontend_settings_reflect_configuration() {
    let h = harness(Settings {
        char_limit: 500,
        ..Settings::default()
    })
    .await;

    let settings = body_json(h.get("/frontend/settings", &[]).await).await;
    assert_eq!(settings["charLimit"], 500);
    assert_eq!(settings["apiKeys"], false);
    assert_eq!(settings["language"]["source"]["code"], "en");
    assert_eq!(settings["language"]["target"]["code"], "es");
}

#[tokio::test]
async fn routes_live_under_the_url_prefix() {
    let h = harness(Settings {
        url_prefix: "/mt".into(),
        ..Settings::default()
    })
    .await;

    let request = Request::post("/mt/detect")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("q=%D0%9F%D1%80%D0%B8%D0%B2%D0%B5%D1%82"))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await[0]["language"], "ru");

    let script = body_text(h.get("/mt/js/app.js", &[]).await).await;
    assert!(script.contains("var apiUrlPrefix = \"/mt\";"));
}
