use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{CONTENT_TYPE, ORIGIN};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::{
    client_identity, AccessGate, BaseCost, Denial, GateRequest, ProtectedEndpoint, RequestFields,
};

/// Largest request body the gate will buffer.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Axum middleware running the full admission sequence around a handler.
pub async fn access_check(
    State(gate): State<Arc<AccessGate>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer);
    let path = request.uri().path().to_string();
    let endpoint = ProtectedEndpoint::from_path(&path).unwrap_or(ProtectedEndpoint::Translate);

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return Denial::PayloadTooLarge.into_response(),
    };

    let origin = parts
        .headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let gate_request = GateRequest {
        identity,
        endpoint,
        origin,
        fields: RequestFields::parse(content_type, &bytes, parts.uri.query()),
    };

    let Some(metrics) = gate.metrics() else {
        return guarded(&gate, &gate_request, parts, bytes, next, started).await;
    };

    let api_key = gate_request.fields.api_key.as_deref().unwrap_or("");
    let in_flight = metrics.start(&path, &gate_request.identity, api_key);
    let response = guarded(&gate, &gate_request, parts, bytes, next, started).await;
    drop(in_flight);

    metrics.observe(
        &path,
        response.status(),
        &gate_request.identity,
        api_key,
        started.elapsed(),
    );
    response
}

/// Admit, run the handler, then charge what it cost.
async fn guarded(
    gate: &AccessGate,
    gate_request: &GateRequest,
    parts: Parts,
    bytes: Bytes,
    next: Next,
    started: Instant,
) -> Response {
    let admission = match gate.admit(gate_request).await {
        Ok(admission) => admission,
        Err(denial) => {
            if denial.charges() {
                if let Err(overflow) = gate
                    .settle(&gate_request.identity, None, 1, started.elapsed())
                    .await
                {
                    return overflow.into_response();
                }
            }
            return denial.into_response();
        }
    };

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(admission.clone());
    let response = next.run(request).await;

    let base_cost = response
        .extensions()
        .get::<BaseCost>()
        .map(|cost| cost.0)
        .unwrap_or(1);

    match gate
        .settle(
            &admission.identity,
            admission.key.as_ref(),
            base_cost,
            started.elapsed(),
        )
        .await
    {
        Ok(()) => response,
        Err(denial) => denial.into_response(),
    }
}
