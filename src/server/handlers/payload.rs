//! Request body decoding and handler errors.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use crate::server::engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn missing(name: &str) -> Self {
        ApiError::BadRequest(format!("Invalid request: missing {} parameter", name))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) | ApiError::Engine(EngineError::UnsupportedPair { .. }) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Engine(EngineError::Failed(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Request parameters from a JSON object or a form body.
pub struct Payload {
    pub is_json: bool,
    fields: Map<String, Value>,
}

impl Payload {
    pub fn parse(headers: &HeaderMap, body: &[u8]) -> Result<Self, ApiError> {
        let is_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));

        let fields = if is_json {
            match serde_json::from_slice::<Value>(body) {
                Ok(Value::Object(map)) => map,
                _ => return Err(ApiError::BadRequest("Invalid JSON format".to_string())),
            }
        } else {
            url::form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect()
        };

        Ok(Self { is_json, fields })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Non-empty string parameter.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Integer parameter given as a number or a numeric string.
    pub fn integer(&self, name: &str) -> Result<Option<i64>, ApiError> {
        let not_a_number =
            || ApiError::BadRequest(format!("Invalid request: {} parameter is not a number", name));
        match self.get(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(not_a_number),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| not_a_number()),
            Some(_) => Err(not_a_number()),
        }
    }
}

/// `q` as one text or a batch.
pub enum Texts {
    Single(String),
    Batch(Vec<String>),
}

impl Texts {
    pub fn from_payload(payload: &Payload) -> Result<Self, ApiError> {
        match payload.get("q") {
            Some(Value::String(s)) if !s.is_empty() => {
                // Form input may carry CRLF line endings
                let text = if payload.is_json {
                    s.clone()
                } else {
                    s.lines().collect::<Vec<_>>().join("\n")
                };
                Ok(Texts::Single(text))
            }
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        ApiError::BadRequest("Invalid request: q must contain strings".to_string())
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Texts::Batch),
            _ => Err(ApiError::missing("q")),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            Texts::Single(text) => std::slice::from_ref(text),
            Texts::Batch(texts) => texts,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Texts::Batch(_))
    }
}
