//! Translation API handlers.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};

use super::payload::{ApiError, Payload, Texts};
use crate::gate::{Admission, BaseCost};
use crate::server::engine::Detection;
use crate::server::AppState;

/// List supported languages.
pub async fn languages(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.languages().to_vec())
}

/// Translate one text or a batch.
pub async fn translate(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload = Payload::parse(&headers, &body)?;
    let texts = Texts::from_payload(&payload)?;
    let source = payload
        .text("source")
        .ok_or_else(|| ApiError::missing("source"))?;
    let target = payload
        .text("target")
        .ok_or_else(|| ApiError::missing("target"))?;

    let settings = &state.settings;
    let alternatives = payload.integer("alternatives")?.unwrap_or(0).max(0);
    if settings.alternatives_limit != -1 && alternatives > settings.alternatives_limit {
        return Err(ApiError::BadRequest(format!(
            "Invalid request: alternatives parameter must be <= {}",
            settings.alternatives_limit
        )));
    }

    if texts.is_batch()
        && settings.batch_limit != -1
        && texts.as_slice().len() as i64 > settings.batch_limit
    {
        return Err(ApiError::BadRequest(format!(
            "Invalid request: request ({}) exceeds text limit ({})",
            texts.as_slice().len(),
            settings.batch_limit
        )));
    }

    if admission.char_limit != -1 {
        for text in texts.as_slice() {
            let size = text.chars().count();
            if size as i64 > admission.char_limit {
                return Err(ApiError::BadRequest(format!(
                    "Invalid request: request ({}) exceeds text limit ({})",
                    size, admission.char_limit
                )));
            }
        }
    }

    let engine = &state.engine;
    let detected = if source == "auto" {
        engine
            .detect(&texts.as_slice().join("\n"))
            .await?
            .into_iter()
            .next()
    } else {
        Some(Detection {
            confidence: 100.0,
            language: source.to_string(),
        })
    };
    let detected = detected
        .filter(|d| engine.language(&d.language).is_some())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is not supported", source)))?;
    if engine.language(target).is_none() {
        return Err(ApiError::BadRequest(format!("{} is not supported", target)));
    }

    let format = payload.text("format").unwrap_or("text");
    if format != "text" && format != "html" {
        return Err(ApiError::BadRequest(format!(
            "{} format is not supported",
            format
        )));
    }

    let mut translated = Vec::with_capacity(texts.as_slice().len());
    for text in texts.as_slice() {
        translated.push(
            engine
                .translate(
                    text,
                    &detected.language,
                    target,
                    format == "html",
                    alternatives as usize,
                )
                .await?,
        );
    }

    let mut result = serde_json::Map::new();
    match &texts {
        Texts::Single(_) => {
            if let Some(first) = translated.first() {
                result.insert("translatedText".into(), json!(first.text));
                if alternatives > 0 {
                    result.insert("alternatives".into(), json!(first.alternatives));
                }
            }
            if source == "auto" {
                result.insert("detectedLanguage".into(), json!(detected));
            }
        }
        Texts::Batch(batch) => {
            let outputs: Vec<&str> = translated.iter().map(|t| t.text.as_str()).collect();
            result.insert("translatedText".into(), json!(outputs));
            if alternatives > 0 {
                let alts: Vec<&Vec<String>> = translated.iter().map(|t| &t.alternatives).collect();
                result.insert("alternatives".into(), json!(alts));
            }
            if source == "auto" {
                result.insert(
                    "detectedLanguage".into(),
                    json!(vec![detected.clone(); batch.len()]),
                );
            }
        }
    }

    let cost = BaseCost(texts.as_slice().len().max(1) as u64);
    Ok((Extension(cost), Json(Value::Object(result))).into_response())
}

/// Detect the language of a text.
pub async fn detect(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<Detection>>, ApiError> {
    let payload = Payload::parse(&headers, &body)?;
    let texts = Texts::from_payload(&payload)?;

    let detections = state.engine.detect(&texts.as_slice().join("\n")).await?;
    Ok(Json(detections))
}
