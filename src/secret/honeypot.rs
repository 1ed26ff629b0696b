//! Plausible, empty results handed to callers that present the honeypot secret.

use rand::seq::IndexedRandom;
use serde_json::{json, Value};

const EMOJIS: &[&str] = &[
    "😀", "😂", "🙃", "😉", "😎", "🤔", "😴", "🥳", "👍", "👋", "🙏", "🎉", "🌞", "🌈", "🍕",
    "☕", "🐱", "🐶", "🦄", "🚀",
];

pub fn emoji() -> &'static str {
    EMOJIS.choose(&mut rand::rng()).copied().unwrap_or("👍")
}

pub fn translate_placeholder() -> Value {
    json!({
        "translatedText": emoji(),
        "alternatives": [],
        "detectedLanguage": { "confidence": 100, "language": "en" }
    })
}

pub fn detect_placeholder() -> Value {
    json!([{ "confidence": 100, "language": "en" }])
}
