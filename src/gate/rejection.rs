use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::ProtectedEndpoint;
use crate::secret;

/// Why the gate refused (or pretended to serve) a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    Banned,
    InvalidKey,
    KeyRequired { link: Option<String> },
    QuotaExceeded { limit: String },
    /// Honeypot secret presented: answer with plausible filler.
    Decoy(ProtectedEndpoint),
    PayloadTooLarge,
}

impl Denial {
    /// Whether the request still consumes quota.
    pub fn charges(&self) -> bool {
        !matches!(self, Denial::Banned | Denial::QuotaExceeded { .. })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Denial::Banned | Denial::InvalidKey => StatusCode::FORBIDDEN,
            Denial::KeyRequired { .. } => StatusCode::BAD_REQUEST,
            Denial::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Denial::Decoy(_) => StatusCode::OK,
            Denial::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Denial::Banned => "Too many request limits violations".to_string(),
            Denial::InvalidKey => "Invalid API key".to_string(),
            Denial::KeyRequired { link: Some(link) } => {
                format!("Visit {} to get an API key", link)
            }
            Denial::KeyRequired { link: None } => {
                "Please contact the server operator to get an API key".to_string()
            }
            Denial::QuotaExceeded { limit } => format!("Slowdown: {}", limit),
            Denial::Decoy(_) => String::new(),
            Denial::PayloadTooLarge => "Request body too large".to_string(),
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        let body = match &self {
            Denial::Decoy(ProtectedEndpoint::Translate) => secret::translate_placeholder(),
            Denial::Decoy(ProtectedEndpoint::Detect) => secret::detect_placeholder(),
            other => json!({ "error": other.message() }),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses_and_messages() {
        assert_eq!(Denial::Banned.status(), StatusCode::FORBIDDEN);
        assert_eq!(Denial::InvalidKey.message(), "Invalid API key");
        assert_eq!(
            Denial::KeyRequired {
                link: Some("https://example.com/keys".into())
            }
            .message(),
            "Visit https://example.com/keys to get an API key"
        );
        assert_eq!(
            Denial::QuotaExceeded {
                limit: "10 per 1 minute".into()
            }
            .message(),
            "Slowdown: 10 per 1 minute"
        );
        assert_eq!(
            Denial::Decoy(ProtectedEndpoint::Translate).status(),
            StatusCode::OK
        );
    }

    #[test]
    fn test_only_bans_and_overflows_are_free() {
        assert!(!Denial::Banned.charges());
        assert!(!Denial::QuotaExceeded { limit: String::new() }.charges());
        assert!(Denial::InvalidKey.charges());
        assert!(Denial::KeyRequired { link: None }.charges());
        assert!(Denial::Decoy(ProtectedEndpoint::Detect).charges());
    }
}
