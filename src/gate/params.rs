//! Pull the API key and client secret out of a request.

use serde_json::Value;

/// Governance fields a client may send with any protected request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFields {
    pub api_key: Option<String>,
    pub secret: Option<String>,
}

impl RequestFields {
    /// JSON bodies are read on their own; anything else reads the form body
    /// and then the query string.
    pub fn parse(content_type: Option<&str>, body: &[u8], query: Option<&str>) -> Self {
        let is_json = content_type.is_some_and(|ct| ct.contains("json"));
        if is_json {
            return Self::from_json(body);
        }

        let is_form =
            content_type.is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        let mut fields = if is_form {
            Self::from_form(body)
        } else {
            Self::default()
        };

        if let Some(query) = query {
            let from_query = Self::from_form(query.as_bytes());
            fields.api_key = fields.api_key.or(from_query.api_key);
            fields.secret = fields.secret.or(from_query.secret);
        }
        fields
    }

    fn from_json(body: &[u8]) -> Self {
        let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            api_key: field("api_key"),
            secret: field("secret"),
        }
    }

    fn from_form(body: &[u8]) -> Self {
        let mut fields = Self::default();
        for (name, value) in url::form_urlencoded::parse(body) {
            if value.is_empty() {
                continue;
            }
            match &*name {
                "api_key" if fields.api_key.is_none() => fields.api_key = Some(value.into_owned()),
                "secret" if fields.secret.is_none() => fields.secret = Some(value.into_owned()),
                _ => {}
            }
        }
        fields
    }
}
