//! Response bodies as seen by callers.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::{RequestError, RequestResult};

/// Parsed response body
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    /// Non-JSON content passed through untouched
    Text(String),
    /// Empty body, or a JSON content type that did not parse
    #[default]
    Null,
}

impl ResponseBody {
    /// Interpret raw bytes according to the response `Content-Type`.
    pub fn from_bytes(content_type: Option<&str>, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::Null;
        }

        let is_json = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
        if is_json {
            return serde_json::from_slice(bytes).map_or(Self::Null, Self::Json);
        }

        Self::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    /// JSON value, if the body was JSON
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Text, if the body was not JSON
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Whether the body was empty
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert into a JSON value; text becomes a JSON string.
    pub fn into_json(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
            Self::Null => Value::Null,
        }
    }

    /// Deserialize the body into a typed value.
    ///
    /// # Errors
    /// Returns `RequestError::Decode` when the body does not match `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> RequestResult<T> {
        serde_json::from_value(self.into_json()).map_err(|err| RequestError::Decode(err.to_string()))
    }

    /// Build the error for a non-2xx response.
    ///
    /// The message prefers the server's `error` field, then `message`, then
    /// the status reason phrase.
    pub(crate) fn into_http_error(self, status: StatusCode) -> RequestError {
        let field = |name: &str| -> Option<String> {
            match self.as_json()?.get(name)? {
                Value::Null => None,
                Value::String(text) if text.is_empty() => None,
                Value::String(text) => Some(text.clone()),
                other => Some(other.to_string()),
            }
        };

        let message = field("error").or_else(|| field("message")).unwrap_or_else(|| {
            status.canonical_reason().map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
        });
        let details = field("details");

        RequestError::Http { status, message, details, body: self }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn json_content_type_is_parsed() {
        let body = ResponseBody::from_bytes(
            Some("application/json; charset=utf-8"),
            br#"{"items":[{"name":"tomato","low":true}]}"#,
        );
        assert_eq!(body.as_json().unwrap()["items"][0]["name"], "tomato");
    }

    #[test]
    fn other_content_types_pass_through_as_text() {
        let body = ResponseBody::from_bytes(Some("text/csv"), b"item,qty\nbasil,2");
        assert_eq!(body.as_text(), Some("item,qty\nbasil,2"));
    }

    #[test]
    fn empty_and_malformed_json_become_null() {
        assert!(ResponseBody::from_bytes(Some("application/json"), b"").is_null());
        assert!(ResponseBody::from_bytes(Some("application/json"), b"{oops").is_null());
        assert!(ResponseBody::from_bytes(None, b"").is_null());
    }

    #[test]
    fn deserialize_reports_decode_errors() {
        #[derive(Debug, Deserialize)]
        struct Stock {
            #[allow(dead_code)]
            qty: u32,
        }

        let ok: Stock = ResponseBody::Json(json!({"qty": 3})).deserialize().unwrap();
        assert_eq!(ok.qty, 3);

        let err = ResponseBody::Json(json!({"qty": "many"})).deserialize::<Stock>().unwrap_err();
        assert!(matches!(err, RequestError::Decode(_)));
    }

    #[test]
    fn http_error_prefers_error_then_message_fields() {
        let body = ResponseBody::Json(json!({"error": "Menu item not found", "message": "ignored"}));
        match body.into_http_error(StatusCode::NOT_FOUND) {
            RequestError::Http { message, details, .. } => {
                assert_eq!(message, "Menu item not found");
                assert!(details.is_none());
            }
            other => panic!("expected http error, got {:?}", other),
        }

        let body = ResponseBody::Json(json!({"message": "Invalid quantity", "details": "qty < 0"}));
        match body.into_http_error(StatusCode::BAD_REQUEST) {
            RequestError::Http { message, details, .. } => {
                assert_eq!(message, "Invalid quantity");
                assert_eq!(details.as_deref(), Some("qty < 0"));
            }
            other => panic!("expected http error, got {:?}", other),
        }
    }

    #[test]
    fn http_error_falls_back_to_reason_phrase() {
        let err = ResponseBody::Text("<html>bad gateway</html>".into())
            .into_http_error(StatusCode::BAD_GATEWAY);
        match err {
            RequestError::Http { status, message, body, .. } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(message, "Bad Gateway");
                assert!(body.as_text().is_some());
            }
            other => panic!("expected http error, got {:?}", other),
        }
    }
}
