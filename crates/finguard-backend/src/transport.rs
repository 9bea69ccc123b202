//! Transport trait and request/response types

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// HTTP method used by the backend endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single backend call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, e.g. `/api/bills/upcoming`
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Bearer token for authenticated endpoints
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            bearer: None,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            bearer: None,
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// A backend reply. `body` is None when the response had no (JSON) body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    pub fn status(status: u16) -> Self {
        Self { status, body: None }
    }

    pub fn with_body(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Server-supplied error text, if any
    pub fn error_message(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        ["message", "error"]
            .iter()
            .find_map(|key| body.get(key).and_then(Value::as_str))
            .map(str::to_string)
    }
}

/// Errors below the HTTP status level
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Malformed response: {0}")]
    Malformed(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// The network seam. Implementations never interpret status codes.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn call(&self, request: ApiRequest) -> TransportResult<ApiResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_builder() {
        let request = ApiRequest::get("/api/summary")
            .with_query("month", 3)
            .with_query("year", 2025)
            .with_bearer("a.b.c");

        assert_eq!(request.method, Method::Get);
        assert_eq!(
            request.query,
            vec![
                ("month".to_string(), "3".to_string()),
                ("year".to_string(), "2025".to_string())
            ]
        );
        assert_eq!(request.bearer.as_deref(), Some("a.b.c"));
        assert!(request.body.is_none());
    }

    #[test]
    fn error_message_prefers_message_field() {
        let response = ApiResponse::with_body(401, json!({"message": "Invalid refresh token"}));
        assert_eq!(response.error_message().as_deref(), Some("Invalid refresh token"));

        let response = ApiResponse::with_body(500, json!({"error": "boom"}));
        assert_eq!(response.error_message().as_deref(), Some("boom"));

        assert!(ApiResponse::status(502).error_message().is_none());
        assert!(!ApiResponse::status(502).is_success());
    }
}
