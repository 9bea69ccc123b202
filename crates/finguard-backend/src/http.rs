//! HTTP transport over reqwest

use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{ApiRequest, ApiResponse, ApiTransport, Method, TransportError, TransportResult};

/// Transport that talks to the real backend
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn call(&self, request: ApiRequest) -> TransportResult<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        builder = builder
            .timeout(self.timeout)
            .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = &request.body {
            let encoded = serde_json::to_string(body)
                .map_err(|e| TransportError::Malformed(e.to_string()))?;
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(encoded);
        }

        debug!(path = %request.path, method = ?request.method, "Backend request");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let body = if text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => Some(value),
                Err(e) if (200..300).contains(&status) => {
                    return Err(TransportError::Malformed(e.to_string()));
                }
                Err(_) => {
                    // Error pages are often HTML; the status code is enough
                    warn!(status, path = %request.path, "Non-JSON error body");
                    None
                }
            }
        };

        debug!(path = %request.path, status, "Backend response");
        Ok(ApiResponse { status, body })
    }
}
