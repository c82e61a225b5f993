//! Authenticated JSON transport to the chat backend.
//!
//! Every call reads the bearer credential fresh from the token provider and
//! normalizes failures into the shared `ApiError` taxonomy. No domain logic
//! lives here; callers receive decoded JSON or a typed failure.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use toolpush_core::config::Config;
use toolpush_core::error::{ApiError, Result};
use toolpush_core::TokenProvider;

/// Authenticated request/response client for the backend endpoints.
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    /// Builds a client from configuration. The configured metadata timeout
    /// applies to every call unless overridden per request.
    pub fn new(config: &Config, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let request = self.http.get(self.url(path));
        self.send(request).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let request = self.http.post(self.url(path)).json(body);
        self.send(request).await
    }

    /// POST with a per-request timeout override; used for generation, which
    /// legitimately outlives the metadata timeout.
    pub async fn post_with_timeout(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value> {
        let request = self.http.post(self.url(path)).json(body).timeout(timeout);
        self.send(request).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        let request = self.http.delete(self.url(path));
        self.send(request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        // Credential is read per call and never cached here.
        let token = self
            .tokens
            .access_token()
            .ok_or(ApiError::AuthMissing)?;

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("failed to read response body: {e}")))?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&body).map_err(|e| {
                ApiError::server(status.as_u16(), format!("malformed JSON response: {e}"))
            });
        }

        let detail = extract_detail(&body);
        tracing::debug!(status = status.as_u16(), %detail, "backend request failed");
        Err(classify_status(status, detail))
    }
}

/// Maps an HTTP failure status plus its detail string onto the error
/// taxonomy. Pure so the mapping is testable without a server.
pub fn classify_status(status: StatusCode, detail: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::auth_rejected(detail),
        StatusCode::PAYMENT_REQUIRED => ApiError::quota_exceeded(detail),
        StatusCode::UNPROCESSABLE_ENTITY => ApiError::validation(detail),
        StatusCode::NOT_FOUND => ApiError::not_found(detail),
        _ => ApiError::server(status.as_u16(), detail),
    }
}

/// Pulls the `detail` field out of an error body, falling back to the raw
/// text. Richer server error bodies stay opaque.
pub fn extract_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .and_then(|d| d.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| body.trim().to_string())
}
