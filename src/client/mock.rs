//! Mock transport for testing
//!
//! Serves canned `data` payloads per `(method, path)` without a network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{ApiRequest, JwtToken, Transport};
use crate::error::{ApiError, Result};

/// Mock transport for testing.
///
/// # Example
/// ```ignore
/// let mock = MockTransport::new()
///     .with_response(Method::GET, "/departments", json!([]))
///     .await;
/// ```
#[derive(Default)]
pub struct MockTransport {
    /// Payloads keyed by `(method, path)`
    responses: Arc<Mutex<HashMap<(Method, String), Value>>>,
    /// Errors keyed by `(method, path)`, returned on every matching call
    failures: Arc<Mutex<HashMap<(Method, String), ApiError>>>,
    /// Error to return (if any) - consumed on first use
    error: Arc<Mutex<Option<ApiError>>>,
    /// Simulated latency per request
    delay: Arc<Mutex<Option<Duration>>>,
    /// Captured requests for test assertions
    captured_requests: Arc<Mutex<Vec<ApiRequest>>>,
    token: Arc<Mutex<Option<JwtToken>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method path` with `data`.
    pub async fn with_response(self, method: Method, path: &str, data: Value) -> Self {
        self.responses
            .lock()
            .await
            .insert((method, path.to_string()), data);
        self
    }

    /// Fail every `method path` call with `error`.
    pub async fn with_failure(self, method: Method, path: &str, error: ApiError) -> Self {
        self.failures
            .lock()
            .await
            .insert((method, path.to_string()), error);
        self
    }

    /// Fail the next call, whatever it is.
    pub async fn with_error(self, error: ApiError) -> Self {
        *self.error.lock().await = Some(error);
        self
    }

    /// Sleep before answering each request.
    pub async fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().await = Some(delay);
        self
    }

    /// All requests received so far.
    pub async fn captured_requests(&self) -> Vec<ApiRequest> {
        self.captured_requests.lock().await.clone()
    }

    /// Number of requests received for `method path`.
    pub async fn call_count(&self, method: Method, path: &str) -> usize {
        self.captured_requests
            .lock()
            .await
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Total number of requests received.
    pub async fn total_calls(&self) -> usize {
        self.captured_requests.lock().await.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: ApiRequest) -> Result<Value> {
        self.captured_requests.lock().await.push(request.clone());

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.error.lock().await.take() {
            return Err(err.into());
        }

        let key = (request.method.clone(), request.path.clone());
        if let Some(err) = self.failures.lock().await.get(&key) {
            return Err(err.clone().into());
        }

        self.responses
            .lock()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", request.method, request.path)).into())
    }

    async fn set_token(&self, token: Option<JwtToken>) {
        *self.token.lock().await = token;
    }

    async fn token(&self) -> Option<JwtToken> {
        self.token.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_serves_canned_response() {
        let mock = MockTransport::new()
            .with_response(Method::GET, "/lines", json!([{"id": "l-1"}]))
            .await;

        let data = mock.request(ApiRequest::get("/lines")).await.unwrap();

        assert_eq!(data, json!([{"id": "l-1"}]));
        assert_eq!(mock.call_count(Method::GET, "/lines").await, 1);
    }

    #[tokio::test]
    async fn test_mock_error_consumed_once() {
        let mock = MockTransport::new()
            .with_response(Method::GET, "/lines", json!([]))
            .await
            .with_error(ApiError::ServerError("boom".to_string()))
            .await;

        assert!(mock.request(ApiRequest::get("/lines")).await.is_err());
        assert!(mock.request(ApiRequest::get("/lines")).await.is_ok());
        assert_eq!(mock.total_calls().await, 2);
    }

    #[tokio::test]
    async fn test_mock_unknown_route_is_not_found() {
        let mock = MockTransport::new();
        let err = mock.request(ApiRequest::get("/nope")).await.unwrap_err();
        assert!(err.to_string().contains("/nope"));
    }
}
