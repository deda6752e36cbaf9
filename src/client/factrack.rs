//! Factory platform API client implementation

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{ApiEnvelope, ApiRequest, JwtToken, Transport};
use crate::error::{ApiError, Result};

/// Default backend host
pub const DEFAULT_API_HOST: &str = "http://localhost:3000";

/// All REST endpoints live under this prefix
const API_PREFIX: &str = "/api";

/// Client-side throttle so bulk commands don't hammer the backend
const RATE_LIMIT_PER_SECOND: u32 = 20;

/// HTTP client for the factory platform backend
pub struct FactrackClient {
    http: HttpClient,
    base_url: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    auth_state: Arc<RwLock<AuthState>>,
}

/// Internal authentication state
#[derive(Debug, Clone, Default)]
struct AuthState {
    token: Option<JwtToken>,
}

impl FactrackClient {
    /// Create a client for `api_host` (defaults to [`DEFAULT_API_HOST`])
    pub fn new(api_host: Option<&str>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let quota = Quota::per_second(
            NonZeroU32::new(RATE_LIMIT_PER_SECOND).unwrap_or(NonZeroU32::MIN),
        );

        let host = api_host.unwrap_or(DEFAULT_API_HOST).trim_end_matches('/');

        Ok(Self {
            http,
            base_url: format!("{}{}", host, API_PREFIX),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            auth_state: Arc::new(RwLock::new(AuthState::default())),
        })
    }

    /// Base URL every request path is appended to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send once, without the refresh-and-retry step
    async fn send(&self, request: &ApiRequest) -> Result<Value> {
        self.rate_limiter.until_ready().await;

        let token = match &request.bearer {
            Some(token) => Some(token.clone()),
            None => self.auth_state.read().await.token.clone(),
        };
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token.token);
        }

        debug!("{} {}", request.method, url);
        let response = builder.send().await.map_err(ApiError::from)?;

        let status = response.status();
        match status {
            StatusCode::NO_CONTENT => Ok(Value::Null),
            status if status.is_success() => {
                let envelope = response.json::<ApiEnvelope>().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse response: {}", e))
                })?;
                envelope.into_result()
            }
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized.into()),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden.into()),
            StatusCode::NOT_FOUND => {
                let msg = error_message(response.text().await.ok(), "Resource not found");
                Err(ApiError::NotFound(msg).into())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(ApiError::RateLimit(Duration::from_secs(retry_after)).into())
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let msg = error_message(response.text().await.ok(), "Bad request");
                Err(ApiError::BadRequest(msg).into())
            }
            status if status.is_server_error() => {
                let fallback = format!("Server error: {}", status);
                let msg = error_message(response.text().await.ok(), &fallback);
                Err(ApiError::ServerError(msg).into())
            }
            _ => {
                let error_msg = format!("Unexpected status code: {}", status);
                Err(ApiError::InvalidResponse(error_msg).into())
            }
        }
    }
}

/// Pull the envelope's `error`/`message` out of an error body, else use the raw text.
fn error_message(body: Option<String>, fallback: &str) -> String {
    let Some(body) = body.filter(|b| !b.trim().is_empty()) else {
        return fallback.to_string();
    };

    match serde_json::from_str::<ApiEnvelope>(&body) {
        Ok(envelope) => envelope
            .error
            .or(envelope.message)
            .unwrap_or_else(|| fallback.to_string()),
        Err(_) => body,
    }
}

#[async_trait]
impl Transport for FactrackClient {
    async fn request(&self, request: ApiRequest) -> Result<Value> {
        match self.send(&request).await {
            Err(err) if err.is_unauthorized() && !request.path.starts_with("/auth/") => {
                // Try to refresh token once
                if self.token().await.is_none() {
                    return Err(err);
                }
                debug!("Token rejected, refreshing before retry");
                self.refresh().await?;
                self.send(&request).await
            }
            other => other,
        }
    }

    async fn set_token(&self, token: Option<JwtToken>) {
        self.auth_state.write().await.token = token;
    }

    async fn token(&self) -> Option<JwtToken> {
        self.auth_state.read().await.token.clone()
    }
}
