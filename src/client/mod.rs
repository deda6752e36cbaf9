//! Factory platform API client
//!
//! Everything above this module talks to the backend through the
//! [`Transport`] trait: one request in, one unwrapped `data` payload out.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result};

pub mod factrack;
#[cfg(test)]
pub mod mock;
pub mod models;

pub use factrack::FactrackClient;
#[cfg(test)]
pub use mock::MockTransport;
pub use models::JwtToken;

use models::LoginResponse;

/// A single backend request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Token to send instead of the transport's current one
    pub bearer: Option<JwtToken>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append query parameters
    pub fn query<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attach a JSON body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Authenticate with `token` regardless of the transport's state
    pub fn bearer(mut self, token: JwtToken) -> Self {
        self.bearer = Some(token);
        self
    }
}

/// Response envelope used by every backend endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub success: bool,

    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiEnvelope {
    /// Unwrap `data` on success, or turn the envelope's error into `ApiError::Rejected`.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            let message = self
                .error
                .or(self.message)
                .unwrap_or_else(|| "unknown error".to_string());
            Err(ApiError::Rejected(message).into())
        }
    }
}

/// Decode an unwrapped payload into a typed value
pub fn decode<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)).into())
}

/// Backend transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the envelope's `data` payload
    async fn request(&self, request: ApiRequest) -> Result<Value>;

    /// Replace (or clear) the bearer token sent with every request
    async fn set_token(&self, token: Option<JwtToken>);

    /// Current bearer token, if any
    async fn token(&self) -> Option<JwtToken>;

    /// Exchange the current token for a fresh one via `/auth/refresh` and
    /// start using it.
    async fn refresh(&self) -> Result<JwtToken> {
        let data = self.request(ApiRequest::post("/auth/refresh")).await?;
        let response: LoginResponse = decode(data)?;
        let token = response
            .token
            .map(JwtToken::from_raw)
            .ok_or_else(|| ApiError::InvalidResponse("refresh returned no token".to_string()))?;

        self.set_token(Some(token.clone())).await;
        Ok(token)
    }
}
