//! Authentication models

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserProfile;

/// Refresh this long before the token actually expires
const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Bearer token issued by `/auth/login` or `/auth/refresh`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtToken {
    /// The raw token string
    pub token: String,

    /// Expiration time, when the token is a JWT carrying `exp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl JwtToken {
    /// Wrap a raw token, reading `exp` from its payload if it is a JWT.
    pub fn from_raw(token: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at = decode_expiry(&token);
        Self { token, expires_at }
    }

    /// Expired or expiring within the refresh buffer. Tokens without a known
    /// expiry are treated as valid until the backend says otherwise.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => expires_at - chrono::Duration::minutes(EXPIRY_BUFFER_MINUTES) < now,
        }
    }
}

/// Read the `exp` claim from a JWT (header.payload.signature).
fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    #[derive(Deserialize)]
    struct JwtPayload {
        exp: i64,
    }

    let mut parts = token.split('.');
    let (_, payload, _) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let payload: JwtPayload = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(payload.exp, 0)
}

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `data` of the login and refresh responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub user: Option<UserProfile>,
}
