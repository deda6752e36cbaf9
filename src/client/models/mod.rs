//! Authentication and user models returned by the platform API

mod auth;
mod user;

pub use auth::{JwtToken, LoginRequest, LoginResponse};
pub use user::{CurrentUser, PermissionGrant, UserProfile};
