//! factrack - client core for the factory production-tracking platform
//!
//! Response caching with request coalescing, per-entity CRUD contexts,
//! permission evaluation and guards, and inactivity-based session logout.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod permission;
pub mod session;

pub use error::{Error, Result};
