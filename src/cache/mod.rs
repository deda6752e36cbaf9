//! Client-side response cache
//!
//! In-memory TTL caching with request coalescing, shared by every consumer of
//! an entity type for the lifetime of the process.

pub mod key;
pub mod ttl;

use std::time::Duration;

use crate::entity::EntityKind;

/// Cache TTL configuration per data type
pub struct CacheTtl;

impl CacheTtl {
    // Organisation structure rarely changes during a shift
    pub const DEPARTMENTS: Duration = Duration::from_secs(10 * 60); // 10 min
    pub const FACTORIES: Duration = Duration::from_secs(30 * 60); // 30 min
    pub const LINES: Duration = Duration::from_secs(10 * 60); // 10 min
    pub const ORGANIZATION_TREE: Duration = Duration::from_secs(10 * 60); // 10 min

    // Edited through admin screens all day
    pub const TEAMS: Duration = Duration::from_secs(60); // 1 min
    pub const ROLES: Duration = Duration::from_secs(5 * 60); // 5 min

    /// Default TTL for an entity type
    pub fn for_kind(kind: EntityKind) -> Duration {
        match kind {
            EntityKind::Department => Self::DEPARTMENTS,
            EntityKind::Factory => Self::FACTORIES,
            EntityKind::Line => Self::LINES,
            EntityKind::Team => Self::TEAMS,
            EntityKind::Role => Self::ROLES,
        }
    }
}

pub use key::{cache_key, namespace_prefix};
pub use ttl::{CacheEntry, TtlCache, TtlCacheStats};
