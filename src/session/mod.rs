//! Session and security monitoring
//!
//! Tracks when the user last did something and forces a logout once the idle
//! time exceeds the threshold of the session's [`SecurityLevel`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod activity;
pub mod monitor;

pub use activity::{ActivityEvent, ActivityTracker};
pub use monitor::{LogoutHandler, LogoutNotice, LogoutReason, SessionMonitor};

/// How aggressively idle sessions are ended
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Low,
    #[default]
    Medium,
    High,
    Strict,
}

impl SecurityLevel {
    /// Maximum idle time before a forced logout
    pub fn inactivity_threshold(&self) -> Duration {
        match self {
            SecurityLevel::Low => Duration::from_secs(2 * 60 * 60),
            SecurityLevel::Medium => Duration::from_secs(60 * 60),
            SecurityLevel::High => Duration::from_secs(30 * 60),
            SecurityLevel::Strict => Duration::from_secs(15 * 60),
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
            SecurityLevel::Strict => "strict",
        };
        f.write_str(name)
    }
}

/// Persisted session snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySession {
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub security_level: SecurityLevel,
    #[serde(default)]
    pub is_authenticated: bool,
}

impl SecuritySession {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_activity_at: now,
            security_level: SecurityLevel::default(),
            is_authenticated: false,
        }
    }

    /// Time since the last recorded activity, zero if that lies in the future
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Authenticated and idle for longer than the level's threshold
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.is_authenticated && self.idle_for(now) > self.security_level.inactivity_threshold()
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Where the session snapshot survives restarts
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<SecuritySession>>;
    fn save(&self, session: &SecuritySession) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Non-persistent [`SessionStore`]
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<SecuritySession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SecuritySession>> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, session: &SecuritySession) -> Result<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Shared, persisted session state. Cloning gives another handle onto the
/// same session.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<SecuritySession>>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl SessionHandle {
    /// Restore from `store`, or start an unauthenticated session
    pub fn load(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::load_with_level(store, clock, SecurityLevel::default())
    }

    /// Like [`SessionHandle::load`], starting fresh sessions at `level`
    pub fn load_with_level(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        level: SecurityLevel,
    ) -> Result<Self> {
        let session = store.load()?.unwrap_or_else(|| SecuritySession {
            security_level: level,
            ..SecuritySession::new(clock.now())
        });
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            store,
            clock,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SecuritySession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn snapshot(&self) -> SecuritySession {
        self.lock().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_authenticated
    }

    pub fn is_timed_out(&self) -> bool {
        self.lock().is_timed_out(self.clock.now())
    }

    /// Record activity at `at`. Older timestamps never move the clock back.
    pub fn touch(&self, at: DateTime<Utc>) -> Result<()> {
        self.update(|s| {
            if at > s.last_activity_at {
                s.last_activity_at = at;
            }
        })
    }

    pub fn set_level(&self, level: SecurityLevel) -> Result<()> {
        self.update(|s| s.security_level = level)
    }

    /// Mark signed in; counts as activity
    pub fn authenticate(&self) -> Result<()> {
        let now = self.clock.now();
        self.update(|s| {
            s.is_authenticated = true;
            s.last_activity_at = now;
        })
    }

    /// Mark signed out and drop the persisted snapshot. The security level
    /// is kept in memory for the next login.
    pub fn end(&self) -> Result<()> {
        self.lock().is_authenticated = false;
        self.store.clear()
    }

    fn update(&self, apply: impl FnOnce(&mut SecuritySession)) -> Result<()> {
        let snapshot = {
            let mut session = self.lock();
            apply(&mut session);
            session.clone()
        };
        self.store.save(&snapshot)
    }
}
