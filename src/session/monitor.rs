//! Inactivity polling and forced logout

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

use super::SessionHandle;

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The user signed out
    UserRequested,
    /// The user signed out of every device
    AllDevices,
    /// Idle for longer than the security level allows
    SessionTimeout,
    /// The backend refused the token and it could not be refreshed
    TokenExpired,
}

impl LogoutReason {
    /// Text shown to the user after the logout
    pub fn message(&self) -> &'static str {
        match self {
            LogoutReason::UserRequested => "You have been signed out.",
            LogoutReason::AllDevices => "You have been signed out on all devices.",
            LogoutReason::SessionTimeout => {
                "Your session expired after a period of inactivity. Please sign in again."
            }
            LogoutReason::TokenExpired => "Your sign-in has expired. Please sign in again.",
        }
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogoutReason::UserRequested => "user_requested",
            LogoutReason::AllDevices => "all_devices",
            LogoutReason::SessionTimeout => "session_timeout",
            LogoutReason::TokenExpired => "token_expired",
        };
        f.write_str(name)
    }
}

/// User-visible notice emitted by every logout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoutNotice {
    pub reason: LogoutReason,
    pub message: String,
}

impl LogoutNotice {
    pub fn new(reason: LogoutReason) -> Self {
        Self {
            reason,
            message: reason.message().to_string(),
        }
    }
}

/// Whatever tears the authenticated state down
#[async_trait]
pub trait LogoutHandler: Send + Sync {
    async fn logout(&self, reason: LogoutReason) -> LogoutNotice;
}

/// Polls the session and logs out once it has been idle too long.
///
/// Timeouts are only noticed on a poll, so a session may outlive its
/// threshold by up to one interval.
#[derive(Clone)]
pub struct SessionMonitor {
    session: SessionHandle,
    handler: Arc<dyn LogoutHandler>,
    interval: Duration,
}

impl SessionMonitor {
    pub fn new(session: SessionHandle, handler: Arc<dyn LogoutHandler>) -> Self {
        Self {
            session,
            handler,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one poll now
    pub async fn check(&self) -> Option<LogoutNotice> {
        if !self.session.is_timed_out() {
            return None;
        }

        let snapshot = self.session.snapshot();
        log::info!(
            "Session idle for {}s at level {}; signing out",
            snapshot.idle_for(self.session.clock().now()).as_secs(),
            snapshot.security_level
        );
        Some(self.handler.logout(LogoutReason::SessionTimeout).await)
    }

    /// Poll forever on the interval. Notices are passed to `on_notice`.
    pub fn spawn<F>(self, on_notice: F) -> JoinHandle<()>
    where
        F: Fn(LogoutNotice) + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Some(notice) = self.check().await {
                    on_notice(notice);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Clock, ManualClock, MemorySessionStore, SecurityLevel};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLogout {
        reasons: Mutex<Vec<LogoutReason>>,
        session: Mutex<Option<SessionHandle>>,
    }

    #[async_trait]
    impl LogoutHandler for RecordingLogout {
        async fn logout(&self, reason: LogoutReason) -> LogoutNotice {
            self.reasons.lock().unwrap().push(reason);
            if let Some(session) = self.session.lock().unwrap().as_ref() {
                session.end().unwrap();
            }
            LogoutNotice::new(reason)
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn strict_session(clock: Arc<ManualClock>) -> SessionHandle {
        let session = SessionHandle::load(Arc::new(MemorySessionStore::new()), clock).unwrap();
        session.authenticate().unwrap();
        session.set_level(SecurityLevel::Strict).unwrap();
        session
    }

    #[tokio::test]
    async fn test_strict_idle_16_minutes_logs_out() {
        let clock = Arc::new(ManualClock::new(start()));
        let session = strict_session(clock.clone());
        let handler = Arc::new(RecordingLogout::default());
        let monitor = SessionMonitor::new(session, handler.clone());

        clock.advance(Duration::from_secs(16 * 60));
        let notice = monitor.check().await.unwrap();

        assert_eq!(notice.reason, LogoutReason::SessionTimeout);
        assert!(notice.message.contains("inactivity"));
        assert_eq!(*handler.reasons.lock().unwrap(), vec![LogoutReason::SessionTimeout]);
    }

    #[tokio::test]
    async fn test_strict_idle_14_minutes_keeps_session() {
        let clock = Arc::new(ManualClock::new(start()));
        let session = strict_session(clock.clone());
        let handler = Arc::new(RecordingLogout::default());
        let monitor = SessionMonitor::new(session, handler.clone());

        clock.advance(Duration::from_secs(14 * 60));

        assert!(monitor.check().await.is_none());
        assert!(handler.reasons.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activity_resets_idle_time() {
        let clock = Arc::new(ManualClock::new(start()));
        let session = strict_session(clock.clone());
        let monitor = SessionMonitor::new(session.clone(), Arc::new(RecordingLogout::default()));

        clock.advance(Duration::from_secs(10 * 60));
        session.touch(clock.now()).unwrap();
        clock.advance(Duration::from_secs(10 * 60));

        assert!(monitor.check().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_monitor_polls_on_interval() {
        let clock = Arc::new(ManualClock::new(start()));
        let session = strict_session(clock.clone());
        let handler = Arc::new(RecordingLogout::default());
        *handler.session.lock().unwrap() = Some(session.clone());

        let notices = Arc::new(Mutex::new(Vec::new()));
        let task = SessionMonitor::new(session, handler.clone()).spawn({
            let notices = Arc::clone(&notices);
            move |notice| notices.lock().unwrap().push(notice)
        });

        clock.advance(Duration::from_secs(16 * 60));
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(notices.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(notices.lock().unwrap().len(), 1);

        // Signed out now, so later polls stay quiet
        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(notices.lock().unwrap().len(), 1);
        assert_eq!(handler.reasons.lock().unwrap().len(), 1);

        task.abort();
    }
}
