//! Debounced activity tracking

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::SessionHandle;

/// Trailing quiet period before activity is written
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// User interactions that count as activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    Pointer,
    Key,
    Click,
    Scroll,
    Touch,
    /// A CLI command was run
    Command,
}

struct Pending {
    id: u64,
    at: DateTime<Utc>,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct TrackerState {
    pending: Option<Pending>,
    next_id: u64,
}

/// Collapses bursts of events into one write of the last event's time,
/// made once no event arrived for the debounce period.
#[derive(Clone)]
pub struct ActivityTracker {
    session: SessionHandle,
    debounce: Duration,
    state: Arc<Mutex<TrackerState>>,
}

impl ActivityTracker {
    pub fn new(session: SessionHandle) -> Self {
        Self::with_debounce(session, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(session: SessionHandle, debounce: Duration) -> Self {
        Self {
            session,
            debounce,
            state: Arc::new(Mutex::new(TrackerState::default())),
        }
    }

    /// Note an event now. Must be called inside a tokio runtime.
    pub fn record(&self, event: ActivityEvent) {
        let at = self.session.clock().now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = state.pending.take() {
            previous.timer.abort();
        }

        let id = state.next_id;
        state.next_id += 1;

        let timer = tokio::spawn({
            let session = self.session.clone();
            let shared = Arc::clone(&self.state);
            let debounce = self.debounce;
            async move {
                tokio::time::sleep(debounce).await;
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if state.pending.as_ref().is_some_and(|p| p.id == id) {
                    state.pending = None;
                    drop(state);
                    write(&session, at);
                }
            }
        });

        log::trace!("Activity {:?} at {}", event, at);
        state.pending = Some(Pending { id, at, timer });
    }

    /// Write any pending activity immediately
    pub fn flush(&self) {
        let pending = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .take();

        if let Some(pending) = pending {
            pending.timer.abort();
            write(&self.session, pending.at);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .is_some()
    }
}

fn write(session: &SessionHandle, at: DateTime<Utc>) {
    if let Err(err) = session.touch(at) {
        log::warn!("Failed to persist activity: {}", err);
    }
}
