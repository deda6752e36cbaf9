//! Permission guard
//!
//! Wraps a piece of UI (or a command) behind a [`PermissionCheck`]. The guard
//! starts in [`GuardState::Unknown`], waits until permissions are loaded and a
//! settle delay has passed, then moves to `Granted` or `Denied`. While it
//! waits, a loading indicator keyed by the criteria is active.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{PermissionCheck, PermissionStore};

/// Shown when access is denied and no fallback was supplied
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied. You do not have permission to view this.";

/// Global start/stop loading indicator, keyed so several owners can coexist
pub trait LoadingIndicator: Send + Sync {
    fn start(&self, key: &str);
    fn stop(&self, key: &str);
}

/// In-memory [`LoadingIndicator`] tracking which keys are active
#[derive(Debug, Default)]
pub struct LoadingRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    active: BTreeMap<String, usize>,
    calls: usize,
}

impl LoadingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.lock().active.contains_key(key)
    }

    pub fn any_loading(&self) -> bool {
        !self.lock().active.is_empty()
    }

    pub fn active_keys(&self) -> Vec<String> {
        self.lock().active.keys().cloned().collect()
    }

    /// Number of start/stop calls received
    pub fn calls(&self) -> usize {
        self.lock().calls
    }
}

impl LoadingIndicator for LoadingRegistry {
    fn start(&self, key: &str) {
        let mut inner = self.lock();
        inner.calls += 1;
        *inner.active.entry(key.to_string()).or_default() += 1;
    }

    fn stop(&self, key: &str) {
        let mut inner = self.lock();
        inner.calls += 1;
        if let Some(count) = inner.active.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                inner.active.remove(key);
            }
        }
    }
}

/// Evaluation state of a guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Unknown,
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOptions {
    /// Minimum time spent in `Unknown` before evaluating, on top of waiting
    /// for permissions to load. May be zero.
    pub settle_delay: Duration,
    /// Show [`ACCESS_DENIED_MESSAGE`] when denied without a fallback
    pub show_denied_message: bool,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(3000),
            show_denied_message: true,
        }
    }
}

/// What a guarded region renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView<T> {
    Loading,
    Children(T),
    Fallback(T),
    DeniedMessage(&'static str),
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Settled,
    Cancelled,
}

/// One evaluation attempt. `phase` decides who stops the indicator: the task
/// when it settles, or `cancel` when it gets there first. Never both.
struct Run {
    key: String,
    phase: Arc<Mutex<Phase>>,
    task: JoinHandle<()>,
}

fn lock_phase(phase: &Mutex<Phase>) -> MutexGuard<'_, Phase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mounted guard. Dropping it unmounts it.
pub struct PermissionGuard {
    store: PermissionStore,
    indicator: Arc<dyn LoadingIndicator>,
    options: GuardOptions,
    check: PermissionCheck,
    state: Arc<watch::Sender<GuardState>>,
    run: Option<Run>,
}

impl PermissionGuard {
    /// Mount a guard and start evaluating `check`. Must be called inside a
    /// tokio runtime.
    pub fn mount(
        store: PermissionStore,
        indicator: Arc<dyn LoadingIndicator>,
        options: GuardOptions,
        check: PermissionCheck,
    ) -> Self {
        let (state, _) = watch::channel(GuardState::Unknown);
        let mut guard = Self {
            store,
            indicator,
            options,
            check,
            state: Arc::new(state),
            run: None,
        };
        guard.start();
        guard
    }

    pub fn state(&self) -> GuardState {
        *self.state.borrow()
    }

    pub fn check(&self) -> &PermissionCheck {
        &self.check
    }

    /// Indicator key for the current criteria
    pub fn loading_key(&self) -> String {
        format!("guard:{}", self.check.digest())
    }

    pub fn subscribe(&self) -> watch::Receiver<GuardState> {
        self.state.subscribe()
    }

    /// Wait until the guard leaves `Unknown`
    pub async fn settled(&self) -> GuardState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| *state != GuardState::Unknown).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Replace the criteria. Unchanged criteria keep the current result;
    /// anything else aborts the pending evaluation and starts over.
    pub fn set_check(&mut self, check: PermissionCheck) {
        if check == self.check {
            return;
        }
        self.cancel();
        self.check = check;
        self.start();
    }

    /// Pick what to show for the current state
    pub fn view<T>(&self, children: T, fallback: Option<T>) -> GuardView<T> {
        match self.state() {
            GuardState::Unknown => GuardView::Loading,
            GuardState::Granted => GuardView::Children(children),
            GuardState::Denied => match fallback {
                Some(fallback) => GuardView::Fallback(fallback),
                None if self.options.show_denied_message => {
                    GuardView::DeniedMessage(ACCESS_DENIED_MESSAGE)
                }
                None => GuardView::Nothing,
            },
        }
    }

    /// Unmount explicitly; same as dropping the guard
    pub fn unmount(self) {}

    fn start(&mut self) {
        self.state.send_replace(GuardState::Unknown);

        let key = self.loading_key();
        let phase = Arc::new(Mutex::new(Phase::Pending));
        self.indicator.start(&key);
        log::debug!("Guard {} waiting", key);

        let task = tokio::spawn(evaluate(
            self.store.clone(),
            Arc::clone(&self.indicator),
            self.check.clone(),
            self.options.settle_delay,
            Arc::clone(&self.state),
            key.clone(),
            Arc::clone(&phase),
        ));

        self.run = Some(Run { key, phase, task });
    }

    fn cancel(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };

        let mut phase = lock_phase(&run.phase);
        if *phase == Phase::Pending {
            *phase = Phase::Cancelled;
            self.indicator.stop(&run.key);
            log::debug!("Guard {} cancelled", run.key);
        }
        drop(phase);
        run.task.abort();
    }
}

impl Drop for PermissionGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn evaluate(
    store: PermissionStore,
    indicator: Arc<dyn LoadingIndicator>,
    check: PermissionCheck,
    settle_delay: Duration,
    state: Arc<watch::Sender<GuardState>>,
    key: String,
    phase: Arc<Mutex<Phase>>,
) {
    let (set, ()) = tokio::join!(store.wait_ready(), tokio::time::sleep(settle_delay));
    let granted = check.evaluate(&set);

    let mut phase = lock_phase(&phase);
    if *phase != Phase::Pending {
        return;
    }
    *phase = Phase::Settled;

    let next = if granted {
        GuardState::Granted
    } else {
        GuardState::Denied
    };
    log::debug!("Guard {} -> {:?}", key, next);
    state.send_replace(next);
    indicator.stop(&key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::PermissionSet;

    const SETTLE: Duration = Duration::from_millis(3000);

    fn options() -> GuardOptions {
        GuardOptions::default()
    }

    fn loaded_store(codes: &[&str]) -> PermissionStore {
        let store = PermissionStore::new();
        store.load(PermissionSet::from_codes(codes.iter().copied()));
        store
    }

    #[tokio::test(start_paused = true)]
    async fn test_granted_after_settle_delay() {
        let indicator = Arc::new(LoadingRegistry::new());
        let guard = PermissionGuard::mount(
            loaded_store(&["line.edit"]),
            indicator.clone(),
            options(),
            PermissionCheck::permission("line.edit"),
        );

        assert_eq!(guard.state(), GuardState::Unknown);
        assert!(indicator.is_loading(&guard.loading_key()));
        assert_eq!(guard.view("page", None), GuardView::Loading);

        tokio::time::sleep(SETTLE - Duration::from_millis(1)).await;
        assert_eq!(guard.state(), GuardState::Unknown);

        assert_eq!(guard.settled().await, GuardState::Granted);
        assert!(!indicator.any_loading());
        assert_eq!(guard.view("page", None), GuardView::Children("page"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_permissions_to_load() {
        let store = PermissionStore::new();
        let indicator = Arc::new(LoadingRegistry::new());
        let guard = PermissionGuard::mount(
            store.clone(),
            indicator.clone(),
            GuardOptions {
                settle_delay: Duration::ZERO,
                ..options()
            },
            PermissionCheck::page("reports"),
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(guard.state(), GuardState::Unknown);

        store.load(PermissionSet::from_codes(["page:reports"]));
        assert_eq!(guard.settled().await, GuardState::Granted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_views() {
        let indicator = Arc::new(LoadingRegistry::new());
        let mut opts = options();
        opts.settle_delay = Duration::ZERO;

        let guard = PermissionGuard::mount(
            loaded_store(&[]),
            indicator.clone(),
            opts.clone(),
            PermissionCheck::permission("role.delete"),
        );
        assert_eq!(guard.settled().await, GuardState::Denied);
        assert_eq!(
            guard.view("page", Some("fallback")),
            GuardView::Fallback("fallback")
        );
        assert_eq!(
            guard.view("page", None),
            GuardView::DeniedMessage(ACCESS_DENIED_MESSAGE)
        );

        opts.show_denied_message = false;
        let quiet = PermissionGuard::mount(
            loaded_store(&[]),
            indicator,
            opts,
            PermissionCheck::permission("role.delete"),
        );
        quiet.settled().await;
        assert_eq!(quiet.view("page", None), GuardView::Nothing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_before_settle_stops_indicator_once() {
        let indicator = Arc::new(LoadingRegistry::new());
        let guard = PermissionGuard::mount(
            loaded_store(&["line.edit"]),
            indicator.clone(),
            options(),
            PermissionCheck::permission("line.edit"),
        );
        let key = guard.loading_key();

        tokio::time::sleep(Duration::from_millis(500)).await;
        guard.unmount();

        assert!(!indicator.is_loading(&key));
        let calls_at_unmount = indicator.calls();
        assert_eq!(calls_at_unmount, 2);

        tokio::time::sleep(SETTLE * 2).await;
        assert_eq!(indicator.calls(), calls_at_unmount);
    }

    #[tokio::test(start_paused = true)]
    async fn test_criteria_change_restarts_evaluation() {
        let indicator = Arc::new(LoadingRegistry::new());
        let mut guard = PermissionGuard::mount(
            loaded_store(&["line.edit"]),
            indicator.clone(),
            options(),
            PermissionCheck::permission("line.edit"),
        );
        assert_eq!(guard.settled().await, GuardState::Granted);
        let first_key = guard.loading_key();

        guard.set_check(PermissionCheck::permission("line.delete"));
        assert_eq!(guard.state(), GuardState::Unknown);
        assert_ne!(guard.loading_key(), first_key);
        assert!(indicator.is_loading(&guard.loading_key()));

        assert_eq!(guard.settled().await, GuardState::Denied);
        assert!(!indicator.any_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_criteria_keeps_result() {
        let indicator = Arc::new(LoadingRegistry::new());
        let mut guard = PermissionGuard::mount(
            loaded_store(&["line.edit"]),
            indicator.clone(),
            options(),
            PermissionCheck::permission("line.edit"),
        );
        guard.settled().await;
        let calls = indicator.calls();

        guard.set_check(PermissionCheck::permission("line.edit"));
        assert_eq!(guard.state(), GuardState::Granted);
        assert_eq!(indicator.calls(), calls);
    }

    #[test]
    fn test_registry_counts_nested_starts() {
        let registry = LoadingRegistry::new();
        registry.start("a");
        registry.start("a");
        registry.stop("a");
        assert!(registry.is_loading("a"));

        registry.stop("a");
        assert!(!registry.any_loading());
        assert_eq!(registry.calls(), 4);
    }
}
