//! Command execution context
//!
//! Builds the client core once per invocation: config, transport, entity
//! registry, session, auth manager and activity tracking.

use std::sync::Arc;

use colored::Colorize;
use tokio::task::JoinHandle;

use factrack::auth::AuthManager;
use factrack::client::{FactrackClient, Transport};
use factrack::config::{Config, ConfigStore};
use factrack::context::EntityRegistry;
use factrack::error::{ConfigError, Result};
use factrack::permission::{
    GuardOptions, GuardView, PermissionCheck, PermissionGuard, PermissionStore,
};
use factrack::session::{
    ActivityEvent, ActivityTracker, LogoutHandler, LogoutNotice, LogoutReason, SessionHandle,
    SessionMonitor, SystemClock,
};

use crate::cli::{GlobalOptions, OutputFormat};
use crate::output::SpinnerIndicator;

/// Context for command execution.
///
/// Creating it restores the signed-in user, then signs out at once if the
/// persisted session has been idle past its security level's threshold.
pub struct CommandContext {
    /// Config as loaded at startup
    pub config: Config,
    /// Config file handle, shared with the session and credential stores
    pub store: ConfigStore,
    /// Resolved output format
    pub format: OutputFormat,
    /// Bypass cached responses
    pub refresh: bool,
    pub registry: Arc<EntityRegistry>,
    pub auth: Arc<AuthManager>,
    session: SessionHandle,
    activity: ActivityTracker,
    spinner: Arc<SpinnerIndicator>,
    monitor: JoinHandle<()>,
}

impl CommandContext {
    pub async fn new(opts: &GlobalOptions) -> Result<Self> {
        let store = ConfigStore::new(Config::resolve_path(opts.config_ref())?);
        let config = store.load()?;
        let format = opts.resolve_format(&config);
        let prefs = config.preferences.clone();

        let api_host = opts.api_host_ref().or(config.api_host.as_deref());
        let transport: Arc<dyn Transport> = Arc::new(FactrackClient::new(api_host)?);
        let registry = Arc::new(EntityRegistry::with_ttls(
            Arc::clone(&transport),
            prefs.ttl_overrides(),
        ));
        let session = SessionHandle::load_with_level(
            Arc::new(store.clone()),
            Arc::new(SystemClock),
            prefs.security_level,
        )?;
        let auth = Arc::new(AuthManager::new(
            transport,
            Arc::clone(&registry),
            PermissionStore::new(),
            session.clone(),
            Arc::new(store.clone()),
        ));

        if let Some(user) = auth.restore().await? {
            log::debug!("Restored session for {}", user.username);
        }

        let handler: Arc<dyn LogoutHandler> = auth.clone();
        let monitor =
            SessionMonitor::new(session.clone(), handler).with_interval(prefs.poll_interval());
        if let Some(notice) = monitor.check().await {
            print_notice(&notice);
        }
        let monitor = monitor.spawn(|notice| print_notice(&notice));

        let activity = ActivityTracker::with_debounce(session.clone(), prefs.debounce());
        if session.is_authenticated() {
            activity.record(ActivityEvent::Command);
        }

        let spinner = Arc::new(SpinnerIndicator::new(
            "Checking permissions...",
            format == OutputFormat::Json,
        ));

        Ok(Self {
            config,
            store,
            format,
            refresh: opts.no_cache,
            registry,
            auth,
            session,
            activity,
            spinner,
            monitor,
        })
    }

    /// Fail unless a user is signed in
    pub fn require_user(&self) -> Result<()> {
        if self.auth.permissions().is_ready() {
            Ok(())
        } else {
            Err(ConfigError::NotAuthenticated.into())
        }
    }

    /// Run `check` through a permission guard. Prints the denied message and
    /// returns `false` when access is denied.
    pub async fn require(&self, check: PermissionCheck) -> Result<bool> {
        self.require_user()?;

        let guard = PermissionGuard::mount(
            self.auth.permissions().clone(),
            self.spinner.clone(),
            GuardOptions {
                settle_delay: self.config.preferences.guard_settle(),
                show_denied_message: true,
            },
            check,
        );
        guard.settled().await;

        match guard.view((), None) {
            GuardView::Children(()) => Ok(true),
            GuardView::DeniedMessage(message) => {
                eprintln!("{} {}", "✗".red(), message);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Sign out locally when the backend rejected the token, then pass the
    /// result through
    pub async fn signed_out_on_reject<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && err.is_unauthorized()
            && self.session.is_authenticated()
        {
            let notice = self.auth.logout(LogoutReason::TokenExpired).await;
            print_notice(&notice);
        }
        result
    }

    /// Write pending activity and any refreshed token back to the config
    pub async fn finish(self) -> Result<()> {
        self.monitor.abort();
        if self.session.is_authenticated() {
            self.activity.flush();
            self.auth.persist_token().await?;
        }
        Ok(())
    }
}

fn print_notice(notice: &LogoutNotice) {
    eprintln!("{} {}", "⚠".yellow(), notice.message);
}
