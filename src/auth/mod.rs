//! Sign-in, sign-out and session restore
//!
//! [`AuthManager`] owns the authenticated state: the bearer token on the
//! transport, the permission store, the session snapshot and the persisted
//! credentials. Logout tears all of it down unconditionally; the remote
//! logout call is best-effort.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::client::models::{CurrentUser, LoginRequest, LoginResponse, UserProfile};
use crate::client::{ApiRequest, JwtToken, Transport, decode};
use crate::context::EntityRegistry;
use crate::error::{ApiError, ConfigError, Result};
use crate::permission::{PermissionSet, PermissionStore};
use crate::session::{LogoutHandler, LogoutNotice, LogoutReason, SessionHandle};

/// Minimal user record kept between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user: UserProfile,
    pub permissions: PermissionSet,
}

impl UserSnapshot {
    /// Base64 of the JSON form. This only keeps the snapshot from being
    /// read at a glance; it is not encryption.
    pub fn encode(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ConfigError::Invalid(format!("user snapshot is not base64: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Token and user snapshot persisted between runs
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCredentials {
    pub token: JwtToken,
    pub snapshot: UserSnapshot,
}

/// Where credentials survive restarts
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredCredentials>>;
    fn save(&self, credentials: &StoredCredentials) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Non-persistent [`CredentialStore`]
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>> {
        Ok(self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<()> {
        *self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

pub struct AuthManager {
    transport: Arc<dyn Transport>,
    registry: Arc<EntityRegistry>,
    permissions: PermissionStore,
    session: SessionHandle,
    credentials: Arc<dyn CredentialStore>,
    user: Mutex<Option<UserProfile>>,
    notices: watch::Sender<Option<LogoutNotice>>,
}

impl AuthManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<EntityRegistry>,
        permissions: PermissionStore,
        session: SessionHandle,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let (notices, _) = watch::channel(None);
        Self {
            transport,
            registry,
            permissions,
            session,
            credentials,
            user: Mutex::new(None),
            notices,
        }
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn permissions(&self) -> &PermissionStore {
        &self.permissions
    }

    /// Latest logout notice
    pub fn notices(&self) -> watch::Receiver<Option<LogoutNotice>> {
        self.notices.subscribe()
    }

    /// Sign in and load the user's permissions.
    ///
    /// Every cache is dropped before the new permissions are loaded so
    /// nothing fetched for a previous user leaks into the new session.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
        let body = serde_json::to_value(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        let data = self
            .transport
            .request(ApiRequest::post("/auth/login").json(body))
            .await?;
        let login: LoginResponse = decode(data)?;
        let token = login
            .token
            .map(JwtToken::from_raw)
            .ok_or_else(|| ApiError::InvalidResponse("login returned no token".to_string()))?;

        self.transport.set_token(Some(token.clone())).await;

        let me = match self.fetch_me().await {
            Ok(me) => me,
            Err(err) => {
                self.transport.set_token(None).await;
                return Err(err);
            }
        };

        let snapshot = UserSnapshot {
            user: me.user.clone(),
            permissions: PermissionSet::from(&me),
        };

        self.registry.invalidate_all();
        self.permissions.load(snapshot.permissions.clone());
        self.credentials.save(&StoredCredentials {
            token,
            snapshot: snapshot.clone(),
        })?;
        self.session.authenticate()?;
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.user.clone());

        log::info!("Signed in as {}", snapshot.user.username);
        Ok(snapshot.user)
    }

    async fn fetch_me(&self) -> Result<CurrentUser> {
        let data = self.transport.request(ApiRequest::get("/auth/me")).await?;
        decode(data)
    }

    /// Reload the user and permissions from `/auth/me` with the current token
    pub async fn reload_permissions(&self) -> Result<PermissionSet> {
        let me = self.fetch_me().await?;
        let permissions = PermissionSet::from(&me);
        self.permissions.load(permissions.clone());

        if let Some(token) = self.transport.token().await {
            self.credentials.save(&StoredCredentials {
                token,
                snapshot: UserSnapshot {
                    user: me.user.clone(),
                    permissions: permissions.clone(),
                },
            })?;
        }
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = Some(me.user);
        Ok(permissions)
    }

    /// Swap the token for a fresh one and persist it
    pub async fn refresh(&self) -> Result<JwtToken> {
        let token = self.transport.refresh().await?;
        self.persist_token().await?;
        Ok(token)
    }

    /// Save the transport's current token if it differs from the stored one
    pub async fn persist_token(&self) -> Result<()> {
        let Some(token) = self.transport.token().await else {
            return Ok(());
        };
        if let Some(mut stored) = self.credentials.load()?
            && stored.token != token
        {
            log::debug!("Persisting refreshed token");
            stored.token = token;
            self.credentials.save(&stored)?;
        }
        Ok(())
    }

    /// Rebuild state from persisted credentials. Returns the restored user,
    /// or `None` when there is nothing (valid) to restore.
    pub async fn restore(&self) -> Result<Option<UserProfile>> {
        let Some(stored) = self.credentials.load()? else {
            return Ok(None);
        };

        if !self.session.is_authenticated() {
            log::debug!("Stored credentials without an authenticated session; discarding");
            self.clear_local().await;
            return Ok(None);
        }

        if stored.token.is_expired(self.session.clock().now()) {
            log::info!("Stored token has expired");
            self.clear_local().await;
            return Ok(None);
        }

        self.transport.set_token(Some(stored.token)).await;
        self.permissions.load(stored.snapshot.permissions);
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(stored.snapshot.user.clone());
        Ok(Some(stored.snapshot.user))
    }

    /// Sign out of this device
    pub async fn logout(&self, reason: LogoutReason) -> LogoutNotice {
        self.end("/auth/logout", reason).await
    }

    /// Sign out of every device
    pub async fn logout_all(&self, reason: LogoutReason) -> LogoutNotice {
        self.end("/auth/logout-all", reason).await
    }

    async fn end(&self, path: &str, reason: LogoutReason) -> LogoutNotice {
        let token = self.transport.token().await;
        self.clear_local().await;

        let notice = LogoutNotice::new(reason);
        log::info!("Signed out ({})", reason);
        self.notices.send_replace(Some(notice.clone()));

        // Local state is already gone; the backend only gets told afterwards
        if let Some(token) = token
            && let Err(err) = self
                .transport
                .request(ApiRequest::post(path).bearer(token))
                .await
        {
            log::warn!("Remote logout failed: {}", err);
        }
        notice
    }

    async fn clear_local(&self) {
        self.registry.invalidate_all();
        self.permissions.clear();
        self.transport.set_token(None).await;
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = None;

        if let Err(err) = self.credentials.clear() {
            log::warn!("Failed to clear stored credentials: {}", err);
        }
        if let Err(err) = self.session.end() {
            log::warn!("Failed to clear session snapshot: {}", err);
        }
    }
}

#[async_trait]
impl LogoutHandler for AuthManager {
    async fn logout(&self, reason: LogoutReason) -> LogoutNotice {
        AuthManager::logout(self, reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockTransport;
    use crate::entity::{Department, ListFilter};
    use crate::error::Error;
    use crate::session::{Clock, ManualClock, MemorySessionStore, SessionStore};
    use chrono::{TimeZone, Utc};
    use reqwest::Method;
    use serde_json::json;

    struct Fixture {
        mock: Arc<MockTransport>,
        auth: AuthManager,
        registry: Arc<EntityRegistry>,
        credentials: Arc<MemoryCredentialStore>,
        sessions: Arc<MemorySessionStore>,
    }

    async fn base_mock() -> MockTransport {
        MockTransport::new()
            .with_response(
                Method::POST,
                "/auth/login",
                json!({"token": "opaque-token", "user": {"id": "u-1", "username": "NV001"}}),
            )
            .await
            .with_response(
                Method::GET,
                "/auth/me",
                json!({
                    "user": {"id": "u-1", "username": "NV001", "role": "line_leader"},
                    "permissions": [{"code": "line.edit"}, {"code": "page:reports"}]
                }),
            )
            .await
            .with_response(Method::POST, "/auth/logout", serde_json::Value::Null)
            .await
            .with_response(
                Method::GET,
                "/departments",
                json!([{"id": "d-1", "code": "CUT", "name": "Cutting"}]),
            )
            .await
    }

    fn fixture(mock: MockTransport) -> Fixture {
        let mock = Arc::new(mock);
        let registry = Arc::new(EntityRegistry::new(mock.clone()));
        let credentials = Arc::new(MemoryCredentialStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        ));
        let session = SessionHandle::load(sessions.clone(), clock).unwrap();
        let auth = AuthManager::new(
            mock.clone(),
            registry.clone(),
            PermissionStore::new(),
            session,
            credentials.clone(),
        );
        Fixture {
            mock,
            auth,
            registry,
            credentials,
            sessions,
        }
    }

    #[tokio::test]
    async fn test_login_loads_permissions_and_session() {
        let f = fixture(base_mock().await);

        let user = f.auth.login("NV001", "secret").await.unwrap();

        assert_eq!(user.role.as_deref(), Some("line_leader"));
        let set = f.auth.permissions().current().unwrap();
        assert!(set.has_permission("line.edit"));
        assert!(set.has_page_access("reports"));
        assert!(f.auth.session().is_authenticated());
        assert_eq!(f.mock.token().await.unwrap().token, "opaque-token");
        assert!(f.credentials.load().unwrap().is_some());

        let sent = f.mock.captured_requests().await;
        assert_eq!(
            sent[0].body,
            Some(json!({"username": "NV001", "password": "secret"}))
        );
    }

    #[tokio::test]
    async fn test_login_without_token_fails() {
        let mock = MockTransport::new()
            .with_response(Method::POST, "/auth/login", json!({"user": null}))
            .await;
        let f = fixture(mock);

        let err = f.auth.login("NV001", "secret").await.unwrap_err();
        assert!(matches!(err, Error::Api(ApiError::InvalidResponse(_))));
        assert!(!f.auth.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_me_leaves_no_token() {
        let mock = base_mock()
            .await
            .with_failure(Method::GET, "/auth/me", ApiError::ServerError("down".to_string()))
            .await;
        let f = fixture(mock);

        assert!(f.auth.login("NV001", "secret").await.is_err());
        assert!(f.mock.token().await.is_none());
        assert!(f.auth.permissions().current().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let f = fixture(base_mock().await);
        f.auth.login("NV001", "secret").await.unwrap();
        let departments = f.registry.context::<Department>();
        departments.list(&ListFilter::new(), false).await.unwrap();

        let notice = f.auth.logout(LogoutReason::UserRequested).await;

        assert_eq!(notice.reason, LogoutReason::UserRequested);
        assert_eq!(f.mock.call_count(Method::POST, "/auth/logout").await, 1);
        assert!(f.auth.permissions().current().is_none());
        assert!(f.mock.token().await.is_none());
        assert!(f.auth.current_user().is_none());
        assert!(!f.auth.session().is_authenticated());
        assert!(f.credentials.load().unwrap().is_none());
        assert!(f.sessions.load().unwrap().is_none());
        assert!(departments.caches().cached_list(&ListFilter::new()).is_none());
        assert_eq!(*f.auth.notices().borrow(), Some(notice));
    }

    #[tokio::test]
    async fn test_remote_logout_failure_still_clears_state() {
        let mock = base_mock()
            .await
            .with_failure(
                Method::POST,
                "/auth/logout-all",
                ApiError::Network("offline".to_string()),
            )
            .await;
        let f = fixture(mock);
        f.auth.login("NV001", "secret").await.unwrap();

        let notice = f.auth.logout_all(LogoutReason::AllDevices).await;

        assert_eq!(notice.reason, LogoutReason::AllDevices);
        assert!(f.auth.permissions().current().is_none());
        assert!(f.mock.token().await.is_none());
        assert!(f.credentials.load().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_remote_logout_does_not_delay_cleanup() {
        let mock = base_mock()
            .await
            .with_delay(std::time::Duration::from_secs(25))
            .await;
        let f = fixture(mock);
        f.auth.login("NV001", "secret").await.unwrap();

        let (notice, ()) = tokio::join!(f.auth.logout(LogoutReason::SessionTimeout), async {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            assert!(f.auth.permissions().current().is_none());
            assert!(f.mock.token().await.is_none());
            assert!(f.credentials.load().unwrap().is_none());
        });

        assert_eq!(notice.reason, LogoutReason::SessionTimeout);
        let sent = f.mock.captured_requests().await;
        let logout = sent.iter().find(|r| r.path == "/auth/logout").unwrap();
        assert_eq!(
            logout.bearer.as_ref().map(|t| t.token.as_str()),
            Some("opaque-token")
        );
    }

    #[tokio::test]
    async fn test_logout_without_token_skips_remote_call() {
        let f = fixture(base_mock().await);

        f.auth.logout(LogoutReason::SessionTimeout).await;
        assert_eq!(f.mock.total_calls().await, 0);
    }

    #[tokio::test]
    async fn test_restore_from_credentials() {
        let f = fixture(base_mock().await);
        f.auth.login("NV001", "secret").await.unwrap();

        // A fresh manager over the same stores, as on the next run
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 5, 0).unwrap(),
        ));
        let session = SessionHandle::load(f.sessions.clone(), clock).unwrap();
        let restored = AuthManager::new(
            f.mock.clone(),
            f.registry.clone(),
            PermissionStore::new(),
            session,
            f.credentials.clone(),
        );

        let user = restored.restore().await.unwrap().unwrap();
        assert_eq!(user.username, "NV001");
        assert!(
            restored
                .permissions()
                .current()
                .unwrap()
                .has_permission("line.edit")
        );
    }

    #[tokio::test]
    async fn test_restore_drops_expired_token() {
        let f = fixture(base_mock().await);
        f.auth.session().authenticate().unwrap();
        f.credentials
            .save(&StoredCredentials {
                token: JwtToken {
                    token: "old".to_string(),
                    expires_at: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
                },
                snapshot: UserSnapshot {
                    user: UserProfile {
                        id: "u-1".to_string(),
                        username: "NV001".to_string(),
                        full_name: None,
                        role: None,
                        department_id: None,
                        factory_id: None,
                    },
                    permissions: PermissionSet::default(),
                },
            })
            .unwrap();

        assert!(f.auth.restore().await.unwrap().is_none());
        assert!(f.credentials.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_persists_new_token() {
        let mock = base_mock()
            .await
            .with_response(Method::POST, "/auth/refresh", json!({"token": "fresh-token"}))
            .await;
        let f = fixture(mock);
        f.auth.login("NV001", "secret").await.unwrap();

        let token = f.auth.refresh().await.unwrap();

        assert_eq!(token.token, "fresh-token");
        assert_eq!(f.credentials.load().unwrap().unwrap().token.token, "fresh-token");
    }

    #[test]
    fn test_user_snapshot_encoding() {
        let snapshot = UserSnapshot {
            user: UserProfile {
                id: "u-1".to_string(),
                username: "NV001".to_string(),
                full_name: Some("Nguyen Van A".to_string()),
                role: None,
                department_id: None,
                factory_id: None,
            },
            permissions: PermissionSet::from_codes(["line.edit"]),
        };

        let encoded = snapshot.encode().unwrap();
        assert!(!encoded.contains("NV001"));
        assert_eq!(UserSnapshot::decode(&encoded).unwrap(), snapshot);
        assert!(UserSnapshot::decode("not base64!").is_err());
    }
}
