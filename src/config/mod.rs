//! Configuration management for factrack
//!
//! One YAML file holds the backend host, the signed-in user's token and
//! snapshot, the session snapshot and user preferences.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::{CredentialStore, StoredCredentials, UserSnapshot};
use crate::client::JwtToken;
use crate::entity::EntityKind;
use crate::error::{ConfigError, Result};
use crate::session::{SecurityLevel, SecuritySession, SessionStore};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend host, e.g. `https://factory.example.com`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,

    /// Bearer token of the signed-in user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtToken>,

    /// Base64 user snapshot (see [`UserSnapshot::encode`])
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Last activity and security level of the current session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SecuritySession>,

    /// User preferences
    #[serde(default)]
    pub preferences: Preferences,
}

/// User preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Default output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Default page size for list commands
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Security level for new sessions
    #[serde(default)]
    pub security_level: SecurityLevel,

    /// Extra wait before guarded commands evaluate permissions
    #[serde(default)]
    pub guard_settle_ms: u64,

    /// Session monitor polling interval
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Activity debounce period
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Per-type cache TTL overrides in seconds
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cache_ttl_secs: BTreeMap<EntityKind, u64>,
}

fn default_page_size() -> usize {
    50
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            format: None,
            page_size: default_page_size(),
            security_level: SecurityLevel::default(),
            guard_settle_ms: 0,
            poll_interval_secs: default_poll_interval_secs(),
            debounce_ms: default_debounce_ms(),
            cache_ttl_secs: BTreeMap::new(),
        }
    }
}

impl Preferences {
    pub fn guard_settle(&self) -> Duration {
        Duration::from_millis(self.guard_settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn ttl_overrides(&self) -> std::collections::HashMap<EntityKind, Duration> {
        self.cache_ttl_secs
            .iter()
            .map(|(kind, secs)| (*kind, Duration::from_secs(*secs)))
            .collect()
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".factrack").join("config.yaml"))
    }

    /// Resolve an explicit path or fall back to the default
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Self::default_path(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;

        Ok(config)
    }

    /// Load configuration, or the defaults if the file does not exist yet
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(path, contents)?;

        // Set file permissions to 600 on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Decoded user snapshot, if one is stored
    pub fn user_snapshot(&self) -> Result<Option<UserSnapshot>> {
        self.user.as_deref().map(UserSnapshot::decode).transpose()
    }

    /// Whether a token and user snapshot are present
    pub fn is_signed_in(&self) -> bool {
        self.jwt.is_some() && self.user.is_some()
    }
}

/// Config file used as [`SessionStore`] and [`CredentialStore`].
///
/// Every write re-reads the file so handles touching different sections
/// don't overwrite each other.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Config> {
        Config::load_or_default(&self.path)
    }

    /// Read, modify and write back the config
    pub fn update(&self, apply: impl FnOnce(&mut Config)) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut config = self.load()?;
        apply(&mut config);
        config.save_to(&self.path)
    }
}

impl SessionStore for ConfigStore {
    fn load(&self) -> Result<Option<SecuritySession>> {
        Ok(ConfigStore::load(self)?.session)
    }

    fn save(&self, session: &SecuritySession) -> Result<()> {
        let session = session.clone();
        self.update(|config| config.session = Some(session))
    }

    fn clear(&self) -> Result<()> {
        self.update(|config| config.session = None)
    }
}

impl CredentialStore for ConfigStore {
    fn load(&self) -> Result<Option<StoredCredentials>> {
        let config = ConfigStore::load(self)?;
        let snapshot = config.user_snapshot()?;
        match (config.jwt, snapshot) {
            (Some(token), Some(snapshot)) => Ok(Some(StoredCredentials { token, snapshot })),
            _ => Ok(None),
        }
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<()> {
        let encoded = credentials.snapshot.encode()?;
        let token = credentials.token.clone();
        self.update(|config| {
            config.jwt = Some(token);
            config.user = Some(encoded);
        })
    }

    fn clear(&self) -> Result<()> {
        self.update(|config| {
            config.jwt = None;
            config.user = None;
        })
    }
}
