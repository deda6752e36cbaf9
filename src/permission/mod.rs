//! Permission evaluation
//!
//! A [`PermissionSet`] is loaded once per session from `GET /auth/me` and
//! replaced wholesale on re-login. All checks are pure lookups against it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::client::models::{CurrentUser, PermissionGrant};

pub mod guard;

pub use guard::{
    GuardOptions, GuardState, GuardView, LoadingIndicator, LoadingRegistry, PermissionGuard,
};

const PAGE_PREFIX: &str = "page:";
const FEATURE_PREFIX: &str = "feature:";

/// Permissions of the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    permissions: BTreeMap<String, bool>,
    page_access: BTreeSet<String>,
    feature_access: BTreeSet<String>,
}

impl PermissionSet {
    /// Build from grants plus explicit page/feature lists.
    ///
    /// Granted `page:<p>` and `feature:<f>` codes also grant page `p` and
    /// feature `f`.
    pub fn new(
        grants: impl IntoIterator<Item = PermissionGrant>,
        pages: impl IntoIterator<Item = String>,
        features: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut set = Self {
            page_access: pages.into_iter().collect(),
            feature_access: features.into_iter().collect(),
            ..Default::default()
        };

        for grant in grants {
            if grant.granted {
                if let Some(page) = grant.code.strip_prefix(PAGE_PREFIX) {
                    set.page_access.insert(page.to_string());
                } else if let Some(feature) = grant.code.strip_prefix(FEATURE_PREFIX) {
                    set.feature_access.insert(feature.to_string());
                }
            }
            set.permissions.insert(grant.code, grant.granted);
        }
        set
    }

    /// Every listed code granted
    pub fn from_codes<S: Into<String>>(codes: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            codes.into_iter().map(|code| PermissionGrant {
                code: code.into(),
                granted: true,
            }),
            [],
            [],
        )
    }

    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.get(code).copied().unwrap_or(false)
    }

    pub fn has_page_access(&self, page: &str) -> bool {
        self.page_access.contains(page)
    }

    pub fn has_feature_access(&self, feature: &str) -> bool {
        self.feature_access.contains(feature)
    }

    /// True if any code is granted; an empty list grants nothing.
    pub fn has_any_permission<S: AsRef<str>>(&self, codes: &[S]) -> bool {
        codes.iter().any(|code| self.has_permission(code.as_ref()))
    }

    /// True if every code is granted; an empty list is vacuously granted.
    pub fn has_all_permissions<S: AsRef<str>>(&self, codes: &[S]) -> bool {
        codes.iter().all(|code| self.has_permission(code.as_ref()))
    }

    /// Granted permission codes, sorted
    pub fn granted(&self) -> impl Iterator<Item = &str> {
        self.permissions
            .iter()
            .filter(|(_, granted)| **granted)
            .map(|(code, _)| code.as_str())
    }

    pub fn pages(&self) -> impl Iterator<Item = &str> {
        self.page_access.iter().map(String::as_str)
    }

    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.feature_access.iter().map(String::as_str)
    }
}

impl From<&CurrentUser> for PermissionSet {
    fn from(me: &CurrentUser) -> Self {
        Self::new(
            me.permissions.iter().cloned(),
            me.pages.iter().cloned(),
            me.features.iter().cloned(),
        )
    }
}

/// Criteria for a guarded view or command.
///
/// Only the first non-empty criterion, in the order permission, page,
/// feature, `all_of`, `any_of`, is evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<String>,
}

/// The criterion that decided a check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    Permission,
    Page,
    Feature,
    AllOf,
    AnyOf,
    None,
}

impl PermissionCheck {
    pub fn permission(code: impl Into<String>) -> Self {
        Self {
            permission: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn page(page: impl Into<String>) -> Self {
        Self {
            page: Some(page.into()),
            ..Default::default()
        }
    }

    pub fn feature(feature: impl Into<String>) -> Self {
        Self {
            feature: Some(feature.into()),
            ..Default::default()
        }
    }

    /// Criterion that `evaluate` will use
    pub fn deciding_criterion(&self) -> Criterion {
        let present = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.is_empty());

        if present(&self.permission) {
            Criterion::Permission
        } else if present(&self.page) {
            Criterion::Page
        } else if present(&self.feature) {
            Criterion::Feature
        } else if !self.all_of.is_empty() {
            Criterion::AllOf
        } else if !self.any_of.is_empty() {
            Criterion::AnyOf
        } else {
            Criterion::None
        }
    }

    /// Evaluate against `set`. A check without criteria is granted.
    pub fn evaluate(&self, set: &PermissionSet) -> bool {
        let granted = match self.deciding_criterion() {
            Criterion::Permission => set.has_permission(self.permission.as_deref().unwrap_or("")),
            Criterion::Page => set.has_page_access(self.page.as_deref().unwrap_or("")),
            Criterion::Feature => set.has_feature_access(self.feature.as_deref().unwrap_or("")),
            Criterion::AllOf => set.has_all_permissions(&self.all_of),
            Criterion::AnyOf => set.has_any_permission(&self.any_of),
            Criterion::None => true,
        };
        debug!("Permission check {:?} -> {}", self.deciding_criterion(), granted);
        granted
    }

    /// Short stable digest of the criteria, used to key loading indicators.
    ///
    /// Every string is length-prefixed and every list carries its length,
    /// so no two distinct criteria sets feed the hasher the same bytes.
    pub fn digest(&self) -> String {
        fn feed(hasher: &mut Sha256, value: &str) {
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }

        let mut hasher = Sha256::new();
        for single in [&self.permission, &self.page, &self.feature] {
            feed(&mut hasher, single.as_deref().unwrap_or_default());
        }
        for list in [&self.all_of, &self.any_of] {
            hasher.update((list.len() as u64).to_le_bytes());
            for code in list {
                feed(&mut hasher, code);
            }
        }
        let hash = format!("{:x}", hasher.finalize());
        hash[..16].to_string()
    }
}

/// Holder of the current [`PermissionSet`].
///
/// `None` until permissions are loaded for the session. Cloning gives another
/// handle onto the same store.
#[derive(Clone)]
pub struct PermissionStore {
    tx: Arc<watch::Sender<Option<Arc<PermissionSet>>>>,
}

impl Default for PermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the whole set
    pub fn load(&self, set: PermissionSet) {
        debug!("Permissions loaded ({} codes)", set.permissions.len());
        self.tx.send_replace(Some(Arc::new(set)));
    }

    /// Forget permissions (logout)
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<Arc<PermissionSet>> {
        self.tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until a set is loaded and return it
    pub async fn wait_ready(&self) -> Arc<PermissionSet> {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(set) = rx.borrow_and_update().clone() {
                return set;
            }
            // The sender lives in `self`, so the channel cannot close while we wait
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Evaluate `check` against the loaded set; `None` while nothing is loaded
    pub fn evaluate(&self, check: &PermissionCheck) -> Option<bool> {
        self.current().map(|set| check.evaluate(&set))
    }
}
