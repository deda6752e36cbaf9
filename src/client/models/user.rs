//! User and permission models

use serde::{Deserialize, Serialize};

/// Signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User ID
    pub id: String,

    /// Login name (employee code on the shop floor)
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Role code, e.g. `admin`, `line_leader`, `worker`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_id: Option<String>,
}

/// A single permission code and whether it is granted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub code: String,

    #[serde(default = "default_granted")]
    pub granted: bool,
}

fn default_granted() -> bool {
    true
}

/// `data` of `GET /auth/me`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user: UserProfile,

    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,

    /// Page codes granted outright, on top of `page:*` permission codes
    #[serde(default, alias = "pageAccess")]
    pub pages: Vec<String>,

    /// Feature codes granted outright, on top of `feature:*` permission codes
    #[serde(default, alias = "featureAccess")]
    pub features: Vec<String>,
}
