//! Organisation records and their create payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind, Validate, check_phone, require, require_code};
use crate::error::ValidationError;

/// Department (production, QC, warehouse, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub code: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_id: Option<String>,

    /// Parent department for nested departments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Factory site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factory {
    pub id: String,
    pub code: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Production line inside a factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub id: String,
    pub code: String,
    pub name: String,

    pub factory_id: String,

    /// Planned output per shift (pieces)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<String>,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Team of workers on a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub code: String,
    pub name: String,

    pub line_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<String>,

    #[serde(default)]
    pub member_count: u32,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Role bundling permission codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub code: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Seniority used for ordering in admin screens; lower is more senior
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,

    #[serde(default)]
    pub permissions: Vec<String>,

    /// System roles cannot be edited or deleted
    #[serde(default)]
    pub is_system: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

macro_rules! impl_entity {
    ($record:ty, $draft:ty, $kind:expr) => {
        impl Entity for $record {
            const KIND: EntityKind = $kind;
            type Draft = $draft;

            fn id(&self) -> &str {
                &self.id
            }

            fn code(&self) -> &str {
                &self.code
            }

            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

impl_entity!(Department, DepartmentDraft, EntityKind::Department);
impl_entity!(Factory, FactoryDraft, EntityKind::Factory);
impl_entity!(Line, LineDraft, EntityKind::Line);
impl_entity!(Team, TeamDraft, EntityKind::Team);
impl_entity!(Role, RoleDraft, EntityKind::Role);

// ============================================================================
// Create payloads
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentDraft {
    pub code: String,
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Validate for DepartmentDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_code("code", &self.code)?;
        require("name", &self.name)?;
        check_phone("phone", self.phone.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryDraft {
    pub code: String,
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Validate for FactoryDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_code("code", &self.code)?;
        require("name", &self.name)?;
        check_phone("phone", self.phone.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDraft {
    pub code: String,
    pub name: String,
    pub factory_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
}

impl Validate for LineDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_code("code", &self.code)?;
        require("name", &self.name)?;
        require("factoryId", &self.factory_id)?;
        if self.capacity == Some(0) {
            return Err(ValidationError::Invalid {
                field: "capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDraft {
    pub code: String,
    pub name: String,
    pub line_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<String>,
}

impl Validate for TeamDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_code("code", &self.code)?;
        require("name", &self.name)?;
        require("lineId", &self.line_id)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDraft {
    pub code: String,
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
}

impl Validate for RoleDraft {
    fn validate(&self) -> Result<(), ValidationError> {
        require_code("code", &self.code)?;
        require("name", &self.name)?;
        if let Some(code) = self.permissions.iter().find(|p| p.trim().is_empty()) {
            return Err(ValidationError::Invalid {
                field: "permissions",
                reason: format!("blank permission code {:?}", code),
            });
        }
        Ok(())
    }
}
