//! Domain records owned by the backend and the services that reach them
//!
//! Every admin-managed record type (departments, factories, lines, teams,
//! roles) implements [`Entity`]; one generic REST service and one generic
//! context work for all of them.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub mod filter;
pub mod models;
pub mod organization;
pub mod patch;
pub mod service;

pub use filter::ListFilter;
pub use models::{
    Department, DepartmentDraft, Factory, FactoryDraft, Line, LineDraft, Role, RoleDraft, Team,
    TeamDraft,
};
pub use organization::{OrgNode, OrganizationService};
pub use patch::Patch;
pub use service::{EntityService, RestEntityService};

/// Entity types managed through the admin screens
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Department,
    Factory,
    Line,
    Team,
    Role,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Department,
        EntityKind::Factory,
        EntityKind::Line,
        EntityKind::Team,
        EntityKind::Role,
    ];

    /// REST collection path
    pub fn path(&self) -> &'static str {
        match self {
            EntityKind::Department => "/departments",
            EntityKind::Factory => "/factories",
            EntityKind::Line => "/lines",
            EntityKind::Team => "/teams",
            EntityKind::Role => "/roles",
        }
    }

    /// Query parameter naming the parent record, for kinds that have one
    pub fn parent_param(&self) -> Option<&'static str> {
        match self {
            EntityKind::Department => Some("parentId"),
            EntityKind::Line => Some("factoryId"),
            EntityKind::Team => Some("lineId"),
            EntityKind::Factory | EntityKind::Role => None,
        }
    }

    /// Cache namespace for list pages
    pub fn list_namespace(&self) -> String {
        format!("{}:list", self)
    }

    /// Cache key for a single record
    pub fn item_key(&self, id: &str) -> String {
        format!("{}:item:{}", self, id)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Department => "department",
            EntityKind::Factory => "factory",
            EntityKind::Line => "line",
            EntityKind::Team => "team",
            EntityKind::Role => "role",
        };
        f.write_str(name)
    }
}

/// Local validation run before a request is sent
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// A backend-owned record type
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Payload accepted by the create endpoint
    type Draft: Validate + Serialize + Send + Sync;

    fn id(&self) -> &str;
    fn code(&self) -> &str;
    fn name(&self) -> &str;
}

/// Require a non-blank value
pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

/// Codes are short identifiers printed on reports: no whitespace, at most 32 chars
pub(crate) fn require_code(field: &'static str, value: &str) -> Result<(), ValidationError> {
    require(field, value)?;
    if value.chars().any(char::is_whitespace) {
        return Err(ValidationError::Invalid {
            field,
            reason: "must not contain whitespace".to_string(),
        });
    }
    if value.chars().count() > 32 {
        return Err(ValidationError::Invalid {
            field,
            reason: "must be at most 32 characters".to_string(),
        });
    }
    Ok(())
}

/// Phone numbers: digits with an optional leading `+`, 8 to 15 digits
pub(crate) fn check_phone(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(());
    };

    let digits = value.strip_prefix('+').unwrap_or(value);
    let valid = digits.chars().all(|c| c.is_ascii_digit()) && (8..=15).contains(&digits.len());
    if !valid {
        return Err(ValidationError::Invalid {
            field,
            reason: "must be 8-15 digits".to_string(),
        });
    }
    Ok(())
}
