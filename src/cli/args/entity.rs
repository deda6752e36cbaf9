//! Arguments shared by the per-entity subcommands

use clap::Args;
use serde_json::Value;

use factrack::entity::{ListFilter, Patch};
use factrack::error::{Result, ValidationError};

/// Filters for `list`
#[derive(Debug, Clone, Args, Default)]
pub struct ListArgs {
    /// Search code and name (substring, server-side)
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Parent record ID (parent department, factory of a line, line of a team)
    #[arg(long)]
    pub parent: Option<String>,

    /// Only active (true) or inactive (false) records
    #[arg(long)]
    pub active: Option<bool>,

    /// Page number (1-based)
    #[arg(long)]
    pub page: Option<usize>,

    /// Results per page [default: from config]
    #[arg(long)]
    pub page_size: Option<usize>,
}

impl ListArgs {
    pub fn to_filter(&self, default_page_size: usize) -> ListFilter {
        ListFilter {
            search: self.search.clone(),
            parent_id: self.parent.clone(),
            active: self.active,
            page: self.page,
            page_size: Some(self.page_size.unwrap_or(default_page_size)),
        }
    }
}

/// Fields for `create`. Each record type reads the ones it has and ignores
/// the rest; missing required fields are reported before anything is sent.
#[derive(Debug, Clone, Args, Default)]
pub struct CreateArgs {
    /// Short code printed on reports
    #[arg(long)]
    pub code: String,

    /// Display name
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub phone: Option<String>,

    /// Address (factory)
    #[arg(long)]
    pub address: Option<String>,

    /// Factory ID (department, line)
    #[arg(long)]
    pub factory: Option<String>,

    /// Parent department ID (department)
    #[arg(long)]
    pub parent: Option<String>,

    /// Line ID (team)
    #[arg(long)]
    pub line: Option<String>,

    /// Team leader user ID (team)
    #[arg(long)]
    pub leader: Option<String>,

    /// Planned output per shift (line)
    #[arg(long)]
    pub capacity: Option<u32>,

    /// Seniority level (role)
    #[arg(long)]
    pub level: Option<u32>,

    /// Permission code granted by the role (repeatable)
    #[arg(long = "permission")]
    pub permissions: Vec<String>,
}

/// Changes for `update`
#[derive(Debug, Clone, Args, Default)]
pub struct UpdateArgs {
    /// Set a field, e.g. `--set name="Line 2"` or `--set capacity=150` (repeatable)
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub set: Vec<String>,

    /// Clear a field on the server (repeatable)
    #[arg(long = "clear", value_name = "FIELD")]
    pub clear: Vec<String>,
}

impl UpdateArgs {
    /// Build the patch. Values that parse as JSON numbers or booleans are
    /// sent as such; everything else is a string. Blank values are dropped.
    pub fn to_patch(&self) -> Result<Patch> {
        let mut patch = Patch::new();
        for assignment in &self.set {
            let (field, raw) = assignment.split_once('=').ok_or_else(|| {
                ValidationError::Invalid {
                    field: "set",
                    reason: format!("expected FIELD=VALUE, got {:?}", assignment),
                }
            })?;
            let field = field.trim();
            if field.is_empty() {
                return Err(ValidationError::Required("set field name").into());
            }
            patch = patch.set(field, parse_value(raw));
        }
        for field in &self.clear {
            patch = patch.clear(field.trim());
        }
        Ok(patch)
    }
}

fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}
