//! Display of entity records and the organisation tree

use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use factrack::client::models::UserProfile;
use factrack::entity::{Department, Factory, Line, OrgNode, Role, Team};

use super::formatters::{format_bool, format_optional_timestamp};
use super::json::format_json;
use super::table::{format_fields, format_table};
use super::Formattable;
use crate::cli::OutputFormat;
use factrack::error::Result;

/// One table row, shared by every record type
#[derive(Debug, Tabled)]
pub struct RecordRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "CODE")]
    pub code: String,
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "DETAIL")]
    pub detail: String,
    #[tabled(rename = "ACTIVE")]
    pub active: &'static str,
}

/// How a record type is shown
pub trait Describe: Serialize {
    fn row(&self) -> RecordRow;
    fn fields(&self) -> Vec<(&'static str, String)>;
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

impl Describe for Department {
    fn row(&self) -> RecordRow {
        RecordRow {
            id: self.id.clone(),
            code: self.code.clone(),
            name: self.name.clone(),
            detail: self
                .parent_id
                .as_deref()
                .map(|p| format!("parent {}", p))
                .unwrap_or_default(),
            active: format_bool(self.is_active),
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.clone()),
            ("Code", self.code.clone()),
            ("Name", self.name.clone()),
            ("Description", or_dash(self.description.as_deref())),
            ("Phone", or_dash(self.phone.as_deref())),
            ("Factory", or_dash(self.factory_id.as_deref())),
            ("Parent", or_dash(self.parent_id.as_deref())),
            ("Manager", or_dash(self.manager_id.as_deref())),
            ("Active", format_bool(self.is_active).to_string()),
            ("Updated", format_optional_timestamp(self.updated_at)),
        ]
    }
}

impl Describe for Factory {
    fn row(&self) -> RecordRow {
        RecordRow {
            id: self.id.clone(),
            code: self.code.clone(),
            name: self.name.clone(),
            detail: self.address.clone().unwrap_or_default(),
            active: format_bool(self.is_active),
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.clone()),
            ("Code", self.code.clone()),
            ("Name", self.name.clone()),
            ("Address", or_dash(self.address.as_deref())),
            ("Phone", or_dash(self.phone.as_deref())),
            ("Manager", or_dash(self.manager_id.as_deref())),
            ("Active", format_bool(self.is_active).to_string()),
            ("Updated", format_optional_timestamp(self.updated_at)),
        ]
    }
}

impl Describe for Line {
    fn row(&self) -> RecordRow {
        let capacity = self
            .capacity
            .map(|c| format!(", {} pcs/shift", c))
            .unwrap_or_default();
        RecordRow {
            id: self.id.clone(),
            code: self.code.clone(),
            name: self.name.clone(),
            detail: format!("factory {}{}", self.factory_id, capacity),
            active: format_bool(self.is_active),
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.clone()),
            ("Code", self.code.clone()),
            ("Name", self.name.clone()),
            ("Factory", self.factory_id.clone()),
            (
                "Capacity",
                self.capacity.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            ),
            ("Leader", or_dash(self.leader_id.as_deref())),
            ("Active", format_bool(self.is_active).to_string()),
            ("Updated", format_optional_timestamp(self.updated_at)),
        ]
    }
}

impl Describe for Team {
    fn row(&self) -> RecordRow {
        RecordRow {
            id: self.id.clone(),
            code: self.code.clone(),
            name: self.name.clone(),
            detail: format!("line {}, {} members", self.line_id, self.member_count),
            active: format_bool(self.is_active),
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.clone()),
            ("Code", self.code.clone()),
            ("Name", self.name.clone()),
            ("Line", self.line_id.clone()),
            ("Leader", or_dash(self.leader_id.as_deref())),
            ("Members", self.member_count.to_string()),
            ("Active", format_bool(self.is_active).to_string()),
            ("Updated", format_optional_timestamp(self.updated_at)),
        ]
    }
}

impl Describe for Role {
    fn row(&self) -> RecordRow {
        RecordRow {
            id: self.id.clone(),
            code: self.code.clone(),
            name: self.name.clone(),
            detail: format!(
                "{} permissions{}",
                self.permissions.len(),
                if self.is_system { ", system" } else { "" }
            ),
            active: "yes",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.clone()),
            ("Code", self.code.clone()),
            ("Name", self.name.clone()),
            ("Description", or_dash(self.description.as_deref())),
            (
                "Level",
                self.level.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string()),
            ),
            ("System", format_bool(self.is_system).to_string()),
            ("Permissions", self.permissions.join(", ")),
            ("Updated", format_optional_timestamp(self.updated_at)),
        ]
    }
}

impl Describe for UserProfile {
    fn row(&self) -> RecordRow {
        RecordRow {
            id: self.id.clone(),
            code: self.username.clone(),
            name: self.full_name.clone().unwrap_or_default(),
            detail: self.role.clone().unwrap_or_default(),
            active: "yes",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.clone()),
            ("Username", self.username.clone()),
            ("Name", or_dash(self.full_name.as_deref())),
            ("Role", or_dash(self.role.as_deref())),
            ("Department", or_dash(self.department_id.as_deref())),
            ("Factory", or_dash(self.factory_id.as_deref())),
        ]
    }
}

impl<E: Describe> Formattable for Vec<E> {
    fn format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(format_json(self)?),
            OutputFormat::Table => {
                let rows: Vec<RecordRow> = self.iter().map(Describe::row).collect();
                Ok(format_table(&rows))
            }
            OutputFormat::Pretty => {
                if self.is_empty() {
                    return Ok("No results found.".to_string());
                }
                let lines: Vec<String> = self
                    .iter()
                    .map(|record| {
                        let row = record.row();
                        let code = if row.active == "yes" {
                            row.code.bold()
                        } else {
                            row.code.dimmed()
                        };
                        format!("{:<14} {}  {}", code, row.name, row.detail.dimmed())
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
        }
    }
}

/// A single record shown in full
pub struct Record<'a, E>(pub &'a E);

impl<E: Describe> Formattable for Record<'_, E> {
    fn format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(format_json(self.0)?),
            OutputFormat::Table => Ok(format_fields(&self.0.fields())),
            OutputFormat::Pretty => {
                let lines: Vec<String> = self
                    .0
                    .fields()
                    .into_iter()
                    .map(|(name, value)| format!("{:>12}  {}", name.dimmed(), value))
                    .collect();
                Ok(lines.join("\n"))
            }
        }
    }
}

/// Organisation tree, one indented line per node
pub struct Tree<'a>(pub &'a [OrgNode]);

impl Formattable for Tree<'_> {
    fn format(&self, format: OutputFormat) -> Result<String> {
        if let OutputFormat::Json = format {
            return Ok(format_json(self.0)?);
        }
        if self.0.is_empty() {
            return Ok("No results found.".to_string());
        }

        let colored = matches!(format, OutputFormat::Pretty);
        let mut lines = Vec::new();
        for root in self.0 {
            for (depth, node) in root.walk() {
                let indent = "  ".repeat(depth);
                let code = if colored {
                    node.code.bold().to_string()
                } else {
                    node.code.clone()
                };
                lines.push(format!("{}{} {} ({})", indent, code, node.name, node.node_type));
            }
        }
        Ok(lines.join("\n"))
    }
}
