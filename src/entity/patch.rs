//! Partial updates
//!
//! A patch only carries the fields the user actually filled in. Empty strings
//! and absent values mean "leave unchanged" and are stripped before sending.
//! `null` is only ever sent for fields passed to [`Patch::clear`].

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, ValidationError};

/// Field changes for an update request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: Map<String, Value>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field` to `value`. A `null` value counts as absent and leaves
    /// the field out.
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Null => {
                self.fields.remove(field);
            }
            value => {
                self.fields.insert(field.to_string(), value);
            }
        }
        self
    }

    /// Set `field` only when a value is present.
    pub fn set_opt<V: Into<Value>>(self, field: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(field, value),
            None => self,
        }
    }

    /// Explicitly clear `field` on the server (sent as `null`).
    pub fn clear(mut self, field: &str) -> Self {
        self.fields.insert(field.to_string(), Value::Null);
        self
    }

    /// Build a patch from a JSON object. `null` members are dropped.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(mut fields) => {
                fields.retain(|_, value| !value.is_null());
                Ok(Self { fields })
            }
            other => Err(ValidationError::Invalid {
                field: "patch",
                reason: format!("expected a JSON object, got {}", other),
            }
            .into()),
        }
    }

    /// Fields that will actually be sent: empty strings removed, everything
    /// else (including cleared fields) kept.
    pub fn stripped(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|(_, value)| !is_empty_string(value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    /// True when nothing would be sent.
    pub fn is_empty(&self) -> bool {
        self.stripped().is_empty()
    }
}

fn is_empty_string(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.is_empty())
}

impl Serialize for Patch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.stripped().serialize(serializer)
    }
}
