//! Record schema definitions
//!
//! A schema declares the typed shape of the records an index accepts.
//! Field kinds are resolved once, when spaces are registered against the
//! schema, so records carrying an undeclared field or a value of the wrong
//! kind are rejected at ingestion instead of surfacing at query time.

use crate::record::{FieldKind, Record};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Typed shape of ingested records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub name: String,

    /// Field declarations in declaration order
    pub fields: Vec<FieldDef>,
}

/// Declaration of a single schema field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
        });
        self
    }

    #[must_use]
    pub fn text(self, name: impl Into<String>) -> Self {
        self.with_field(name, FieldKind::Text)
    }

    #[must_use]
    pub fn number(self, name: impl Into<String>) -> Self {
        self.with_field(name, FieldKind::Number)
    }

    /// Validate the schema
    /// - Requires a name and at least one field
    /// - Rejects duplicate and reserved field names
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("schema name cannot be empty".into()));
        }
        if self.fields.is_empty() {
            return Err(Error::Configuration(format!(
                "schema '{}' declares no fields",
                self.name
            )));
        }

        let mut seen = ahash::AHashSet::new();
        for field in &self.fields {
            if field.name == "id" {
                return Err(Error::Configuration(format!(
                    "schema '{}': 'id' is reserved for the record identifier",
                    self.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "schema '{}' declares field '{}' twice",
                    self.name, field.name
                )));
            }
        }

        Ok(())
    }

    /// Get a field declaration by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check a record against the declared fields.
    ///
    /// Absent fields are allowed here; whether an absent field is acceptable
    /// depends on the spaces that read it.
    pub fn check_record(&self, record: &Record) -> Result<()> {
        for (name, value) in &record.fields {
            let def = self.field(name).ok_or_else(|| {
                Error::InvalidRecord(format!(
                    "field '{}' is not declared in schema '{}'",
                    name, self.name
                ))
            })?;

            if def.kind != value.kind() {
                return Err(Error::InvalidRecord(format!(
                    "field '{}' must be {}, got {}",
                    name,
                    def.kind,
                    value.kind()
                )));
            }

            if let Some(n) = value.as_number() {
                if !n.is_finite() {
                    return Err(Error::InvalidRecord(format!(
                        "field '{}' must be a finite number",
                        name
                    )));
                }
            }
        }
        Ok(())
    }
}
