//! Source record model and the schema that splits its fields.
//!
//! A [`SourceRecord`] is owned by the primary store. The [`RecordSchema`]
//! decides, at design time, which of its fields feed the embedding text and
//! which are only copied into vector metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Scalar values
// ============================================================================

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean flag.
    Bool(bool),
    /// Whole number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Free text.
    Text(String),
}

impl Scalar {
    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Boolean view of the value, if it is a flag.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Text view of the value, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True for empty or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// ============================================================================
// Source records
// ============================================================================

/// A record in the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Record identifier; the back-reference id of its vector records.
    pub id: String,

    /// All other fields, flattened alongside `id` when serialized.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Scalar>,
}

impl SourceRecord {
    /// Create an empty record.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Set a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field.
    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.get(name)
    }

    /// Overwrite the given fields, returning the names whose value changed.
    pub fn merge(&mut self, patch: BTreeMap<String, Scalar>) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for (name, value) in patch {
            if self.fields.get(&name) != Some(&value) {
                self.fields.insert(name.clone(), value);
                changed.insert(name);
            }
        }
        changed
    }
}

// ============================================================================
// Schema
// ============================================================================

/// A text-bearing field and the label it gets in canonical text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextField {
    /// Field name in the record.
    pub name: String,
    /// Label written before the value.
    pub label: String,
}

/// Expected type of a passthrough field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassthroughKind {
    /// Integer or float.
    Number,
    /// Boolean.
    Bool,
}

/// A field copied into metadata but never embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassthroughField {
    /// Field name in the record.
    pub name: String,
    /// Expected value type.
    pub kind: PassthroughKind,
}

/// Design-time split of a record's fields.
///
/// Text fields are ordered: canonical text always renders them in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Name of the primary collection.
    pub collection: String,
    /// Fields that feed the embedding text.
    pub text_fields: Vec<TextField>,
    /// Fields copied into metadata only.
    pub passthrough_fields: Vec<PassthroughField>,
    /// Fields shown alongside search hits.
    pub display_fields: Vec<String>,
    /// Fields that must be present on create.
    pub required_fields: Vec<String>,
}

impl RecordSchema {
    /// The catalog schema used by the bundled service: vehicles for sale.
    pub fn catalog() -> Self {
        let text = |name: &str, label: &str| TextField {
            name: name.to_string(),
            label: label.to_string(),
        };
        let pass = |name: &str, kind| PassthroughField {
            name: name.to_string(),
            kind,
        };
        Self {
            collection: "cars".to_string(),
            text_fields: vec![
                text("name", "Name"),
                text("brand", "Brand"),
                text("model", "Model"),
                text("category", "Category"),
                text("description", "Description"),
            ],
            passthrough_fields: vec![
                pass("price", PassthroughKind::Number),
                pass("year", PassthroughKind::Number),
                pass("mileage", PassthroughKind::Number),
                pass("in_stock", PassthroughKind::Bool),
            ],
            display_fields: vec!["name".to_string(), "brand".to_string()],
            required_fields: vec!["name".to_string(), "brand".to_string()],
        }
    }

    /// Whether `name` is a text-bearing field.
    pub fn is_text_field(&self, name: &str) -> bool {
        self.text_fields.iter().any(|f| f.name == name)
    }

    /// Whether `name` is a passthrough field.
    pub fn is_passthrough_field(&self, name: &str) -> bool {
        self.passthrough_fields.iter().any(|f| f.name == name)
    }

    /// Whether any of `changed` affects the embedding text.
    pub fn touches_text(&self, changed: &BTreeSet<String>) -> bool {
        changed.iter().any(|name| self.is_text_field(name))
    }

    /// The passthrough fields among `changed`.
    pub fn touched_passthrough<'a>(&self, changed: &'a BTreeSet<String>) -> Vec<&'a str> {
        changed
            .iter()
            .filter(|name| self.is_passthrough_field(name))
            .map(String::as_str)
            .collect()
    }

    /// Current values of every passthrough field present on `record`.
    pub fn passthrough_values(&self, record: &SourceRecord) -> BTreeMap<String, Scalar> {
        self.passthrough_fields
            .iter()
            .filter_map(|f| record.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect()
    }

    /// Current values of every display field present on `record`.
    pub fn display_values(&self, record: &SourceRecord) -> BTreeMap<String, Scalar> {
        self.display_fields
            .iter()
            .filter_map(|name| record.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    /// Check required fields and passthrough types.
    pub fn validate(&self, record: &SourceRecord) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(Error::validation("record id must not be empty"));
        }
        for name in &self.required_fields {
            match record.get(name) {
                Some(value) if !value.is_blank() => {}
                _ => {
                    return Err(Error::validation(format!(
                        "missing required field '{name}'"
                    )));
                }
            }
        }
        self.validate_types(record)
    }

    /// Check passthrough types only.
    pub fn validate_types(&self, record: &SourceRecord) -> Result<()> {
        for field in &self.passthrough_fields {
            let Some(value) = record.get(&field.name) else {
                continue;
            };
            let ok = match field.kind {
                PassthroughKind::Number => value.as_f64().is_some(),
                PassthroughKind::Bool => value.as_bool().is_some(),
            };
            if !ok {
                return Err(Error::validation(format!(
                    "field '{}' must be a {:?}, got '{}'",
                    field.name, field.kind, value
                )));
            }
        }
        Ok(())
    }
}

impl Default for RecordSchema {
    fn default() -> Self {
        Self::catalog()
    }
}
