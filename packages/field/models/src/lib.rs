#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Column descriptors, typed values, and the run-wide error policy.
//!
//! A [`FieldSchema`] is built once per input file (loaded from a field file
//! or inferred from sample data) and is immutable afterwards. Every row of
//! the file is converted against it into a [`TypedRecord`].

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Prefix used for synthetic names of columns with an empty header token.
pub const BLANK_PREFIX: &str = "blank-";

/// The declared type of a column.
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
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Raw text, stored verbatim.
    #[strum(to_string = "str", serialize = "string")]
    Str,
    /// 64-bit signed integer.
    #[strum(to_string = "int")]
    Int,
    /// Finite 64-bit float.
    #[strum(to_string = "float")]
    Float,
    /// Date or date-time parsed with an explicit strftime-style format.
    #[strum(to_string = "date", serialize = "datetime")]
    Date,
    /// Placeholder column kept only for alignment; never stored.
    #[strum(to_string = "blank")]
    Blank,
}

/// What to do when a field or row cannot be converted.
///
/// Configured once per run and passed explicitly to every component that
/// can fail.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log the problem and continue.
    #[default]
    Warn,
    /// Continue silently.
    Ignore,
    /// Abort the run on the first problem.
    Fail,
}

/// One input column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Zero-based column position.
    pub position: usize,
    /// Column name as it appears in the header (or `blank-N`).
    pub original_name: String,
    /// Output key overriding `original_name`.
    pub renamed_name: Option<String>,
    /// Declared column type.
    pub field_type: FieldType,
    /// Date format; present iff `field_type` is [`FieldType::Date`].
    pub format: Option<String>,
}

impl FieldDescriptor {
    /// Creates a descriptor with no rename and no format.
    #[must_use]
    pub fn new(position: usize, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            position,
            original_name: name.into(),
            renamed_name: None,
            field_type,
            format: None,
        }
    }

    /// Creates a synthetic descriptor for an unnamed column.
    #[must_use]
    pub fn blank(position: usize) -> Self {
        Self::new(position, blank_name(position), FieldType::Blank)
    }

    /// Sets the date format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Sets the output key.
    #[must_use]
    pub fn with_rename(mut self, name: impl Into<String>) -> Self {
        self.renamed_name = Some(name.into());
        self
    }

    /// The key this column is written under.
    #[must_use]
    pub fn output_name(&self) -> &str {
        self.renamed_name.as_deref().unwrap_or(&self.original_name)
    }
}

/// Returns the synthetic name for the unnamed column at `position`.
#[must_use]
pub fn blank_name(position: usize) -> String {
    format!("{BLANK_PREFIX}{position}")
}

/// Reasons a set of descriptors does not form a valid [`FieldSchema`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaValidationError {
    /// Positions are not `0..n` in order.
    #[error("column '{name}' has position {found}, expected {expected}")]
    Position {
        /// Column name.
        name: String,
        /// Position the column should have.
        expected: usize,
        /// Position it has.
        found: usize,
    },

    /// A date column has no format.
    #[error("date column '{name}' has no format")]
    MissingFormat {
        /// Column name.
        name: String,
    },

    /// A non-date column carries a format.
    #[error("column '{name}' of type {field_type} must not have a format")]
    UnexpectedFormat {
        /// Column name.
        name: String,
        /// Declared type.
        field_type: FieldType,
    },

    /// Two stored columns share an output key.
    #[error("duplicate output field name '{name}'")]
    DuplicateName {
        /// The repeated key.
        name: String,
    },

    /// No columns at all.
    #[error("schema has no columns")]
    Empty,
}

/// Ordered column descriptors for one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: Vec<FieldDescriptor>,
}

impl FieldSchema {
    /// Builds a schema, validating positions, formats, and output keys.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaValidationError`] if the descriptors are empty, not
    /// contiguous from zero, have a missing/unexpected date format, or two
    /// stored columns map to the same output key.
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self, SchemaValidationError> {
        if fields.is_empty() {
            return Err(SchemaValidationError::Empty);
        }

        let mut seen = BTreeSet::new();

        for (expected, field) in fields.iter().enumerate() {
            if field.position != expected {
                return Err(SchemaValidationError::Position {
                    name: field.original_name.clone(),
                    expected,
                    found: field.position,
                });
            }

            match (field.field_type, field.format.as_deref()) {
                (FieldType::Date, None | Some("")) => {
                    return Err(SchemaValidationError::MissingFormat {
                        name: field.original_name.clone(),
                    });
                }
                (FieldType::Date, Some(_)) | (_, None) => {}
                (field_type, Some(_)) => {
                    return Err(SchemaValidationError::UnexpectedFormat {
                        name: field.original_name.clone(),
                        field_type,
                    });
                }
            }

            if field.field_type != FieldType::Blank && !seen.insert(field.output_name()) {
                return Err(SchemaValidationError::DuplicateName {
                    name: field.output_name().to_string(),
                });
            }
        }

        Ok(Self { fields })
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always `false` for a validated schema; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The descriptors in column order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Descriptor at `position`, if any.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&FieldDescriptor> {
        self.fields.get(position)
    }

    /// Looks a column up by its header name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.original_name == name)
    }

    /// Header names in column order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|f| f.original_name.as_str())
            .collect()
    }

    /// Declared types in column order.
    #[must_use]
    pub fn types(&self) -> Vec<FieldType> {
        self.fields.iter().map(|f| f.field_type).collect()
    }
}

impl<'a> IntoIterator for &'a FieldSchema {
    type Item = &'a FieldDescriptor;
    type IntoIter = std::slice::Iter<'a, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// A converted field value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// Text.
    Str(String),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Date/time without zone information.
    Date(NaiveDateTime),
    /// Missing value.
    Null,
}

impl TypedValue {
    /// Whether this is [`TypedValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Renders the value back to text. Dates use `format` when given and
    /// ISO-8601 otherwise; nulls render as the empty string.
    #[must_use]
    pub fn render(&self, format: Option<&str>) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Date(dt) => format.map_or_else(
                || dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
                |fmt| dt.format(fmt).to_string(),
            ),
            Self::Null => String::new(),
        }
    }
}

impl From<&TypedValue> for serde_json::Value {
    fn from(value: &TypedValue) -> Self {
        match value {
            TypedValue::Str(s) => Self::String(s.clone()),
            TypedValue::Int(i) => Self::from(*i),
            TypedValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(Self::Null, Self::Number)
            }
            TypedValue::Date(dt) => serde_json::json!({
                "$date": dt.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string()
            }),
            TypedValue::Null => Self::Null,
        }
    }
}

/// One converted row: output field name to value, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedRecord {
    fields: Vec<(String, TypedValue)>,
}

impl TypedRecord {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a field.
    pub fn push(&mut self, name: impl Into<String>, value: TypedValue) {
        self.fields.push((name.into(), value));
    }

    /// Looks a field up by output name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Names of the fields holding a non-null value.
    #[must_use]
    pub fn non_null_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Converts the record into a JSON object, preserving field order.
    #[must_use]
    pub fn into_json(self) -> serde_json::Map<String, serde_json::Value> {
        self.fields
            .into_iter()
            .map(|(name, value)| {
                let json = serde_json::Value::from(&value);
                (name, json)
            })
            .collect()
    }
}
