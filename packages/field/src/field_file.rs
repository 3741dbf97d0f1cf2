//! The `.ff` field-file format.
//!
//! One section per column, in column order:
//!
//! ```text
//! [Inventory Item]
//! type=str
//! [Last Order]
//! type=date
//! format=%d-%b-%Y
//! name=last_order
//! ```
//!
//! Lines starting with `;` or `#` are comments.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;

use docimport_field_models::{FieldDescriptor, FieldSchema, FieldType};

use crate::SchemaError;

/// Extension used for field files.
pub const FIELD_FILE_EXTENSION: &str = "ff";

/// Returns the field file conventionally paired with `input`
/// (`inventory.csv` -> `inventory.ff`).
#[must_use]
pub fn default_path(input: &Path) -> PathBuf {
    input.with_extension(FIELD_FILE_EXTENSION)
}

struct Section {
    name: String,
    line: usize,
    field_type: Option<FieldType>,
    format: Option<String>,
    rename: Option<String>,
}

impl Section {
    fn into_descriptor(self, position: usize) -> Result<FieldDescriptor, SchemaError> {
        let field_type = self.field_type.ok_or_else(|| SchemaError::Parse {
            line: self.line,
            message: format!("section [{}] has no type", self.name),
        })?;

        Ok(FieldDescriptor {
            position,
            original_name: self.name,
            renamed_name: self.rename,
            field_type,
            format: self.format,
        })
    }
}

/// Parses field-file text into a schema.
///
/// # Errors
///
/// Returns [`SchemaError::Parse`] on malformed lines, unknown keys or
/// types, duplicate sections, or keys outside a section, and
/// [`SchemaError::Invalid`] if the resulting schema fails validation.
pub fn parse(text: &str) -> Result<FieldSchema, SchemaError> {
    let mut sections: Vec<Section> = Vec::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw_line.trim();

        if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| SchemaError::Parse {
                line,
                message: format!("unterminated section header: {trimmed}"),
            })?;
            if sections.iter().any(|s| s.name == name) {
                return Err(SchemaError::Parse {
                    line,
                    message: format!("duplicate section [{name}]"),
                });
            }
            sections.push(Section {
                name: name.to_string(),
                line,
                field_type: None,
                format: None,
                rename: None,
            });
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(SchemaError::Parse {
                line,
                message: format!("expected key=value, found: {trimmed}"),
            });
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        let Some(section) = sections.last_mut() else {
            return Err(SchemaError::Parse {
                line,
                message: format!("'{key}' appears before any section"),
            });
        };

        match key.as_str() {
            "type" => {
                let field_type = FieldType::from_str(value).map_err(|_| SchemaError::Parse {
                    line,
                    message: format!("unknown type '{value}' for [{}]", section.name),
                })?;
                section.field_type = Some(field_type);
            }
            "format" => section.format = Some(value.to_string()),
            "name" => {
                if !value.is_empty() {
                    section.rename = Some(value.to_string());
                }
            }
            other => {
                return Err(SchemaError::Parse {
                    line,
                    message: format!("unknown key '{other}' in [{}]", section.name),
                });
            }
        }
    }

    let fields = sections
        .into_iter()
        .enumerate()
        .map(|(position, section)| section.into_descriptor(position))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FieldSchema::new(fields)?)
}

/// Reads and parses a field file.
///
/// # Errors
///
/// Returns [`SchemaError`] if the file cannot be read or parsed.
pub fn load(path: &Path) -> Result<FieldSchema, SchemaError> {
    let text = std::fs::read_to_string(path)?;
    let schema = parse(&text)?;
    log::debug!("Loaded {} fields from {}", schema.len(), path.display());
    Ok(schema)
}

/// Renders a schema in field-file format.
#[must_use]
pub fn render(schema: &FieldSchema) -> String {
    let mut out = String::new();

    for field in schema {
        let _ = writeln!(out, "[{}]", field.original_name);
        let _ = writeln!(out, "type={}", field.field_type);
        if let Some(format) = &field.format {
            let _ = writeln!(out, "format={format}");
        }
        if let Some(rename) = &field.renamed_name {
            let _ = writeln!(out, "name={rename}");
        }
    }

    out
}

/// Writes a schema to `path` in field-file format.
///
/// # Errors
///
/// Returns [`SchemaError::Io`] if the file cannot be written.
pub fn save(schema: &FieldSchema, path: &Path) -> Result<(), SchemaError> {
    std::fs::write(path, render(schema))?;
    Ok(())
}
