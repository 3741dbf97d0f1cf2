//! Schema inference from a header and one sample row.
//!
//! Each column tries `int`, then `float`, then a fixed list of date
//! formats, and finally falls back to `str`. A single row is easy to
//! misread (an all-digit ID column comes out as `int`), so the generated
//! field file is meant to be reviewed and edited before large imports.

use std::path::Path;

use docimport_field_models::{FieldDescriptor, FieldSchema, FieldType};

use crate::SchemaError;
use crate::convert::{convert, parse_date};

/// Date formats tried during inference, in priority order.
pub const DATE_CANDIDATES: &[&str] = &[
    "%Y-%m-%d",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
];

/// Guesses the type of one sample token, returning the type and, for
/// dates, the matching format.
#[must_use]
pub fn infer_type(token: &str) -> (FieldType, Option<&'static str>) {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return (FieldType::Str, None);
    }

    for candidate in [FieldType::Int, FieldType::Float] {
        if convert(trimmed, candidate, None).is_ok() {
            return (candidate, None);
        }
    }

    DATE_CANDIDATES
        .iter()
        .find(|format| parse_date(trimmed, format).is_some())
        .map_or((FieldType::Str, None), |format| {
            (FieldType::Date, Some(*format))
        })
}

/// Infers a schema from header tokens and one sample row.
///
/// Empty header tokens become `blank-N` columns of type
/// [`FieldType::Blank`] whatever the sample holds.
///
/// # Errors
///
/// Returns [`SchemaError::ColumnCountMismatch`] if the sample row and
/// header differ in width, and [`SchemaError::Invalid`] if the header is
/// empty or repeats a column name.
pub fn infer<H: AsRef<str>, S: AsRef<str>>(
    header: &[H],
    sample: &[S],
) -> Result<FieldSchema, SchemaError> {
    if header.len() != sample.len() {
        return Err(SchemaError::ColumnCountMismatch {
            expected: header.len(),
            found: sample.len(),
        });
    }

    let fields = header
        .iter()
        .zip(sample)
        .enumerate()
        .map(|(position, (name, token))| {
            let name = name.as_ref().trim();
            if name.is_empty() {
                return FieldDescriptor::blank(position);
            }
            match infer_type(token.as_ref()) {
                (field_type, Some(format)) => {
                    FieldDescriptor::new(position, name, field_type).with_format(format)
                }
                (field_type, None) => FieldDescriptor::new(position, name, field_type),
            }
        })
        .collect();

    Ok(FieldSchema::new(fields)?)
}

/// Reads the header and first data row of `path` and infers its schema.
///
/// A file with a header but no data rows infers every column as `str`.
///
/// # Errors
///
/// Returns [`SchemaError::EmptyFile`] if the file has no lines, and
/// [`SchemaError`] on I/O, CSV, or inference failures.
pub fn infer_file(path: &Path, delimiter: u8) -> Result<FieldSchema, SchemaError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)?;

    let mut records = reader.records();
    let header = records
        .next()
        .transpose()?
        .ok_or_else(|| SchemaError::EmptyFile {
            path: path.to_path_buf(),
        })?;
    let header: Vec<&str> = header.iter().collect();

    let schema = match records.next().transpose()? {
        Some(sample) => {
            let sample: Vec<&str> = sample.iter().collect();
            infer(&header, &sample)?
        }
        None => {
            log::warn!(
                "{} has no data rows; inferring all columns as str",
                path.display()
            );
            infer(&header, &vec![""; header.len()])?
        }
    };

    log::info!(
        "Inferred {} fields from {}",
        schema.len(),
        path.display()
    );

    Ok(schema)
}
