#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Turning raw delimited text into typed records.
//!
//! - [`convert`] coerces one token into a [`TypedValue`](docimport_field_models::TypedValue).
//! - [`field_file`] reads and writes the `.ff` field-file format.
//! - [`inference`] guesses a schema from a header and one sample row.
//! - [`record`] converts a whole row, falling back to strings on bad fields.

pub mod convert;
pub mod field_file;
pub mod inference;
pub mod record;

use std::path::PathBuf;

use docimport_field_models::SchemaValidationError;

/// Errors that make a schema unusable for a file.
///
/// Always fatal to the file being processed.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// I/O error reading or writing a field file or sample data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sample data could not be read as delimited text.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The field file is syntactically malformed.
    #[error("field file line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// The descriptors do not form a valid schema.
    #[error("invalid schema: {0}")]
    Invalid(#[from] SchemaValidationError),

    /// The schema and the data disagree on the number of columns.
    #[error("column count mismatch: schema has {expected} columns, data has {found}")]
    ColumnCountMismatch {
        /// Columns in the schema.
        expected: usize,
        /// Columns in the data.
        found: usize,
    },

    /// A schema had to be inferred but the file has no header line.
    #[error("no field file for {path:?} and no header to infer one from")]
    NoHeader {
        /// The input file.
        path: PathBuf,
    },

    /// The input file contains no lines at all.
    #[error("{path:?} is empty")]
    EmptyFile {
        /// The input file.
        path: PathBuf,
    },
}
