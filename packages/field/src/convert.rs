//! Single-token type conversion.
//!
//! Pure functions with no side effects. Failures are returned as
//! [`ConversionError`] values; the caller decides whether to fall back.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use docimport_field_models::{FieldType, TypedValue};

/// Why a token could not be converted to its declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// Not a 64-bit integer.
    #[error("'{token}' is not an integer")]
    InvalidInt {
        /// The offending token.
        token: String,
    },

    /// Not a finite float.
    #[error("'{token}' is not a float")]
    InvalidFloat {
        /// The offending token.
        token: String,
    },

    /// Does not match the date format.
    #[error("'{token}' does not match date format '{format}'")]
    InvalidDate {
        /// The offending token.
        token: String,
        /// The format it was checked against.
        format: String,
    },

    /// A date conversion was requested without a format.
    #[error("date conversion requires a format")]
    MissingFormat,
}

/// Converts `raw` to `field_type`.
///
/// Strings are returned verbatim. Numeric and date tokens are trimmed
/// first, and an empty token yields [`TypedValue::Null`]. Blank columns
/// always yield null.
///
/// # Errors
///
/// Returns [`ConversionError`] if the trimmed token does not parse as the
/// declared type, or if a date is requested without a format.
pub fn convert(
    raw: &str,
    field_type: FieldType,
    format: Option<&str>,
) -> Result<TypedValue, ConversionError> {
    let token = raw.trim();

    match field_type {
        FieldType::Str => Ok(TypedValue::Str(raw.to_string())),
        FieldType::Blank => Ok(TypedValue::Null),
        FieldType::Int => {
            if token.is_empty() {
                return Ok(TypedValue::Null);
            }
            token
                .parse::<i64>()
                .map(TypedValue::Int)
                .map_err(|_| ConversionError::InvalidInt {
                    token: raw.to_string(),
                })
        }
        FieldType::Float => {
            if token.is_empty() {
                return Ok(TypedValue::Null);
            }
            parse_float(token)
                .map(TypedValue::Float)
                .ok_or_else(|| ConversionError::InvalidFloat {
                    token: raw.to_string(),
                })
        }
        FieldType::Date => {
            let format = format.ok_or(ConversionError::MissingFormat)?;
            if token.is_empty() {
                return Ok(TypedValue::Null);
            }
            parse_date(token, format)
                .map(TypedValue::Date)
                .ok_or_else(|| ConversionError::InvalidDate {
                    token: raw.to_string(),
                    format: format.to_string(),
                })
        }
    }
}

/// Parses a finite float. `inf` and `NaN` spellings are rejected so that
/// words like "nan" or "infinity" stay text.
fn parse_float(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Parses `token` against exactly `format`.
///
/// Date-only formats produce midnight on that date.
#[must_use]
pub fn parse_date(token: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(token, format) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(token, format)
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}
