//! Row-to-record conversion with string fallback.
//!
//! A row whose width matches the schema is always salvaged: any field that
//! fails to convert is kept as its raw text. A row of the wrong width is
//! rejected as a whole.

use docimport_field_models::{ErrorPolicy, FieldSchema, FieldType, TypedRecord, TypedValue};

use crate::convert::{ConversionError, convert};

/// A field that fell back to its raw string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWarning {
    /// Column position.
    pub position: usize,
    /// Output key of the column.
    pub field: String,
    /// Why the declared type did not apply.
    pub error: ConversionError,
}

/// A converted row plus the fields that needed a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    /// The typed record; blank columns are omitted.
    pub record: TypedRecord,
    /// Fallbacks that happened. Always empty under [`ErrorPolicy::Ignore`].
    pub warnings: Vec<FieldWarning>,
}

/// Why a row could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// The row has the wrong number of tokens.
    #[error("expected {expected} fields, found {found}")]
    Arity {
        /// Columns in the schema.
        expected: usize,
        /// Tokens in the row.
        found: usize,
    },

    /// A field is not valid UTF-8.
    #[error("field {position} is not valid UTF-8 (invalid byte at offset {valid_up_to})")]
    Encoding {
        /// Column position.
        position: usize,
        /// Length of the valid prefix of the field.
        valid_up_to: usize,
    },

    /// A field failed to convert and the policy is [`ErrorPolicy::Fail`].
    #[error("field '{field}': {source}")]
    Conversion {
        /// Output key of the column.
        field: String,
        /// The underlying failure.
        #[source]
        source: ConversionError,
    },
}

/// Converts one row against `schema`.
///
/// # Errors
///
/// Returns [`RowError::Arity`] if `row` and `schema` differ in width, and
/// [`RowError::Conversion`] on the first bad field when `policy` is
/// [`ErrorPolicy::Fail`].
pub fn to_record<S: AsRef<str>>(
    schema: &FieldSchema,
    row: &[S],
    policy: ErrorPolicy,
) -> Result<Converted, RowError> {
    if row.len() != schema.len() {
        return Err(RowError::Arity {
            expected: schema.len(),
            found: row.len(),
        });
    }

    let mut record = TypedRecord::new();
    let mut warnings = Vec::new();

    for (field, token) in schema.fields().iter().zip(row) {
        if field.field_type == FieldType::Blank {
            continue;
        }

        let raw = token.as_ref();
        let value = match convert(raw, field.field_type, field.format.as_deref()) {
            Ok(value) => value,
            Err(error) => match policy {
                ErrorPolicy::Fail => {
                    return Err(RowError::Conversion {
                        field: field.output_name().to_string(),
                        source: error,
                    });
                }
                ErrorPolicy::Warn => {
                    warnings.push(FieldWarning {
                        position: field.position,
                        field: field.output_name().to_string(),
                        error,
                    });
                    TypedValue::Str(raw.to_string())
                }
                ErrorPolicy::Ignore => TypedValue::Str(raw.to_string()),
            },
        };

        record.push(field.output_name(), value);
    }

    Ok(Converted { record, warnings })
}

#[cfg(test)]
mod tests {
    use docimport_field_models::FieldDescriptor;

    use super::*;

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldDescriptor::new(0, "id", FieldType::Int),
            FieldDescriptor::blank(1),
            FieldDescriptor::new(2, "price", FieldType::Float).with_rename("cost"),
            FieldDescriptor::new(3, "when", FieldType::Date).with_format("%Y-%m-%d"),
        ])
        .unwrap()
    }

    #[test]
    fn converts_matching_row() {
        let converted = to_record(&schema(), &["7", "x", "9.5", "2016-01-01"], ErrorPolicy::Warn)
            .unwrap();
        assert!(converted.warnings.is_empty());
        assert_eq!(converted.record.get("id"), Some(&TypedValue::Int(7)));
        assert_eq!(converted.record.get("cost"), Some(&TypedValue::Float(9.5)));
        assert!(converted.record.get("price").is_none());
    }

    #[test]
    fn blank_columns_never_reach_the_record() {
        let converted =
            to_record(&schema(), &["1", "anything", "", ""], ErrorPolicy::Warn).unwrap();
        assert!(converted.record.get("blank-1").is_none());
        assert_eq!(converted.record.non_null_names(), vec!["id"]);
        assert_eq!(converted.record.len(), 3);
    }

    #[test]
    fn bad_fields_fall_back_to_raw_strings() {
        let converted = to_record(
            &schema(),
            &["seven", "", "cheap", "yesterday"],
            ErrorPolicy::Warn,
        )
        .unwrap();

        assert_eq!(
            converted.record.get("id"),
            Some(&TypedValue::Str("seven".to_string()))
        );
        assert_eq!(
            converted.record.get("cost"),
            Some(&TypedValue::Str("cheap".to_string()))
        );
        assert_eq!(
            converted.record.get("when"),
            Some(&TypedValue::Str("yesterday".to_string()))
        );
        let positions: Vec<usize> = converted.warnings.iter().map(|w| w.position).collect();
        assert_eq!(positions, vec![0, 2, 3]);
        assert_eq!(converted.warnings[1].field, "cost");
    }

    #[test]
    fn ignore_policy_salvages_silently() {
        let converted =
            to_record(&schema(), &["seven", "", "1", ""], ErrorPolicy::Ignore).unwrap();
        assert!(converted.warnings.is_empty());
        assert_eq!(
            converted.record.get("id"),
            Some(&TypedValue::Str("seven".to_string()))
        );
    }

    #[test]
    fn fail_policy_rejects_first_bad_field() {
        let err = to_record(&schema(), &["1", "", "cheap", "nope"], ErrorPolicy::Fail)
            .unwrap_err();
        assert!(matches!(err, RowError::Conversion { ref field, .. } if field == "cost"));
    }

    #[test]
    fn wrong_width_rejects_whole_row() {
        for policy in [ErrorPolicy::Warn, ErrorPolicy::Ignore, ErrorPolicy::Fail] {
            let err = to_record(&schema(), &["1", "2"], policy).unwrap_err();
            assert_eq!(
                err,
                RowError::Arity {
                    expected: 4,
                    found: 2
                }
            );
        }
    }

    #[test]
    fn no_field_is_dropped_under_lenient_policies() {
        let rows: [[&str; 4]; 3] = [
            ["1", "", "2.0", "2016-01-01"],
            ["x", "", "y", "z"],
            ["", "", "", ""],
        ];

        for policy in [ErrorPolicy::Warn, ErrorPolicy::Ignore] {
            for row in &rows {
                let converted = to_record(&schema(), row, policy).unwrap();
                assert_eq!(converted.record.len(), 3);
            }
        }
    }
}
