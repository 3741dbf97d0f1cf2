//! Delimited row reader.
//!
//! Rows are read without header handling and with flexible widths so the
//! engine sees every line and checks arity itself. Fields are decoded one
//! row at a time, so a line that is not UTF-8 is a row error rather than a
//! broken stream.

use std::io::Read;

use docimport_field::record::RowError;

use crate::ImportError;

/// One row with its position in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based line on which the row starts.
    pub line: u64,
    pub fields: Vec<String>,
}

/// Parses a delimiter argument. Accepts a single byte, or `\t` / `tab`
/// for a tab.
///
/// # Errors
///
/// Returns [`ImportError::InvalidDelimiter`] for anything else.
pub fn parse_delimiter(value: &str) -> Result<u8, ImportError> {
    match value {
        "\\t" | "tab" => Ok(b'\t'),
        _ => match value.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(ImportError::InvalidDelimiter(value.to_string())),
        },
    }
}

/// Streams rows from a delimited source.
pub struct RowReader<R: Read> {
    inner: csv::Reader<R>,
    record: csv::ByteRecord,
}

impl<R: Read> RowReader<R> {
    #[must_use]
    pub fn new(source: R, delimiter: u8) -> Self {
        let inner = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(source);

        Self {
            inner,
            record: csv::ByteRecord::new(),
        }
    }

    /// Reads the next row, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Csv`] if the input is malformed, and
    /// [`ImportError::Row`] with [`RowError::Encoding`] if a field is not
    /// UTF-8. The reader has moved past that row, so reading can go on.
    pub fn next_row(&mut self) -> Result<Option<Row>, ImportError> {
        if !self.inner.read_byte_record(&mut self.record)? {
            return Ok(None);
        }

        let line = self.record.position().map_or(0, csv::Position::line);
        let fields = self
            .record
            .iter()
            .enumerate()
            .map(|(position, bytes)| {
                std::str::from_utf8(bytes)
                    .map(ToString::to_string)
                    .map_err(|e| RowError::Encoding {
                        position,
                        valid_up_to: e.valid_up_to(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ImportError::Row { line, source })?;

        Ok(Some(Row { line, fields }))
    }

    /// Discards up to `count` rows without decoding them, returning how
    /// many were actually skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Csv`] if the input is malformed.
    pub fn skip(&mut self, count: u64) -> Result<u64, ImportError> {
        let mut record = csv::ByteRecord::new();
        let mut skipped = 0;

        while skipped < count && self.inner.read_byte_record(&mut record)? {
            skipped += 1;
        }

        Ok(skipped)
    }
}
