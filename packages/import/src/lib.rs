#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Resumable import of delimited files into a document store.
//!
//! [`engine::ImportEngine`] drives one file from schema resolution through
//! batched writes and checkpoints. [`processor::FileProcessor`] runs the
//! engine over many files and collects a [`RunReport`]. Configuration is
//! layered by [`config`].

pub mod batch;
pub mod config;
pub mod engine;
pub mod processor;
pub mod reader;

use docimport_field::SchemaError;
use docimport_field::record::RowError;
use docimport_store::StoreError;

pub use docimport_import_models::{
    EngineState, FailureKind, FileFailure, IdMode, ImportOptions, ImportOutcome, RowFailure,
    RunReport, TimestampMode,
};

/// Errors that stop the import of a file.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// I/O error opening or reading the source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source is not readable as delimited text.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// No usable schema for the file.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The store failed or is unreachable.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A row was rejected under the `fail` policy.
    #[error("line {line}: {source}")]
    Row {
        /// 1-based line number in the source.
        line: u64,
        /// Why the row was rejected.
        #[source]
        source: RowError,
    },

    /// The store refused a document and the file cannot continue.
    #[error("line {line}: write failed: {reason}")]
    Write {
        /// 1-based line number of the refused row.
        line: u64,
        /// Reason reported by the store.
        reason: String,
    },

    /// The delimiter is not a single byte.
    #[error("invalid delimiter {0:?}: expected a single byte or \\t")]
    InvalidDelimiter(String),
}

impl ImportError {
    /// Whether the store itself is unusable.
    #[must_use]
    pub const fn is_store_unavailable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_unavailable(),
            _ => false,
        }
    }
}
