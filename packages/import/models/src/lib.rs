#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Import options, engine state, and result types.

pub mod progress;

use std::path::PathBuf;
use std::time::Duration;

use docimport_field_models::ErrorPolicy;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Default number of documents per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default destination collection.
pub const DEFAULT_COLLECTION: &str = "test";

/// Who assigns document ids.
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
pub enum IdMode {
    /// The store assigns a random id.
    #[default]
    Store,
    /// The importer derives `<file name>:<line>` so replayed rows collide.
    Gen,
}

/// Whether and how documents are timestamped.
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
pub enum TimestampMode {
    /// No timestamp field.
    #[default]
    None,
    /// One timestamp taken when the run starts.
    Now,
    /// One timestamp per batch, taken at submission.
    Gen,
}

/// Settings for importing one or more files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Destination collection.
    pub collection: String,
    /// Collection holding progress records.
    pub audit_collection: String,
    /// Documents per batch.
    pub batch_size: usize,
    /// Submit batches in ordered mode.
    pub ordered: bool,
    /// How conversion, row, and write errors are handled.
    pub policy: ErrorPolicy,
    /// Resume from the last checkpoint and write new ones.
    pub restart: bool,
    /// The first line of each file is a header.
    pub has_header: bool,
    /// Single-byte field delimiter.
    pub delimiter: u8,
    /// Explicit field file, overriding the per-file `<stem>.ff`.
    pub field_file: Option<PathBuf>,
    /// Add a `filename` field to every document.
    pub add_filename: bool,
    /// Timestamping mode.
    pub timestamp: TimestampMode,
    /// Add a `locator` field with file name and line number.
    pub locator: bool,
    /// Id assignment mode.
    pub id_mode: IdMode,
    /// Empty the destination collection before loading.
    pub drop: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            audit_collection: "audit".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            ordered: false,
            policy: ErrorPolicy::default(),
            restart: false,
            has_header: false,
            delimiter: b',',
            field_file: None,
            add_filename: false,
            timestamp: TimestampMode::default(),
            locator: false,
            id_mode: IdMode::default(),
            drop: false,
        }
    }
}

/// Lifecycle of a single file import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EngineState {
    Init,
    SchemaResolved,
    Skipping,
    Streaming,
    Draining,
    Done,
    Failed,
}

impl EngineState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// What went wrong with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FailureKind {
    /// Wrong number of fields.
    Arity,
    /// A field was not valid UTF-8.
    Encoding,
    /// A field could not be converted.
    Conversion,
    /// The store refused the document.
    Write,
}

/// A row that did not make it into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    /// 1-based line number in the source file.
    pub line: u64,
    pub kind: FailureKind,
    pub reason: String,
}

/// Result of importing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    /// Canonical path (or caller-supplied name) of the source.
    pub name: String,
    /// Final engine state.
    pub state: EngineState,
    /// Data rows read after any skipped prefix.
    pub rows_read: u64,
    /// Data rows skipped on restart.
    pub rows_skipped: u64,
    /// Documents written by this run.
    pub records_written: u64,
    /// Fields that fell back to strings.
    pub warnings: u64,
    /// Rows rejected by the converter or the store.
    pub failures: Vec<RowFailure>,
    pub elapsed: Duration,
}

impl ImportOutcome {
    /// Rows written in total, counting those skipped on restart.
    #[must_use]
    pub const fn total_written(&self) -> u64 {
        self.rows_skipped + self.records_written
    }
}

/// A file the orchestrator could not import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub name: String,
    pub reason: String,
}

/// Summary of a multi-file run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub succeeded: Vec<ImportOutcome>,
    pub failed: Vec<FileFailure>,
    /// The run stopped early under [`ErrorPolicy::Fail`].
    pub aborted: bool,
}

impl RunReport {
    /// Documents written across all succeeded files.
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.succeeded.iter().map(|o| o.records_written).sum()
    }

    /// Whether every file succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.aborted
    }
}
