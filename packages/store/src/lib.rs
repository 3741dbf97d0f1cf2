#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Destination store for imported documents.
//!
//! [`DocumentStore`] is the bulk-capable client the importer writes
//! through. Two backends are provided: [`duckdb_store::DuckDbStore`], which
//! keeps every collection in a single `DuckDB` file, and
//! [`memory::MemoryStore`]. The [`audit`] module keeps the per-file
//! progress records that make restarts possible.

pub mod audit;
pub mod duckdb_store;
pub mod memory;
pub mod paths;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

/// A JSON object as stored in a collection.
pub type Document = serde_json::Map<String, Value>;

/// Field holding a document's unique id.
pub const ID_FIELD: &str = "_id";

/// Errors raised by the store itself, as opposed to per-document write
/// failures reported in [`CommitResult`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be reached or opened.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Description of what went wrong.
        message: String,
    },

    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// A stored body is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document does not have the expected shape.
    #[error("malformed document in '{collection}': {message}")]
    Malformed {
        /// Collection holding the document.
        collection: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A checkpoint would move a progress record backwards.
    #[error("checkpoint for {name} would regress count from {previous} to {attempted}")]
    CheckpointRegressed {
        /// Source file identity.
        name: String,
        /// Count already recorded.
        previous: u64,
        /// Count that was rejected.
        attempted: u64,
    },
}

impl StoreError {
    /// Whether the error means the store itself is unusable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::DuckDb(_) | Self::Io(_))
    }
}

/// How a batch is applied.
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
pub enum WriteMode {
    /// Stop at the first rejected document.
    Ordered,
    /// Attempt every document independently.
    #[default]
    Unordered,
}

/// A document the store refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFailure {
    /// Position within the submitted batch.
    pub index: usize,
    /// Id of the refused document.
    pub id: String,
    /// Why it was refused.
    pub reason: String,
}

/// Outcome of one bulk insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    /// Documents submitted.
    pub attempted: usize,
    /// Documents durably written.
    pub committed: usize,
    /// Id of the last document written, in batch order.
    pub last_id: Option<String>,
    /// Refused documents. In ordered mode this holds at most the first
    /// failure; documents after it were not attempted.
    pub failures: Vec<WriteFailure>,
}

impl CommitResult {
    /// Whether every submitted document was written.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.committed == self.attempted
    }

    /// Documents neither written nor reported as refused (the tail of an
    /// ordered batch after its first failure).
    #[must_use]
    pub const fn unattempted(&self) -> usize {
        self.attempted
            .saturating_sub(self.committed)
            .saturating_sub(self.failures.len())
    }
}

/// A bulk-capable document store.
///
/// Methods take `&self` so one connection can serve both the batch writer
/// and the audit log.
pub trait DocumentStore {
    /// Inserts `documents` into `collection`, assigning an [`ID_FIELD`] to
    /// any document without one. Documents whose id already exists in the
    /// collection, or repeats within the batch, are refused.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store itself fails; per-document
    /// refusals are reported in the [`CommitResult`].
    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        mode: WriteMode,
    ) -> Result<CommitResult, StoreError>;

    /// Inserts or replaces the document keyed by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn upsert(&self, collection: &str, key: &str, document: Document) -> Result<(), StoreError>;

    /// Fetches the document keyed by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn find_one(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError>;

    /// Removes the document keyed by `key`, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the delete fails.
    fn delete_one(&self, collection: &str, key: &str) -> Result<bool, StoreError>;

    /// Fetches every document of `collection` in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Number of documents in `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn count(&self, collection: &str) -> Result<u64, StoreError>;

    /// Removes every document of `collection`, returning how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the delete fails.
    fn drop_collection(&self, collection: &str) -> Result<u64, StoreError>;
}

/// Returns the document's id, generating a UUID v4 and placing it first
/// when the document has none.
pub fn assign_id(document: &mut Document) -> String {
    match document.get(ID_FIELD) {
        Some(Value::String(id)) => return id.clone(),
        Some(Value::Null) | None => {}
        Some(other) => return other.to_string(),
    }

    let id = uuid::Uuid::new_v4().to_string();
    let mut with_id = Document::new();
    with_id.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    document.remove(ID_FIELD);
    with_id.extend(std::mem::take(document));
    *document = with_id;
    id
}

/// Decides which documents of a batch may be written.
///
/// `rejection` returns a reason for documents that must be refused.
/// Returns the indices to write and the failures to report, applying
/// ordered-mode short-circuiting.
pub(crate) fn plan_batch(
    ids: &[String],
    mode: WriteMode,
    mut rejection: impl FnMut(usize, &str) -> Option<String>,
) -> (Vec<usize>, Vec<WriteFailure>) {
    let mut accepted = Vec::with_capacity(ids.len());
    let mut failures = Vec::new();

    for (index, id) in ids.iter().enumerate() {
        match rejection(index, id) {
            None => accepted.push(index),
            Some(reason) => {
                failures.push(WriteFailure {
                    index,
                    id: id.clone(),
                    reason,
                });
                if mode == WriteMode::Ordered {
                    break;
                }
            }
        }
    }

    (accepted, failures)
}
