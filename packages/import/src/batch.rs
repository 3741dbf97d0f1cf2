//! Batched document submission.
//!
//! Documents are buffered until `batch_size` is reached and then submitted
//! in one [`DocumentStore::insert_many`] call. Each buffered document keeps
//! the source position it came from so store refusals can be traced back
//! to lines.

use chrono::{DateTime, SecondsFormat, Utc};
use docimport_import_models::TimestampMode;
use docimport_store::{CommitResult, Document, DocumentStore, ID_FIELD, StoreError, WriteMode};
use serde_json::Value;

/// Field holding the import timestamp.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Where a buffered document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPosition {
    /// 1-based line in the source.
    pub line: u64,
    /// 1-based data row number, counting rows skipped on restart.
    pub ordinal: u64,
}

/// A submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub result: CommitResult,
    /// Position of each submitted document, in batch order.
    pub positions: Vec<RowPosition>,
}

impl Submitted {
    /// Line of the document at `index` in the batch.
    #[must_use]
    pub fn line(&self, index: usize) -> u64 {
        self.positions.get(index).map_or(0, |p| p.line)
    }
}

/// Formats an instant the way dates are stored in documents.
#[must_use]
pub fn date_value(instant: DateTime<Utc>) -> Value {
    serde_json::json!({ "$date": instant.to_rfc3339_opts(SecondsFormat::Millis, true) })
}

/// Buffers documents and submits them to a [`DocumentStore`] in batches.
pub struct BatchWriter<'a> {
    store: &'a dyn DocumentStore,
    collection: String,
    mode: WriteMode,
    batch_size: usize,
    buffer: Vec<Document>,
    positions: Vec<RowPosition>,
    timestamp: TimestampMode,
    run_started: DateTime<Utc>,
    id_prefix: Option<String>,
}

impl<'a> BatchWriter<'a> {
    /// Creates a writer. A `batch_size` of zero is treated as one.
    #[must_use]
    pub fn new(
        store: &'a dyn DocumentStore,
        collection: &str,
        mode: WriteMode,
        batch_size: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            collection: collection.to_string(),
            mode,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            positions: Vec::with_capacity(batch_size),
            timestamp: TimestampMode::None,
            run_started: Utc::now(),
            id_prefix: None,
        }
    }

    /// Stamps documents according to `mode`. [`TimestampMode::Now`] uses
    /// `run_started` for every document.
    #[must_use]
    pub fn with_timestamp(mut self, mode: TimestampMode, run_started: DateTime<Utc>) -> Self {
        self.timestamp = mode;
        self.run_started = run_started;
        self
    }

    /// Assigns `<source>:<line>` ids instead of leaving them to the store.
    /// `source` should identify the file uniquely, such as its canonical
    /// path.
    #[must_use]
    pub fn with_generated_ids(mut self, source: &str) -> Self {
        self.id_prefix = Some(source.to_string());
        self
    }

    /// Documents waiting to be submitted.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Buffers `document`, submitting the batch once it is full.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails; refused documents are
    /// reported in the returned [`Submitted`].
    pub fn write(
        &mut self,
        mut document: Document,
        position: RowPosition,
    ) -> Result<Option<Submitted>, StoreError> {
        if let Some(prefix) = &self.id_prefix {
            let id = format!("{prefix}:{}", position.line);
            let mut with_id = Document::new();
            with_id.insert(ID_FIELD.to_string(), Value::String(id));
            document.remove(ID_FIELD);
            with_id.extend(document);
            document = with_id;
        }

        if self.timestamp == TimestampMode::Now {
            document.insert(TIMESTAMP_FIELD.to_string(), date_value(self.run_started));
        }

        self.buffer.push(document);
        self.positions.push(position);

        if self.buffer.len() >= self.batch_size {
            return self.flush();
        }
        Ok(None)
    }

    /// Submits whatever is buffered. Returns `None` when the buffer is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails.
    pub fn flush(&mut self) -> Result<Option<Submitted>, StoreError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut documents = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let positions = std::mem::replace(&mut self.positions, Vec::with_capacity(self.batch_size));

        if self.timestamp == TimestampMode::Gen {
            let stamp = date_value(Utc::now());
            for document in &mut documents {
                document.insert(TIMESTAMP_FIELD.to_string(), stamp.clone());
            }
        }

        log::debug!(
            "Submitting {} documents to {} ({})",
            documents.len(),
            self.collection,
            self.mode
        );
        let result = self.store.insert_many(&self.collection, documents, self.mode)?;

        Ok(Some(Submitted { result, positions }))
    }
}
