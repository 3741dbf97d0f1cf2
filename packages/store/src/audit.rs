//! Per-file progress records ("audit log").
//!
//! One record per source file, keyed by the canonical path the caller
//! supplies. `count` is the number of data rows durably written and is the
//! number of rows to skip when an import is restarted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Document, DocumentStore, StoreError};

/// Default collection holding progress records.
pub const DEFAULT_AUDIT_COLLECTION: &str = "audit";

/// Progress of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Canonical source path.
    pub name: String,
    /// When the record was last written.
    pub timestamp: DateTime<Utc>,
    /// Batch size in effect for the run that wrote it.
    pub batch_size: u64,
    /// Records durably written.
    pub count: u64,
    /// Id of the last committed record.
    pub doc_id: Option<String>,
}

impl ProgressRecord {
    fn to_document(&self) -> Result<Document, StoreError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(doc) => Ok(doc),
            other => Err(StoreError::Malformed {
                collection: DEFAULT_AUDIT_COLLECTION.to_string(),
                message: format!("progress record serialized as {other}"),
            }),
        }
    }
}

/// Reads and writes [`ProgressRecord`]s through a [`DocumentStore`].
pub struct ProgressTracker<'a> {
    store: &'a dyn DocumentStore,
    collection: String,
    batch_size: u64,
}

impl<'a> ProgressTracker<'a> {
    /// Tracks progress in `collection`, stamping records with `batch_size`.
    #[must_use]
    pub fn new(store: &'a dyn DocumentStore, collection: &str, batch_size: u64) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            batch_size,
        }
    }

    /// Collection the records live in.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the record for `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or the stored record is
    /// malformed.
    pub fn load(&self, name: &str) -> Result<Option<ProgressRecord>, StoreError> {
        self.store
            .find_one(&self.collection, name)?
            .map(|doc| self.decode(doc))
            .transpose()
    }

    /// Records that `records_written` rows of `name` are durable, the last
    /// of them having id `marker`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CheckpointRegressed`] if `records_written` is
    /// below the stored count, or [`StoreError`] if the write fails.
    pub fn checkpoint(
        &self,
        name: &str,
        records_written: u64,
        marker: Option<&str>,
    ) -> Result<(), StoreError> {
        let previous = self.load(name)?.map_or(0, |record| record.count);
        if records_written < previous {
            return Err(StoreError::CheckpointRegressed {
                name: name.to_string(),
                previous,
                attempted: records_written,
            });
        }

        let record = ProgressRecord {
            name: name.to_string(),
            timestamp: Utc::now(),
            batch_size: self.batch_size,
            count: records_written,
            doc_id: marker.map(ToString::to_string),
        };

        self.store
            .upsert(&self.collection, name, record.to_document()?)?;
        log::debug!("Checkpoint {name}: {records_written} records");
        Ok(())
    }

    /// Forgets the record for `name` so the next restart starts from the
    /// first row. Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the delete fails.
    pub fn reset(&self, name: &str) -> Result<bool, StoreError> {
        let removed = self.store.delete_one(&self.collection, name)?;
        if removed {
            log::debug!("Reset progress for {name}");
        }
        Ok(removed)
    }

    /// Every stored record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or a record is malformed.
    pub fn list(&self) -> Result<Vec<ProgressRecord>, StoreError> {
        self.store
            .find_all(&self.collection)?
            .into_iter()
            .map(|doc| self.decode(doc))
            .collect()
    }

    fn decode(&self, doc: Document) -> Result<ProgressRecord, StoreError> {
        serde_json::from_value(serde_json::Value::Object(doc)).map_err(|e| StoreError::Malformed {
            collection: self.collection.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duckdb_store::DuckDbStore;
    use crate::memory::MemoryStore;

    #[test]
    fn missing_record_loads_as_none() {
        let store = MemoryStore::new();
        let tracker = ProgressTracker::new(&store, DEFAULT_AUDIT_COLLECTION, 500);
        assert!(tracker.load("/data/a.csv").unwrap().is_none());
    }

    #[test]
    fn checkpoint_upserts_one_record_per_file() {
        let store = MemoryStore::new();
        let tracker = ProgressTracker::new(&store, DEFAULT_AUDIT_COLLECTION, 2);

        tracker.checkpoint("/data/a.csv", 2, Some("b")).unwrap();
        tracker.checkpoint("/data/a.csv", 4, Some("d")).unwrap();
        tracker.checkpoint("/data/b.csv", 1, None).unwrap();

        let a = tracker.load("/data/a.csv").unwrap().unwrap();
        assert_eq!(a.count, 4);
        assert_eq!(a.doc_id.as_deref(), Some("d"));
        assert_eq!(a.batch_size, 2);

        let names: Vec<String> = tracker.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["/data/a.csv", "/data/b.csv"]);
    }

    #[test]
    fn regressing_checkpoint_is_rejected() {
        let store = MemoryStore::new();
        let tracker = ProgressTracker::new(&store, DEFAULT_AUDIT_COLLECTION, 10);

        tracker.checkpoint("f", 10, Some("x")).unwrap();
        tracker.checkpoint("f", 10, Some("x")).unwrap();
        let err = tracker.checkpoint("f", 3, Some("y")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::CheckpointRegressed {
                previous: 10,
                attempted: 3,
                ..
            }
        ));
        assert_eq!(tracker.load("f").unwrap().unwrap().count, 10);
    }

    #[test]
    fn reset_allows_counting_from_zero() {
        let store = MemoryStore::new();
        let tracker = ProgressTracker::new(&store, DEFAULT_AUDIT_COLLECTION, 10);

        tracker.checkpoint("f", 10, Some("x")).unwrap();
        assert!(tracker.reset("f").unwrap());
        assert!(!tracker.reset("f").unwrap());
        assert!(tracker.load("f").unwrap().is_none());

        tracker.checkpoint("f", 2, Some("y")).unwrap();
        assert_eq!(tracker.load("f").unwrap().unwrap().count, 2);
    }

    #[test]
    fn records_round_trip_through_duckdb() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let tracker = ProgressTracker::new(&store, "progress", 500);

        tracker.checkpoint("/data/a.csv", 500, Some("id-500")).unwrap();
        let record = tracker.load("/data/a.csv").unwrap().unwrap();
        assert_eq!(record.count, 500);
        assert_eq!(record.doc_id.as_deref(), Some("id-500"));
        assert_eq!(tracker.collection(), "progress");
        assert_eq!(store.count("progress").unwrap(), 1);
    }

    #[test]
    fn malformed_record_is_reported() {
        let store = MemoryStore::new();
        let junk = serde_json::json!({"name": 5}).as_object().unwrap().clone();
        store.upsert(DEFAULT_AUDIT_COLLECTION, "f", junk).unwrap();

        let tracker = ProgressTracker::new(&store, DEFAULT_AUDIT_COLLECTION, 1);
        assert!(matches!(
            tracker.load("f").unwrap_err(),
            StoreError::Malformed { .. }
        ));
    }
}
