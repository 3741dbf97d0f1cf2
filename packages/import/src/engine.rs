//! Single-file import engine.
//!
//! A file moves through `Init -> SchemaResolved -> (Skipping ->) Streaming
//! -> Draining -> Done`, or ends in `Failed`. When restart is enabled a
//! checkpoint is written after every batch that committed cleanly, so a
//! later run can skip the rows already settled.
//!
//! The checkpoint `count` is the number of data rows (after the header)
//! that are settled: written, or rejected and reported. Without rejected
//! rows it equals the number of records written.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use docimport_field::record::{RowError, to_record};
use docimport_field::{SchemaError, field_file, inference};
use docimport_field_models::{ErrorPolicy, FieldSchema, TypedRecord};
use docimport_import_models::progress::{ProgressCallback, null_progress};
use docimport_store::audit::ProgressTracker;
use docimport_store::{Document, DocumentStore, WriteMode};
use serde_json::{Value, json};

use crate::batch::{BatchWriter, RowPosition, Submitted};
use crate::reader::{Row, RowReader};
use crate::{
    EngineState, FailureKind, IdMode, ImportError, ImportOptions, ImportOutcome, RowFailure,
};

/// Field holding the source file name when `add_filename` is set.
pub const FILENAME_FIELD: &str = "filename";

/// Field holding `{f, n}` (file name, line) when `locator` is set.
pub const LOCATOR_FIELD: &str = "locator";

struct Source<'s> {
    /// Progress key, log label and generated id prefix.
    name: &'s str,
    /// Bare file name used for enrichment.
    file_name: &'s str,
    /// `<stem>.ff` next to the input, if one exists.
    paired_field_file: Option<PathBuf>,
}

/// A row read ahead of the main loop, or the line and error of one that
/// could not be decoded.
type Pending = Result<Row, (u64, RowError)>;

#[derive(Default)]
struct Tally {
    rows_read: u64,
    written: u64,
    warnings: u64,
    failures: Vec<RowFailure>,
    marker: Option<String>,
}

/// Imports files into one collection with fixed options.
pub struct ImportEngine<'a> {
    store: &'a dyn DocumentStore,
    options: ImportOptions,
    progress: Arc<dyn ProgressCallback>,
    run_started: DateTime<Utc>,
    state: EngineState,
}

impl<'a> ImportEngine<'a> {
    /// Creates an engine writing through `store` with `options`.
    #[must_use]
    pub fn new(store: &'a dyn DocumentStore, options: ImportOptions) -> Self {
        Self {
            store,
            options,
            progress: null_progress(),
            run_started: Utc::now(),
            state: EngineState::Init,
        }
    }

    /// Reports each processed row to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// State reached by the most recent import.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Imports the file at `path`. The path's display form is the progress
    /// key, so callers should canonicalize it first.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] if the file cannot be read, no schema can be
    /// resolved, the store fails, or a row or write error is fatal under
    /// the configured policy.
    pub fn run(&mut self, path: &Path) -> Result<ImportOutcome, ImportError> {
        let name = path.display().to_string();
        let file_name = path
            .file_name()
            .map_or_else(|| name.clone(), |n| n.to_string_lossy().into_owned());
        let paired = field_file::default_path(path);

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                self.state = EngineState::Failed;
                return Err(e.into());
            }
        };

        let source = Source {
            name: &name,
            file_name: &file_name,
            paired_field_file: paired.is_file().then_some(paired),
        };
        self.import(&source, BufReader::new(file))
    }

    /// Imports from any reader. `name` is the progress key; no paired field
    /// file is looked up.
    ///
    /// # Errors
    ///
    /// See [`ImportEngine::run`].
    pub fn run_reader<R: Read>(&mut self, name: &str, reader: R) -> Result<ImportOutcome, ImportError> {
        let file_name = Path::new(name)
            .file_name()
            .map_or_else(|| name.to_string(), |n| n.to_string_lossy().into_owned());

        let source = Source {
            name,
            file_name: &file_name,
            paired_field_file: None,
        };
        self.import(&source, reader)
    }

    fn import<R: Read>(&mut self, source: &Source<'_>, reader: R) -> Result<ImportOutcome, ImportError> {
        self.state = EngineState::Init;

        let result = self.stream(source, reader);
        if let Err(e) = &result {
            self.transition(source.name, EngineState::Failed);
            log::error!("{}: import failed: {e}", source.name);
        }
        result
    }

    fn transition(&mut self, name: &str, next: EngineState) {
        log::debug!("{name}: {} -> {next}", self.state);
        self.state = next;
    }

    #[allow(clippy::too_many_lines)]
    fn stream<R: Read>(&mut self, source: &Source<'_>, reader: R) -> Result<ImportOutcome, ImportError> {
        let start = Instant::now();
        let options = self.options.clone();
        let store = self.store;
        let name = source.name;

        let mut rows = RowReader::new(reader, options.delimiter);
        let header = if options.has_header {
            rows.next_row()?
        } else {
            None
        };

        let (schema, mut pending) = self.resolve_schema(source, header.as_ref(), &mut rows)?;
        if let Some(header) = &header {
            if header.fields.len() != schema.len() {
                return Err(SchemaError::ColumnCountMismatch {
                    expected: schema.len(),
                    found: header.fields.len(),
                }
                .into());
            }
        }
        self.transition(name, EngineState::SchemaResolved);

        let batch_size = options.batch_size.max(1);
        let tracker = ProgressTracker::new(store, &options.audit_collection, batch_size as u64);
        let mut tally = Tally::default();
        let mut rows_skipped = 0u64;

        if options.restart {
            if let Some(record) = tracker.load(name)? {
                self.transition(name, EngineState::Skipping);
                tally.marker = record.doc_id;

                let mut remaining = record.count;
                while remaining > 0 && pending.pop_front().is_some() {
                    rows_skipped += 1;
                    remaining -= 1;
                }
                rows_skipped += rows.skip(remaining)?;

                if rows_skipped < record.count {
                    log::warn!(
                        "{name}: checkpoint covers {} rows but the file has only {rows_skipped}",
                        record.count
                    );
                }
                log::info!("{name}: resuming after {rows_skipped} rows");
            }
        }

        self.transition(name, EngineState::Streaming);

        let mode = if options.ordered {
            WriteMode::Ordered
        } else {
            WriteMode::Unordered
        };
        let mut writer = BatchWriter::new(store, &options.collection, mode, batch_size)
            .with_timestamp(options.timestamp, self.run_started);
        if options.id_mode == IdMode::Gen {
            writer = writer.with_generated_ids(source.name);
        }

        let mut ordinal = rows_skipped;

        loop {
            let next = match pending.pop_front() {
                Some(next) => next,
                None => match rows.next_row() {
                    Ok(Some(row)) => Ok(row),
                    Ok(None) => break,
                    Err(ImportError::Row { line, source }) => Err((line, source)),
                    Err(e) => return Err(e),
                },
            };
            ordinal += 1;
            tally.rows_read += 1;
            self.progress.inc(1);

            let (line, result) = match next {
                Ok(row) => (row.line, to_record(&schema, &row.fields, options.policy)),
                Err((line, error)) => (line, Err(error)),
            };
            let converted = match result {
                Ok(converted) => converted,
                Err(error @ (RowError::Arity { .. } | RowError::Encoding { .. }))
                    if options.policy != ErrorPolicy::Fail =>
                {
                    if options.policy == ErrorPolicy::Warn {
                        log::warn!("{name}:{line}: skipping row: {error}");
                    }
                    let kind = if matches!(error, RowError::Encoding { .. }) {
                        FailureKind::Encoding
                    } else {
                        FailureKind::Arity
                    };
                    tally.failures.push(RowFailure {
                        line,
                        kind,
                        reason: error.to_string(),
                    });
                    continue;
                }
                Err(error) => {
                    return Err(ImportError::Row {
                        line,
                        source: error,
                    });
                }
            };

            if options.policy == ErrorPolicy::Warn {
                for warning in &converted.warnings {
                    log::warn!(
                        "{name}:{line}: {} kept as text: {}",
                        warning.field,
                        warning.error
                    );
                }
            }
            tally.warnings += converted.warnings.len() as u64;

            let document = self.build_document(converted.record, source.file_name, line);
            let position = RowPosition { line, ordinal };
            if let Some(submitted) = writer.write(document, position)? {
                self.settle(&tracker, name, mode, submitted, ordinal, &mut tally)?;
            }
        }

        self.transition(name, EngineState::Draining);
        if let Some(submitted) = writer.flush()? {
            self.settle(&tracker, name, mode, submitted, ordinal, &mut tally)?;
        }
        self.transition(name, EngineState::Done);

        let elapsed = start.elapsed();
        log::info!(
            "{name}: {} written, {rows_skipped} skipped, {} warnings, {} failed rows in {:.1}s",
            tally.written,
            tally.warnings,
            tally.failures.len(),
            elapsed.as_secs_f64()
        );

        Ok(ImportOutcome {
            name: name.to_string(),
            state: EngineState::Done,
            rows_read: tally.rows_read,
            rows_skipped,
            records_written: tally.written,
            warnings: tally.warnings,
            failures: tally.failures,
            elapsed,
        })
    }

    /// Picks the schema: explicit field file, then the paired `<stem>.ff`,
    /// then inference from the header and the first decodable data row.
    /// Rows read for inference are handed back so they are still imported
    /// or reported.
    fn resolve_schema<R: Read>(
        &self,
        source: &Source<'_>,
        header: Option<&Row>,
        rows: &mut RowReader<R>,
    ) -> Result<(FieldSchema, VecDeque<Pending>), ImportError> {
        let field_file = self
            .options
            .field_file
            .as_deref()
            .or(source.paired_field_file.as_deref());

        if let Some(path) = field_file {
            log::info!("{}: using field file {}", source.name, path.display());
            return Ok((field_file::load(path)?, VecDeque::new()));
        }

        let path = PathBuf::from(source.name);
        let Some(header) = header else {
            return Err(if self.options.has_header {
                SchemaError::EmptyFile { path }
            } else {
                SchemaError::NoHeader { path }
            }
            .into());
        };

        let mut read_ahead = VecDeque::new();
        let schema = loop {
            match rows.next_row() {
                Ok(Some(row)) => {
                    let schema = inference::infer(&header.fields, &row.fields)?;
                    read_ahead.push_back(Ok(row));
                    break schema;
                }
                Ok(None) => {
                    break inference::infer(&header.fields, &vec![""; header.fields.len()])?;
                }
                Err(ImportError::Row { line, source }) => {
                    read_ahead.push_back(Err((line, source)));
                }
                Err(e) => return Err(e),
            }
        };
        log::info!(
            "{}: inferred {} fields ({})",
            source.name,
            schema.len(),
            schema
                .fields()
                .iter()
                .map(|f| format!("{}:{}", f.output_name(), f.field_type))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok((schema, read_ahead))
    }

    fn build_document(&self, record: TypedRecord, file_name: &str, line: u64) -> Document {
        let mut document = record.into_json();

        if self.options.add_filename {
            document.insert(FILENAME_FIELD.to_string(), Value::from(file_name));
        }
        if self.options.locator {
            document.insert(LOCATOR_FIELD.to_string(), json!({ "f": file_name, "n": line }));
        }

        document
    }

    /// Accounts for a submitted batch and checkpoints it if eligible.
    fn settle(
        &self,
        tracker: &ProgressTracker<'_>,
        name: &str,
        mode: WriteMode,
        submitted: Submitted,
        consumed: u64,
        tally: &mut Tally,
    ) -> Result<(), ImportError> {
        let Submitted { result, positions } = submitted;

        tally.written += result.committed as u64;
        if let Some(id) = &result.last_id {
            tally.marker = Some(id.clone());
        }

        for failure in &result.failures {
            let line = positions.get(failure.index).map_or(0, |p| p.line);
            log::warn!("{name}:{line}: write refused: {}", failure.reason);
            tally.failures.push(RowFailure {
                line,
                kind: FailureKind::Write,
                reason: failure.reason.clone(),
            });
        }

        if result.is_clean() {
            return self.checkpoint(tracker, name, consumed, tally);
        }

        let first = result.failures.first();
        let line = first
            .and_then(|f| positions.get(f.index))
            .map_or(0, |p| p.line);
        let reason = first.map_or_else(
            || format!("{} documents not written", result.unattempted()),
            |f| f.reason.clone(),
        );

        if mode == WriteMode::Ordered {
            let settled = first
                .and_then(|f| positions.get(f.index))
                .map_or(consumed, |p| p.ordinal.saturating_sub(1));
            self.checkpoint(tracker, name, settled, tally)?;
            return Err(ImportError::Write { line, reason });
        }

        if self.options.policy == ErrorPolicy::Fail {
            return Err(ImportError::Write { line, reason });
        }

        Ok(())
    }

    fn checkpoint(
        &self,
        tracker: &ProgressTracker<'_>,
        name: &str,
        count: u64,
        tally: &Tally,
    ) -> Result<(), ImportError> {
        if self.options.restart {
            tracker.checkpoint(name, count, tally.marker.as_deref())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use docimport_store::StoreError;
    use docimport_store::audit::DEFAULT_AUDIT_COLLECTION;
    use docimport_store::memory::MemoryStore;

    use super::*;
    use crate::TimestampMode;

    fn options() -> ImportOptions {
        ImportOptions {
            has_header: true,
            ..ImportOptions::default()
        }
    }

    fn numbered_csv(rows: u64) -> String {
        let mut text = String::from("n,label\n");
        for n in 1..=rows {
            text.push_str(&format!("{n},row {n}\n"));
        }
        text
    }

    fn audit_count(store: &MemoryStore, name: &str) -> Option<u64> {
        ProgressTracker::new(store, DEFAULT_AUDIT_COLLECTION, 1)
            .load(name)
            .unwrap()
            .map(|r| r.count)
    }

    #[test]
    fn infers_schema_and_writes_typed_documents() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(&store, options());

        let outcome = engine
            .run_reader("inv.csv", Cursor::new("id,qty,d\n7,3,2016-01-01\n8,4,2017-02-03\n"))
            .unwrap();

        assert_eq!(outcome.state, EngineState::Done);
        assert_eq!(engine.state(), EngineState::Done);
        assert_eq!(outcome.rows_read, 2);
        assert_eq!(outcome.records_written, 2);

        let docs = store.find_all("test").unwrap();
        assert_eq!(docs[0]["id"], 7);
        assert_eq!(docs[0]["qty"], 3);
        assert!(
            docs[0]["d"]["$date"]
                .as_str()
                .unwrap()
                .starts_with("2016-01-01T00:00:00")
        );
        assert!(docs[0]["_id"].is_string());
    }

    #[test]
    fn blank_header_columns_are_left_out() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(&store, options());

        engine
            .run_reader("p.csv", Cursor::new("id,,price\n1,junk,9.99\n"))
            .unwrap();

        let doc = &store.find_all("test").unwrap()[0];
        assert_eq!(doc["price"], 9.99);
        assert!(doc.get("blank-1").is_none());
        assert!(doc.get("").is_none());
    }

    #[test]
    fn bad_fields_fall_back_to_text_with_warnings() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(&store, options());

        let outcome = engine
            .run_reader("w.csv", Cursor::new("qty\n3\nlots\n"))
            .unwrap();

        assert_eq!(outcome.records_written, 2);
        assert_eq!(outcome.warnings, 1);
        assert_eq!(store.find_all("test").unwrap()[1]["qty"], "lots");
    }

    #[test]
    fn short_rows_are_reported_and_skipped() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(&store, options());

        let outcome = engine
            .run_reader("a.csv", Cursor::new("a,b\n1,2\n3\n4,5\n"))
            .unwrap();

        assert_eq!(outcome.records_written, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].line, 3);
        assert_eq!(outcome.failures[0].kind, FailureKind::Arity);
    }

    #[test]
    fn fail_policy_stops_at_first_bad_row() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(
            &store,
            ImportOptions {
                policy: ErrorPolicy::Fail,
                ..options()
            },
        );

        let err = engine
            .run_reader("f.csv", Cursor::new("qty\n1\nmany\n3\n"))
            .unwrap_err();

        assert!(matches!(err, ImportError::Row { line: 3, .. }));
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[test]
    fn missing_header_without_field_file_is_fatal() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(&store, ImportOptions::default());

        let err = engine.run_reader("x.csv", Cursor::new("1,2\n")).unwrap_err();
        assert!(matches!(
            err,
            ImportError::Schema(SchemaError::NoHeader { .. })
        ));
    }

    #[test]
    fn ordered_failure_checkpoints_committed_prefix() {
        let store = MemoryStore::new();
        let seeded = json!({"_id": "t.csv:6"}).as_object().unwrap().clone();
        store
            .insert_many("test", vec![seeded], WriteMode::Ordered)
            .unwrap();

        let mut engine = ImportEngine::new(
            &store,
            ImportOptions {
                ordered: true,
                restart: true,
                batch_size: 10,
                id_mode: IdMode::Gen,
                ..options()
            },
        );

        let err = engine
            .run_reader("t.csv", Cursor::new(numbered_csv(10)))
            .unwrap_err();

        assert!(matches!(err, ImportError::Write { line: 6, .. }));
        assert_eq!(store.count("test").unwrap(), 5);

        let record = ProgressTracker::new(&store, DEFAULT_AUDIT_COLLECTION, 1)
            .load("t.csv")
            .unwrap()
            .unwrap();
        assert_eq!(record.count, 4);
        assert_eq!(record.doc_id.as_deref(), Some("t.csv:5"));
    }

    #[test]
    fn unordered_failures_are_reported_without_checkpoint() {
        let store = MemoryStore::new();
        let seeded = json!({"_id": "u.csv:3"}).as_object().unwrap().clone();
        store
            .insert_many("test", vec![seeded], WriteMode::Ordered)
            .unwrap();

        let mut engine = ImportEngine::new(
            &store,
            ImportOptions {
                restart: true,
                batch_size: 4,
                id_mode: IdMode::Gen,
                ..options()
            },
        );

        let outcome = engine
            .run_reader("u.csv", Cursor::new(numbered_csv(4)))
            .unwrap();

        assert_eq!(outcome.records_written, 3);
        assert_eq!(outcome.failures[0].kind, FailureKind::Write);
        assert_eq!(outcome.failures[0].line, 3);
        assert_eq!(audit_count(&store, "u.csv"), None);
    }

    #[test]
    fn unordered_refusal_under_fail_policy_fails_without_checkpoint() {
        let store = MemoryStore::new();
        let seeded = json!({"_id": "v.csv:3"}).as_object().unwrap().clone();
        store
            .insert_many("test", vec![seeded], WriteMode::Ordered)
            .unwrap();

        let mut engine = ImportEngine::new(
            &store,
            ImportOptions {
                restart: true,
                batch_size: 4,
                id_mode: IdMode::Gen,
                policy: ErrorPolicy::Fail,
                ..options()
            },
        );

        let err = engine
            .run_reader("v.csv", Cursor::new(numbered_csv(4)))
            .unwrap_err();

        assert!(matches!(err, ImportError::Write { line: 3, .. }));
        assert_eq!(engine.state(), EngineState::Failed);
        assert_eq!(store.count("test").unwrap(), 4);
        assert_eq!(audit_count(&store, "v.csv"), None);
    }

    #[test]
    fn undecodable_rows_are_reported_and_skipped() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(
            &store,
            ImportOptions {
                restart: true,
                ..options()
            },
        );

        let input: &[u8] = b"a\n1\n\xff\xfe\n3\n";
        let outcome = engine.run_reader("b.csv", Cursor::new(input)).unwrap();

        assert_eq!(outcome.rows_read, 3);
        assert_eq!(outcome.records_written, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].line, 3);
        assert_eq!(outcome.failures[0].kind, FailureKind::Encoding);

        let values: Vec<Value> = store
            .find_all("test")
            .unwrap()
            .into_iter()
            .map(|d| d["a"].clone())
            .collect();
        assert_eq!(values, vec![json!(1), json!(3)]);
        assert_eq!(audit_count(&store, "b.csv"), Some(3));
    }

    #[test]
    fn undecodable_first_row_does_not_block_inference() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(&store, options());

        let input: &[u8] = b"a\n\xff\n7\n";
        let outcome = engine.run_reader("h.csv", Cursor::new(input)).unwrap();

        assert_eq!(outcome.records_written, 1);
        assert_eq!(outcome.failures[0].line, 2);
        assert_eq!(outcome.failures[0].kind, FailureKind::Encoding);
        assert_eq!(store.find_all("test").unwrap()[0]["a"], 7);
    }

    #[test]
    fn undecodable_row_is_fatal_under_fail_policy() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(
            &store,
            ImportOptions {
                policy: ErrorPolicy::Fail,
                ..options()
            },
        );

        let input: &[u8] = b"a\n1\n\xff\n3\n";
        let err = engine.run_reader("z.csv", Cursor::new(input)).unwrap_err();

        assert!(matches!(
            err,
            ImportError::Row {
                line: 3,
                source: RowError::Encoding { .. },
            }
        ));
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[test]
    fn generated_ids_are_prefixed_by_source_name() {
        let store = MemoryStore::new();
        let opts = ImportOptions {
            id_mode: IdMode::Gen,
            add_filename: true,
            ..options()
        };

        ImportEngine::new(&store, opts.clone())
            .run_reader("/x/data.csv", Cursor::new("a\n1\n"))
            .unwrap();
        let second = ImportEngine::new(&store, opts)
            .run_reader("/y/data.csv", Cursor::new("a\n2\n"))
            .unwrap();

        assert!(second.failures.is_empty());
        let docs = store.find_all("test").unwrap();
        assert_eq!(docs[0]["_id"], "/x/data.csv:2");
        assert_eq!(docs[1]["_id"], "/y/data.csv:2");
        assert_eq!(docs[1][FILENAME_FIELD], "data.csv");
    }

    #[test]
    fn checkpoints_track_every_committed_batch() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(
            &store,
            ImportOptions {
                restart: true,
                batch_size: 2,
                ..options()
            },
        );

        let outcome = engine
            .run_reader("c.csv", Cursor::new(numbered_csv(5)))
            .unwrap();

        assert_eq!(outcome.records_written, 5);
        assert_eq!(audit_count(&store, "c.csv"), Some(5));
    }

    #[test]
    fn completed_run_resumes_to_nothing() {
        let store = MemoryStore::new();
        let opts = ImportOptions {
            restart: true,
            batch_size: 2,
            ..options()
        };

        ImportEngine::new(&store, opts.clone())
            .run_reader("r.csv", Cursor::new(numbered_csv(5)))
            .unwrap();
        let again = ImportEngine::new(&store, opts)
            .run_reader("r.csv", Cursor::new(numbered_csv(5)))
            .unwrap();

        assert_eq!(again.records_written, 0);
        assert_eq!(again.rows_skipped, 5);
        assert_eq!(store.count("test").unwrap(), 5);
        assert_eq!(audit_count(&store, "r.csv"), Some(5));
    }

    #[test]
    fn interrupted_run_resumes_after_checkpoint() {
        let store = MemoryStore::new();
        ProgressTracker::new(&store, DEFAULT_AUDIT_COLLECTION, 2)
            .checkpoint("i.csv", 3, Some("prev"))
            .unwrap();

        let outcome = ImportEngine::new(
            &store,
            ImportOptions {
                restart: true,
                batch_size: 2,
                ..options()
            },
        )
        .run_reader("i.csv", Cursor::new(numbered_csv(5)))
        .unwrap();

        assert_eq!(outcome.rows_skipped, 3);
        assert_eq!(outcome.records_written, 2);
        assert_eq!(outcome.total_written(), 5);
        let labels: Vec<Value> = store
            .find_all("test")
            .unwrap()
            .into_iter()
            .map(|d| d["n"].clone())
            .collect();
        assert_eq!(labels, vec![json!(4), json!(5)]);
        assert_eq!(audit_count(&store, "i.csv"), Some(5));
    }

    #[test]
    fn unreachable_store_fails_the_file() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let mut engine = ImportEngine::new(
            &store,
            ImportOptions {
                policy: ErrorPolicy::Ignore,
                ..options()
            },
        );
        let err = engine
            .run_reader("s.csv", Cursor::new(numbered_csv(1)))
            .unwrap_err();

        assert!(err.is_store_unavailable());
        assert!(matches!(
            err,
            ImportError::Store(StoreError::Unavailable { .. })
        ));
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[test]
    fn enrichment_fields_are_added() {
        let store = MemoryStore::new();
        let mut engine = ImportEngine::new(
            &store,
            ImportOptions {
                add_filename: true,
                locator: true,
                timestamp: TimestampMode::Gen,
                ..options()
            },
        );

        engine
            .run_reader("/data/e.csv", Cursor::new("a\nx\n"))
            .unwrap();

        let doc = &store.find_all("test").unwrap()[0];
        assert_eq!(doc[FILENAME_FIELD], "e.csv");
        assert_eq!(doc[LOCATOR_FIELD], json!({"f": "e.csv", "n": 2}));
        assert!(doc["timestamp"]["$date"].is_string());
    }

    #[test]
    fn paired_field_file_is_used_and_header_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("items.csv");
        std::fs::write(&input, "code|when\n0042|01/02/2016\n").unwrap();
        std::fs::write(
            dir.path().join("items.ff"),
            "[code]\ntype=str\n[when]\ntype=date\nformat=%d/%m/%Y\nname=ordered_on\n",
        )
        .unwrap();

        let store = MemoryStore::new();
        let opts = ImportOptions {
            delimiter: b'|',
            ..options()
        };
        ImportEngine::new(&store, opts.clone()).run(&input).unwrap();

        let doc = &store.find_all("test").unwrap()[0];
        assert_eq!(doc["code"], "0042");
        assert!(
            doc["ordered_on"]["$date"]
                .as_str()
                .unwrap()
                .starts_with("2016-02-01")
        );

        let wide = dir.path().join("wide.csv");
        std::fs::write(&wide, "a|b|c\n1|2|3\n").unwrap();
        let err = ImportEngine::new(
            &store,
            ImportOptions {
                field_file: Some(dir.path().join("items.ff")),
                ..opts
            },
        )
        .run(&wide)
        .unwrap_err();
        assert!(matches!(
            err,
            ImportError::Schema(SchemaError::ColumnCountMismatch {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn header_only_file_imports_nothing() {
        let store = MemoryStore::new();
        let outcome = ImportEngine::new(&store, options())
            .run_reader("h.csv", Cursor::new("a,b\n"))
            .unwrap();
        assert_eq!(outcome.rows_read, 0);
        assert_eq!(store.count("test").unwrap(), 0);
    }
}
