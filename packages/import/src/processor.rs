//! Multi-file orchestration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use docimport_field_models::ErrorPolicy;
use docimport_import_models::progress::{ProgressCallback, null_progress};
use docimport_store::DocumentStore;
use docimport_store::audit::ProgressTracker;

use crate::engine::ImportEngine;
use crate::{FileFailure, ImportError, ImportOptions, ImportOutcome, RunReport};

/// Imports a list of files one after another.
pub struct FileProcessor<'a> {
    store: &'a dyn DocumentStore,
    options: ImportOptions,
    files: Arc<dyn ProgressCallback>,
    rows: Arc<dyn ProgressCallback>,
}

impl<'a> FileProcessor<'a> {
    #[must_use]
    pub fn new(store: &'a dyn DocumentStore, options: ImportOptions) -> Self {
        Self {
            store,
            options,
            files: null_progress(),
            rows: null_progress(),
        }
    }

    /// Reports completed files to `files` and processed rows to `rows`.
    #[must_use]
    pub fn with_progress(
        mut self,
        files: Arc<dyn ProgressCallback>,
        rows: Arc<dyn ProgressCallback>,
    ) -> Self {
        self.files = files;
        self.rows = rows;
        self
    }

    /// Imports `paths` in order.
    ///
    /// A file that fails is recorded in the report and the run moves on,
    /// except under [`ErrorPolicy::Fail`] where the remaining files are
    /// not attempted.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Store`] if the destination collection cannot
    /// be dropped when `drop` is set. Per-file errors are reported in the
    /// [`RunReport`].
    pub fn process_files(&self, paths: &[PathBuf]) -> Result<RunReport, ImportError> {
        let start = Instant::now();
        let mut report = RunReport::default();

        if self.options.drop {
            let removed = self.store.drop_collection(&self.options.collection)?;
            log::info!(
                "Dropped collection {} ({removed} documents)",
                self.options.collection
            );
            self.reset_progress(paths)?;
        }

        let mut engine = ImportEngine::new(self.store, self.options.clone())
            .with_progress(Arc::clone(&self.rows));
        self.files.set_total(paths.len() as u64);

        for (i, path) in paths.iter().enumerate() {
            log::info!("Processing {} ({}/{})", path.display(), i + 1, paths.len());
            self.rows.set_message(path.display().to_string());

            let result = Self::process_one(&mut engine, path);
            self.files.inc(1);
            match result {
                Ok(outcome) => {
                    log::info!(
                        "{}: {} records in {:.1}s",
                        outcome.name,
                        outcome.records_written,
                        outcome.elapsed.as_secs_f64()
                    );
                    report.succeeded.push(outcome);
                }
                Err(e) => {
                    log::error!("Failed to import {}: {e}", path.display());
                    report.failed.push(FileFailure {
                        name: path.display().to_string(),
                        reason: e.to_string(),
                    });
                    if self.options.policy == ErrorPolicy::Fail {
                        report.aborted = paths.len() > i + 1;
                        if report.aborted {
                            log::error!(
                                "Stopping: {} file(s) not attempted",
                                paths.len() - i - 1
                            );
                        }
                        break;
                    }
                }
            }
        }

        let elapsed = start.elapsed();
        log::info!(
            "Processed {} file(s): {} succeeded ({} records), {} failed in {:.1}s",
            report.succeeded.len() + report.failed.len(),
            report.succeeded.len(),
            report.records_written(),
            report.failed.len(),
            elapsed.as_secs_f64()
        );
        if !report.failed.is_empty() {
            let names: Vec<&str> = report.failed.iter().map(|f| f.name.as_str()).collect();
            log::warn!("Failed to process: {}", names.join(", "));
        }
        self.rows.finish(format!("{} records", report.records_written()));
        self.files.finish(format!(
            "{} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        ));

        Ok(report)
    }

    /// Forgets the progress of every file in `paths`; the rows it covered
    /// were just dropped. Paths that cannot be resolved have no record.
    fn reset_progress(&self, paths: &[PathBuf]) -> Result<(), ImportError> {
        let tracker = ProgressTracker::new(
            self.store,
            &self.options.audit_collection,
            self.options.batch_size as u64,
        );
        for path in paths {
            let Ok(canonical) = std::fs::canonicalize(path) else {
                continue;
            };
            if tracker.reset(&canonical.display().to_string())? {
                log::info!("Cleared progress for {}", canonical.display());
            }
        }
        Ok(())
    }

    fn process_one(
        engine: &mut ImportEngine<'_>,
        path: &Path,
    ) -> Result<ImportOutcome, ImportError> {
        let canonical = std::fs::canonicalize(path)?;
        engine.run(&canonical)
    }
}
