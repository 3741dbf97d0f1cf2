#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the delimited-file importer.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use docimport_cli_utils::IndicatifProgress;
use docimport_field::{field_file, inference};
use docimport_field_models::ErrorPolicy;
use docimport_import::config::Config;
use docimport_import::processor::FileProcessor;
use docimport_import::reader::parse_delimiter;
use docimport_import::{IdMode, ImportError, ImportOptions, TimestampMode};
use docimport_store::audit::ProgressTracker;
use docimport_store::duckdb_store::DuckDbStore;

#[derive(Parser)]
#[command(name = "docimport", about = "Import delimited files into a document store")]
struct Cli {
    /// Store file (overrides `DOCIMPORT_DATABASE` and the config file).
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Configuration file (defaults to `DOCIMPORT_CONFIG`, then
    /// `./docimport.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one or more delimited files
    Import(ImportArgs),
    /// Infer a schema for each file and write it to `<stem>.ff`
    GenFieldFile {
        /// Files to sample (header line plus first data row).
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Field delimiter: a single character, or `\t` for tab.
        #[arg(long)]
        delimiter: Option<String>,
    },
    /// List progress records
    Audit {
        /// Collection holding progress records.
        #[arg(long)]
        audit_collection: Option<String>,
    },
}

#[derive(Args)]
struct ImportArgs {
    /// Files to import, in order.
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Destination collection.
    #[arg(long)]
    collection: Option<String>,
    /// Collection holding progress records.
    #[arg(long)]
    audit_collection: Option<String>,
    /// Documents per batch.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Field delimiter: a single character, or `\t` for tab.
    #[arg(long)]
    delimiter: Option<String>,
    /// Error policy: warn, ignore, or fail.
    #[arg(long)]
    onerror: Option<ErrorPolicy>,
    /// Stop each batch at the first refused document.
    #[arg(long)]
    ordered: bool,
    /// Skip rows already recorded in the audit log and checkpoint progress.
    #[arg(long)]
    restart: bool,
    /// The first line of each file is a header.
    #[arg(long)]
    has_header: bool,
    /// Field file to use for every input instead of `<stem>.ff`.
    #[arg(long)]
    fieldfile: Option<PathBuf>,
    /// Add a `filename` field to every document.
    #[arg(long)]
    add_filename: bool,
    /// Timestamp documents: none, now (once per run), or gen (once per batch).
    #[arg(long, default_value = "none")]
    add_timestamp: TimestampMode,
    /// Add a `locator` field with file name and line number.
    #[arg(long)]
    locator: bool,
    /// Who assigns `_id`: store (random) or gen (`<file>:<line>`).
    #[arg(long, default_value = "store")]
    id: IdMode,
    /// Empty the destination collection before importing.
    #[arg(long)]
    drop: bool,
}

impl ImportArgs {
    fn apply(&self, options: &mut ImportOptions) -> Result<(), ImportError> {
        if let Some(collection) = &self.collection {
            options.collection.clone_from(collection);
        }
        if let Some(audit) = &self.audit_collection {
            options.audit_collection.clone_from(audit);
        }
        if let Some(batch_size) = self.batch_size {
            options.batch_size = batch_size.max(1);
        }
        if let Some(delimiter) = &self.delimiter {
            options.delimiter = parse_delimiter(delimiter)?;
        }
        if let Some(policy) = self.onerror {
            options.policy = policy;
        }
        options.ordered |= self.ordered;
        options.restart |= self.restart;
        options.has_header |= self.has_header;
        if self.fieldfile.is_some() {
            options.field_file.clone_from(&self.fieldfile);
        }
        options.add_filename |= self.add_filename;
        options.timestamp = self.add_timestamp;
        options.locator |= self.locator;
        options.id_mode = self.id;
        options.drop |= self.drop;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = docimport_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Import(args) => {
            let mut options = ImportOptions::default();
            config.apply(&mut options)?;
            args.apply(&mut options)?;

            let database = config.database_path(cli.database.as_deref());
            log::info!(
                "Importing {} file(s) into {} ({})",
                args.files.len(),
                options.collection,
                database.display()
            );
            let store = DuckDbStore::open(&database)?;

            let files = IndicatifProgress::files_bar(&multi, "Files", args.files.len() as u64);
            let rows = IndicatifProgress::rows_bar(&multi, "Rows");
            let report = FileProcessor::new(&store, options)
                .with_progress(files, rows)
                .process_files(&args.files)?;

            for outcome in &report.succeeded {
                println!(
                    "{:<40} {:>10} written {:>8} skipped {:>6} warnings {:>6} failed",
                    outcome.name,
                    outcome.records_written,
                    outcome.rows_skipped,
                    outcome.warnings,
                    outcome.failures.len()
                );
            }
            for failure in &report.failed {
                println!("{:<40} FAILED: {}", failure.name, failure.reason);
            }

            if !report.is_success() {
                return Err(format!("{} file(s) failed", report.failed.len()).into());
            }
        }
        Commands::GenFieldFile { files, delimiter } => {
            let mut options = ImportOptions::default();
            config.apply(&mut options)?;
            if let Some(delimiter) = &delimiter {
                options.delimiter = parse_delimiter(delimiter)?;
            }

            for file in &files {
                let schema = inference::infer_file(file, options.delimiter)?;
                let out = field_file::default_path(file);
                field_file::save(&schema, &out)?;
                log::info!("Wrote {} ({} fields)", out.display(), schema.len());
                println!("{}", out.display());
            }
        }
        Commands::Audit { audit_collection } => {
            let mut options = ImportOptions::default();
            config.apply(&mut options)?;
            let collection = audit_collection.unwrap_or(options.audit_collection);

            let store = DuckDbStore::open(&config.database_path(cli.database.as_deref()))?;
            let tracker = ProgressTracker::new(&store, &collection, options.batch_size as u64);
            let records = tracker.list()?;

            println!("{:<50} {:>10} {:>8}  {:<25} DOC_ID", "NAME", "COUNT", "BATCH", "TIMESTAMP");
            println!("{}", "-".repeat(110));
            for record in &records {
                println!(
                    "{:<50} {:>10} {:>8}  {:<25} {}",
                    record.name,
                    record.count,
                    record.batch_size,
                    record.timestamp.to_rfc3339(),
                    record.doc_id.as_deref().unwrap_or("-")
                );
            }
            log::info!("{} progress record(s) in {collection}", records.len());
        }
    }

    Ok(())
}
