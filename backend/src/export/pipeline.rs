//! Export run pipeline.
//!
//! Sequential per-identifier loop:
//!
//! ```text
//! identifier ──fetch──▶ RawApiRecord ──parse──▶ NormalizedRecord ──map──▶ OutputRow ──▶ CSV
//! ```
//!
//! Per-record faults (fetch failures, malformed XML) are logged and
//! collected; only an empty input, a run where every fetch failed, or a
//! write error ends the run with an error.
//!
//! # Example
//!
//! ```rust,ignore
//! use alma_export::{AlmaClient, ExportConfig, ExportOptions, OutputSchema, run_export};
//!
//! let config = ExportConfig::from_env()?;
//! let client = AlmaClient::from_config(&config)?;
//! let ids = vec!["991234567890104641".to_string()];
//! let schema = OutputSchema::alma_digital();
//! let report =
//!     run_export(&client, &ids, &config.catalog(), &schema, &ExportOptions::default()).await?;
//! println!("{} rows -> {}", report.records_written, report.output_path.display());
//! ```

use chrono::Local;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::resolve_output_path;
use super::writer::CsvExporter;
use crate::alma::RecordSource;
use crate::api::logs::{
    log_debug, log_debug_indent, log_error, log_info, log_info_indent, log_success, log_warning,
    log_warning_indent,
};
use crate::dublin_core::{parse, FieldCatalog};
use crate::error::{CsvWriteError, ExportError, ExportResult};
use crate::models::{FailedIdentifier, OutputRow, RowStatus};
use crate::schema::{OutputSchema, DEFAULT_JOIN_DELIMITER};
use crate::transform::map_row;

/// Progress is logged every this many identifiers.
const PROGRESS_EVERY: usize = 10;

/// Failed identifiers listed in the run summary.
const SUMMARY_FAILURES_SHOWN: usize = 10;

/// Options for one export run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportOptions {
    /// Keep only the first N identifiers; `None` or 0 keeps all
    pub limit: Option<usize>,

    /// Separator for multi-value columns
    pub join_delimiter: String,

    /// Write deleted-looking records as comment lines
    pub mark_deleted: bool,

    /// Stream rows to disk, flushing every N rows. `None` writes once at the end
    pub flush_every: Option<usize>,

    /// Directory for the timestamped output file
    pub output_dir: PathBuf,

    /// Explicit output file, overriding `output_dir`
    pub output_path: Option<PathBuf>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            limit: None,
            join_delimiter: DEFAULT_JOIN_DELIMITER.to_string(),
            mark_deleted: false,
            flush_every: None,
            output_dir: PathBuf::from("."),
            output_path: None,
        }
    }
}

impl ExportOptions {
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_mark_deleted(mut self, mark_deleted: bool) -> Self {
        self.mark_deleted = mark_deleted;
        self
    }

    pub fn with_flush_every(mut self, rows: Option<usize>) -> Self {
        self.flush_every = rows.filter(|n| *n > 0);
        self
    }

    pub fn with_join_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.join_delimiter = delimiter.into();
        self
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub output_path: PathBuf,

    /// Identifiers processed, after the limit
    pub requested: usize,

    /// Data rows in the file
    pub records_written: usize,

    /// Records written as `# DELETED RECORD` lines
    pub deleted_commented: usize,

    /// Records whose XML was missing or malformed
    pub parse_warnings: usize,

    /// Rows where a column policy dropped values
    pub lossy_rows: usize,

    /// Identifiers that could not be fetched, in input order
    #[serde(skip)]
    pub failed: Vec<FailedIdentifier>,

    #[serde(skip)]
    pub elapsed: Duration,
}

impl ExportReport {
    pub fn failed_identifiers(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.identifier.as_str()).collect()
    }
}

/// Run a complete export.
pub async fn run_export<S>(
    source: &S,
    identifiers: &[String],
    catalog: &FieldCatalog,
    schema: &OutputSchema,
    options: &ExportOptions,
) -> ExportResult<ExportReport>
where
    S: RecordSource + Sync,
{
    run_export_with_progress(source, identifiers, catalog, schema, options, |_, _| {}).await
}

/// Run a complete export, calling `progress(current, total)` after each identifier.
pub async fn run_export_with_progress<S, F>(
    source: &S,
    identifiers: &[String],
    catalog: &FieldCatalog,
    schema: &OutputSchema,
    options: &ExportOptions,
    progress: F,
) -> ExportResult<ExportReport>
where
    S: RecordSource + Sync,
    F: FnMut(usize, usize) + Send,
{
    let open = |schema: &OutputSchema| open_output(options, schema);
    run_into(source, identifiers, catalog, schema, options, open, progress).await
}

/// Explicit output paths are overwritten; timestamped names never are.
fn open_output(
    options: &ExportOptions,
    schema: &OutputSchema,
) -> Result<CsvExporter<File>, CsvWriteError> {
    match &options.output_path {
        Some(path) => CsvExporter::create(path, schema),
        None => {
            let path = resolve_output_path(&options.output_dir, Local::now());
            CsvExporter::create_new(&path, schema)
        }
    }
}

/// The run loop, writing through whatever `open` returns.
async fn run_into<S, F, W, O>(
    source: &S,
    identifiers: &[String],
    catalog: &FieldCatalog,
    schema: &OutputSchema,
    options: &ExportOptions,
    mut open: O,
    mut progress: F,
) -> ExportResult<ExportReport>
where
    S: RecordSource + Sync,
    F: FnMut(usize, usize) + Send,
    W: Write + Send,
    O: FnMut(&OutputSchema) -> Result<CsvExporter<W>, CsvWriteError> + Send,
{
    let started = Instant::now();

    if identifiers.is_empty() {
        log_error("No MMS IDs to export");
        return Err(ExportError::EmptyInput);
    }

    schema.validate(catalog)?;
    let schema = schema.clone().with_join_delimiter(options.join_delimiter.as_str());

    let identifiers = match options.limit {
        Some(n) if n > 0 && n < identifiers.len() => {
            log_info(format!(
                "Limiting export to first {} of {} MMS IDs",
                n,
                identifiers.len()
            ));
            &identifiers[..n]
        }
        _ => identifiers,
    };
    let total = identifiers.len();

    log_info(format!("Starting export of {} records", total));

    let mut rows: Vec<OutputRow> = Vec::new();
    let mut exporter: Option<CsvExporter<W>> = None;
    let mut failed = Vec::new();
    let mut succeeded = 0usize;
    let mut parse_warnings = 0usize;
    let mut lossy_rows = 0usize;

    for (index, identifier) in identifiers.iter().enumerate() {
        let current = index + 1;
        log_debug(format!("Fetching record {}/{}: MMS ID {}", current, total, identifier));

        match source.fetch_record(identifier).await {
            Ok(mut raw) => {
                if raw.mms_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                    raw.mms_id = Some(identifier.trim().to_string());
                }

                let record = parse(&raw, catalog);
                if let Some(warning) = record.warning() {
                    parse_warnings += 1;
                    log_warning_indent(format!("{}: {}", identifier, warning), 1);
                }

                let mut row = map_row(&record, &schema);
                if !row.lossy_columns.is_empty() {
                    lossy_rows += 1;
                    let columns: Vec<String> = row
                        .lossy_columns
                        .iter()
                        .filter_map(|i| schema.column_id(*i))
                        .collect();
                    log_debug_indent(
                        format!("{}: extra values dropped in {}", identifier, columns.join(", ")),
                        1,
                    );
                }
                if options.mark_deleted && raw.looks_deleted() {
                    log_debug_indent(format!("{}: marked as deleted", identifier), 1);
                    row.status = RowStatus::Deleted;
                }

                succeeded += 1;
                match options.flush_every {
                    Some(every) => {
                        // opened on the first success so an all-failed run leaves no file
                        if exporter.is_none() {
                            exporter = Some(open(&schema)?);
                        }
                        if let Some(writer) = exporter.as_mut() {
                            writer.write_row(&row)?;
                            if succeeded % every == 0 {
                                writer.flush()?;
                                log_debug(format!("Flushed {} rows", writer.rows_written()));
                            }
                        }
                    }
                    None => rows.push(row),
                }
            }
            Err(e) => {
                log_warning(format!("Failed to retrieve MMS ID {}: {}", identifier, e));
                failed.push(FailedIdentifier::new(identifier.as_str(), e));
            }
        }

        if current % PROGRESS_EVERY == 0 || current == total {
            log_info_indent(format!("Progress: {}/{}", current, total), 1);
        }
        progress(current, total);
    }

    if succeeded == 0 {
        log_error(format!("All {} MMS IDs failed to fetch; no CSV written", failed.len()));
        log_failures(&failed);
        return Err(ExportError::AllRecordsFailed { failed });
    }

    let writer = match exporter {
        Some(writer) => writer,
        None => {
            let mut writer = open(&schema)?;
            for row in &rows {
                writer.write_row(row)?;
            }
            writer
        }
    };
    let summary = writer.finish()?;

    let report = ExportReport {
        output_path: summary.path,
        requested: total,
        records_written: summary.rows_written,
        deleted_commented: summary.deleted_commented,
        parse_warnings,
        lossy_rows,
        failed,
        elapsed: started.elapsed(),
    };
    log_summary(&report);
    Ok(report)
}

fn log_failures(failed: &[FailedIdentifier]) {
    for f in failed.iter().take(SUMMARY_FAILURES_SHOWN) {
        log_info_indent(format!("{} ({})", f.identifier, f.error.kind()), 1);
    }
    if failed.len() > SUMMARY_FAILURES_SHOWN {
        log_info_indent(format!("... and {} more", failed.len() - SUMMARY_FAILURES_SHOWN), 1);
    }
}

fn log_summary(report: &ExportReport) {
    log_success(format!(
        "Exported {} records to {}",
        report.records_written,
        report.output_path.display()
    ));
    if report.deleted_commented > 0 {
        log_info_indent(format!("Deleted records commented: {}", report.deleted_commented), 1);
    }
    if report.parse_warnings > 0 {
        log_info_indent(format!("Records with XML warnings: {}", report.parse_warnings), 1);
    }
    if !report.failed.is_empty() {
        log_warning(format!("Failed to retrieve {} MMS IDs:", report.failed.len()));
        log_failures(&report.failed);
    }
    log_info_indent(format!("Elapsed: {:.1}s", report.elapsed.as_secs_f64()), 1);
}
