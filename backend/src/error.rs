//! Error types for the Alma export pipeline.
//!
//! The hierarchy mirrors the pipeline stages:
//!
//! - [`MalformedXmlError`] - embedded Dublin Core fragment is not well-formed
//! - [`FetchError`] - one identifier could not be retrieved from Alma
//! - [`CsvWriteError`] - output serialization failed part-way
//! - [`InputError`] - the identifier source could not be read
//! - [`ConfigError`] - missing or invalid configuration
//! - [`SchemaError`] - a column table references unknown fields
//! - [`ExportError`] - top-level run errors
//!
//! Per-record errors ([`MalformedXmlError`], [`FetchError`]) are recovered
//! inside the run. Only [`ExportError`] reaches the caller.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::FailedIdentifier;

// =============================================================================
// XML Errors
// =============================================================================

/// The embedded XML fragment could not be parsed.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Malformed XML at byte {position}: {message}")]
pub struct MalformedXmlError {
    /// Byte offset in the fragment where parsing stopped.
    pub position: u64,
    /// Parser diagnostic.
    pub message: String,
}

impl MalformedXmlError {
    pub fn new(position: u64, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

// =============================================================================
// Fetch Errors
// =============================================================================

/// Errors from the catalog API for a single identifier.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// No record exists for the identifier.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The API rejected the request (malformed or unknown identifier).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Connection, DNS or timeout failure.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// API key rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body was not a bibliographic record.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Short classification label used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::NotFound(_) => "not-found",
            FetchError::BadRequest(_) => "bad-request",
            FetchError::NetworkFailure(_) => "network-failure",
            FetchError::Unauthorized(_) => "unauthorized",
            FetchError::Http { .. } => "http",
            FetchError::InvalidResponse(_) => "invalid-response",
        }
    }
}

// =============================================================================
// CSV Output Errors
// =============================================================================

/// I/O failure while writing the output CSV.
///
/// Carries the number of data rows already written so the caller can decide
/// whether to keep or remove the partial file.
#[derive(Debug, Error)]
#[error("Failed to write CSV '{}' after {rows_written} rows: {source}", .path.display())]
pub struct CsvWriteError {
    pub path: PathBuf,
    pub rows_written: usize,
    #[source]
    pub source: csv::Error,
}

// =============================================================================
// Identifier Source Errors
// =============================================================================

/// Errors reading the list of identifiers.
#[derive(Debug, Error)]
pub enum InputError {
    /// Failed to read file.
    #[error("Cannot read identifier file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid CSV content.
    #[error("Invalid identifier CSV: {0}")]
    Csv(String),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors building the run configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Missing API key.
    #[error("Missing Alma API key (set ALMA_API_KEY or pass --api-key)")]
    MissingApiKey,

    /// Unknown API region code.
    #[error("Unknown Alma region '{0}' (expected na, eu, ap, ca or cn)")]
    InvalidRegion(String),
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors in an output column table.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    /// A column pulls from a field the catalog does not define.
    #[error("Column {index} ('{header}') references unknown field '{field}'")]
    UnknownField {
        index: usize,
        header: String,
        field: String,
    },

    /// A column has an empty header.
    #[error("Column {0} has an empty header")]
    EmptyHeader(usize),
}

// =============================================================================
// Export Errors (top-level)
// =============================================================================

/// Top-level run errors.
///
/// This is the error type returned by [`crate::export::run_export`].
#[derive(Debug, Error)]
pub enum ExportError {
    /// No identifiers resolved from the input. No API call was attempted.
    #[error("No identifiers to export")]
    EmptyInput,

    /// Every identifier failed to fetch. No CSV was written.
    #[error("All {} identifiers failed to fetch", .failed.len())]
    AllRecordsFailed { failed: Vec<FailedIdentifier> },

    /// Output serialization failed.
    #[error("CSV write error: {0}")]
    CsvWrite(#[from] CsvWriteError),

    /// Identifier source error.
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Column table error.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for XML extraction.
pub type XmlResult<T> = Result<T, MalformedXmlError>;

/// Result type for API fetches.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for identifier reading.
pub type InputResult<T> = Result<T, InputError>;

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for whole export runs.
pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let config_err = ConfigError::MissingApiKey;
        let export_err: ExportError = config_err.into();
        assert!(export_err.to_string().contains("ALMA_API_KEY"));

        let schema_err = SchemaError::EmptyHeader(3);
        let export_err: ExportError = schema_err.into();
        assert!(export_err.to_string().contains("Column 3"));
    }

    #[test]
    fn test_all_failed_counts_identifiers() {
        let err = ExportError::AllRecordsFailed {
            failed: vec![
                FailedIdentifier::new("1", FetchError::NotFound("1".into())),
                FailedIdentifier::new("2", FetchError::NetworkFailure("timeout".into())),
            ],
        };
        assert_eq!(err.to_string(), "All 2 identifiers failed to fetch");
    }

    #[test]
    fn test_csv_write_error_reports_progress() {
        let err = CsvWriteError {
            path: PathBuf::from("out/alma_export.csv"),
            rows_written: 7,
            source: csv::Error::from(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )),
        };
        let msg = err.to_string();
        assert!(msg.contains("out/alma_export.csv"));
        assert!(msg.contains("after 7 rows"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_fetch_error_kind() {
        assert_eq!(FetchError::NotFound("x".into()).kind(), "not-found");
        assert_eq!(
            FetchError::Http { status: 503, message: "busy".into() }.to_string(),
            "HTTP 503: busy"
        );
    }
}
