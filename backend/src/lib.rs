//! # Alma export - Dublin Core records to Alma Digital CSV
//!
//! Fetches bibliographic records from the Alma Bibs API by MMS ID, extracts
//! the Dublin Core, DCTERMS and institution-specific elements embedded in
//! each record, and writes them to a fixed-layout CSV file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MMS IDs    │────▶│  Alma API   │────▶│   Parser    │────▶│   Mapper    │────▶│  CSV file   │
//! │  (CSV)      │     │  (per id)   │     │ (XML → map) │     │ (col table) │     │ (69 cols)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use alma_export::{
//!     read_identifiers_file, run_export, AlmaClient, ExportConfig, ExportOptions, OutputSchema,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExportConfig::from_env()?;
//!     let client = AlmaClient::from_config(&config)?;
//!     let ids = read_identifiers_file("ids.csv")?;
//!     let report = run_export(
//!         &client,
//!         &ids.identifiers,
//!         &config.catalog(),
//!         &OutputSchema::alma_digital(),
//!         &ExportOptions::default(),
//!     )
//!     .await?;
//!     println!("Wrote {} rows to {}", report.records_written, report.output_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Raw, normalized and output record shapes
//! - [`xml`] - Namespace-aware XML text extraction
//! - [`dublin_core`] - Field catalog and record parser
//! - [`schema`] - Output column table
//! - [`transform`] - Column mapper
//! - [`export`] - CSV writer and run pipeline
//! - [`input`] - MMS ID list reader
//! - [`alma`] - Alma Bibs API client
//! - [`config`] - Environment configuration
//! - [`api`] - Logging and HTTP API server

// Core modules
pub mod error;
pub mod models;

// Extraction
pub mod xml;
pub mod dublin_core;

// Mapping
pub mod schema;
pub mod transform;

// Output
pub mod export;

// Collaborators
pub mod input;
pub mod alma;
pub mod config;

// Logging + HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvWriteError, ExportError, FetchError, InputError, MalformedXmlError,
    SchemaError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    FailedIdentifier, NamespaceElementKey, NormalizedRecord, OutputRow, ParseWarning,
    RawApiRecord, RowStatus,
};

// =============================================================================
// Re-exports - Extraction and mapping
// =============================================================================

pub use dublin_core::{FieldCatalog, InstitutionPolicy};
pub use schema::{ColumnDef, Combine, OutputSchema, ValuePolicy};
pub use transform::{map_row, map_rows};

// =============================================================================
// Re-exports - Export
// =============================================================================

pub use export::{
    is_export_file_name, output_file_name, run_export, run_export_with_progress, write_csv,
    CsvExporter, ExportOptions, ExportReport, WriteSummary,
};

// =============================================================================
// Re-exports - Collaborators
// =============================================================================

pub use alma::{parse_bib_response, AlmaClient, RecordSource, Region};
pub use config::ExportConfig;
pub use input::{read_identifiers_bytes, read_identifiers_file, IdentifierFile};

// =============================================================================
// Re-exports - Logging
// =============================================================================

pub use api::logs::{init_file_logging, LogEntry, LogLevel, LOG_BROADCASTER};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
