//! REST API types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::export::ExportReport;
use crate::input::IdentifierFile;
use crate::models::FailedIdentifier;

/// Response sent after an export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready", "warning"
    pub status: String,

    /// File name under `/exports`
    pub file_name: String,

    /// Download path for the CSV
    pub download_url: String,

    pub metadata: ExportMetadata,
}

/// Counts for the run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub requested: usize,
    pub records_written: usize,
    pub deleted_commented: usize,
    pub parse_warnings: usize,
    pub lossy_rows: usize,
    pub elapsed_seconds: f64,
    pub input: InputMetadata,
    pub failed: Vec<FailedRecord>,
}

/// What was detected in the uploaded identifier file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub has_header: bool,
    pub id_column: usize,
    pub id_header: Option<String>,
}

/// An identifier that could not be fetched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    pub mms_id: String,
    pub kind: String,
    pub message: String,
}

impl From<&FailedIdentifier> for FailedRecord {
    fn from(failed: &FailedIdentifier) -> Self {
        FailedRecord {
            mms_id: failed.identifier.clone(),
            kind: failed.error.kind().to_string(),
            message: failed.error.to_string(),
        }
    }
}

impl From<&IdentifierFile> for InputMetadata {
    fn from(file: &IdentifierFile) -> Self {
        InputMetadata {
            encoding: file.encoding.clone(),
            delimiter: file.delimiter.to_string(),
            has_header: file.has_header,
            id_column: file.id_column,
            id_header: file.id_header.clone(),
        }
    }
}

impl ExportResponse {
    pub fn new(report: &ExportReport, input: &IdentifierFile) -> Self {
        let file_name = report
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        ExportResponse {
            job_id: Uuid::new_v4().to_string(),
            status: if report.failed.is_empty() { "ready" } else { "warning" }.to_string(),
            download_url: format!("/exports/{}", file_name),
            file_name,
            metadata: ExportMetadata {
                requested: report.requested,
                records_written: report.records_written,
                deleted_commented: report.deleted_commented,
                parse_warnings: report.parse_warnings,
                lossy_rows: report.lossy_rows,
                elapsed_seconds: report.elapsed.as_secs_f64(),
                input: InputMetadata::from(input),
                failed: report.failed.iter().map(FailedRecord::from).collect(),
            },
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

/// Error response listing failed identifiers
pub fn failed_response(error: &str, failed: &[FailedIdentifier]) -> Value {
    let mut value = error_response(error);
    value["failed"] = json!(failed.iter().map(FailedRecord::from).collect::<Vec<_>>());
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_export_response_camel_case() {
        let report = ExportReport {
            output_path: PathBuf::from("exports/alma_export_20240101_120000.csv"),
            requested: 2,
            records_written: 1,
            deleted_commented: 0,
            parse_warnings: 0,
            lossy_rows: 1,
            failed: vec![FailedIdentifier::new("123", FetchError::NotFound("123".into()))],
            elapsed: Duration::from_millis(1500),
        };
        let input = IdentifierFile {
            identifiers: vec!["123".into(), "456".into()],
            encoding: "utf-8".into(),
            delimiter: ',',
            has_header: true,
            id_column: 0,
            id_header: Some("mms_id".into()),
        };

        let json = serde_json::to_value(ExportResponse::new(&report, &input)).unwrap();
        assert_eq!(json["status"], "warning");
        assert_eq!(json["downloadUrl"], "/exports/alma_export_20240101_120000.csv");
        assert_eq!(json["metadata"]["recordsWritten"], 1);
        assert_eq!(json["metadata"]["input"]["idHeader"], "mms_id");
        assert_eq!(json["metadata"]["failed"][0]["mmsId"], "123");
        assert_eq!(json["metadata"]["failed"][0]["kind"], "not-found");
    }

    #[test]
    fn test_failed_response() {
        let failed = vec![FailedIdentifier::new("1", FetchError::NetworkFailure("timeout".into()))];
        let json = failed_response("All 1 identifiers failed to fetch", &failed);
        assert_eq!(json["status"], "error");
        assert_eq!(json["failed"][0]["kind"], "network-failure");
    }
}
