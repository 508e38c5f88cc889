//! Export module.
//!
//! - [`writer`] - CSV serialization of output rows
//! - [`pipeline`] - per-identifier fetch, parse, map and write loop

pub mod pipeline;
pub mod writer;

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub use pipeline::{run_export, run_export_with_progress, ExportOptions, ExportReport};
pub use writer::{write_csv, CsvExporter, WriteSummary};

const FILE_PREFIX: &str = "alma_export_";
const FILE_EXTENSION: &str = ".csv";

/// `alma_export_<YYYYMMDD>_<HHMMSS>.csv`
pub fn output_file_name(at: DateTime<Local>) -> String {
    format!("{}{}{}", FILE_PREFIX, at.format("%Y%m%d_%H%M%S"), FILE_EXTENSION)
}

/// Whether `name` is a bare export file name (no directories, no dotfiles).
pub fn is_export_file_name(name: &str) -> bool {
    name.starts_with(FILE_PREFIX)
        && name.ends_with(FILE_EXTENSION)
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Output file inside `dir`, named after `at`.
pub fn resolve_output_path(dir: &Path, at: DateTime<Local>) -> PathBuf {
    dir.join(output_file_name(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_output_file_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(output_file_name(at), "alma_export_20240309_070501.csv");
        assert_eq!(
            resolve_output_path(Path::new("exports"), at),
            PathBuf::from("exports/alma_export_20240309_070501.csv")
        );
    }

    #[test]
    fn test_export_file_names() {
        assert!(is_export_file_name("alma_export_20240309_070501.csv"));
        assert!(is_export_file_name("alma_export_20240309_070501_2.csv"));

        assert!(!is_export_file_name(".env"));
        assert!(!is_export_file_name("alma_export_x.log"));
        assert!(!is_export_file_name("alma_export_../secret.csv"));
        assert!(!is_export_file_name("alma_export_a/b.csv"));
        assert!(!is_export_file_name("alma_export_a\\b.csv"));
        assert!(!is_export_file_name("notes.csv"));
    }
}
