//! CSV Writer
//!
//! Writes the literal header row once, then one line per [`OutputRow`] in the
//! order received. Rows marked deleted become `# DELETED RECORD` comment
//! lines. Quoting follows standard CSV rules so commas, quotes and newlines
//! inside values survive a re-read.
//!
//! Each record is encoded in memory and handed to the underlying writer
//! whole, so the row count in a [`CsvWriteError`] only includes rows the
//! writer accepted.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::CsvWriteError;
use crate::models::OutputRow;
use crate::schema::OutputSchema;

/// Suffixed names tried before giving up on a fresh output file.
const MAX_NAME_SUFFIX: usize = 1000;

/// Counts for a finished file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub path: PathBuf,
    /// Data rows, header excluded.
    pub rows_written: usize,
    pub deleted_commented: usize,
}

/// Comment line standing in for a deleted record.
pub fn deleted_comment(identifier: &str) -> String {
    format!("# DELETED RECORD - MMS ID: {}", identifier)
}

/// Streaming CSV writer for one export file.
pub struct CsvExporter<W: Write> {
    inner: W,
    path: PathBuf,
    width: usize,
    rows_written: usize,
    deleted_commented: usize,
}

impl CsvExporter<File> {
    /// Create (truncate) the file at `path` and write the header row.
    /// Missing parent directories are created.
    pub fn create(path: &Path, schema: &OutputSchema) -> Result<Self, CsvWriteError> {
        create_parent(path)?;
        let file = File::create(path).map_err(|e| open_error(path, e))?;
        Self::from_writer(file, path, schema)
    }

    /// Create a file that did not exist before, at `path` or, when taken, at
    /// `<stem>_1.csv`, `<stem>_2.csv`, ...
    ///
    /// Two runs never share a file, even when their timestamps collide.
    pub fn create_new(path: &Path, schema: &OutputSchema) -> Result<Self, CsvWriteError> {
        create_parent(path)?;
        for n in 0..=MAX_NAME_SUFFIX {
            let candidate = suffixed(path, n);
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => return Self::from_writer(file, candidate, schema),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(open_error(&candidate, e)),
            }
        }
        Err(open_error(
            path,
            io::Error::new(io::ErrorKind::AlreadyExists, "no free output file name"),
        ))
    }
}

impl<W: Write> CsvExporter<W> {
    /// Wrap any writer; `path` is only used in error reports and summaries.
    pub fn from_writer(
        inner: W,
        path: impl Into<PathBuf>,
        schema: &OutputSchema,
    ) -> Result<Self, CsvWriteError> {
        let mut exporter = Self {
            inner,
            path: path.into(),
            width: schema.len(),
            rows_written: 0,
            deleted_commented: 0,
        };
        let bytes = encode_record(&schema.headers()).map_err(|e| exporter.error(e))?;
        exporter.put(&bytes)?;
        Ok(exporter)
    }

    /// Append one row.
    pub fn write_row(&mut self, row: &OutputRow) -> Result<(), CsvWriteError> {
        if row.is_deleted() {
            let line = format!("{}\n", deleted_comment(&row.identifier));
            self.put(line.as_bytes())?;
            self.deleted_commented += 1;
            return Ok(());
        }

        if row.cells.len() != self.width {
            return Err(self.io_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("row has {} cells, expected {}", row.cells.len(), self.width),
            )));
        }
        let bytes = encode_record(&row.cells).map_err(|e| self.error(e))?;
        self.put(&bytes)?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<(), CsvWriteError> {
        self.inner.flush().map_err(|e| self.io_error(e))
    }

    /// Data rows accepted by the underlying writer.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and report what was written.
    pub fn finish(mut self) -> Result<WriteSummary, CsvWriteError> {
        self.flush()?;
        Ok(WriteSummary {
            path: self.path,
            rows_written: self.rows_written,
            deleted_commented: self.deleted_commented,
        })
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), CsvWriteError> {
        self.inner.write_all(bytes).map_err(|e| self.io_error(e))
    }

    fn error(&self, source: csv::Error) -> CsvWriteError {
        CsvWriteError {
            path: self.path.clone(),
            rows_written: self.rows_written,
            source,
        }
    }

    fn io_error(&self, source: io::Error) -> CsvWriteError {
        self.error(csv::Error::from(source))
    }
}

/// Write a complete file: header, then every row in order.
pub fn write_csv<'a, I>(
    path: &Path,
    schema: &OutputSchema,
    rows: I,
) -> Result<WriteSummary, CsvWriteError>
where
    I: IntoIterator<Item = &'a OutputRow>,
{
    let mut exporter = CsvExporter::create(path, schema)?;
    for row in rows {
        exporter.write_row(row)?;
    }
    exporter.finish()
}

/// One CSV record, quoted as needed, `\n`-terminated.
fn encode_record<I, T>(fields: I) -> Result<Vec<u8>, csv::Error>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut encoder = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    encoder.write_record(fields)?;
    encoder.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

fn create_parent(path: &Path) -> Result<(), CsvWriteError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| open_error(path, e)),
        None => Ok(()),
    }
}

fn open_error(path: &Path, source: io::Error) -> CsvWriteError {
    CsvWriteError {
        path: path.to_path_buf(),
        rows_written: 0,
        source: csv::Error::from(source),
    }
}

/// `path` for `n == 0`, else `<stem>_<n>.<ext>`.
fn suffixed(path: &Path, n: usize) -> PathBuf {
    if n == 0 {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RowStatus;
    use crate::schema::{ColumnDef, Combine, ValuePolicy};
    use tempfile::tempdir;

    fn small_schema() -> OutputSchema {
        let single = |header, source| {
            ColumnDef::new(header, &[source], Combine::Fallback, ValuePolicy::Single)
        };
        OutputSchema::new(vec![
            single("mms_id", "mms_id"),
            single("dc:title", "dc:title"),
            single("dc:title", "title"),
        ])
        .unwrap()
    }

    fn row(id: &str, cells: &[&str]) -> OutputRow {
        OutputRow {
            identifier: id.to_string(),
            cells: cells.iter().map(|c| c.to_string()).collect(),
            status: RowStatus::Active,
            lossy_columns: Vec::new(),
        }
    }

    #[test]
    fn test_round_trip_special_characters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let tricky = "Smith, John \"Jack\"\nsecond line";
        let rows = vec![row("1", &["1", tricky, ""]), row("2", &["2", "plain", "x"])];

        let summary = write_csv(&path, &small_schema(), &rows).unwrap();
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.deleted_commented, 0);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, vec!["mms_id", "dc:title", "dc:title"]);

        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][1], tricky);
        assert_eq!(&records[0][2], "");
        assert_eq!(&records[1][0], "2");
    }

    #[test]
    fn test_deleted_rows_become_comments() {
        let mut buffer = Vec::new();
        {
            let mut exporter =
                CsvExporter::from_writer(&mut buffer, "mem.csv", &small_schema()).unwrap();
            exporter.write_row(&row("1", &["1", "A", "B"])).unwrap();
            let mut deleted = row("2", &["2", "", ""]);
            deleted.status = RowStatus::Deleted;
            exporter.write_row(&deleted).unwrap();
            exporter.write_row(&row("3", &["3", "C", "D"])).unwrap();
            let summary = exporter.finish().unwrap();
            assert_eq!(summary.rows_written, 2);
            assert_eq!(summary.deleted_commented, 1);
        }

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "mms_id,dc:title,dc:title\n1,A,B\n# DELETED RECORD - MMS ID: 2\n3,C,D\n"
        );
    }

    #[test]
    fn test_row_width_mismatch_is_an_error() {
        let mut exporter =
            CsvExporter::from_writer(Vec::new(), "mem.csv", &small_schema()).unwrap();
        exporter.write_row(&row("1", &["1", "A", "B"])).unwrap();
        let err = exporter.write_row(&row("2", &["2"])).unwrap_err();
        assert_eq!(err.rows_written, 1);
    }

    /// Accepts `limit` bytes, then fails.
    struct FailingWriter {
        written: usize,
        limit: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written + buf.len() > self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.written += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_io_failure_reports_rows_that_reached_the_writer() {
        // header (25 bytes) and one 6-byte row fit
        let sink = FailingWriter { written: 0, limit: 31 };
        let mut exporter = CsvExporter::from_writer(sink, "full.csv", &small_schema()).unwrap();
        exporter.write_row(&row("1", &["1", "A", "B"])).unwrap();

        let err = exporter.write_row(&row("2", &["2", "C", "D"])).unwrap_err();
        assert_eq!(err.rows_written, 1);
        assert_eq!(err.path, PathBuf::from("full.csv"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_sink_that_never_accepts_reports_zero_rows() {
        let sink = FailingWriter { written: 0, limit: 0 };
        let err = CsvExporter::from_writer(sink, "full.csv", &small_schema())
            .err()
            .unwrap();
        assert_eq!(err.rows_written, 0);
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let result = CsvExporter::create(&blocker.join("out.csv"), &small_schema());
        assert!(result.is_err());
    }

    #[test]
    fn test_create_new_never_reuses_a_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alma_export_20240101_120000.csv");

        let first = CsvExporter::create_new(&path, &small_schema()).unwrap();
        let second = CsvExporter::create_new(&path, &small_schema()).unwrap();
        let third = CsvExporter::create_new(&path, &small_schema()).unwrap();

        assert_eq!(first.path(), path);
        assert_eq!(second.path(), dir.path().join("alma_export_20240101_120000_1.csv"));
        assert_eq!(third.path(), dir.path().join("alma_export_20240101_120000_2.csv"));
    }
}
