//! Identifier source reader.
//!
//! Reads the list of MMS IDs to export from a CSV file with auto-detection
//! of encoding, delimiter, header row and identifier column.
//!
//! # Example
//! ```
//! use alma_export::input::read_identifiers_str;
//!
//! let file = read_identifiers_str("Title,MMS ID\nFoo,991234\n# skipped,#\nBar,995678\n").unwrap();
//! assert_eq!(file.identifiers, vec!["991234", "995678"]);
//! assert_eq!(file.id_column, 1);
//! ```

use std::path::Path;

use crate::api::logs::{log_debug, log_info, log_warning};
use crate::error::{InputError, InputResult};

/// Identifiers read from one input file, with what was detected.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierFile {
    /// Identifiers in file order, trimmed.
    pub identifiers: Vec<String>,
    pub encoding: String,
    pub delimiter: char,
    pub has_header: bool,
    /// Column the identifiers were read from.
    pub id_column: usize,
    /// Header of that column, when the file has a header row.
    pub id_header: Option<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes using the detected encoding. Unknown encodings decode as
/// lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let text = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };
    text.trim_start_matches('\u{feff}').to_string()
}

/// Pick the delimiter from the first line: tab if present, semicolon if
/// there are semicolons but no commas, comma otherwise.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");
    if first_line.contains('\t') {
        '\t'
    } else if first_line.contains(';') && !first_line.contains(',') {
        ';'
    } else {
        ','
    }
}

/// Read identifiers from a file on disk.
pub fn read_identifiers_file<P: AsRef<Path>>(path: P) -> InputResult<IdentifierFile> {
    let path = path.as_ref();
    log_info(format!("Reading MMS IDs from {}", path.display()));
    let bytes = std::fs::read(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    read_identifiers_bytes(&bytes)
}

/// Read identifiers from raw bytes (uploads).
pub fn read_identifiers_bytes(bytes: &[u8]) -> InputResult<IdentifierFile> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let mut file = read_identifiers_str(&content)?;
    file.encoding = encoding;
    Ok(file)
}

/// Read identifiers from already-decoded text.
pub fn read_identifiers_str(content: &str) -> InputResult<IdentifierFile> {
    let content = content.trim_start_matches('\u{feff}');
    let delimiter = detect_delimiter(content);
    log_debug(format!("Using delimiter: {:?}", delimiter));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = reader.records();
    let first_row = match rows.next() {
        Some(row) => row.map_err(|e| InputError::Csv(e.to_string()))?,
        None => {
            return Ok(IdentifierFile {
                identifiers: Vec::new(),
                encoding: "utf-8".to_string(),
                delimiter,
                has_header: false,
                id_column: 0,
                id_header: None,
            })
        }
    };

    let has_header = first_row.iter().any(|cell| {
        let cell = cell.trim();
        !cell.is_empty() && !cell.chars().all(|c| c.is_ascii_digit())
    });

    let mut identifiers = Vec::new();
    let (id_column, id_header) = if has_header {
        match first_row.iter().position(is_mms_id_header) {
            Some(index) => {
                log_info(format!("Found MMS ID column '{}' at index {}", &first_row[index], index));
                (index, Some(first_row[index].to_string()))
            }
            None => {
                let header = first_row.get(0).unwrap_or("").to_string();
                log_warning(format!(
                    "No MMS ID column found in headers, using first column '{}'",
                    header
                ));
                (0, Some(header))
            }
        }
    } else {
        log_info("No header detected, using first column for MMS IDs");
        if let Some(id) = accept_cell(first_row.get(0)) {
            identifiers.push(id);
        }
        (0, None)
    };

    for row in rows {
        let row = row.map_err(|e| InputError::Csv(e.to_string()))?;
        if let Some(id) = accept_cell(row.get(id_column)) {
            identifiers.push(id);
        }
    }

    log_info(format!("Read {} MMS IDs", identifiers.len()));
    if !identifiers.is_empty() {
        log_debug(format!("First MMS IDs: {:?}", &identifiers[..identifiers.len().min(5)]));
    }

    Ok(IdentifierFile {
        identifiers,
        encoding: "utf-8".to_string(),
        delimiter,
        has_header,
        id_column,
        id_header,
    })
}

/// Header naming the MMS ID column: contains "mms" and "id", case and
/// spaces ignored.
fn is_mms_id_header(header: &str) -> bool {
    let normalized = header.to_lowercase().replace(' ', "");
    normalized.contains("mms") && normalized.contains("id")
}

/// Skip blanks, `#` comments and purely alphabetic cells.
fn accept_cell(cell: Option<&str>) -> Option<String> {
    let value = cell?.trim();
    if value.is_empty() {
        return None;
    }
    if value.starts_with('#') {
        log_debug(format!("Skipping comment line: {}", value.chars().take(50).collect::<String>()));
        return None;
    }
    if value.chars().all(char::is_alphabetic) {
        return None;
    }
    Some(value.to_string())
}
