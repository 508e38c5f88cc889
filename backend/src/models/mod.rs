//! Domain models for the export pipeline.
//!
//! Records move through four shapes:
//!
//! ```text
//! RawApiRecord ──parse──▶ NormalizedRecord ──map──▶ OutputRow ──write──▶ CSV line
//! ```
//!
//! - [`RawApiRecord`] - one bib record as returned by the Alma API
//! - [`NamespaceElementKey`] - (namespace URI, local name) of an XML element
//! - [`NormalizedRecord`] - field key → ordered list of values
//! - [`OutputRow`] - one CSV row, one cell per schema column
//! - [`FailedIdentifier`] - an identifier that could not be retrieved

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{FetchError, MalformedXmlError};

// =============================================================================
// Raw API Record
// =============================================================================

/// A coded value with a description, as Alma returns them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CodedValue {
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub desc: Option<String>,
}

/// One bibliographic record as returned by the Alma Bibs API.
///
/// Only the fields the export reads are modelled; everything else in the
/// response is ignored. `anies` holds the embedded XML fragments, normally
/// exactly one Dublin Core `<record>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawApiRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub mms_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date_of_publication: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub publisher_const: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub originating_system: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub originating_system_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub record_format: Option<String>,
    #[serde(default, deserialize_with = "lenient_fragments")]
    pub anies: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub record_status: Option<String>,
    #[serde(default)]
    pub cataloging_level: Option<CodedValue>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub suppress_from_publishing: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub suppress_from_external_search: Option<String>,
}

impl RawApiRecord {
    /// Top-level scalar field by its field key.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        let value = match key {
            "mms_id" => &self.mms_id,
            "title" => &self.title,
            "author" => &self.author,
            "date_of_publication" => &self.date_of_publication,
            "publisher_const" => &self.publisher_const,
            "originating_system" => &self.originating_system,
            "originating_system_id" => &self.originating_system_id,
            "record_format" => &self.record_format,
            _ => return None,
        };
        value.as_deref()
    }

    /// The embedded XML fragment, if any. Only the first one is used.
    pub fn fragment(&self) -> Option<&str> {
        self.anies
            .first()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Heuristic deletion check.
    ///
    /// A record counts as deleted when its title is empty or mentions
    /// "deleted", when `record_status` is `deleted`, when the cataloging
    /// level description mentions "deleted", or when it is suppressed from
    /// both publishing and external search and carries no XML fragment.
    pub fn looks_deleted(&self) -> bool {
        let title = self.title.as_deref().unwrap_or("").to_lowercase();
        if title.trim().is_empty() || title.contains("deleted") {
            return true;
        }

        if self.record_status.as_deref() == Some("deleted") {
            return true;
        }

        let level_desc = self
            .cataloging_level
            .as_ref()
            .and_then(|level| level.desc.as_deref())
            .unwrap_or("")
            .to_lowercase();
        if level_desc.contains("deleted") {
            return true;
        }

        let suppressed = |flag: &Option<String>| {
            flag.as_deref()
                .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        };
        suppressed(&self.suppress_from_publishing)
            && suppressed(&self.suppress_from_external_search)
            && self.anies.is_empty()
    }
}

/// Accept strings, booleans and numbers; anything else is absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// `anies` is usually an array of strings but may be a bare string or null.
fn lenient_fragments<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => vec![s],
        _ => Vec::new(),
    })
}

// =============================================================================
// Namespace Element Key
// =============================================================================

/// An XML element identified by namespace URI and local name.
///
/// Prefixes vary from record to record, so matching is always done on the
/// URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceElementKey {
    namespace: String,
    local_name: String,
}

impl NamespaceElementKey {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

impl fmt::Display for NamespaceElementKey {
    /// Clark notation: `{uri}local`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local_name)
    }
}

// =============================================================================
// Normalized Record
// =============================================================================

/// Why a record's namespaced fields are empty.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseWarning {
    /// The API response carried no XML fragment.
    MissingFragment,
    /// The fragment was not well-formed.
    Malformed(MalformedXmlError),
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::MissingFragment => write!(f, "no embedded XML fragment"),
            ParseWarning::Malformed(e) => write!(f, "{}", e),
        }
    }
}

/// Field key → ordered values, decoupled from both the API and the CSV shape.
///
/// An empty list means the field was absent in the source. Values are
/// trimmed and never empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    fields: BTreeMap<String, Vec<String>>,
    warning: Option<ParseWarning>,
}

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store values under `key`, trimming and dropping blanks.
    pub fn insert<I, S>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cleaned = values
            .into_iter()
            .map(|v| v.as_ref().trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        self.fields.insert(key.into(), cleaned);
    }

    /// Values for `key`; empty when absent or unknown.
    pub fn values(&self, key: &str) -> &[String] {
        self.fields.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key).first().map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn warning(&self) -> Option<&ParseWarning> {
        self.warning.as_ref()
    }

    pub fn set_warning(&mut self, warning: ParseWarning) {
        self.warning = Some(warning);
    }
}

// =============================================================================
// Output Row
// =============================================================================

/// How a row is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    /// Written as a data row.
    Active,
    /// Written as a `# DELETED RECORD` comment line.
    Deleted,
}

/// One CSV row: one cell per schema column, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    /// MMS ID of the source record (may be empty for unidentified records).
    pub identifier: String,
    pub cells: Vec<String>,
    pub status: RowStatus,
    /// Columns that dropped values because the policy keeps fewer than the
    /// source had.
    pub lossy_columns: Vec<usize>,
}

impl OutputRow {
    pub fn is_deleted(&self) -> bool {
        self.status == RowStatus::Deleted
    }
}

// =============================================================================
// Failed Identifier
// =============================================================================

/// An identifier whose record could not be retrieved.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedIdentifier {
    pub identifier: String,
    pub error: FetchError,
}

impl FailedIdentifier {
    pub fn new(identifier: impl Into<String>, error: FetchError) -> Self {
        Self {
            identifier: identifier.into(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_alma_bib() {
        let json = r#"{
            "mms_id": "991234567890104641",
            "title": "Scarlet and Black, 1921-03-02",
            "author": null,
            "originating_system": "01GCL_INST",
            "originating_system_id": "dg_1234",
            "record_format": "dc",
            "suppress_from_publishing": "false",
            "cataloging_level": { "value": "00", "desc": "Default Level" },
            "anies": ["<record xmlns:dc=\"http://purl.org/dc/elements/1.1/\"/>"]
        }"#;

        let raw: RawApiRecord = serde_json::from_str(json).unwrap();
        assert_eq!(raw.mms_id.as_deref(), Some("991234567890104641"));
        assert_eq!(raw.author, None);
        assert_eq!(raw.scalar("record_format"), Some("dc"));
        assert!(raw.fragment().unwrap().starts_with("<record"));
        assert!(!raw.looks_deleted());
    }

    #[test]
    fn test_lenient_scalars_and_fragments() {
        let json = r#"{ "mms_id": 991, "suppress_from_publishing": true, "anies": "<r/>" }"#;
        let raw: RawApiRecord = serde_json::from_str(json).unwrap();
        assert_eq!(raw.mms_id.as_deref(), Some("991"));
        assert_eq!(raw.suppress_from_publishing.as_deref(), Some("true"));
        assert_eq!(raw.anies, vec!["<r/>"]);

        let raw: RawApiRecord = serde_json::from_str(r#"{ "anies": null }"#).unwrap();
        assert!(raw.anies.is_empty());
        assert_eq!(raw.fragment(), None);
    }

    #[test]
    fn test_looks_deleted() {
        let mut raw = RawApiRecord {
            title: Some("A title".into()),
            anies: vec!["<r/>".into()],
            ..Default::default()
        };
        assert!(!raw.looks_deleted());

        raw.title = Some("DELETED record".into());
        assert!(raw.looks_deleted());

        raw.title = Some("A title".into());
        raw.cataloging_level = Some(CodedValue {
            value: Some("99".into()),
            desc: Some("Deleted".into()),
        });
        assert!(raw.looks_deleted());

        raw.cataloging_level = None;
        raw.suppress_from_publishing = Some("true".into());
        raw.suppress_from_external_search = Some("TRUE".into());
        assert!(!raw.looks_deleted(), "suppressed but has metadata");
        raw.anies.clear();
        assert!(raw.looks_deleted());
    }

    #[test]
    fn test_normalized_record_trims_and_drops_blanks() {
        let mut record = NormalizedRecord::new();
        record.insert("dc:title", ["  A ", "", "   ", "B"]);
        record.insert("dc:creator", Vec::<String>::new());

        assert_eq!(record.values("dc:title"), ["A", "B"]);
        assert!(record.contains_key("dc:creator"));
        assert!(record.values("dc:creator").is_empty());
        assert!(record.values("never:set").is_empty());
        assert_eq!(record.first("dc:title"), Some("A"));
    }

    #[test]
    fn test_namespace_key_display() {
        let key = NamespaceElementKey::new("http://purl.org/dc/terms/", "abstract");
        assert_eq!(key.to_string(), "{http://purl.org/dc/terms/}abstract");
    }
}
