//! Output column table.
//!
//! Every column of the export is one row of [`ALMA_DIGITAL_COLUMNS`]: the
//! literal header, the field keys it reads, how several sources combine and
//! which value(s) end up in the cell. Changing the export layout means
//! editing this table, not the extraction code.
//!
//! Header texts repeat on purpose (twelve LCSH columns, two publishers, two
//! extents, three `isPartOf`). Columns are identified by position; the pair
//! (header, occurrence) is unique, see [`OutputSchema::column_id`].

use std::fmt;

use crate::dublin_core::FieldCatalog;
use crate::error::SchemaError;

/// Default separator for [`ValuePolicy::Join`].
pub const DEFAULT_JOIN_DELIMITER: &str = "; ";

/// How the lists of several source fields are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    /// Use the first source that has any value.
    Fallback,
    /// Concatenate all sources, in listed order.
    Concat,
}

/// Which of the combined values land in the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuePolicy {
    /// One value expected. Extra values are dropped and the column is
    /// reported as lossy for that row.
    Single,
    /// First value only, by design (head of a series).
    FirstOnly,
    /// All values joined with the schema's delimiter.
    Join,
    /// The value at this index, empty when there are fewer values.
    Nth(usize),
    /// First value that is an `http://` or `https://` URI.
    FirstUri,
}

impl fmt::Display for ValuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuePolicy::Single => write!(f, "single"),
            ValuePolicy::FirstOnly => write!(f, "first"),
            ValuePolicy::Join => write!(f, "join"),
            ValuePolicy::Nth(n) => write!(f, "nth({})", n),
            ValuePolicy::FirstUri => write!(f, "first-uri"),
        }
    }
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub header: String,
    /// Field keys, in priority/concatenation order. Empty for columns the
    /// export leaves blank.
    pub sources: Vec<String>,
    pub combine: Combine,
    pub policy: ValuePolicy,
}

impl ColumnDef {
    pub fn new(header: &str, sources: &[&str], combine: Combine, policy: ValuePolicy) -> Self {
        Self {
            header: header.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            combine,
            policy,
        }
    }

    /// A column that is always empty.
    pub fn blank(header: &str) -> Self {
        Self::new(header, &[], Combine::Fallback, ValuePolicy::Single)
    }

    pub fn is_blank(&self) -> bool {
        self.sources.is_empty()
    }
}

type ColumnSpec = (&'static str, &'static [&'static str], Combine, ValuePolicy);

const NONE: &[&str] = &[];
const SUBJECTS: &[&str] = &["dc:subject", "dcterms:subject"];
const PUBLISHERS: &[&str] = &["dcterms:publisher", "publisher_const"];
const EXTENTS: &[&str] = &["dcterms:extent"];
const PART_OF: &[&str] = &["dcterms:isPartOf"];
const LCSH: &str = "dcterms:subject.dcterms:LCSH";

use Combine::{Concat, Fallback};
use ValuePolicy::{FirstOnly, FirstUri, Join, Nth, Single};

/// The Alma Digital import layout.
pub const ALMA_DIGITAL_COLUMNS: &[ColumnSpec] = &[
    ("group_id", NONE, Fallback, Single),
    ("collection_id", NONE, Fallback, Single),
    ("mms_id", &["mms_id"], Fallback, Single),
    ("originating_system_id", &["originating_system_id"], Fallback, Single),
    ("compoundrelationship", &["custom:compoundrelationship"], Fallback, Single),
    ("dc:title", &["dc:title", "title"], Fallback, Single),
    ("dcterms:alternative", &["dcterms:alternative"], Fallback, Join),
    ("oldalttitle", NONE, Fallback, Single),
    ("dc:identifier", &["dc:identifier"], Fallback, Join),
    ("dcterms:identifier.dcterms:URI", &["dc:identifier"], Fallback, FirstUri),
    ("dcterms:tableOfContents", &["dcterms:tableOfContents"], Fallback, Join),
    ("dc:creator", &["dc:creator", "author"], Fallback, Join),
    ("dc:contributor", &["dc:contributor"], Fallback, Join),
    ("dc:subject", SUBJECTS, Concat, FirstOnly),
    (LCSH, SUBJECTS, Concat, Nth(1)),
    (LCSH, SUBJECTS, Concat, Nth(2)),
    (LCSH, SUBJECTS, Concat, Nth(3)),
    (LCSH, SUBJECTS, Concat, Nth(4)),
    (LCSH, SUBJECTS, Concat, Nth(5)),
    (LCSH, SUBJECTS, Concat, Nth(6)),
    (LCSH, SUBJECTS, Concat, Nth(7)),
    (LCSH, SUBJECTS, Concat, Nth(8)),
    (LCSH, SUBJECTS, Concat, Nth(9)),
    (LCSH, SUBJECTS, Concat, Nth(10)),
    (LCSH, SUBJECTS, Concat, Nth(11)),
    (LCSH, SUBJECTS, Concat, Nth(12)),
    ("dc:description", &["dc:description"], Fallback, Join),
    ("dcterms:provenance", &["dcterms:provenance"], Fallback, Join),
    ("dcterms:bibliographicCitation", &["dcterms:bibliographicCitation"], Fallback, Join),
    ("dcterms:abstract", &["dcterms:abstract"], Fallback, Join),
    ("dcterms:publisher", PUBLISHERS, Fallback, Nth(0)),
    ("dcterms:publisher", PUBLISHERS, Fallback, Nth(1)),
    ("dc:date", &["dc:date", "date_of_publication"], Fallback, Single),
    ("dcterms:created", &["dcterms:created"], Fallback, Single),
    ("dcterms:issued", &["dcterms:issued", "date_of_publication"], Fallback, Single),
    ("dcterms:dateSubmitted", &["dcterms:dateSubmitted"], Fallback, Single),
    ("dcterms:dateAccepted", &["dcterms:dateAccepted"], Fallback, Single),
    ("dc:type", &["dc:type"], Fallback, Single),
    ("dc:format", &["dc:format"], Fallback, Single),
    ("dcterms:extent", EXTENTS, Fallback, Nth(0)),
    ("dcterms:extent", EXTENTS, Fallback, Nth(1)),
    ("dcterms:medium", &["dcterms:medium"], Fallback, Single),
    ("dcterms:format.dcterms:IMT", &["dcterms:format"], Fallback, Single),
    ("dcterms:type.dcterms:DCMIType", &["dcterms:type"], Fallback, Single),
    ("dc:language", &["dc:language"], Fallback, Join),
    ("dc:relation", &["dc:relation"], Fallback, Join),
    ("dcterms:isPartOf", PART_OF, Fallback, Nth(0)),
    ("dcterms:isPartOf", PART_OF, Fallback, Nth(1)),
    ("dcterms:isPartOf", PART_OF, Fallback, Nth(2)),
    ("dc:coverage", &["dc:coverage"], Fallback, Join),
    ("dcterms:spatial", &["dcterms:spatial"], Fallback, Join),
    ("dcterms:spatial.dcterms:Point", NONE, Fallback, Single),
    ("dcterms:temporal", &["dcterms:temporal"], Fallback, Join),
    ("dc:rights", &["dc:rights"], Fallback, Join),
    ("dc:source", &["dc:source"], Fallback, Join),
    ("bib custom field", NONE, Fallback, Single),
    ("rep_label", NONE, Fallback, Single),
    ("rep_public_note", NONE, Fallback, Single),
    ("rep_access_rights", NONE, Fallback, Single),
    ("rep_usage_type", NONE, Fallback, Single),
    ("rep_library", NONE, Fallback, Single),
    ("rep_note", NONE, Fallback, Single),
    ("rep_custom field", NONE, Fallback, Single),
    ("file_name_1", NONE, Fallback, Single),
    ("file_label_1", NONE, Fallback, Single),
    ("file_name_2", NONE, Fallback, Single),
    ("file_label_2", NONE, Fallback, Single),
    ("googlesheetsource", &["custom:googlesheetsource"], Fallback, Single),
    ("dginfo", &["custom:dginfo"], Fallback, Single),
];

/// Ordered, immutable list of output columns.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    columns: Vec<ColumnDef>,
    join_delimiter: String,
    /// `true` for an `Nth` column with no higher index over the same sources.
    series_tail: Vec<bool>,
}

impl Default for OutputSchema {
    fn default() -> Self {
        Self::alma_digital()
    }
}

impl OutputSchema {
    /// Build a schema from column definitions.
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self, SchemaError> {
        if let Some(index) = columns.iter().position(|c| c.header.trim().is_empty()) {
            return Err(SchemaError::EmptyHeader(index));
        }
        let series_tail = series_tails(&columns);
        Ok(Self {
            columns,
            join_delimiter: DEFAULT_JOIN_DELIMITER.to_string(),
            series_tail,
        })
    }

    /// The Alma Digital import layout.
    pub fn alma_digital() -> Self {
        let columns: Vec<ColumnDef> = ALMA_DIGITAL_COLUMNS
            .iter()
            .map(|(header, sources, combine, policy)| {
                ColumnDef::new(header, sources, *combine, *policy)
            })
            .collect();
        let series_tail = series_tails(&columns);
        Self {
            columns,
            join_delimiter: DEFAULT_JOIN_DELIMITER.to_string(),
            series_tail,
        }
    }

    pub fn with_join_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.join_delimiter = delimiter.into();
        self
    }

    /// Check every source key against the field catalog.
    pub fn validate(&self, catalog: &FieldCatalog) -> Result<(), SchemaError> {
        for (index, column) in self.columns.iter().enumerate() {
            if let Some(field) = column.sources.iter().find(|s| !catalog.contains(s)) {
                return Err(SchemaError::UnknownField {
                    index,
                    header: column.header.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn join_delimiter(&self) -> &str {
        &self.join_delimiter
    }

    /// Literal header row.
    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    /// Unique column id: the header, suffixed `#n` for the nth repeat (n ≥ 2).
    pub fn column_id(&self, index: usize) -> Option<String> {
        let header = &self.columns.get(index)?.header;
        let occurrence = self.columns[..=index]
            .iter()
            .filter(|c| &c.header == header)
            .count();
        Some(if occurrence == 1 {
            header.clone()
        } else {
            format!("{}#{}", header, occurrence)
        })
    }

    /// Whether values past this column's index are dropped.
    pub fn is_series_tail(&self, index: usize) -> bool {
        self.series_tail.get(index).copied().unwrap_or(false)
    }
}

fn series_tails(columns: &[ColumnDef]) -> Vec<bool> {
    columns
        .iter()
        .map(|column| match column.policy {
            Nth(n) => !columns.iter().any(|other| {
                matches!(other.policy, Nth(m) if m > n)
                    && other.sources == column.sources
                    && other.combine == column.combine
            }),
            _ => false,
        })
        .collect()
}
