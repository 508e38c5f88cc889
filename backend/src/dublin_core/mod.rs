//! Dublin Core field catalog and record parser.
//!
//! The [`FieldCatalog`] lists every field the export knows about:
//!
//! - top-level scalar fields of the API response (`mms_id`, `title`, ...)
//! - the fifteen Dublin Core elements (`dc:*`)
//! - the DCTERMS refinements the column table uses (`dcterms:*`)
//! - the institution's custom elements (`custom:*`)
//!
//! [`parse`] turns one [`RawApiRecord`] into a [`NormalizedRecord`] holding
//! every catalog key, with an empty list for fields the record lacks.

use crate::models::{NamespaceElementKey, NormalizedRecord, ParseWarning, RawApiRecord};
use crate::xml;

/// Dublin Core element set namespace.
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// DCMI terms namespace.
pub const DCTERMS_NAMESPACE: &str = "http://purl.org/dc/terms/";

/// Alma's custom Dublin Core namespace; `{institution}` is substituted.
pub const DEFAULT_CUSTOM_NAMESPACE_TEMPLATE: &str =
    "http://alma.exlibrisgroup.com/dc/{institution}";

/// Institution used when neither configuration nor the record names one.
pub const DEFAULT_INSTITUTION: &str = "01GCL_INST";

/// Top-level scalar fields copied from the API response.
pub const SCALAR_FIELDS: &[&str] = &[
    "mms_id",
    "title",
    "author",
    "date_of_publication",
    "publisher_const",
    "originating_system",
    "originating_system_id",
    "record_format",
];

const DC_ELEMENTS: &[&str] = &[
    "title",
    "creator",
    "subject",
    "description",
    "publisher",
    "contributor",
    "date",
    "type",
    "format",
    "identifier",
    "source",
    "language",
    "relation",
    "coverage",
    "rights",
];

const DCTERMS_ELEMENTS: &[&str] = &[
    "alternative",
    "tableOfContents",
    "subject",
    "provenance",
    "bibliographicCitation",
    "abstract",
    "publisher",
    "created",
    "issued",
    "dateSubmitted",
    "dateAccepted",
    "extent",
    "medium",
    "format",
    "type",
    "isPartOf",
    "spatial",
    "temporal",
];

const CUSTOM_ELEMENTS: &[&str] = &["compoundrelationship", "googlesheetsource", "dginfo"];

/// Which namespace family a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    Dc,
    DcTerms,
    Custom,
}

impl Vocabulary {
    /// Prefix used in field keys (`dc:title`, `custom:dginfo`).
    pub fn key_prefix(self) -> &'static str {
        match self {
            Vocabulary::Dc => "dc",
            Vocabulary::DcTerms => "dcterms",
            Vocabulary::Custom => "custom",
        }
    }
}

/// One namespaced field of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub key: String,
    pub vocabulary: Vocabulary,
    pub local_name: String,
}

/// Where the institution code for the custom namespace comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstitutionPolicy {
    /// Always use this code.
    Fixed(String),
    /// Use the record's `originating_system`, else the fallback.
    FromRecord { fallback: String },
}

impl Default for InstitutionPolicy {
    fn default() -> Self {
        InstitutionPolicy::FromRecord {
            fallback: DEFAULT_INSTITUTION.to_string(),
        }
    }
}

/// Immutable field catalog, built once per run and shared by parser and mapper.
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    namespace_template: String,
    institution: InstitutionPolicy,
    fields: Vec<FieldDef>,
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::new(InstitutionPolicy::default())
    }
}

impl FieldCatalog {
    /// Standard catalog with the given institution policy.
    pub fn new(institution: InstitutionPolicy) -> Self {
        let groups = [
            (Vocabulary::Dc, DC_ELEMENTS),
            (Vocabulary::DcTerms, DCTERMS_ELEMENTS),
            (Vocabulary::Custom, CUSTOM_ELEMENTS),
        ];
        let fields = groups
            .iter()
            .flat_map(|(vocabulary, names)| {
                names.iter().map(move |name| FieldDef {
                    key: format!("{}:{}", vocabulary.key_prefix(), name),
                    vocabulary: *vocabulary,
                    local_name: name.to_string(),
                })
            })
            .collect();

        Self {
            namespace_template: DEFAULT_CUSTOM_NAMESPACE_TEMPLATE.to_string(),
            institution,
            fields,
        }
    }

    /// Catalog pinned to one institution code.
    pub fn for_institution(code: impl Into<String>) -> Self {
        Self::new(InstitutionPolicy::Fixed(code.into()))
    }

    /// Override the custom namespace template (`{institution}` is substituted).
    pub fn with_namespace_template(mut self, template: impl Into<String>) -> Self {
        self.namespace_template = template.into();
        self
    }

    pub fn institution(&self) -> &InstitutionPolicy {
        &self.institution
    }

    /// Institution code to use for one record.
    pub fn institution_for<'a>(&'a self, raw: &'a RawApiRecord) -> &'a str {
        match &self.institution {
            InstitutionPolicy::Fixed(code) => code.as_str(),
            InstitutionPolicy::FromRecord { fallback } => raw
                .originating_system
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(fallback.as_str()),
        }
    }

    /// Custom namespace URI for an institution code.
    pub fn custom_namespace(&self, institution: &str) -> String {
        self.namespace_template.replace("{institution}", institution)
    }

    /// Namespaced fields in catalog order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Every field key: scalars first, then namespaced fields.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        SCALAR_FIELDS
            .iter()
            .copied()
            .chain(self.fields.iter().map(|f| f.key.as_str()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().any(|k| k == key)
    }

    /// Resolved (namespace URI, local name) keys for one institution.
    pub fn element_keys(&self, institution: &str) -> Vec<NamespaceElementKey> {
        let custom = self.custom_namespace(institution);
        self.fields
            .iter()
            .map(|field| {
                let namespace = match field.vocabulary {
                    Vocabulary::Dc => DC_NAMESPACE,
                    Vocabulary::DcTerms => DCTERMS_NAMESPACE,
                    Vocabulary::Custom => custom.as_str(),
                };
                NamespaceElementKey::new(namespace, field.local_name.as_str())
            })
            .collect()
    }
}

/// Normalize one API record.
///
/// Scalars are copied first. If the record has no XML fragment, or the
/// fragment is malformed, every namespaced field is empty and the record
/// carries a [`ParseWarning`]; the record itself is never discarded.
///
/// A fragment declaring a different institution namespace than the catalog
/// resolves yields empty custom fields, without a warning.
pub fn parse(raw: &RawApiRecord, catalog: &FieldCatalog) -> NormalizedRecord {
    let mut record = NormalizedRecord::new();

    for key in SCALAR_FIELDS {
        record.insert(*key, raw.scalar(key));
    }

    let empty_namespaced = |record: &mut NormalizedRecord| {
        for field in catalog.fields() {
            record.insert(field.key.as_str(), Vec::<String>::new());
        }
    };

    let Some(fragment) = raw.fragment() else {
        empty_namespaced(&mut record);
        record.set_warning(ParseWarning::MissingFragment);
        return record;
    };

    let keys = catalog.element_keys(catalog.institution_for(raw));
    match xml::extract_many(fragment, &keys) {
        Ok(found) => {
            for (field, values) in catalog.fields().iter().zip(found) {
                record.insert(field.key.as_str(), values);
            }
        }
        Err(e) => {
            empty_namespaced(&mut record);
            record.set_warning(ParseWarning::Malformed(e));
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fragment() -> String {
        r#"<record xmlns:dc="http://purl.org/dc/elements/1.1/"
                   xmlns:dcterms="http://purl.org/dc/terms/"
                   xmlns:dg="http://alma.exlibrisgroup.com/dc/01GCL_INST">
            <dc:title> Scarlet and Black </dc:title>
            <dc:creator>Grinnell College</dc:creator>
            <dc:subject>Student newspapers</dc:subject>
            <dcterms:subject>College students</dcterms:subject>
            <dcterms:abstract>   </dcterms:abstract>
            <dg:dginfo>batch 7</dg:dginfo>
        </record>"#
            .to_string()
    }

    fn sample_raw() -> RawApiRecord {
        RawApiRecord {
            mms_id: Some("991".into()),
            title: Some("Scarlet and Black".into()),
            originating_system: Some("01GCL_INST".into()),
            anies: vec![sample_fragment()],
            ..Default::default()
        }
    }

    #[test]
    fn test_catalog_keys() {
        let catalog = FieldCatalog::default();
        assert_eq!(catalog.fields().len(), 15 + 18 + 3);
        assert!(catalog.contains("mms_id"));
        assert!(catalog.contains("dc:title"));
        assert!(catalog.contains("dcterms:isPartOf"));
        assert!(catalog.contains("custom:compoundrelationship"));
        assert!(!catalog.contains("dc:isPartOf"));
    }

    #[test]
    fn test_custom_namespace_substitution() {
        let catalog = FieldCatalog::for_institution("01ABC_INST");
        assert_eq!(
            catalog.custom_namespace("01ABC_INST"),
            "http://alma.exlibrisgroup.com/dc/01ABC_INST"
        );

        let templated = FieldCatalog::default().with_namespace_template("urn:dc:{institution}:ext");
        assert_eq!(templated.custom_namespace("X"), "urn:dc:X:ext");
    }

    #[test]
    fn test_institution_policy() {
        let raw = RawApiRecord {
            originating_system: Some("01XYZ_INST".into()),
            ..Default::default()
        };
        assert_eq!(FieldCatalog::default().institution_for(&raw), "01XYZ_INST");
        assert_eq!(
            FieldCatalog::default().institution_for(&RawApiRecord::default()),
            DEFAULT_INSTITUTION
        );
        assert_eq!(FieldCatalog::for_institution("FIXED").institution_for(&raw), "FIXED");
    }

    #[test]
    fn test_parse_full_record() {
        let catalog = FieldCatalog::default();
        let record = parse(&sample_raw(), &catalog);

        assert!(record.warning().is_none());
        assert_eq!(record.values("mms_id"), ["991"]);
        assert_eq!(record.values("dc:title"), ["Scarlet and Black"]);
        assert_eq!(record.values("dc:subject"), ["Student newspapers"]);
        assert_eq!(record.values("dcterms:subject"), ["College students"]);
        assert!(record.values("dcterms:abstract").is_empty(), "whitespace-only dropped");
        assert_eq!(record.values("custom:dginfo"), ["batch 7"]);
        assert!(record.values("author").is_empty());

        for key in catalog.keys() {
            assert!(record.contains_key(key), "missing key {}", key);
        }
    }

    #[test]
    fn test_parse_without_fragment() {
        let catalog = FieldCatalog::default();
        let raw = RawApiRecord {
            mms_id: Some("991".into()),
            author: Some("Anon".into()),
            ..Default::default()
        };
        let record = parse(&raw, &catalog);

        assert_eq!(record.warning(), Some(&ParseWarning::MissingFragment));
        for field in catalog.fields() {
            assert!(record.values(&field.key).is_empty());
        }
        assert_eq!(record.values("mms_id"), ["991"]);
        assert_eq!(record.values("author"), ["Anon"]);
        assert!(record.values("title").is_empty());
    }

    #[test]
    fn test_parse_malformed_fragment_keeps_scalars() {
        let catalog = FieldCatalog::default();
        let raw = RawApiRecord {
            mms_id: Some("991".into()),
            title: Some("Fallback".into()),
            anies: vec!["<record><dc:title>broken".into()],
            ..Default::default()
        };
        let record = parse(&raw, &catalog);

        assert!(matches!(record.warning(), Some(ParseWarning::Malformed(_))));
        assert!(record.values("dc:title").is_empty());
        assert_eq!(record.values("title"), ["Fallback"]);
    }

    #[test]
    fn test_wrong_institution_yields_empty_custom_fields() {
        let catalog = FieldCatalog::for_institution("01OTHER_INST");
        let record = parse(&sample_raw(), &catalog);

        assert!(record.warning().is_none());
        assert!(record.values("custom:dginfo").is_empty());
        assert_eq!(record.values("dc:creator"), ["Grinnell College"]);
    }
}
