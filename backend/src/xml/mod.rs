//! Namespace-aware text extraction from XML fragments.
//!
//! Elements are matched on their resolved namespace URI and local name, never
//! on the prefix written in the document: `dc:`, `dcterms:` and institution
//! prefixes differ between records but the URIs do not.
//!
//! ```rust
//! use alma_export::models::NamespaceElementKey;
//! use alma_export::xml::extract;
//!
//! let fragment = r#"<record xmlns:dc="http://purl.org/dc/elements/1.1/">
//!     <dc:title>A</dc:title><dc:title>B</dc:title>
//! </record>"#;
//! let key = NamespaceElementKey::new("http://purl.org/dc/elements/1.1/", "title");
//! assert_eq!(extract(fragment, &key).unwrap(), vec!["A", "B"]);
//! ```

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::error::{MalformedXmlError, XmlResult};
use crate::models::NamespaceElementKey;

/// Text content of every element matching `key`, in document order.
///
/// Text is returned as-is (no trimming). A matching element with no text
/// yields an empty string. Zero matches is an empty vector, not an error.
pub fn extract(fragment: &str, key: &NamespaceElementKey) -> XmlResult<Vec<String>> {
    let mut found = extract_many(fragment, std::slice::from_ref(key))?;
    Ok(found.pop().unwrap_or_default())
}

/// Single-pass extraction of several keys.
///
/// Returns one list per key, in the order of `keys`. The fragment is parsed
/// once; any well-formedness error fails the whole call.
pub fn extract_many(
    fragment: &str,
    keys: &[NamespaceElementKey],
) -> XmlResult<Vec<Vec<String>>> {
    let mut reader = NsReader::from_str(fragment);
    let mut results: Vec<Vec<String>> = vec![Vec::new(); keys.len()];

    // (depth, key index, value index) of matched elements still open
    let mut open: Vec<(usize, usize, usize)> = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        let position = reader.buffer_position();
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| MalformedXmlError::new(position, e.to_string()))?;

        match event {
            Event::Start(ref e) => {
                check_root(depth, &mut seen_root, position)?;
                depth += 1;
                let namespace = element_namespace(&resolved, position)?;
                for (k, key) in keys.iter().enumerate() {
                    if matches(key, namespace, e.local_name().as_ref()) {
                        results[k].push(String::new());
                        open.push((depth, k, results[k].len() - 1));
                    }
                }
            }
            Event::Empty(ref e) => {
                check_root(depth, &mut seen_root, position)?;
                let namespace = element_namespace(&resolved, position)?;
                for (k, key) in keys.iter().enumerate() {
                    if matches(key, namespace, e.local_name().as_ref()) {
                        results[k].push(String::new());
                    }
                }
            }
            Event::End(_) => {
                open.retain(|(d, _, _)| *d != depth);
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| MalformedXmlError::new(position, "unexpected end tag"))?;
            }
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|err| MalformedXmlError::new(position, err.to_string()))?;
                if depth == 0 {
                    if !text.trim().is_empty() {
                        return Err(MalformedXmlError::new(
                            position,
                            "text outside the root element",
                        ));
                    }
                    continue;
                }
                append(&mut results, &open, &text);
            }
            Event::CData(ref e) => {
                if depth == 0 {
                    return Err(MalformedXmlError::new(
                        position,
                        "CDATA outside the root element",
                    ));
                }
                append(&mut results, &open, &String::from_utf8_lossy(e));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(MalformedXmlError::new(
            reader.buffer_position(),
            format!("{} unclosed element(s) at end of fragment", depth),
        ));
    }
    if !seen_root {
        return Err(MalformedXmlError::new(0, "no root element"));
    }

    Ok(results)
}

/// Only one top-level element is allowed.
fn check_root(depth: usize, seen_root: &mut bool, position: u64) -> XmlResult<()> {
    if depth == 0 {
        if *seen_root {
            return Err(MalformedXmlError::new(position, "more than one root element"));
        }
        *seen_root = true;
    }
    Ok(())
}

/// Namespace URI of an element, `None` when it has no namespace.
fn element_namespace<'a>(
    resolved: &'a ResolveResult<'_>,
    position: u64,
) -> XmlResult<Option<&'a [u8]>> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(ns.0)),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(MalformedXmlError::new(
            position,
            format!("unbound prefix '{}'", String::from_utf8_lossy(prefix)),
        )),
    }
}

fn matches(key: &NamespaceElementKey, namespace: Option<&[u8]>, local_name: &[u8]) -> bool {
    namespace == Some(key.namespace().as_bytes()) && local_name == key.local_name().as_bytes()
}

/// Text belongs to every matched element still open (descendant text included).
fn append(results: &mut [Vec<String>], open: &[(usize, usize, usize)], text: &str) {
    for &(_, k, i) in open {
        results[k][i].push_str(text);
    }
}
