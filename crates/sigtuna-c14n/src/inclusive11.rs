#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.1 (C14N 1.1).
//!
//! Algorithm URI: `http://www.w3.org/2006/12/xml-c14n11`
//! With comments: `http://www.w3.org/2006/12/xml-c14n11#WithComments`
//!
//! C14N 1.1 differs from 1.0 in the xml:* attribute handling for document
//! subsets: only the simple inheritable attributes (`xml:lang`,
//! `xml:space`) are imported from invisible ancestors, and `xml:id` is
//! never inherited.

use sigtuna_core::Error;
use sigtuna_xml::NodeSet;

/// Canonicalize using Inclusive C14N 1.1.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    crate::inclusive::canonicalize_with_options(doc, with_comments, node_set, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_does_not_import_xml_id() {
        let xml = r#"<r xml:id="outer" xml:lang="et"><inner>t</inner></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let inner = doc
            .descendants()
            .find(|n| n.tag_name().name() == "inner")
            .unwrap();
        let set = NodeSet::tree_without_comments(inner);
        let out = String::from_utf8(canonicalize(&doc, false, Some(&set)).unwrap()).unwrap();
        assert_eq!(out, r#"<inner xml:lang="et">t</inner>"#);
    }
}
