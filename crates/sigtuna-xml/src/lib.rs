#![forbid(unsafe_code)]

//! XML document helpers for the Sigtuna library.
//!
//! Thin utilities over `roxmltree`: parse options that keep whitespace
//! exactly as received, namespace-qualified element lookup, and the
//! `NodeSet` type used for document-subset canonicalization.
//!
//! Digests are computed over a canonical byte stream that depends on the
//! exact DOM the parser yields, so the raw text is always re-parsed with
//! these options.  A parser that normalizes whitespace must not be used.

pub mod nodeset;

pub use nodeset::NodeSet;

use sigtuna_core::Error;

/// Parsing options shared by every parse in the library.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    }
}

/// Parse an XML document, keeping whitespace verbatim.
pub fn parse(text: &str) -> Result<roxmltree::Document<'_>, Error> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| Error::Parse(e.to_string()))
}

/// Find all descendant elements with the given namespace and local name.
pub fn find_elements<'a, 'i>(
    doc: &'a roxmltree::Document<'i>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'i>> {
    doc.descendants()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name() == local_name
                && n.tag_name().namespace().unwrap_or("") == ns_uri
        })
        .collect()
}

/// Find the first descendant element with the given namespace and local name.
pub fn find_element<'a, 'i>(
    doc: &'a roxmltree::Document<'i>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'i>> {
    doc.descendants().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && n.tag_name().namespace().unwrap_or("") == ns_uri
    })
}

/// Find the first direct child element with the given namespace and local name.
pub fn find_child<'a, 'i>(
    parent: roxmltree::Node<'a, 'i>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'i>> {
    parent.children().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && n.tag_name().namespace().unwrap_or("") == ns_uri
    })
}

/// Find all direct child elements with the given namespace and local name.
pub fn find_children<'a, 'i>(
    parent: roxmltree::Node<'a, 'i>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'i>> {
    parent
        .children()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name() == local_name
                && n.tag_name().namespace().unwrap_or("") == ns_uri
        })
        .collect()
}

/// Trimmed text content of an element, or `""`.
pub fn text_of<'a>(node: roxmltree::Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}
