#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! Per the spec, the canonical form:
//! - Outputs namespace declarations sorted by prefix (default first)
//! - Outputs attributes sorted by (namespace-URI, local-name)
//! - Escapes text and attribute values per C14N rules
//! - Optionally preserves or strips comments
//! - Supports document-subset canonicalization via NodeSet

use crate::escape;
use crate::render::{Attr, NsDecl};
use sigtuna_core::Error;
use sigtuna_xml::NodeSet;
use std::collections::BTreeMap;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    canonicalize_with_options(doc, with_comments, node_set, false)
}

/// Canonicalize with an explicit C14N 1.1 flag.
///
/// The 1.1 variant restricts xml:* attribute inheritance on document
/// subsets to the simple inheritable attributes (`xml:lang`, `xml:space`);
/// `xml:id` is never inherited.
pub fn canonicalize_with_options(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    c14n11: bool,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let mut ctx = C14nContext {
        with_comments,
        node_set,
        c14n11,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct C14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    c14n11: bool,
}

impl C14nContext<'_> {
    fn is_visible(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        match self.node_set {
            None => true,
            Some(ns) => ns.contains(node),
        }
    }

    fn process_node(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, inherited_ns)?;
                }
            }
            roxmltree::NodeType::Element => {
                self.process_element(node, output, inherited_ns)?;
            }
            roxmltree::NodeType::Text => {
                if self.is_visible(&node) {
                    let text = node.text().unwrap_or("");
                    output.extend_from_slice(escape::escape_text(text).as_bytes());
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    let parent_is_root = node
                        .parent()
                        .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);

                    // Document-level comments get newline separators from
                    // the document element.
                    if parent_is_root && node.prev_siblings().any(|s| s.is_element()) {
                        output.push(b'\n');
                    }

                    output.extend_from_slice(b"<!--");
                    output.extend_from_slice(node.text().unwrap_or("").as_bytes());
                    output.extend_from_slice(b"-->");

                    if parent_is_root && node.next_siblings().any(|s| s.is_element()) {
                        output.push(b'\n');
                    }
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(&node) {
                    let parent_is_root = node
                        .parent()
                        .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);

                    if parent_is_root && node.prev_siblings().any(|s| s.is_element()) {
                        output.push(b'\n');
                    }

                    if let Some(pi) = node.pi() {
                        output.extend_from_slice(b"<?");
                        output.extend_from_slice(pi.target.as_bytes());
                        if let Some(value) = pi.value {
                            if !value.is_empty() {
                                output.push(b' ');
                                output.extend_from_slice(escape::escape_pi(value).as_bytes());
                            }
                        }
                        output.extend_from_slice(b"?>");
                    }

                    if parent_is_root && node.next_siblings().any(|s| s.is_element()) {
                        output.push(b'\n');
                    }
                }
            }
        }
        Ok(())
    }

    fn process_element(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(&node) {
            // Invisible element: process visible children transparently.
            // Children see the same inherited namespace context, based on
            // visible ancestors only.
            for child in node.children() {
                self.process_node(child, output, inherited_ns)?;
            }
            return Ok(());
        }

        // All namespace declarations in scope at this element.
        let current_ns = collect_inscope_namespaces(&node);

        // Output a declaration when it differs from what the nearest
        // visible ancestor already rendered; never re-declare xmlns:xml.
        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for (prefix, uri) in &current_ns {
            if prefix == "xml" {
                continue;
            }
            if inherited_ns.get(prefix) != Some(uri) {
                ns_decls.push(NsDecl {
                    prefix: prefix.clone(),
                    uri: uri.clone(),
                });
            }
        }
        ns_decls.sort();

        // Collect attributes (namespace declarations are not attributes
        // in roxmltree's model).
        let mut attrs: Vec<Attr> = Vec::new();
        for attr in node.attributes() {
            let ns_uri = attr.namespace().unwrap_or("");
            attrs.push(Attr {
                ns_uri: ns_uri.to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name: attr_qualified_name(&node, &attr),
                value: attr.value().to_owned(),
            });
        }

        // For document subsets: a visible element whose parent is not
        // visible imports the xml:* attributes of its ancestors (nearest
        // ancestor value wins).  C14N 1.1 restricts the imported set to the
        // simple inheritable attributes.
        if self.node_set.is_some() {
            let parent_not_visible = node
                .parent()
                .map_or(true, |p| !p.is_element() || !self.is_visible(&p));
            if parent_not_visible {
                let extra = self.collect_inherited_xml_attrs(&node, &attrs);
                attrs.extend(extra);
            }
        }
        attrs.sort();

        let elem_name = qualified_element_name(&node);

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            output.extend_from_slice(ns_decl.render().as_bytes());
        }
        for attr in &attrs {
            output.extend_from_slice(attr.render().as_bytes());
        }
        output.push(b'>');

        // Children inherit this element's rendered namespace context.
        let mut child_ns = inherited_ns.clone();
        for (prefix, uri) in &current_ns {
            if prefix != "xml" {
                child_ns.insert(prefix.clone(), uri.clone());
            }
        }
        for child in node.children() {
            self.process_node(child, output, &child_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');

        Ok(())
    }

    /// Collect xml:* attributes inherited from ancestors for document-subset
    /// canonicalization.  Walks all ancestors regardless of visibility,
    /// keeping the nearest value, then drops names already present on the
    /// element's own attribute axis.
    fn collect_inherited_xml_attrs(
        &self,
        node: &roxmltree::Node<'_, '_>,
        existing_attrs: &[Attr],
    ) -> Vec<Attr> {
        let mut inherited_xml: BTreeMap<String, String> = BTreeMap::new();

        let mut current = node.parent();
        while let Some(ancestor) = current {
            if ancestor.is_element() {
                for attr in ancestor.attributes() {
                    if attr.namespace() == Some(XML_NS) {
                        let name = attr.name();
                        if self.c14n11 && !matches!(name, "lang" | "space") {
                            continue;
                        }
                        if !inherited_xml.contains_key(name) {
                            inherited_xml.insert(name.to_owned(), attr.value().to_owned());
                        }
                    }
                }
            }
            current = ancestor.parent();
        }

        let mut result = Vec::new();
        for (name, value) in &inherited_xml {
            let already_present = existing_attrs
                .iter()
                .any(|a| a.ns_uri == XML_NS && a.local_name == *name);
            if !already_present {
                result.push(Attr {
                    ns_uri: XML_NS.to_owned(),
                    local_name: name.clone(),
                    qualified_name: format!("xml:{name}"),
                    value: value.clone(),
                });
            }
        }
        result
    }
}

/// Collect all in-scope namespaces for an element.
///
/// Walks up the ancestor chain collecting declarations, with closer
/// declarations overriding more distant ones.
pub(crate) fn collect_inscope_namespaces(
    node: &roxmltree::Node<'_, '_>,
) -> BTreeMap<String, String> {
    let mut ns_stack: Vec<BTreeMap<String, String>> = Vec::new();

    let mut current = Some(*node);
    while let Some(n) = current {
        if n.is_element() {
            let mut level = BTreeMap::new();
            for ns in n.namespaces() {
                let prefix = ns.name().unwrap_or("").to_owned();
                let uri = ns.uri().to_owned();
                level.insert(prefix, uri);
            }
            ns_stack.push(level);
        }
        current = n.parent();
    }

    let mut result = BTreeMap::new();
    for level in ns_stack.into_iter().rev() {
        for (prefix, uri) in level {
            if uri.is_empty() {
                // Un-declaration of the default namespace.
                result.remove(&prefix);
            } else {
                result.insert(prefix, uri);
            }
        }
    }
    result
}

/// Get the qualified element name (prefix:local or just local).
pub(crate) fn qualified_element_name(node: &roxmltree::Node<'_, '_>) -> String {
    let local = node.tag_name().name();
    match node.tag_name().namespace() {
        Some(ns_uri) => match node.lookup_prefix(ns_uri) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
            _ => local.to_owned(),
        },
        None => local.to_owned(),
    }
}

/// Get the qualified name of an attribute.
pub(crate) fn attr_qualified_name(
    node: &roxmltree::Node<'_, '_>,
    attr: &roxmltree::Attribute<'_, '_>,
) -> String {
    match attr.namespace() {
        Some(XML_NS) => format!("xml:{}", attr.name()),
        Some(ns_uri) => match node.lookup_prefix(ns_uri) {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, attr.name()),
            _ => attr.name().to_owned(),
        },
        None => attr.name().to_owned(),
    }
}
