#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! The key difference from inclusive C14N: only "visibly utilized"
//! namespace declarations are output.  A namespace is visibly utilized if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList.
//!
//! Signature processing declares the `ds` prefix as inclusive for
//! compatibility with existing xmldsig implementations.

use crate::escape;
use crate::inclusive::{attr_qualified_name, collect_inscope_namespaces, qualified_element_name};
use crate::render::{Attr, NsDecl};
use sigtuna_core::Error;
use sigtuna_xml::NodeSet;
use std::collections::{BTreeMap, BTreeSet};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let mut ctx = ExcC14nContext {
        with_comments,
        node_set,
        inclusive_prefixes,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct ExcC14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: &'a [String],
}

impl ExcC14nContext<'_> {
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
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            roxmltree::NodeType::Element => {
                self.process_element(node, output, rendered_ns)?;
            }
            roxmltree::NodeType::Text => {
                if self.is_visible(&node) {
                    let text = node.text().unwrap_or("");
                    output.extend_from_slice(escape::escape_text(text).as_bytes());
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    output.extend_from_slice(b"<!--");
                    output.extend_from_slice(node.text().unwrap_or("").as_bytes());
                    output.extend_from_slice(b"-->");
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(&node) {
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
                }
            }
        }
        Ok(())
    }

    fn process_element(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(&node) {
            for child in node.children() {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }

        // Determine which prefixes are visibly utilized at this element.
        let mut utilized: BTreeSet<String> = BTreeSet::new();

        let elem_prefix = match node.tag_name().namespace() {
            Some(ns_uri) => node
                .lookup_prefix(ns_uri)
                .unwrap_or("")
                .to_owned(),
            None => String::new(),
        };
        utilized.insert(elem_prefix);

        for attr in node.attributes() {
            match attr.namespace() {
                Some(XML_NS) | None => {}
                Some(ns_uri) => {
                    if let Some(prefix) = node.lookup_prefix(ns_uri) {
                        if !prefix.is_empty() {
                            utilized.insert(prefix.to_owned());
                        }
                    }
                }
            }
        }

        for p in self.inclusive_prefixes {
            if p == "#default" {
                utilized.insert(String::new());
            } else {
                utilized.insert(p.clone());
            }
        }

        let inscope_ns = collect_inscope_namespaces(&node);

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized {
            if prefix == "xml" {
                continue;
            }
            match inscope_ns.get(prefix) {
                Some(uri) => {
                    if rendered_ns.get(prefix) != Some(uri) {
                        ns_decls.push(NsDecl {
                            prefix: prefix.clone(),
                            uri: uri.clone(),
                        });
                    }
                }
                None => {
                    // Utilized default prefix with no binding in scope:
                    // undeclare if an ancestor rendered a default namespace.
                    if prefix.is_empty()
                        && rendered_ns.get("").map_or(false, |u| !u.is_empty())
                    {
                        ns_decls.push(NsDecl {
                            prefix: String::new(),
                            uri: String::new(),
                        });
                    }
                }
            }
        }
        ns_decls.sort();

        let mut attrs: Vec<Attr> = Vec::new();
        for attr in node.attributes() {
            attrs.push(Attr {
                ns_uri: attr.namespace().unwrap_or("").to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name: attr_qualified_name(&node, &attr),
                value: attr.value().to_owned(),
            });
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

        let mut child_ns = rendered_ns.clone();
        for decl in &ns_decls {
            child_ns.insert(decl.prefix.clone(), decl.uri.clone());
        }
        for child in node.children() {
            self.process_node(child, output, &child_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exc_c14n(xml: &str, prefixes: &[&str]) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        let prefixes: Vec<String> = prefixes.iter().map(|s| s.to_string()).collect();
        String::from_utf8(canonicalize(&doc, false, None, &prefixes).unwrap()).unwrap()
    }

    #[test]
    fn unused_namespaces_are_dropped() {
        let out = exc_c14n(
            r#"<p:r xmlns:p="http://p" xmlns:unused="http://u"><p:c/></p:r>"#,
            &[],
        );
        assert_eq!(out, r#"<p:r xmlns:p="http://p"><p:c></p:c></p:r>"#);
    }

    #[test]
    fn inclusive_prefix_list_forces_output() {
        let out = exc_c14n(
            r#"<p:r xmlns:p="http://p" xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><p:c/></p:r>"#,
            &["ds"],
        );
        assert!(out.contains(r#"xmlns:ds="http://www.w3.org/2000/09/xmldsig#""#));
    }

    #[test]
    fn declaration_is_not_repeated_on_children() {
        let out = exc_c14n(r#"<p:r xmlns:p="http://p"><p:c><p:d/></p:c></p:r>"#, &[]);
        assert_eq!(
            out,
            r#"<p:r xmlns:p="http://p"><p:c><p:d></p:d></p:c></p:r>"#
        );
    }
}
