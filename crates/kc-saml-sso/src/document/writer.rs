//! Serialization of the document model.
//!
//! Two forms are produced: the wire form, which preserves attribute order
//! and uses self-closing tags, and the exclusive canonical form
//! (`http://www.w3.org/2001/10/xml-exc-c14n#`) that signatures are computed
//! over.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use quick_xml::escape::escape;

use super::{XmlAttribute, XmlElement, XmlNode};

pub(super) fn serialize(root: &XmlElement) -> String {
    let mut out = String::new();
    write_wire(&mut out, root);
    out
}

fn write_wire(out: &mut String, element: &XmlElement) {
    out.push('<');
    out.push_str(element.name());
    for attr in element.attributes() {
        let _ = write!(out, " {}=\"{}\"", attr.name, escape(attr.value.as_str()));
    }
    if element.children().is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for node in element.children() {
        match node {
            XmlNode::Element(child) => write_wire(out, child),
            XmlNode::Text(text) => out.push_str(&escape(text.as_str())),
        }
    }
    let _ = write!(out, "</{}>", element.name());
}

/// Namespace bindings keyed by prefix, `""` standing for the default namespace.
type Bindings<'a> = BTreeMap<&'a str, &'a str>;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Exclusive XML canonicalization (without comments) of `element`.
///
/// `ancestors` are the enclosing elements, outermost first, whose namespace
/// declarations are in scope. A declaration is rendered only on an element
/// that visibly uses its prefix, unless an output ancestor already rendered
/// the same binding. Prefixes listed in `inclusive_prefixes` (`#default` for
/// the default namespace) are rendered wherever they are in scope.
pub(super) fn canonicalize<'a>(
    element: &'a XmlElement,
    ancestors: &[&'a XmlElement],
    inclusive_prefixes: &[&'a str],
) -> String {
    let mut in_scope = Bindings::new();
    for &ancestor in ancestors {
        declare(ancestor, &mut in_scope);
    }
    let inclusive: Vec<&'a str> = inclusive_prefixes
        .iter()
        .map(|p| if *p == "#default" { "" } else { *p })
        .collect();

    let mut out = String::new();
    write_canonical(&mut out, element, &in_scope, &Bindings::new(), &inclusive);
    out
}

fn declare<'a>(element: &'a XmlElement, scope: &mut Bindings<'a>) {
    for attr in element.attributes() {
        if let Some(prefix) = declared_prefix(&attr.name) {
            scope.insert(prefix, attr.value.as_str());
        }
    }
}

fn declared_prefix(name: &str) -> Option<&str> {
    if name == "xmlns" {
        Some("")
    } else {
        name.strip_prefix("xmlns:")
    }
}

fn write_canonical<'a>(
    out: &mut String,
    element: &'a XmlElement,
    inherited: &Bindings<'a>,
    rendered: &Bindings<'a>,
    inclusive: &[&'a str],
) {
    let mut in_scope = inherited.clone();
    declare(element, &mut in_scope);

    let mut utilized: BTreeSet<&'a str> = BTreeSet::new();
    utilized.insert(element.prefix().unwrap_or(""));
    for attr in element.attributes().iter().filter(|a| !a.is_namespace_declaration()) {
        if let Some((prefix, _)) = attr.name.split_once(':') {
            if prefix != "xml" {
                utilized.insert(prefix);
            }
        }
    }
    utilized.extend(inclusive.iter().copied().filter(|p| in_scope.contains_key(p)));

    let mut now_rendered = rendered.clone();
    let mut declarations: Vec<(&str, &str)> = Vec::new();
    for prefix in utilized {
        let uri = in_scope.get(prefix).copied().unwrap_or("");
        let previous = rendered.get(prefix).copied().unwrap_or("");
        if previous == uri || (uri.is_empty() && !prefix.is_empty()) {
            continue;
        }
        declarations.push((prefix, uri));
        now_rendered.insert(prefix, uri);
    }

    let mut attributes: Vec<(&str, &str, &XmlAttribute)> = element
        .attributes()
        .iter()
        .filter(|a| !a.is_namespace_declaration())
        .map(|a| match a.name.split_once(':') {
            Some(("xml", local)) => (XML_NAMESPACE, local, a),
            Some((prefix, local)) => (in_scope.get(prefix).copied().unwrap_or(""), local, a),
            None => ("", a.name.as_str(), a),
        })
        .collect();
    attributes.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    out.push('<');
    out.push_str(element.name());
    for (prefix, uri) in declarations {
        out.push_str(" xmlns");
        if !prefix.is_empty() {
            out.push(':');
            out.push_str(prefix);
        }
        out.push_str("=\"");
        escape_attribute(out, uri);
        out.push('"');
    }
    for (_, _, attr) in attributes {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        escape_attribute(out, &attr.value);
        out.push('"');
    }
    out.push('>');
    for node in element.children() {
        match node {
            XmlNode::Element(child) => write_canonical(out, child, &in_scope, &now_rendered, inclusive),
            XmlNode::Text(text) => escape_text(out, text),
        }
    }
    out.push_str("</");
    out.push_str(element.name());
    out.push('>');
}

fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

fn escape_text(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}
