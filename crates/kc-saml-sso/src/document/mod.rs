//! In-memory XML document model.
//!
//! SAML messages are handled as a small element tree rather than as raw
//! strings so that the signer and the verifier can produce the same canonical
//! form, and so that callers can mutate a built message before transport.
//!
//! Element and attribute names are kept exactly as written (including any
//! namespace prefix). Lookups accept either the qualified or the local name.

mod reader;
mod writer;

use crate::error::SamlResult;

/// A single attribute on an element. The value is stored unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Qualified attribute name, e.g. `ID` or `xmlns:samlp`.
    pub name: String,
    /// Unescaped attribute value.
    pub value: String,
}

impl XmlAttribute {
    /// Creates a new attribute.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns true if this attribute is a namespace declaration.
    #[must_use]
    pub fn is_namespace_declaration(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }
}

/// A child node of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// A nested element.
    Element(XmlElement),
    /// Character data, stored unescaped.
    Text(String),
}

/// An XML element with its attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<XmlAttribute>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute, replacing any existing attribute with the same name.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Appends a text node.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Returns the qualified name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name without its namespace prefix.
    #[must_use]
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Returns the namespace prefix, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Returns true if `name` matches this element's qualified or local name.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || (!name.contains(':') && self.local_name() == name)
    }

    /// Returns the attributes in document order.
    #[must_use]
    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    /// Returns the value of the named attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Sets an attribute, keeping its position if it already exists.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(XmlAttribute { name, value }),
        }
    }

    /// Removes an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(index).value)
    }

    /// Resolves a namespace prefix declared on this element.
    ///
    /// `None` looks up the default namespace.
    #[must_use]
    pub fn declared_namespace(&self, prefix: Option<&str>) -> Option<&str> {
        match prefix {
            Some(prefix) => self.attribute(&format!("xmlns:{prefix}")),
            None => self.attribute("xmlns"),
        }
    }

    /// Returns the child nodes.
    #[must_use]
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Iterates over the child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// Finds the first direct child element matching `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.elements().find(|e| e.matches(name))
    }

    /// Finds the first element matching `name` in this subtree, depth first.
    #[must_use]
    pub fn descendant(&self, name: &str) -> Option<&Self> {
        self.elements()
            .find_map(|e| if e.matches(name) { Some(e) } else { e.descendant(name) })
    }

    fn descendant_or_self_mut(&mut self, name: &str) -> Option<&mut Self> {
        if self.matches(name) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(e) => e.descendant_or_self_mut(name),
            XmlNode::Text(_) => None,
        })
    }

    /// Index of the first direct child element matching `name` within the node list.
    #[must_use]
    pub fn child_position(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(e) if e.matches(name)))
    }

    /// Removes and returns the first direct child element matching `name`.
    pub fn remove_child(&mut self, name: &str) -> Option<Self> {
        let index = self.child_position(name)?;
        match self.children.remove(index) {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        }
    }

    /// Inserts a child element at the given node index (clamped to the end).
    pub fn insert_child(&mut self, index: usize, child: Self) {
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(child));
    }

    /// Concatenated text content of the direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Serializes this element alone in exclusive canonical form.
    #[must_use]
    pub fn canonicalize(&self) -> String {
        writer::canonicalize(self, &[], &[])
    }

    /// Exclusive canonical form of this element as it sits below
    /// `ancestors` (outermost first), whose namespace declarations are in
    /// scope. `inclusive_prefixes` is an `InclusiveNamespaces` prefix list.
    #[must_use]
    pub fn canonicalize_within(&self, ancestors: &[&Self], inclusive_prefixes: &[&str]) -> String {
        writer::canonicalize(self, ancestors, inclusive_prefixes)
    }

    pub(crate) fn push_node(&mut self, node: XmlNode) {
        self.children.push(node);
    }

    pub(crate) fn push_attribute(&mut self, attribute: XmlAttribute) {
        self.attributes.push(attribute);
    }
}

/// A parsed or built XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    root: XmlElement,
}

impl XmlDocument {
    /// Wraps a root element.
    #[must_use]
    pub const fn new(root: XmlElement) -> Self {
        Self { root }
    }

    /// Parses a document from text.
    ///
    /// Comments and processing instructions are discarded. Documents that
    /// carry a `<!DOCTYPE>` are refused.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        reader::parse(xml)
    }

    /// Parses a document from UTF-8 bytes.
    pub fn parse_bytes(xml: &[u8]) -> SamlResult<Self> {
        let text = std::str::from_utf8(xml)
            .map_err(|e| crate::error::SamlError::XmlParse(format!("invalid UTF-8: {e}")))?;
        Self::parse(text)
    }

    /// Returns the root element.
    #[must_use]
    pub const fn root(&self) -> &XmlElement {
        &self.root
    }

    /// Returns the root element mutably.
    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    /// Consumes the document, returning its root element.
    #[must_use]
    pub fn into_root(self) -> XmlElement {
        self.root
    }

    /// Serializes the document as transported on the wire.
    #[must_use]
    pub fn to_xml_string(&self) -> String {
        writer::serialize(&self.root)
    }

    /// Serializes the document in exclusive canonical form.
    #[must_use]
    pub fn canonicalize(&self) -> String {
        writer::canonicalize(&self.root, &[], &[])
    }

    /// Overwrites an attribute on the first element named `element`
    /// (qualified or local name, root included).
    ///
    /// Returns false if no such element exists.
    pub fn set_element_attribute(
        &mut self,
        element: &str,
        attribute: &str,
        value: impl Into<String>,
    ) -> bool {
        match self.root.descendant_or_self_mut(element) {
            Some(e) => {
                e.set_attribute(attribute, value);
                true
            }
            None => false,
        }
    }

    /// Applies an arbitrary mutation and returns the result.
    #[must_use]
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        f(&mut self);
        self
    }
}

/// Strips the namespace prefix from a qualified name.
pub(crate) fn local_part(name: &str) -> &str {
    name.split_once(':').map_or(name, |(_, local)| local)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XmlDocument {
        XmlDocument::new(
            XmlElement::new("samlp:AuthnRequest")
                .with_attribute("xmlns:samlp", "urn:oasis:names:tc:SAML:2.0:protocol")
                .with_attribute("ID", "_abc")
                .with_child(XmlElement::new("saml:Issuer").with_text("sp")),
        )
    }

    #[test]
    fn matches_qualified_and_local_names() {
        let doc = sample();
        assert!(doc.root().matches("samlp:AuthnRequest"));
        assert!(doc.root().matches("AuthnRequest"));
        assert!(!doc.root().matches("saml:AuthnRequest"));
        assert_eq!(doc.root().prefix(), Some("samlp"));
        assert_eq!(
            doc.root().declared_namespace(Some("samlp")),
            Some("urn:oasis:names:tc:SAML:2.0:protocol")
        );
    }

    #[test]
    fn set_element_attribute_on_root_and_child() {
        let mut doc = sample();
        assert!(doc.set_element_attribute("AuthnRequest", "ID", "poisoned"));
        assert_eq!(doc.root().attribute("ID"), Some("poisoned"));

        assert!(doc.set_element_attribute("saml:Issuer", "Format", "x"));
        assert_eq!(doc.root().child("Issuer").and_then(|i| i.attribute("Format")), Some("x"));

        assert!(!doc.set_element_attribute("Missing", "ID", "x"));
    }

    #[test]
    fn transform_leaves_other_content_untouched() {
        let original = sample();
        let changed = original.clone().transform(|doc| {
            doc.set_element_attribute("AuthnRequest", "ID", "other");
        });

        assert_eq!(changed.root().attribute("ID"), Some("other"));
        assert_eq!(changed.root().child("Issuer"), original.root().child("Issuer"));
        assert_eq!(changed.root().attributes().len(), original.root().attributes().len());
    }

    #[test]
    fn remove_and_insert_child() {
        let mut doc = sample();
        let issuer = doc.root_mut().remove_child("Issuer").expect("issuer");
        assert!(doc.root().child("Issuer").is_none());

        doc.root_mut().insert_child(10, issuer);
        assert_eq!(doc.root().child("Issuer").map(XmlElement::text).as_deref(), Some("sp"));
    }
}
