//! Parsing XML text into the document model.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{XmlAttribute, XmlDocument, XmlElement, XmlNode};
use crate::error::{SamlError, SamlResult};

/// Nesting depth beyond which a document is refused.
const MAX_DEPTH: usize = 64;

pub(super) fn parse(xml: &str) -> SamlResult<XmlDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if root.is_some() {
                    return Err(SamlError::XmlParse("content after root element".to_string()));
                }
                if stack.len() >= MAX_DEPTH {
                    return Err(SamlError::XmlParse("document nested too deeply".to_string()));
                }
                stack.push(start_element(&e)?);
            }
            Event::Empty(e) => {
                if root.is_some() {
                    return Err(SamlError::XmlParse("content after root element".to_string()));
                }
                let element = start_element(&e)?;
                close_element(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("unexpected end tag".to_string()))?;
                close_element(&mut stack, &mut root, element);
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(c) => {
                let text = String::from_utf8(c.into_inner().into_owned())
                    .map_err(|e| SamlError::XmlParse(e.to_string()))?;
                push_text(&mut stack, &text)?;
            }
            Event::DocType(_) => {
                return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
            }
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("unclosed element".to_string()));
    }

    root.map(XmlDocument::new)
        .ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
}

fn start_element(start: &BytesStart<'_>) -> SamlResult<XmlElement> {
    let name = String::from_utf8(start.name().as_ref().to_vec())
        .map_err(|e| SamlError::XmlParse(e.to_string()))?;
    let mut element = XmlElement::new(name);

    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8(attr.key.as_ref().to_vec())
            .map_err(|e| SamlError::XmlParse(e.to_string()))?;
        if element.attribute(&key).is_some() {
            return Err(SamlError::XmlParse(format!("duplicate attribute: {key}")));
        }
        let value = attr.unescape_value()?.into_owned();
        element.push_attribute(XmlAttribute::new(key, value));
    }

    Ok(element)
}

fn close_element(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.push_node(XmlNode::Element(element)),
        None => *root = Some(element),
    }
}

fn push_text(stack: &mut [XmlElement], text: &str) -> SamlResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push_node(XmlNode::Text(text.to_string()));
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(SamlError::XmlParse("text outside root element".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_elements_attributes_and_text() {
        let doc = parse(
            r#"<?xml version="1.0"?>
<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_1" Destination="https://idp/?a=1&amp;b=2"><saml:Issuer>sp &lt;one&gt;</saml:Issuer><!-- note --></samlp:AuthnRequest>"#,
        )
        .expect("parse");

        let root = doc.root();
        assert_eq!(root.name(), "samlp:AuthnRequest");
        assert_eq!(root.attribute("Destination"), Some("https://idp/?a=1&b=2"));
        assert_eq!(root.child("Issuer").map(XmlElement::text).as_deref(), Some("sp <one>"));
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn rejects_doctype() {
        let xml = r#"<!DOCTYPE foo [<!ENTITY x "y">]><foo>&x;</foo>"#;
        assert!(matches!(parse(xml), Err(SamlError::XmlParse(_))));
    }

    #[test]
    fn rejects_unbalanced_and_trailing_content() {
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("<a>").is_err());
        assert!(parse("<a/><b/>").is_err());
        assert!(parse("text<a/>").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn rejects_duplicate_attributes() {
        assert!(parse(r#"<a ID="1" ID="2"/>"#).is_err());
    }

    #[test]
    fn rejects_excessive_nesting() {
        let xml = format!("{}{}", "<a>".repeat(MAX_DEPTH + 1), "</a>".repeat(MAX_DEPTH + 1));
        assert!(parse(&xml).is_err());
    }
}
