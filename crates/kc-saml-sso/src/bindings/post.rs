//! HTTP-POST Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-POST binding for sending SAML messages
//! via HTML form POST.

use axum::http::Method;
use base64::Engine;

use crate::document::XmlDocument;
use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

use super::{BindingRequest, DecodeLimits, DecodedMessage, SamlMessageType};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Encodes a SAML request for HTTP-POST binding.
    ///
    /// When a signer is given the document is signed before serialization.
    pub fn encode_request(
        doc: &XmlDocument,
        destination: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<BindingRequest> {
        let xml = match signer {
            Some(signer) => signer.sign_document(doc)?.to_xml_string(),
            None => doc.to_xml_string(),
        };

        Ok(BindingRequest {
            binding: SamlBinding::HttpPost,
            method: Method::POST,
            url: destination.to_string(),
            form: Self::form_fields(&xml, relay_state, SamlMessageType::Request),
        })
    }

    /// Encodes a SAML response for HTTP-POST binding.
    ///
    /// Returns an HTML form that will auto-submit to the destination.
    #[must_use]
    pub fn encode_response(doc: &XmlDocument, destination: &str, relay_state: Option<&str>) -> String {
        let form = Self::form_fields(&doc.to_xml_string(), relay_state, SamlMessageType::Response);
        Self::render_form(destination, &form)
    }

    fn form_fields(
        xml: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> Vec<(String, String)> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(xml);
        let mut form = vec![(message_type.form_param().to_string(), encoded)];
        if let Some(rs) = relay_state {
            form.push(("RelayState".to_string(), rs.to_string()));
        }
        form
    }

    /// Renders an auto-submitting form posting `fields` to `action`.
    #[must_use]
    pub fn render_form(action: &str, fields: &[(String, String)]) -> String {
        let inputs: String = fields
            .iter()
            .map(|(name, value)| {
                format!(
                    r#"<input type="hidden" name="{}" value="{}"/>"#,
                    html_escape(name),
                    html_escape(value)
                )
            })
            .collect::<Vec<_>>()
            .join("\n        ");

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            html_escape(action),
            inputs
        )
    }

    /// Decodes a SAML message from HTTP-POST form data.
    ///
    /// Whitespace inside the base64 value is ignored, since some senders
    /// wrap it at 76 columns.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
        limits: &DecodeLimits,
    ) -> SamlResult<DecodedMessage> {
        let (encoded, message_type) = if let Some(req) = saml_request {
            (req, SamlMessageType::Request)
        } else if let Some(resp) = saml_response {
            (resp, SamlMessageType::Response)
        } else {
            return Err(SamlError::InvalidRequest(
                "No SAMLRequest or SAMLResponse parameter".to_string(),
            ));
        };

        limits.check_encoded(encoded.len())?;

        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;
        if decoded.len() > limits.max_inflated_size {
            return Err(SamlError::MessageTooLarge {
                size: decoded.len(),
                limit: limits.max_inflated_size,
            });
        }

        let xml = String::from_utf8(decoded)
            .map_err(|e| SamlError::InvalidRequest(format!("Invalid UTF-8 in message: {e}")))?;

        Ok(DecodedMessage {
            xml,
            message_type,
            binding: SamlBinding::HttpPost,
            relay_state: relay_state.map(String::from),
            redirect_signature: None,
        })
    }

    /// Recovers the message carried by an auto-submit page produced by
    /// [`Self::render_form`] or a compatible sender.
    pub fn decode_html(html: &str, limits: &DecodeLimits) -> SamlResult<DecodedMessage> {
        let mut saml_request = None;
        let mut saml_response = None;
        let mut relay_state = None;

        let mut rest = html;
        while let Some(start) = rest.find("<input") {
            let tag_rest = &rest[start..];
            let end = tag_rest
                .find('>')
                .ok_or_else(|| SamlError::InvalidRequest("unterminated input tag".to_string()))?;
            let tag = &tag_rest[..end];

            if let (Some(name), Some(value)) = (tag_attribute(tag, "name"), tag_attribute(tag, "value")) {
                let value = html_unescape(value)?;
                match name {
                    "SAMLRequest" => saml_request = Some(value),
                    "SAMLResponse" => saml_response = Some(value),
                    "RelayState" => relay_state = Some(value),
                    _ => {}
                }
            }
            rest = &tag_rest[end..];
        }

        Self::decode(
            saml_request.as_deref(),
            saml_response.as_deref(),
            relay_state.as_deref(),
            limits,
        )
    }
}

/// Finds `name="..."` inside a single tag.
fn tag_attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let len = tag[start..].find('"')?;
    Some(&tag[start..start + len])
}

/// Escapes HTML special characters.
pub(crate) fn html_escape(s: &str) -> String {
    quick_xml::escape::escape(s).into_owned()
}

/// Resolves character and predefined entity references in an attribute value.
fn html_unescape(s: &str) -> SamlResult<String> {
    quick_xml::escape::unescape(s)
        .map(|value| value.into_owned())
        .map_err(|e| SamlError::InvalidRequest(format!("Invalid form field value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::XmlElement;

    fn doc() -> XmlDocument {
        XmlDocument::new(XmlElement::new("samlp:AuthnRequest").with_text("test"))
    }

    #[test]
    fn encode_and_decode_request() {
        let request =
            HttpPostBinding::encode_request(&doc(), "https://idp.example.com", Some("state123"), None)
                .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "https://idp.example.com");
        assert_eq!(request.form_value("RelayState"), Some("state123"));

        let decoded = HttpPostBinding::decode(
            request.form_value("SAMLRequest"),
            None,
            request.form_value("RelayState"),
            &DecodeLimits::default(),
        )
        .unwrap();
        assert_eq!(decoded.xml, doc().to_xml_string());
        assert_eq!(decoded.message_type, SamlMessageType::Request);
        assert_eq!(decoded.binding, SamlBinding::HttpPost);
        assert_eq!(decoded.relay_state.as_deref(), Some("state123"));
    }

    #[test]
    fn encode_response_and_decode_html() {
        let response = XmlDocument::new(XmlElement::new("samlp:Response").with_text("ok"));
        let html =
            HttpPostBinding::encode_response(&response, "https://sp.example.com/acs", Some("a&b"));

        assert!(html.contains("SAMLResponse"));
        assert!(html.contains(r#"action="https://sp.example.com/acs""#));

        let decoded = HttpPostBinding::decode_html(&html, &DecodeLimits::default()).unwrap();
        assert_eq!(decoded.xml, response.to_xml_string());
        assert_eq!(decoded.message_type, SamlMessageType::Response);
        assert_eq!(decoded.relay_state.as_deref(), Some("a&b"));
    }

    #[test]
    fn decode_tolerates_wrapped_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("<a>hello world</a>");
        let wrapped = format!("{}\r\n{}", &encoded[..8], &encoded[8..]);

        let decoded =
            HttpPostBinding::decode(Some(&wrapped), None, None, &DecodeLimits::default()).unwrap();
        assert_eq!(decoded.xml, "<a>hello world</a>");
    }

    #[test]
    fn decode_rejects_bad_base64_and_oversize() {
        let limits = DecodeLimits::default();
        assert!(matches!(
            HttpPostBinding::decode(Some("!!not base64!!"), None, None, &limits),
            Err(SamlError::Base64Decode(_))
        ));

        let small = DecodeLimits {
            max_encoded_size: 8,
            max_inflated_size: 8,
        };
        assert!(matches!(
            HttpPostBinding::decode(Some("QUJDREVGR0hJSg=="), None, None, &small),
            Err(SamlError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn decode_missing_message() {
        let result = HttpPostBinding::decode(None, None, None, &DecodeLimits::default());
        assert!(result.is_err());
    }

    #[test]
    fn html_escape_special_chars() {
        let input = r#"<script>alert("xss")</script>"#;
        let escaped = html_escape(input);
        assert!(!escaped.contains('<'));
        assert!(!escaped.contains('>'));
        assert!(!escaped.contains('"'));
        assert_eq!(html_unescape(&escaped).expect("unescape"), input);
    }

    #[test]
    fn html_unescape_resolves_character_references() {
        assert_eq!(html_unescape("a&#43;b&#x2F;c&#61;").expect("unescape"), "a+b/c=");
        assert_eq!(html_unescape("&amp;lt;&apos;").expect("unescape"), "&lt;'");
        assert!(matches!(html_unescape("&nope;"), Err(SamlError::InvalidRequest(_))));
    }

    #[test]
    fn decode_html_reads_numeric_references() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("<a>x</a>");
        let referenced = encoded.replace('+', "&#43;").replace('/', "&#x2F;").replace('=', "&#61;");
        let page = format!(
            r#"<form><input type="hidden" name="SAMLRequest" value="{referenced}"/><input type="hidden" name="RelayState" value="s&#x26;t"/></form>"#
        );

        let decoded = HttpPostBinding::decode_html(&page, &DecodeLimits::default()).expect("decode");
        assert_eq!(decoded.xml, "<a>x</a>");
        assert_eq!(decoded.relay_state.as_deref(), Some("s&t"));
    }
}
