//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression.
//!
//! Signatures on this binding are detached: they cover the query string
//! octets `SAMLRequest=..[&RelayState=..]&SigAlg=..` exactly as sent, so
//! decoding keeps the raw wire form of those parameters.

use axum::http::Method;
use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::document::XmlDocument;
use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

use super::post::html_escape;
use super::{BindingRequest, DecodeLimits, DecodedMessage, RedirectSignature, SamlMessageType};

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes a SAML request for HTTP-Redirect binding.
    ///
    /// With a signer, `SigAlg` and `Signature` are appended; the signature
    /// covers the preceding parameters in their fixed order.
    pub fn encode_request(
        doc: &XmlDocument,
        destination: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<BindingRequest> {
        let url = Self::encode_url(
            &doc.to_xml_string(),
            destination,
            relay_state,
            signer,
            SamlMessageType::Request,
        )?;

        Ok(BindingRequest {
            binding: SamlBinding::HttpRedirect,
            method: Method::GET,
            url,
            form: Vec::new(),
        })
    }

    /// Encodes a SAML response for HTTP-Redirect binding.
    ///
    /// Returns a URL with the encoded message in query parameters.
    pub fn encode_response(
        doc: &XmlDocument,
        destination: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        Self::encode_url(
            &doc.to_xml_string(),
            destination,
            relay_state,
            signer,
            SamlMessageType::Response,
        )
    }

    fn encode_url(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&compressed);

        let mut query = format!("{}={}", message_type.form_param(), urlencoding::encode(&encoded));
        if let Some(rs) = relay_state {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(rs));
        }

        if let Some(signer) = signer {
            query.push_str("&SigAlg=");
            query.push_str(&urlencoding::encode(signer.algorithm().uri()));
            let signature = signer.sign_redirect(&query)?;
            query.push_str("&Signature=");
            query.push_str(&urlencoding::encode(&signature));
        }

        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a SAML message from a raw (still percent-encoded) query string.
    ///
    /// Unrelated parameters are ignored. Repeating a SAML parameter is an error.
    pub fn decode_query(raw_query: &str, limits: &DecodeLimits) -> SamlResult<DecodedMessage> {
        let params = RawQuery::parse(raw_query)?;

        let (raw_message, message_type) = if let Some(req) = params.get("SAMLRequest") {
            (req, SamlMessageType::Request)
        } else if let Some(resp) = params.get("SAMLResponse") {
            (resp, SamlMessageType::Response)
        } else {
            return Err(SamlError::InvalidRequest(
                "No SAMLRequest or SAMLResponse parameter".to_string(),
            ));
        };

        limits.check_encoded(raw_message.len())?;

        let encoded = form_decode(raw_message);
        let compressed = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
        let xml_bytes = deflate_decompress(&compressed, limits.max_inflated_size)?;
        let xml = String::from_utf8(xml_bytes)
            .map_err(|e| SamlError::InvalidRequest(format!("Invalid UTF-8 in message: {e}")))?;

        let redirect_signature = match (params.get("SigAlg"), params.get("Signature")) {
            (None, None) => None,
            (Some(sig_alg), Some(signature)) => Some(RedirectSignature {
                signed_octets: params.signed_octets(message_type),
                sig_alg: form_decode(sig_alg),
                signature: form_decode(signature),
            }),
            _ => {
                return Err(SamlError::SignatureInvalid(
                    "SigAlg and Signature must be sent together".to_string(),
                ))
            }
        };

        Ok(DecodedMessage {
            xml,
            message_type,
            binding: SamlBinding::HttpRedirect,
            relay_state: params.get("RelayState").map(form_decode),
            redirect_signature,
        })
    }

    /// Returns true if the raw query carries the message parameter. Keys are
    /// matched undecoded, the same way [`Self::decode_query`] reads them.
    #[must_use]
    pub fn carries_message(raw_query: &str, message_type: SamlMessageType) -> bool {
        raw_pairs(raw_query).any(|(key, _)| key == message_type.form_param())
    }

    /// Decodes a message from a full URL.
    pub fn decode_url(url: &str, limits: &DecodeLimits) -> SamlResult<DecodedMessage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::InvalidRequest(format!("Invalid URL: {e}")))?;
        Self::decode_query(parsed.query().unwrap_or_default(), limits)
    }

    /// Renders a page that sends the browser to `url`.
    #[must_use]
    pub fn render_link(url: &str) -> String {
        let url = html_escape(url);
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta http-equiv="refresh" content="0;url={url}">
    <title>SAML Redirect Binding</title>
</head>
<body>
    <a href="{url}">Continue</a>
</body>
</html>"#
        )
    }
}

/// Splits a query into `key=value` pairs without decoding either side.
fn raw_pairs(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
}

/// Query parameters kept in their raw wire form and wire order.
struct RawQuery<'a> {
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> RawQuery<'a> {
    const SAML_PARAMS: [&'static str; 5] =
        ["SAMLRequest", "SAMLResponse", "RelayState", "SigAlg", "Signature"];

    fn parse(raw: &'a str) -> SamlResult<Self> {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        for (key, value) in raw_pairs(raw) {
            if !Self::SAML_PARAMS.iter().any(|p| *p == key) {
                continue;
            }
            if pairs.iter().any(|(k, _)| *k == key) {
                return Err(SamlError::InvalidRequest(format!("duplicate parameter: {key}")));
            }
            pairs.push((key, value));
        }
        Ok(Self { pairs })
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// The signed parameters joined in the order they were received.
    fn signed_octets(&self, message_type: SamlMessageType) -> String {
        self.pairs
            .iter()
            .filter(|(k, _)| {
                *k == message_type.form_param() || *k == "RelayState" || *k == "SigAlg"
            })
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Decodes an `application/x-www-form-urlencoded` value.
fn form_decode(raw: &str) -> String {
    url::form_urlencoded::parse(format!("v={raw}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("Compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("Compression finish error: {e}")))
}

/// Decompresses DEFLATE data, refusing output larger than `limit`.
fn deflate_decompress(data: &[u8], limit: usize) -> SamlResult<Vec<u8>> {
    let ceiling = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut decoder = DeflateDecoder::new(data).take(ceiling);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("Decompression error: {e}")))?;
    if decompressed.len() > limit {
        return Err(SamlError::MessageTooLarge {
            size: decompressed.len(),
            limit,
        });
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::XmlElement;

    fn doc() -> XmlDocument {
        XmlDocument::new(XmlElement::new("samlp:AuthnRequest").with_text("test content here"))
    }

    #[test]
    fn encode_and_decode_request() {
        let request = HttpRedirectBinding::encode_request(
            &doc(),
            "https://idp.example.com/sso",
            Some("state 123"),
            None,
        )
        .unwrap();

        assert_eq!(request.method, Method::GET);
        assert!(request.url.starts_with("https://idp.example.com/sso?SAMLRequest="));
        assert!(request.url.contains("&RelayState=state%20123"));

        let decoded = HttpRedirectBinding::decode_url(&request.url, &DecodeLimits::default()).unwrap();
        assert_eq!(decoded.xml, doc().to_xml_string());
        assert_eq!(decoded.message_type, SamlMessageType::Request);
        assert_eq!(decoded.relay_state.as_deref(), Some("state 123"));
        assert!(decoded.redirect_signature.is_none());
    }

    #[test]
    fn encode_and_decode_response() {
        let url = HttpRedirectBinding::encode_response(&doc(), "https://sp.example.com/acs", None, None)
            .unwrap();

        assert!(url.contains("SAMLResponse="));

        let decoded = HttpRedirectBinding::decode_url(&url, &DecodeLimits::default()).unwrap();
        assert_eq!(decoded.message_type, SamlMessageType::Response);
    }

    #[test]
    fn deflate_roundtrip() {
        let original = b"Test data for compression";
        let compressed = deflate_compress(original).unwrap();
        let decompressed = deflate_decompress(&compressed, 1024).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn inflate_respects_limit() {
        let compressed = deflate_compress(&[b'a'; 4096]).unwrap();
        assert!(matches!(
            deflate_decompress(&compressed, 1024),
            Err(SamlError::MessageTooLarge { limit: 1024, .. })
        ));
    }

    #[test]
    fn corrupt_stream_is_a_deflate_error() {
        let query = format!(
            "SAMLRequest={}",
            urlencoding::encode(&base64::engine::general_purpose::STANDARD.encode([0xff, 0xff, 0xff]))
        );
        assert!(matches!(
            HttpRedirectBinding::decode_query(&query, &DecodeLimits::default()),
            Err(SamlError::Deflate(_))
        ));
    }

    #[test]
    fn signed_octets_follow_wire_order() {
        let query = "Signature=s&SigAlg=alg%3Ax&foo=bar&RelayState=r%2B&SAMLRequest=m";
        let params = RawQuery::parse(query).unwrap();

        assert_eq!(
            params.signed_octets(SamlMessageType::Request),
            "SigAlg=alg%3Ax&RelayState=r%2B&SAMLRequest=m"
        );
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        assert!(RawQuery::parse("SAMLRequest=a&SAMLRequest=b").is_err());
        assert!(RawQuery::parse("foo=a&foo=b&SAMLRequest=c").is_ok());
    }

    #[test]
    fn half_signed_query_is_rejected() {
        let request = HttpRedirectBinding::encode_request(&doc(), "https://idp/sso", None, None).unwrap();
        let url = format!("{}&SigAlg=x", request.url);
        assert!(matches!(
            HttpRedirectBinding::decode_url(&url, &DecodeLimits::default()),
            Err(SamlError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn message_presence_uses_raw_keys() {
        let request = SamlMessageType::Request;
        assert!(HttpRedirectBinding::carries_message("SAMLRequest=abc&RelayState=x", request));
        assert!(HttpRedirectBinding::carries_message("RelayState=x&SAMLRequest=", request));
        assert!(!HttpRedirectBinding::carries_message("SAMLResponse=abc", request));
        assert!(!HttpRedirectBinding::carries_message("", request));
        assert!(!HttpRedirectBinding::carries_message("SAML%52equest=abc", request));

        assert!(HttpRedirectBinding::decode_query("SAML%52equest=abc", &DecodeLimits::default()).is_err());
    }

    #[test]
    fn form_decode_handles_plus_and_percent() {
        assert_eq!(form_decode("a+b%2Bc"), "a b+c");
    }

    #[test]
    fn url_with_existing_query() {
        let request = HttpRedirectBinding::encode_request(
            &doc(),
            "https://idp.example.com/sso?existing=param",
            None,
            None,
        )
        .unwrap();

        assert!(request.url.contains("?existing=param&SAMLRequest="));
    }
}
