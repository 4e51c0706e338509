//! SAML bindings implementation.
//!
//! This module implements the SAML 2.0 bindings for message transport:
//!
//! - **HTTP-POST Binding** - Messages are base64-encoded and sent in HTML forms
//! - **HTTP-Redirect Binding** - Messages are deflated, base64-encoded, and URL-encoded
//!
//! # Usage
//!
//! ```rust,ignore
//! use kc_saml_sso::types::SamlBinding;
//!
//! let request = SamlBinding::HttpRedirect.encode_request(&doc, endpoint, Some("state"), None)?;
//! let http = request.into_http_request()?;
//! ```

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

pub(crate) use post::html_escape;

use axum::body::Body;
use axum::http::{header, Method, Request};

use crate::document::XmlDocument;
use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// AuthnRequest message.
    Request,
    /// Response message.
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// Detached signature carried by the Redirect binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSignature {
    /// The signed parameters exactly as they appeared on the wire.
    pub signed_octets: String,
    /// The `SigAlg` parameter, decoded.
    pub sig_alg: String,
    /// The `Signature` parameter, decoded (still base64).
    pub signature: String,
}

/// Decoded SAML binding message.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// The decoded XML message.
    pub xml: String,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The binding the message arrived on.
    pub binding: SamlBinding,
    /// The RelayState if present.
    pub relay_state: Option<String>,
    /// Detached signature, Redirect binding only.
    pub redirect_signature: Option<RedirectSignature>,
}

/// Size ceilings applied while decoding inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum length of the encoded message parameter.
    pub max_encoded_size: usize,
    /// Maximum size of the decoded (and inflated) XML.
    pub max_inflated_size: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_encoded_size: 512 * 1024,
            max_inflated_size: 1024 * 1024,
        }
    }
}

impl DecodeLimits {
    pub(crate) const fn check_encoded(&self, size: usize) -> SamlResult<()> {
        if size > self.max_encoded_size {
            return Err(SamlError::MessageTooLarge {
                size,
                limit: self.max_encoded_size,
            });
        }
        Ok(())
    }
}

/// An encoded message ready to be sent by a browser or HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRequest {
    /// The binding used.
    pub binding: SamlBinding,
    /// `POST` for the POST binding, `GET` for Redirect.
    pub method: Method,
    /// Target URL; carries the query string for Redirect.
    pub url: String,
    /// Form fields for the POST binding, in order.
    pub form: Vec<(String, String)>,
}

impl BindingRequest {
    /// Returns a form field by name.
    #[must_use]
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The `application/x-www-form-urlencoded` body for the POST binding.
    #[must_use]
    pub fn form_body(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.form.iter())
            .finish()
    }

    /// Renders the auto-submitting HTML page for the POST binding.
    ///
    /// For Redirect this is a plain link page pointing at the URL.
    #[must_use]
    pub fn to_html_form(&self) -> String {
        match self.binding {
            SamlBinding::HttpPost => HttpPostBinding::render_form(&self.url, &self.form),
            SamlBinding::HttpRedirect => HttpRedirectBinding::render_link(&self.url),
        }
    }

    /// Converts into an HTTP request.
    pub fn into_http_request(self) -> SamlResult<Request<Body>> {
        let builder = Request::builder().method(self.method.clone()).uri(&self.url);
        let request = match self.binding {
            SamlBinding::HttpPost => builder
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(self.form_body())),
            SamlBinding::HttpRedirect => builder.body(Body::empty()),
        };
        request.map_err(|e| SamlError::Internal(format!("failed to build HTTP request: {e}")))
    }
}

impl SamlBinding {
    /// Encodes a request document for this binding.
    ///
    /// With a signer, POST embeds an enveloped signature in the document and
    /// Redirect signs the query string.
    pub fn encode_request(
        self,
        doc: &XmlDocument,
        endpoint: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<BindingRequest> {
        match self {
            Self::HttpPost => HttpPostBinding::encode_request(doc, endpoint, relay_state, signer),
            Self::HttpRedirect => {
                HttpRedirectBinding::encode_request(doc, endpoint, relay_state, signer)
            }
        }
    }
}
