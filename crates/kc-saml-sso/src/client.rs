//! Requester-side AuthnRequest builder.
//!
//! Produces the HTTP request a service provider would send through the
//! browser. The order of steps is fixed: the message is modelled, turned into
//! a document, optionally rewritten, optionally signed and finally encoded for
//! the chosen binding.
//!
//! ```rust,ignore
//! let request = SamlRequestBuilder::authn_request(endpoint, client_id, acs, SamlBinding::HttpPost)
//!     .no_destination()
//!     .sign_with(signer)
//!     .build()?
//!     .into_http_request()?;
//! ```

use std::fmt;

use tracing::debug;

use crate::bindings::BindingRequest;
use crate::document::XmlDocument;
use crate::error::SamlResult;
use crate::signature::XmlSigner;
use crate::types::{AuthnRequest, SamlBinding};

type DocumentTransform = Box<dyn FnOnce(XmlDocument) -> XmlDocument + Send>;

/// Builds an encoded AuthnRequest.
pub struct SamlRequestBuilder {
    endpoint: String,
    request: AuthnRequest,
    binding: SamlBinding,
    relay_state: Option<String>,
    transform: Option<DocumentTransform>,
    signer: Option<XmlSigner>,
}

impl fmt::Debug for SamlRequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamlRequestBuilder")
            .field("endpoint", &self.endpoint)
            .field("request", &self.request)
            .field("binding", &self.binding)
            .field("relay_state", &self.relay_state)
            .field("transform", &self.transform.is_some())
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

impl SamlRequestBuilder {
    /// Starts an AuthnRequest from `client_id` to `endpoint`.
    ///
    /// `Destination` defaults to `endpoint`.
    pub fn authn_request(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        acs_url: impl Into<String>,
        binding: SamlBinding,
    ) -> Self {
        let endpoint = endpoint.into();
        let request = AuthnRequest::new(client_id)
            .with_acs_url(acs_url)
            .with_destination(endpoint.clone())
            .with_binding(SamlBinding::HttpPost);
        Self {
            endpoint,
            request,
            binding,
            relay_state: None,
            transform: None,
            signer: None,
        }
    }

    /// Overrides the `Destination` attribute.
    #[must_use]
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.request.destination = Some(destination.into());
        self
    }

    /// Omits the `Destination` attribute.
    #[must_use]
    pub fn no_destination(mut self) -> Self {
        self.request.destination = None;
        self
    }

    /// Sets the `ProtocolBinding` the reply should use.
    #[must_use]
    pub fn response_binding(mut self, binding: SamlBinding) -> Self {
        self.request = self.request.with_binding(binding);
        self
    }

    /// Sets RelayState.
    #[must_use]
    pub fn relay_state(mut self, relay_state: impl Into<String>) -> Self {
        self.relay_state = Some(relay_state.into());
        self
    }

    /// Edits the request model before it becomes a document.
    #[must_use]
    pub fn modify_request(mut self, f: impl FnOnce(AuthnRequest) -> AuthnRequest) -> Self {
        self.request = f(self.request);
        self
    }

    /// Rewrites the document after it is built and before it is signed.
    #[must_use]
    pub fn transform_document(
        mut self,
        f: impl FnOnce(XmlDocument) -> XmlDocument + Send + 'static,
    ) -> Self {
        self.transform = Some(Box::new(f));
        self
    }

    /// Signs the request with `signer`.
    #[must_use]
    pub fn sign_with(mut self, signer: XmlSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Returns the request model as it currently stands.
    #[must_use]
    pub const fn request(&self) -> &AuthnRequest {
        &self.request
    }

    /// Encodes the request.
    pub fn build(self) -> SamlResult<BindingRequest> {
        let mut document = self.request.to_document();
        if let Some(transform) = self.transform {
            document = transform(document);
        }

        debug!(
            request_id = %self.request.id,
            binding = self.binding.uri(),
            signed = self.signer.is_some(),
            "encoding AuthnRequest"
        );

        self.binding.encode_request(
            &document,
            &self.endpoint,
            self.relay_state.as_deref(),
            self.signer.as_ref(),
        )
    }
}
