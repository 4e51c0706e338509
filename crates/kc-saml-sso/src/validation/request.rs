//! The AuthnRequest validation state machine.
//!
//! `InboundMessage` is decoded into a [`DecodedRequest`], which is then
//! checked in a fixed order: client, signature, destination, reply address.
//! The first failing check decides the outcome.

use tracing::debug;

use super::{
    AuthnRequestContext, DestinationPolicy, DestinationValidator, Rejection, ServiceProviderConfig,
    ValidationOutcome,
};
use crate::bindings::{DecodeLimits, DecodedMessage, HttpPostBinding, HttpRedirectBinding, SamlMessageType};
use crate::config::SamlProtocolConfig;
use crate::document::XmlDocument;
use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSignatureValidator;
use crate::types::{AuthnRequest, SamlBinding};

/// A request as it arrived over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Form fields of a POST.
    Post {
        /// The `SAMLRequest` field.
        saml_request: String,
        /// The `RelayState` field.
        relay_state: Option<String>,
    },
    /// The undecoded query string of a GET.
    Redirect {
        /// Raw query string, percent-encoding intact.
        raw_query: String,
    },
}

impl InboundMessage {
    /// The binding this message travelled on.
    #[must_use]
    pub const fn binding(&self) -> SamlBinding {
        match self {
            Self::Post { .. } => SamlBinding::HttpPost,
            Self::Redirect { .. } => SamlBinding::HttpRedirect,
        }
    }
}

/// Decodes and validates inbound AuthnRequests.
#[derive(Debug, Clone)]
pub struct AuthnRequestValidator {
    post_limits: DecodeLimits,
    redirect_limits: DecodeLimits,
}

impl Default for AuthnRequestValidator {
    fn default() -> Self {
        Self::new(&SamlProtocolConfig::default())
    }
}

impl AuthnRequestValidator {
    /// Creates a validator using the size limits from `config`.
    #[must_use]
    pub fn new(config: &SamlProtocolConfig) -> Self {
        Self {
            post_limits: DecodeLimits {
                max_encoded_size: config.max_post_request_size,
                max_inflated_size: config.max_inflated_size,
            },
            redirect_limits: DecodeLimits {
                max_encoded_size: config.max_redirect_request_size,
                max_inflated_size: config.max_inflated_size,
            },
        }
    }

    /// Decodes the message and reads the AuthnRequest out of it.
    ///
    /// Every failure here is a malformed request, apart from a half-present
    /// Redirect signature which is reported as a signature failure.
    pub fn decode(&self, inbound: &InboundMessage) -> SamlResult<DecodedRequest> {
        let message = match inbound {
            InboundMessage::Post {
                saml_request,
                relay_state,
            } => HttpPostBinding::decode(
                Some(saml_request),
                None,
                relay_state.as_deref(),
                &self.post_limits,
            )?,
            InboundMessage::Redirect { raw_query } => {
                HttpRedirectBinding::decode_query(raw_query, &self.redirect_limits)?
            }
        };

        if message.message_type != SamlMessageType::Request {
            return Err(SamlError::InvalidRequest("expected SAMLRequest".to_string()));
        }

        let document = XmlDocument::parse(&message.xml)?;
        let request = AuthnRequest::from_document(&document)?;
        request.validate()?;

        Ok(DecodedRequest {
            message,
            document,
            request,
        })
    }

    /// Runs the whole pipeline for one request.
    ///
    /// `lookup_client` receives the decoded issuer.
    pub fn validate<'a, F>(
        &self,
        realm: &str,
        inbound: &InboundMessage,
        lookup_client: F,
        policy: &DestinationPolicy,
    ) -> ValidationOutcome
    where
        F: FnOnce(&str) -> Option<&'a ServiceProviderConfig>,
    {
        match self.decode(inbound) {
            Ok(decoded) => {
                let client = lookup_client(decoded.issuer());
                decoded.validate(realm, client, policy)
            }
            Err(err) => ValidationOutcome::rejected(realm, None, &err),
        }
    }
}

/// A decoded, structurally valid AuthnRequest whose contents are not yet trusted.
#[derive(Debug, Clone)]
pub struct DecodedRequest {
    message: DecodedMessage,
    document: XmlDocument,
    request: AuthnRequest,
}

impl DecodedRequest {
    /// The claimed issuer, used to find the client.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.request.issuer
    }

    /// The parsed request.
    #[must_use]
    pub const fn request(&self) -> &AuthnRequest {
        &self.request
    }

    /// The binding the request arrived on.
    #[must_use]
    pub const fn binding(&self) -> SamlBinding {
        self.message.binding
    }

    /// True if any signature material came with the request.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.message.redirect_signature.is_some() || XmlSignatureValidator::has_signature(&self.document)
    }

    /// Applies the remaining checks and produces the outcome.
    #[must_use]
    pub fn validate(
        self,
        realm: &str,
        client: Option<&ServiceProviderConfig>,
        policy: &DestinationPolicy,
    ) -> ValidationOutcome {
        let issuer = self.request.issuer.clone();
        match self.check(realm, client, policy) {
            Ok(context) => {
                debug!(
                    realm,
                    client_id = %context.client_id,
                    request_id = %context.request_id,
                    binding = context.response_binding.uri(),
                    "accepted AuthnRequest"
                );
                ValidationOutcome::Accepted(context)
            }
            Err(err) => ValidationOutcome::rejected(realm, Some(&issuer), &err),
        }
    }

    fn check(
        self,
        realm: &str,
        client: Option<&ServiceProviderConfig>,
        policy: &DestinationPolicy,
    ) -> SamlResult<AuthnRequestContext> {
        let client = client
            .filter(|c| c.enabled && c.entity_id == self.request.issuer)
            .ok_or_else(|| SamlError::UnknownServiceProvider(self.request.issuer.clone()))?;

        let signed = self.verify_signature(client)?;

        match &self.request.destination {
            Some(destination) => DestinationValidator::validate(policy, destination)?,
            None if signed => return Err(SamlError::MissingDestination),
            None => {}
        }

        let assertion_consumer_service_url = self
            .request
            .assertion_consumer_service_url
            .clone()
            .or_else(|| client.default_acs_url.clone())
            .ok_or_else(|| SamlError::MissingElement("AssertionConsumerServiceURL".to_string()))?;

        let response_binding = match &self.request.protocol_binding {
            Some(uri) => SamlBinding::from_uri(uri)
                .ok_or_else(|| SamlError::UnsupportedBinding(uri.clone()))?,
            None => SamlBinding::HttpPost,
        };

        Ok(AuthnRequestContext {
            realm: realm.to_string(),
            client_id: client.entity_id.clone(),
            issuer: self.request.issuer,
            request_id: self.request.id,
            assertion_consumer_service_url,
            response_binding,
            destination: self.request.destination,
            relay_state: self.message.relay_state,
            force_authn: self.request.force_authn,
            is_passive: self.request.is_passive,
        })
    }

    /// Verifies whatever signature material is present. Returns whether the
    /// request was signed.
    fn verify_signature(&self, client: &ServiceProviderConfig) -> SamlResult<bool> {
        let enveloped = XmlSignatureValidator::has_signature(&self.document);
        let detached = self.message.redirect_signature.as_ref();

        if !enveloped && detached.is_none() {
            if client.require_signed_requests {
                return Err(SamlError::SignatureInvalid(
                    "client requires signed requests".to_string(),
                ));
            }
            return Ok(false);
        }

        let key = client.verification_key.clone().ok_or_else(|| {
            SamlError::SignatureInvalid("no verification key registered for client".to_string())
        })?;
        let validator = XmlSignatureValidator::new(key);

        if let Some(detached) = detached {
            validator.validate_redirect_binding(
                &detached.signed_octets,
                &detached.signature,
                &detached.sig_alg,
            )?;
        }
        if enveloped {
            validator.validate_document(&self.document)?;
        }
        Ok(true)
    }
}
