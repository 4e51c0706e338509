//! SAML error types.
//!
//! Provides the error type for building, encoding, decoding and validating
//! AuthnRequest messages, and the closed set of reasons a validation can be
//! rejected for.

use std::fmt;

use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Invalid SAML request format or content.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate compression or decompression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Encoded or inflated message exceeds the configured ceiling.
    #[error("message too large: {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Observed size.
        size: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// XML signature validation failed.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// XML signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// Destination does not match the endpoint the request arrived at.
    #[error("invalid destination: expected {expected}, got {actual}")]
    InvalidDestination {
        /// The expected destination URL.
        expected: String,
        /// The actual destination URL.
        actual: String,
    },

    /// Signed request without a Destination attribute.
    #[error("destination required for signed requests")]
    MissingDestination,

    /// Unknown or unsupported binding.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// Unknown or disabled service provider.
    #[error("unknown service provider: {0}")]
    UnknownServiceProvider(String),

    /// Realm not found.
    #[error("realm not found: {0}")]
    RealmNotFound(String),

    /// Missing or invalid key material or settings on the requesting side.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Reason a validated request was refused.
///
/// The reason is logged and reported to callers of the engine; it is never
/// rendered into an HTTP response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    /// The message could not be decoded or is structurally invalid.
    Malformed,
    /// Signed material was present and did not verify, or a required
    /// signature was missing.
    BadSignature,
    /// The declared destination does not match the realm endpoint.
    BadDestination,
    /// The issuer is not a registered, enabled client.
    UnknownClient,
}

impl RejectionReason {
    /// Returns a stable identifier for logs and events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::BadSignature => "bad_signature",
            Self::BadDestination => "bad_destination",
            Self::UnknownClient => "unknown_client",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SamlError {
    /// Maps this error to a validation rejection reason.
    ///
    /// Returns `None` for errors that are not attributable to the inbound
    /// request (configuration, realm lookup and internal failures).
    #[must_use]
    pub const fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            Self::InvalidRequest(_)
            | Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::MessageTooLarge { .. }
            | Self::UnsupportedBinding(_) => Some(RejectionReason::Malformed),
            Self::SignatureInvalid(_) => Some(RejectionReason::BadSignature),
            Self::InvalidDestination { .. } | Self::MissingDestination => {
                Some(RejectionReason::BadDestination)
            }
            Self::UnknownServiceProvider(_) => Some(RejectionReason::UnknownClient),
            Self::SignatureCreation(_)
            | Self::RealmNotFound(_)
            | Self::Configuration(_)
            | Self::Internal(_) => None,
        }
    }

    /// Returns the SAML status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        match self {
            Self::UnknownServiceProvider(_) => "urn:oasis:names:tc:SAML:2.0:status:UnknownPrincipal",
            Self::UnsupportedBinding(_) => "urn:oasis:names:tc:SAML:2.0:status:RequestUnsupported",
            Self::SignatureCreation(_)
            | Self::RealmNotFound(_)
            | Self::Configuration(_)
            | Self::Internal(_) => "urn:oasis:names:tc:SAML:2.0:status:Responder",
            _ => "urn:oasis:names:tc:SAML:2.0:status:Requester",
        }
    }

    /// Returns the HTTP status code for errors raised outside request validation.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_)
            | Self::MissingElement(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::XmlParse(_)
            | Self::MessageTooLarge { .. } => 400,
            Self::RealmNotFound(_) | Self::UnknownServiceProvider(_) => 404,
            _ => 500,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::Deflate(err.to_string())
    }
}

impl From<kc_crypto::SignatureError> for SamlError {
    fn from(err: kc_crypto::SignatureError) -> Self {
        match err {
            kc_crypto::SignatureError::InvalidKey(msg) => Self::Configuration(msg),
            kc_crypto::SignatureError::Verification => {
                Self::SignatureInvalid("signature verification failed".to_string())
            }
            other => Self::SignatureCreation(other.to_string()),
        }
    }
}
