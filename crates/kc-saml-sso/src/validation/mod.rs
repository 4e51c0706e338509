//! Inbound AuthnRequest validation.
//!
//! The validator is a pure function of the inbound message, the issuing
//! client's registration and a [`DestinationPolicy`]. It never performs I/O;
//! the endpoint layer resolves the client and policy first.

mod destination;
mod request;

pub use destination::*;
pub use request::*;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RejectionReason, SamlError};
use crate::signature::VerificationKey;
use crate::types::SamlBinding;

/// A registered service provider, as far as request validation needs it.
#[derive(Debug, Clone)]
pub struct ServiceProviderConfig {
    /// Entity ID; matched against the request `Issuer`.
    pub entity_id: String,
    /// Disabled clients are treated as unknown.
    pub enabled: bool,
    /// Reject requests that carry no signature.
    pub require_signed_requests: bool,
    /// Key used to verify request signatures.
    pub verification_key: Option<VerificationKey>,
    /// Used when a request omits `AssertionConsumerServiceURL`.
    pub default_acs_url: Option<String>,
}

impl ServiceProviderConfig {
    /// Creates an enabled client that does not require signatures.
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            enabled: true,
            require_signed_requests: false,
            verification_key: None,
            default_acs_url: None,
        }
    }

    /// Sets the verification key and requires signed requests.
    #[must_use]
    pub fn with_signing_key(mut self, key: VerificationKey) -> Self {
        self.verification_key = Some(key);
        self.require_signed_requests = true;
        self
    }

    /// Sets whether signed requests are required.
    #[must_use]
    pub const fn require_signed_requests(mut self, required: bool) -> Self {
        self.require_signed_requests = required;
        self
    }

    /// Sets the default assertion consumer URL.
    #[must_use]
    pub fn with_default_acs_url(mut self, url: impl Into<String>) -> Self {
        self.default_acs_url = Some(url.into());
        self
    }

    /// Enables or disables the client.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// What the login collaborator receives for an accepted request.
///
/// This is the responder's own record of the request; replies take
/// `InResponseTo` and the reply address from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequestContext {
    /// Realm the request was addressed to.
    pub realm: String,
    /// Client the request was accepted for.
    pub client_id: String,
    /// `Issuer` as sent.
    pub issuer: String,
    /// `ID` as sent.
    pub request_id: String,
    /// Where the reply goes.
    pub assertion_consumer_service_url: String,
    /// Binding for the reply.
    #[serde(with = "binding_uri")]
    pub response_binding: SamlBinding,
    /// `Destination` as sent, if any.
    pub destination: Option<String>,
    /// RelayState to return with the reply.
    pub relay_state: Option<String>,
    /// Whether the client asked for fresh authentication.
    pub force_authn: bool,
    /// Whether the client forbade user interaction.
    pub is_passive: bool,
}

/// A refused request. `detail` is for logs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Closed-set reason.
    pub reason: RejectionReason,
    /// Internal description of the failure.
    pub detail: String,
}

/// Result of validating one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// All checks passed.
    Accepted(AuthnRequestContext),
    /// A check failed.
    Rejected(Rejection),
}

impl ValidationOutcome {
    /// Returns the rejection reason, if rejected.
    #[must_use]
    pub const fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(rejection) => Some(rejection.reason),
        }
    }

    /// Returns true if accepted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Logs `err` and turns it into a rejection.
    ///
    /// Errors that are not the requester's fault still reject as malformed.
    pub(crate) fn rejected(realm: &str, issuer: Option<&str>, err: &SamlError) -> Self {
        let reason = err.rejection_reason().unwrap_or(RejectionReason::Malformed);
        warn!(realm, issuer, reason = %reason, error = %err, "rejected AuthnRequest");
        Self::Rejected(Rejection {
            reason,
            detail: err.to_string(),
        })
    }
}

mod binding_uri {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::types::SamlBinding;

    pub fn serialize<S: Serializer>(binding: &SamlBinding, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(binding.uri())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SamlBinding, D::Error> {
        let uri = String::deserialize(deserializer)?;
        SamlBinding::from_uri(&uri).ok_or_else(|| de::Error::custom(format!("unknown binding {uri}")))
    }
}
