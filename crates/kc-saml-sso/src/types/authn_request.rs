//! SAML AuthnRequest types.
//!
//! Authentication request message sent by a service provider to an identity provider.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{SamlBinding, SAMLP_NS, SAML_NS, SAML_VERSION};
use crate::document::{XmlDocument, XmlElement};
use crate::error::{SamlError, SamlResult};

/// SAML Authentication Request.
///
/// Built once and then treated as immutable; wire-level changes go through
/// [`XmlDocument::transform`] on the document produced by [`Self::to_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Version of the SAML protocol (always "2.0").
    #[serde(default = "default_version")]
    pub version: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the service provider issuing the request.
    pub issuer: String,

    /// The URL where the response should be sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,

    /// The endpoint the sender believes it is contacting. Omitted from the
    /// wire entirely when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Binding to use for the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<String>,

    /// Whether the IdP must authenticate the user directly.
    #[serde(default)]
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    #[serde(default)]
    pub is_passive: bool,
}

fn default_version() -> String {
    SAML_VERSION.to_string()
}

impl AuthnRequest {
    /// Creates a new authentication request with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            version: SAML_VERSION.to_string(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            assertion_consumer_service_url: None,
            destination: None,
            protocol_binding: None,
            force_authn: false,
            is_passive: false,
        }
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the protocol binding for the response.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding.uri().to_string());
        self
    }

    /// Sets force authentication.
    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    /// Sets passive authentication.
    #[must_use]
    pub const fn is_passive(mut self, passive: bool) -> Self {
        self.is_passive = passive;
        self
    }

    /// Returns the parsed protocol binding.
    #[must_use]
    pub fn parsed_binding(&self) -> Option<SamlBinding> {
        self.protocol_binding.as_deref().and_then(SamlBinding::from_uri)
    }

    /// Validates the basic structure of this request.
    pub fn validate(&self) -> SamlResult<()> {
        if self.id.is_empty() {
            return Err(SamlError::InvalidRequest("ID is required".to_string()));
        }
        if self.version != SAML_VERSION {
            return Err(SamlError::InvalidRequest(format!(
                "unsupported SAML version: {}",
                self.version
            )));
        }
        if self.issuer.is_empty() {
            return Err(SamlError::InvalidRequest("Issuer is required".to_string()));
        }
        Ok(())
    }

    /// Builds the `samlp:AuthnRequest` document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        let mut root = XmlElement::new("samlp:AuthnRequest")
            .with_attribute("xmlns:samlp", SAMLP_NS)
            .with_attribute("xmlns:saml", SAML_NS)
            .with_attribute("ID", &self.id)
            .with_attribute("Version", &self.version)
            .with_attribute(
                "IssueInstant",
                self.issue_instant.to_rfc3339_opts(SecondsFormat::Millis, true),
            );

        if let Some(destination) = &self.destination {
            root.set_attribute("Destination", destination);
        }
        if let Some(acs) = &self.assertion_consumer_service_url {
            root.set_attribute("AssertionConsumerServiceURL", acs);
        }
        if let Some(binding) = &self.protocol_binding {
            root.set_attribute("ProtocolBinding", binding);
        }
        if self.force_authn {
            root.set_attribute("ForceAuthn", "true");
        }
        if self.is_passive {
            root.set_attribute("IsPassive", "true");
        }

        XmlDocument::new(root.with_child(XmlElement::new("saml:Issuer").with_text(&self.issuer)))
    }

    /// Reads an AuthnRequest back from its document form.
    ///
    /// Only structure is checked here; semantic checks belong to [`Self::validate`].
    pub fn from_document(doc: &XmlDocument) -> SamlResult<Self> {
        let root = doc.root();
        if root.local_name() != "AuthnRequest" {
            return Err(SamlError::InvalidRequest(format!(
                "expected AuthnRequest, found {}",
                root.name()
            )));
        }
        if let Some(ns) = root.declared_namespace(root.prefix()) {
            if ns != SAMLP_NS {
                return Err(SamlError::InvalidRequest(format!(
                    "unexpected protocol namespace: {ns}"
                )));
            }
        }

        let id = required_attribute(root, "ID")?;
        let version = required_attribute(root, "Version")?;
        let issue_instant = DateTime::parse_from_rfc3339(&required_attribute(root, "IssueInstant")?)
            .map_err(|e| SamlError::InvalidRequest(format!("invalid IssueInstant: {e}")))?
            .with_timezone(&Utc);

        let issuer = root
            .child("Issuer")
            .map(|issuer| issuer.text().trim().to_string())
            .ok_or_else(|| SamlError::MissingElement("Issuer".to_string()))?;

        Ok(Self {
            id,
            version,
            issue_instant,
            issuer,
            assertion_consumer_service_url: optional_attribute(root, "AssertionConsumerServiceURL"),
            destination: optional_attribute(root, "Destination"),
            protocol_binding: optional_attribute(root, "ProtocolBinding"),
            force_authn: root.attribute("ForceAuthn") == Some("true"),
            is_passive: root.attribute("IsPassive") == Some("true"),
        })
    }
}

/// Generates a message identifier. Always starts with a letter so that it
/// is a valid `xs:ID`.
#[must_use]
pub fn generate_id() -> String {
    format!("_id{}", uuid::Uuid::new_v4())
}

fn required_attribute(element: &XmlElement, name: &str) -> SamlResult<String> {
    element
        .attribute(name)
        .map(str::to_string)
        .ok_or_else(|| SamlError::MissingElement(format!("{}@{name}", element.local_name())))
}

fn optional_attribute(element: &XmlElement, name: &str) -> Option<String> {
    element.attribute(name).map(str::to_string)
}
