//! SAML Response types.
//!
//! Response messages sent by an identity provider back to the requesting
//! service provider once login has completed.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{generate_id, status_codes, NameIdFormat, SAMLP_NS, SAML_NS, SAML_VERSION};
use crate::document::{XmlDocument, XmlElement};
use crate::error::{SamlError, SamlResult};
use crate::validation::AuthnRequestContext;

/// Lifetime of an issued assertion.
const ASSERTION_VALIDITY_MINUTES: i64 = 5;

/// SAML protocol status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The top-level status code URI.
    pub code: String,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: status_codes::SUCCESS.to_string(),
            message: None,
        }
    }

    /// Creates a requester error status.
    #[must_use]
    pub fn requester_error(message: impl Into<String>) -> Self {
        Self {
            code: status_codes::REQUESTER.to_string(),
            message: Some(message.into()),
        }
    }

    /// Creates a responder error status.
    #[must_use]
    pub fn responder_error(message: impl Into<String>) -> Self {
        Self {
            code: status_codes::RESPONDER.to_string(),
            message: Some(message.into()),
        }
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == status_codes::SUCCESS
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// The bearer assertion carried in a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,
    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,
    /// The authenticated principal.
    pub name_id: String,
    /// Format of `name_id`.
    pub name_id_format: String,
    /// Where the assertion may be presented.
    pub recipient: Option<String>,
    /// The service provider the assertion is intended for.
    pub audience: Option<String>,
    /// End of the validity window.
    pub not_on_or_after: DateTime<Utc>,
}

/// SAML Response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlResponse {
    /// Unique identifier for this response.
    pub id: String,

    /// Version of the SAML protocol (always "2.0").
    pub version: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this response.
    pub issuer: String,

    /// The ID of the request this response answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// The URL this response is delivered to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The status of the response.
    pub status: Status,

    /// The assertion, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion: Option<Assertion>,
}

impl SamlResponse {
    /// Returns true if this response indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Builds the `samlp:Response` document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        let mut root = XmlElement::new("samlp:Response")
            .with_attribute("xmlns:samlp", SAMLP_NS)
            .with_attribute("xmlns:saml", SAML_NS)
            .with_attribute("ID", &self.id)
            .with_attribute("Version", &self.version)
            .with_attribute("IssueInstant", timestamp(self.issue_instant));

        if let Some(destination) = &self.destination {
            root.set_attribute("Destination", destination);
        }
        if let Some(in_response_to) = &self.in_response_to {
            root.set_attribute("InResponseTo", in_response_to);
        }

        let mut status = XmlElement::new("samlp:Status")
            .with_child(XmlElement::new("samlp:StatusCode").with_attribute("Value", &self.status.code));
        if let Some(message) = &self.status.message {
            status = status.with_child(XmlElement::new("samlp:StatusMessage").with_text(message));
        }

        root = root
            .with_child(XmlElement::new("saml:Issuer").with_text(&self.issuer))
            .with_child(status);

        if let Some(assertion) = &self.assertion {
            root = root.with_child(self.assertion_element(assertion));
        }

        XmlDocument::new(root)
    }

    fn assertion_element(&self, assertion: &Assertion) -> XmlElement {
        let mut confirmation_data = XmlElement::new("saml:SubjectConfirmationData")
            .with_attribute("NotOnOrAfter", timestamp(assertion.not_on_or_after));
        if let Some(in_response_to) = &self.in_response_to {
            confirmation_data.set_attribute("InResponseTo", in_response_to);
        }
        if let Some(recipient) = &assertion.recipient {
            confirmation_data.set_attribute("Recipient", recipient);
        }

        let subject = XmlElement::new("saml:Subject")
            .with_child(
                XmlElement::new("saml:NameID")
                    .with_attribute("Format", &assertion.name_id_format)
                    .with_text(&assertion.name_id),
            )
            .with_child(
                XmlElement::new("saml:SubjectConfirmation")
                    .with_attribute("Method", "urn:oasis:names:tc:SAML:2.0:cm:bearer")
                    .with_child(confirmation_data),
            );

        let mut conditions = XmlElement::new("saml:Conditions")
            .with_attribute("NotBefore", timestamp(assertion.issue_instant))
            .with_attribute("NotOnOrAfter", timestamp(assertion.not_on_or_after));
        if let Some(audience) = &assertion.audience {
            conditions = conditions.with_child(
                XmlElement::new("saml:AudienceRestriction")
                    .with_child(XmlElement::new("saml:Audience").with_text(audience)),
            );
        }

        XmlElement::new("saml:Assertion")
            .with_attribute("ID", &assertion.id)
            .with_attribute("Version", SAML_VERSION)
            .with_attribute("IssueInstant", timestamp(assertion.issue_instant))
            .with_child(XmlElement::new("saml:Issuer").with_text(&self.issuer))
            .with_child(subject)
            .with_child(conditions)
            .with_child(
                XmlElement::new("saml:AuthnStatement")
                    .with_attribute("AuthnInstant", timestamp(assertion.issue_instant)),
            )
    }

    /// Reads a response back from its document form.
    pub fn from_document(doc: &XmlDocument) -> SamlResult<Self> {
        let root = doc.root();
        if root.local_name() != "Response" {
            return Err(SamlError::InvalidRequest(format!(
                "expected Response, found {}",
                root.name()
            )));
        }

        let id = root
            .attribute("ID")
            .ok_or_else(|| SamlError::MissingElement("Response@ID".to_string()))?
            .to_string();
        let issue_instant = parse_timestamp(root.attribute("IssueInstant"))?;
        let issuer = root
            .child("Issuer")
            .map(|e| e.text().trim().to_string())
            .ok_or_else(|| SamlError::MissingElement("Issuer".to_string()))?;

        let status_element = root
            .child("Status")
            .ok_or_else(|| SamlError::MissingElement("Status".to_string()))?;
        let status = Status {
            code: status_element
                .child("StatusCode")
                .and_then(|c| c.attribute("Value"))
                .ok_or_else(|| SamlError::MissingElement("StatusCode".to_string()))?
                .to_string(),
            message: status_element.child("StatusMessage").map(XmlElement::text),
        };

        let assertion = match root.child("Assertion") {
            Some(element) => Some(read_assertion(element)?),
            None => None,
        };

        Ok(Self {
            id,
            version: root.attribute("Version").unwrap_or(SAML_VERSION).to_string(),
            issue_instant,
            issuer,
            in_response_to: root.attribute("InResponseTo").map(str::to_string),
            destination: root.attribute("Destination").map(str::to_string),
            status,
            assertion,
        })
    }
}

fn read_assertion(element: &XmlElement) -> SamlResult<Assertion> {
    let name_id = element
        .descendant("NameID")
        .ok_or_else(|| SamlError::MissingElement("NameID".to_string()))?;
    let conditions = element.child("Conditions");

    Ok(Assertion {
        id: element
            .attribute("ID")
            .ok_or_else(|| SamlError::MissingElement("Assertion@ID".to_string()))?
            .to_string(),
        issue_instant: parse_timestamp(element.attribute("IssueInstant"))?,
        name_id: name_id.text(),
        name_id_format: name_id
            .attribute("Format")
            .unwrap_or(NameIdFormat::Unspecified.uri())
            .to_string(),
        recipient: element
            .descendant("SubjectConfirmationData")
            .and_then(|d| d.attribute("Recipient"))
            .map(str::to_string),
        audience: conditions.and_then(|c| c.descendant("Audience")).map(XmlElement::text),
        not_on_or_after: parse_timestamp(conditions.and_then(|c| c.attribute("NotOnOrAfter")))?,
    })
}

fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: Option<&str>) -> SamlResult<DateTime<Utc>> {
    let value = value.ok_or_else(|| SamlError::MissingElement("timestamp".to_string()))?;
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SamlError::InvalidRequest(format!("invalid timestamp {value}: {e}")))
}

/// Builder for replies to a previously accepted AuthnRequest.
///
/// `InResponseTo`, the destination and the audience are only ever taken from
/// the [`AuthnRequestContext`] recorded when the request was accepted.
pub struct ResponseBuilder {
    issuer: String,
    context: Option<AuthnRequestContext>,
    status: Status,
    subject: Option<(String, NameIdFormat)>,
}

impl ResponseBuilder {
    /// Creates a new response builder for the given identity provider.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            context: None,
            status: Status::success(),
            subject: None,
        }
    }

    /// Answers the given recorded request.
    #[must_use]
    pub fn for_request(mut self, context: &AuthnRequestContext) -> Self {
        self.context = Some(context.clone());
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Sets the authenticated subject.
    #[must_use]
    pub fn subject(mut self, name_id: impl Into<String>, format: NameIdFormat) -> Self {
        self.subject = Some((name_id.into(), format));
        self
    }

    /// Builds the response. An assertion is only included for a successful
    /// status with a subject.
    #[must_use]
    pub fn build(self) -> SamlResponse {
        let now = Utc::now();
        let recipient = self
            .context
            .as_ref()
            .map(|c| c.assertion_consumer_service_url.clone());

        let assertion = match (&self.subject, self.status.is_success()) {
            (Some((name_id, format)), true) => Some(Assertion {
                id: generate_id(),
                issue_instant: now,
                name_id: name_id.clone(),
                name_id_format: format.uri().to_string(),
                recipient: recipient.clone(),
                audience: self.context.as_ref().map(|c| c.issuer.clone()),
                not_on_or_after: now + Duration::minutes(ASSERTION_VALIDITY_MINUTES),
            }),
            _ => None,
        };

        SamlResponse {
            id: generate_id(),
            version: SAML_VERSION.to_string(),
            issue_instant: now,
            issuer: self.issuer,
            in_response_to: self.context.map(|c| c.request_id),
            destination: recipient,
            status: self.status,
            assertion,
        }
    }
}
