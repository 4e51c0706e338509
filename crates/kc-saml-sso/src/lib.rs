//! SAML 2.0 Web Browser SSO for Keycloak Rust.
//!
//! This crate covers the AuthnRequest leg of the SSO profile:
//!
//! - **Message model** - AuthnRequest and Response types backed by an XML document model
//! - **Bindings** - HTTP-POST and HTTP-Redirect encoding and decoding
//! - **XML signature** - Enveloped signatures and Redirect query signatures
//! - **Validation** - Client, signature and destination checks for inbound requests
//! - **Endpoint** - Axum handlers for `/realms/{realm}/protocol/saml`
//!
//! # Architecture
//!
//! - [`types`] - Core SAML types and data structures
//! - [`document`] - XML document model, parser and canonical writer
//! - [`bindings`] - POST and Redirect binding implementations
//! - [`signature`] - XML signature signing and validation
//! - [`validation`] - Inbound AuthnRequest validation
//! - [`client`] - Requester-side request builder
//! - [`endpoints`] - Axum HTTP handlers for the SSO endpoint
//! - [`config`] - Protocol settings
//! - [`error`] - Error types for SAML operations
//!
//! # Example
//!
//! ```rust,ignore
//! use kc_saml_sso::client::SamlRequestBuilder;
//! use kc_saml_sso::types::SamlBinding;
//!
//! let request = SamlRequestBuilder::authn_request(endpoint, client_id, acs, SamlBinding::HttpRedirect)
//!     .relay_state("state")
//!     .build()?;
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Profiles](https://docs.oasis-open.org/security/saml/v2.0/saml-profiles-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod client;
pub mod config;
pub mod document;
pub mod endpoints;
pub mod error;
pub mod signature;
pub mod types;
pub mod validation;

pub use config::SamlProtocolConfig;
pub use error::{RejectionReason, SamlError, SamlResult};
pub use types::*;
