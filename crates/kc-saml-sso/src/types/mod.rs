//! SAML 2.0 types and data structures.
//!
//! The request and response messages handled by the SSO endpoint, plus the
//! protocol constants they are built from.

mod authn_request;
mod constants;
mod response;

pub use authn_request::*;
pub use constants::*;
pub use response::*;
