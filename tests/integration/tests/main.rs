//! End-to-End Integration Tests
//!
//! These tests drive the SAML SSO router with requests built by the
//! requester-side builder, the way a service provider's browser would.

mod saml_endpoints;
