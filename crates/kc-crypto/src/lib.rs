//! # kc-crypto
//!
//! Cryptographic operations for the Keycloak Rust SAML engine using aws-lc-rs.
//!
//! SAML 2.0 deployments overwhelmingly sign with RSA PKCS#1 v1.5 over
//! SHA-256, so unlike the token side of Keycloak this crate exposes the
//! SHA-256 family alongside SHA-384 and SHA-512.
//!
//! - [`hash`] - message digests used for XML-DSig references
//! - [`keys`] - RSA private keys, parsed once and shared across requests
//! - [`signature`] - detached signature verification and the error type
//! - [`pem`] - PEM armour helpers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod hash;
pub mod keys;
pub mod pem;
pub mod signature;

pub use algorithm::{HashAlgorithm, RsaAlgorithm};
pub use hash::{digest, sha256, sha384, sha512};
pub use keys::RsaSigningKey;
pub use signature::{rsa_verify, SignatureError};
