//! XML Signature support for SAML.
//!
//! Enveloped XML-DSig for documents sent over the POST binding, and the
//! detached query-string signature used by the Redirect binding.
//!
//! # Signing Algorithms
//!
//! - RSA-SHA256 (default)
//! - RSA-SHA384
//! - RSA-SHA512

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use kc_crypto::{HashAlgorithm, RsaAlgorithm};

use crate::types::{digest_algorithms, signature_algorithms};

/// Signature algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    /// RSA with SHA-256.
    #[default]
    RsaSha256,
    /// RSA with SHA-384.
    RsaSha384,
    /// RSA with SHA-512.
    RsaSha512,
}

impl SignatureAlgorithm {
    /// Returns the URI for this signature algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => signature_algorithms::RSA_SHA256,
            Self::RsaSha384 => signature_algorithms::RSA_SHA384,
            Self::RsaSha512 => signature_algorithms::RSA_SHA512,
        }
    }

    /// Returns the corresponding digest algorithm URI.
    #[must_use]
    pub const fn digest_uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => digest_algorithms::SHA256,
            Self::RsaSha384 => digest_algorithms::SHA384,
            Self::RsaSha512 => digest_algorithms::SHA512,
        }
    }

    /// Parses a signature algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            signature_algorithms::RSA_SHA256 => Some(Self::RsaSha256),
            signature_algorithms::RSA_SHA384 => Some(Self::RsaSha384),
            signature_algorithms::RSA_SHA512 => Some(Self::RsaSha512),
            _ => None,
        }
    }

    /// The RSA primitive backing this algorithm.
    #[must_use]
    pub const fn rsa(&self) -> RsaAlgorithm {
        match self {
            Self::RsaSha256 => RsaAlgorithm::Rs256,
            Self::RsaSha384 => RsaAlgorithm::Rs384,
            Self::RsaSha512 => RsaAlgorithm::Rs512,
        }
    }

    /// The digest used for the signed reference.
    #[must_use]
    pub const fn hash(&self) -> HashAlgorithm {
        self.rsa().hash()
    }
}

/// Parses a digest method URI.
#[must_use]
pub fn digest_algorithm_from_uri(uri: &str) -> Option<HashAlgorithm> {
    match uri {
        digest_algorithms::SHA256 => Some(HashAlgorithm::Sha256),
        digest_algorithms::SHA384 => Some(HashAlgorithm::Sha384),
        digest_algorithms::SHA512 => Some(HashAlgorithm::Sha512),
        _ => None,
    }
}

/// XML Signature structure.
///
/// The contents of a verified `<ds:Signature>` element.
#[derive(Debug, Clone)]
pub struct XmlSignature {
    /// The signature algorithm used.
    pub algorithm: SignatureAlgorithm,
    /// The reference URI, `#` followed by the signed element's ID.
    pub reference_uri: String,
    /// The digest value (base64 encoded).
    pub digest_value: String,
    /// The signature value (base64 encoded).
    pub signature_value: String,
    /// Optional X.509 certificate (base64 encoded, DER format).
    pub x509_certificate: Option<String>,
}

/// Configuration for signature creation.
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    /// The signature algorithm to use.
    pub algorithm: SignatureAlgorithm,
    /// Whether to include the X.509 certificate in the signature.
    pub include_certificate: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            algorithm: SignatureAlgorithm::RsaSha256,
            include_certificate: true,
        }
    }
}

impl SignatureConfig {
    /// Creates a new signature configuration with the given algorithm.
    #[must_use]
    pub const fn with_algorithm(algorithm: SignatureAlgorithm) -> Self {
        Self {
            algorithm,
            include_certificate: true,
        }
    }
}
