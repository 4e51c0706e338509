//! RSA private key handling.
//!
//! Keys are parsed once when a realm or client configuration is loaded and
//! then shared read-only across concurrent signing operations.

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{self, KeyPair, RsaKeyPair},
};
use base64::Engine;

use crate::algorithm::RsaAlgorithm;
use crate::hash::sha256;
use crate::pem::pem_to_der;
use crate::signature::SignatureError;

/// Smallest modulus accepted for signing keys.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// RSA key pair used for PKCS#1 v1.5 signatures.
pub struct RsaSigningKey {
    key_pair: RsaKeyPair,
    key_id: String,
}

impl std::fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigningKey")
            .field("key_id", &self.key_id)
            .field("modulus_bits", &self.modulus_bits())
            .finish_non_exhaustive()
    }
}

impl RsaSigningKey {
    /// Creates a signing key from a PKCS#8 DER-encoded private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed or is too small.
    pub fn from_pkcs8(pkcs8_der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::from_pkcs8(pkcs8_der)
            .map_err(|e| SignatureError::InvalidKey(format!("Invalid RSA PKCS#8 key: {e}")))?;
        Self::from_key_pair(key_pair)
    }

    /// Creates a signing key from a DER-encoded `RSAPrivateKey` (PKCS#1).
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed or is too small.
    pub fn from_der(der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::from_der(der)
            .map_err(|e| SignatureError::InvalidKey(format!("Invalid RSA DER key: {e}")))?;
        Self::from_key_pair(key_pair)
    }

    /// Creates a signing key from either PKCS#8 or PKCS#1 DER.
    ///
    /// # Errors
    ///
    /// Returns an error if neither encoding parses.
    pub fn from_any_der(der: &[u8]) -> Result<Self, SignatureError> {
        Self::from_pkcs8(der).or_else(|_| Self::from_der(der))
    }

    /// Creates a signing key from a PEM `PRIVATE KEY` or `RSA PRIVATE KEY` block.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable block is present.
    pub fn from_pem(pem: &str) -> Result<Self, SignatureError> {
        if let Some(der) = pem_to_der(pem, "PRIVATE KEY") {
            return Self::from_pkcs8(&der);
        }
        if let Some(der) = pem_to_der(pem, "RSA PRIVATE KEY") {
            return Self::from_der(&der);
        }
        Err(SignatureError::InvalidKey(
            "no PRIVATE KEY or RSA PRIVATE KEY block found".to_string(),
        ))
    }

    fn from_key_pair(key_pair: RsaKeyPair) -> Result<Self, SignatureError> {
        let bits = key_pair.public_modulus_len() * 8;
        if bits < MIN_RSA_KEY_BITS {
            return Err(SignatureError::InvalidKey(format!(
                "RSA key size {bits} bits is below the minimum of {MIN_RSA_KEY_BITS} bits"
            )));
        }

        let key_id = generate_key_id(key_pair.public_key().as_ref());
        Ok(Self { key_pair, key_id })
    }

    /// Returns the key ID derived from the public key.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the modulus size in bits.
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        self.key_pair.public_modulus_len() * 8
    }

    /// Returns the public key as a DER-encoded `RSAPublicKey`.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    /// Signs `data` with the given algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, algorithm: RsaAlgorithm, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let rng = SystemRandom::new();
        let mut sig = vec![0u8; self.key_pair.public_modulus_len()];

        let padding = match algorithm {
            RsaAlgorithm::Rs256 => &signature::RSA_PKCS1_SHA256,
            RsaAlgorithm::Rs384 => &signature::RSA_PKCS1_SHA384,
            RsaAlgorithm::Rs512 => &signature::RSA_PKCS1_SHA512,
        };

        self.key_pair
            .sign(padding, &rng, data, &mut sig)
            .map_err(|e| SignatureError::Signing(format!("RSA signing failed: {e}")))?;

        Ok(sig)
    }
}

/// Generates a key ID from the public key bytes.
fn generate_key_id(public_key: &[u8]) -> String {
    let hash = sha256(public_key);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&hash[..16])
}
