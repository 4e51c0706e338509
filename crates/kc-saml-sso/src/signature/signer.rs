//! XML Signature creation.
//!
//! Provides functionality for signing SAML documents using XML-DSig.

use std::sync::Arc;

use base64::Engine;
use kc_crypto::pem::pem_to_der;
use kc_crypto::RsaSigningKey;

use crate::document::{XmlDocument, XmlElement};
use crate::error::{SamlError, SamlResult};
use crate::types::{canonicalization_algorithms, transform_algorithms, XMLDSIG_NS};

use super::{SignatureAlgorithm, SignatureConfig};

/// XML document signer.
///
/// Signs SAML documents using the configured private key. Key material is
/// validated on construction, so a signer that exists can always sign.
#[derive(Debug, Clone)]
pub struct XmlSigner {
    key: Arc<RsaSigningKey>,
    /// The X.509 certificate in DER format (optional).
    certificate_der: Option<Vec<u8>>,
    config: SignatureConfig,
}

impl XmlSigner {
    /// Creates a new signer from a parsed key.
    #[must_use]
    pub fn new(key: RsaSigningKey, certificate_der: Option<Vec<u8>>) -> Self {
        Self {
            key: Arc::new(key),
            certificate_der,
            config: SignatureConfig::default(),
        }
    }

    /// Creates a signer from a PKCS#8 or PKCS#1 DER private key.
    pub fn from_der(private_key_der: &[u8], certificate_der: Option<Vec<u8>>) -> SamlResult<Self> {
        let key = RsaSigningKey::from_any_der(private_key_der)?;
        Ok(Self::new(key, certificate_der))
    }

    /// Creates a new signer from PEM-encoded key and certificate.
    pub fn from_pem(private_key_pem: &str, certificate_pem: Option<&str>) -> SamlResult<Self> {
        let key = RsaSigningKey::from_pem(private_key_pem)?;

        let certificate_der = match certificate_pem {
            Some(pem) => Some(pem_to_der(pem, "CERTIFICATE").ok_or_else(|| {
                SamlError::Configuration("invalid certificate PEM".to_string())
            })?),
            None => None,
        };

        Ok(Self::new(key, certificate_der))
    }

    /// Sets the signature configuration.
    #[must_use]
    pub fn with_config(mut self, config: SignatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the signature algorithm in use.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.config.algorithm
    }

    /// Returns the DER encoded `RSAPublicKey` matching the signing key.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key.public_key_der()
    }

    /// Signs a document with an enveloped signature.
    ///
    /// The root element must carry an `ID`. Any existing signature on the
    /// root is replaced. The `ds:Signature` element is placed directly after
    /// `Issuer`, or first when there is no issuer. The input is not modified.
    pub fn sign_document(&self, doc: &XmlDocument) -> SamlResult<XmlDocument> {
        let mut signed = doc.clone();
        let root = signed.root_mut();
        root.remove_child("Signature");

        let reference_id = root
            .attribute("ID")
            .ok_or_else(|| SamlError::SignatureCreation("root element has no ID".to_string()))?
            .to_string();

        let algorithm = self.config.algorithm;
        let digest = kc_crypto::digest(algorithm.hash(), root.canonicalize().as_bytes());
        let digest_b64 = base64::engine::general_purpose::STANDARD.encode(digest);

        let signed_info = build_signed_info(&reference_id, &digest_b64, algorithm);
        let mut signature = XmlElement::new("ds:Signature").with_attribute("xmlns:ds", XMLDSIG_NS);
        let signature_value =
            self.sign_data(signed_info.canonicalize_within(&[&*root, &signature], &[]).as_bytes())?;

        signature = signature
            .with_child(signed_info)
            .with_child(XmlElement::new("ds:SignatureValue").with_text(signature_value));

        if self.config.include_certificate {
            if let Some(cert) = &self.certificate_der {
                signature = signature.with_child(
                    XmlElement::new("ds:KeyInfo").with_child(
                        XmlElement::new("ds:X509Data").with_child(
                            XmlElement::new("ds:X509Certificate")
                                .with_text(base64::engine::general_purpose::STANDARD.encode(cert)),
                        ),
                    ),
                );
            }
        }

        let position = root.child_position("Issuer").map_or(0, |i| i + 1);
        root.insert_child(position, signature);

        tracing::debug!(reference = %reference_id, algorithm = algorithm.uri(), "signed document");
        Ok(signed)
    }

    /// Creates a detached signature for HTTP-Redirect binding.
    ///
    /// `signed_octets` is the query string `SAMLRequest=..[&RelayState=..]&SigAlg=..`
    /// exactly as it will be sent. Returns the base64 signature value.
    pub fn sign_redirect(&self, signed_octets: &str) -> SamlResult<String> {
        self.sign_data(signed_octets.as_bytes())
    }

    /// Signs raw data and returns the base64 signature.
    fn sign_data(&self, data: &[u8]) -> SamlResult<String> {
        let signature = self
            .key
            .sign(self.config.algorithm.rsa(), data)
            .map_err(|e| SamlError::SignatureCreation(format!("RSA signing failed: {e}")))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }
}

/// Builds the SignedInfo element. The `ds` prefix is bound by the
/// enclosing `ds:Signature`.
fn build_signed_info(reference_id: &str, digest_b64: &str, algorithm: SignatureAlgorithm) -> XmlElement {
    XmlElement::new("ds:SignedInfo")
        .with_child(
            XmlElement::new("ds:CanonicalizationMethod")
                .with_attribute("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N),
        )
        .with_child(XmlElement::new("ds:SignatureMethod").with_attribute("Algorithm", algorithm.uri()))
        .with_child(
            XmlElement::new("ds:Reference")
                .with_attribute("URI", format!("#{reference_id}"))
                .with_child(
                    XmlElement::new("ds:Transforms")
                        .with_child(
                            XmlElement::new("ds:Transform")
                                .with_attribute("Algorithm", transform_algorithms::ENVELOPED_SIGNATURE),
                        )
                        .with_child(
                            XmlElement::new("ds:Transform")
                                .with_attribute("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N),
                        ),
                )
                .with_child(
                    XmlElement::new("ds:DigestMethod").with_attribute("Algorithm", algorithm.digest_uri()),
                )
                .with_child(XmlElement::new("ds:DigestValue").with_text(digest_b64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthnRequest;

    const KEY_PEM: &str = include_str!("../../tests/fixtures/sp-signing.key.pem");
    const CERT_PEM: &str = include_str!("../../tests/fixtures/sp-signing.crt.pem");

    fn signer() -> XmlSigner {
        XmlSigner::from_pem(KEY_PEM, Some(CERT_PEM)).expect("signer")
    }

    #[test]
    fn invalid_key_is_a_configuration_error() {
        let err = XmlSigner::from_pem("not a key", None).unwrap_err();
        assert!(matches!(err, SamlError::Configuration(_)));

        let err = XmlSigner::from_pem(KEY_PEM, Some("not a cert")).unwrap_err();
        assert!(matches!(err, SamlError::Configuration(_)));
    }

    #[test]
    fn signature_is_placed_after_issuer() {
        let doc = AuthnRequest::new("sp").to_document();
        let signed = signer().sign_document(&doc).expect("sign");

        let names: Vec<&str> = signed.root().elements().map(XmlElement::local_name).collect();
        assert_eq!(names, ["Issuer", "Signature"]);

        let reference = signed
            .root()
            .descendant("Reference")
            .and_then(|r| r.attribute("URI"))
            .map(str::to_string);
        assert_eq!(reference, Some(format!("#{}", doc.root().attribute("ID").unwrap_or_default())));
        assert!(signed.root().descendant("X509Certificate").is_some());

        let signature = signed.root().child("Signature").expect("signature");
        assert_eq!(signature.attribute("xmlns:ds"), Some(XMLDSIG_NS));
        assert_eq!(signature.child("SignedInfo").and_then(|s| s.attribute("xmlns:ds")), None);
    }

    #[test]
    fn signing_does_not_mutate_input() {
        let doc = AuthnRequest::new("sp").to_document();
        let before = doc.clone();
        let _ = signer().sign_document(&doc).expect("sign");
        assert_eq!(doc, before);
    }

    #[test]
    fn resigning_replaces_signature() {
        let doc = AuthnRequest::new("sp").to_document();
        let once = signer().sign_document(&doc).expect("sign");
        let twice = signer().sign_document(&once).expect("sign");

        assert_eq!(twice.root().elements().filter(|e| e.matches("Signature")).count(), 1);
    }

    #[test]
    fn document_without_id_cannot_be_signed() {
        let doc = XmlDocument::new(XmlElement::new("samlp:AuthnRequest"));
        assert!(matches!(
            signer().sign_document(&doc),
            Err(SamlError::SignatureCreation(_))
        ));
    }

    #[test]
    fn redirect_signature_is_base64() {
        let sig = signer().sign_redirect("SAMLRequest=abc&SigAlg=x").expect("sign");
        let raw = base64::engine::general_purpose::STANDARD.decode(sig).expect("base64");
        assert_eq!(raw.len(), 256);
    }
}
