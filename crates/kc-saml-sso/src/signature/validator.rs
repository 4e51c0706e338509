//! XML Signature validation.
//!
//! Signatures are only ever checked against the key configured for the
//! issuing client. Certificates embedded in a message are reported but never
//! used to decide trust.

use base64::Engine;
use kc_crypto::pem::pem_to_der;
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::document::{XmlDocument, XmlElement};
use crate::error::{SamlError, SamlResult};
use crate::types::{canonicalization_algorithms, transform_algorithms, XMLDSIG_NS};

use super::{digest_algorithm_from_uri, SignatureAlgorithm, XmlSignature};

/// An RSA public key used to verify a client's signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey {
    /// DER encoded `RSAPublicKey`.
    public_key_der: Vec<u8>,
}

impl VerificationKey {
    /// Wraps a DER encoded `RSAPublicKey` (PKCS#1).
    #[must_use]
    pub const fn from_rsa_public_key_der(public_key_der: Vec<u8>) -> Self {
        Self { public_key_der }
    }

    /// Extracts the key from a DER encoded X.509 certificate.
    pub fn from_certificate_der(der: &[u8]) -> SamlResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| SamlError::Configuration(format!("invalid certificate: {e}")))?;
        Ok(Self::from_spki(cert.public_key()))
    }

    /// Extracts the key from a PEM `CERTIFICATE` block.
    pub fn from_certificate_pem(pem: &str) -> SamlResult<Self> {
        let der = pem_to_der(pem, "CERTIFICATE")
            .ok_or_else(|| SamlError::Configuration("invalid certificate PEM".to_string()))?;
        Self::from_certificate_der(&der)
    }

    /// Reads a PEM `PUBLIC KEY` (SubjectPublicKeyInfo) or `RSA PUBLIC KEY` block.
    pub fn from_public_key_pem(pem: &str) -> SamlResult<Self> {
        if let Some(der) = pem_to_der(pem, "PUBLIC KEY") {
            let (_, spki) = SubjectPublicKeyInfo::from_der(&der)
                .map_err(|e| SamlError::Configuration(format!("invalid public key: {e}")))?;
            return Ok(Self::from_spki(&spki));
        }
        if let Some(der) = pem_to_der(pem, "RSA PUBLIC KEY") {
            return Ok(Self::from_rsa_public_key_der(der));
        }
        Err(SamlError::Configuration(
            "no PUBLIC KEY or RSA PUBLIC KEY block found".to_string(),
        ))
    }

    fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> Self {
        Self {
            public_key_der: spki.subject_public_key.data.to_vec(),
        }
    }

    fn verify(&self, data: &[u8], signature_b64: &str, algorithm: SignatureAlgorithm) -> SamlResult<()> {
        let compact: String = signature_b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let signature = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| SamlError::SignatureInvalid(format!("invalid signature encoding: {e}")))?;

        if kc_crypto::rsa_verify(&self.public_key_der, data, &signature, algorithm.rsa())? {
            Ok(())
        } else {
            Err(SamlError::SignatureInvalid(
                "signature does not match the client key".to_string(),
            ))
        }
    }
}

/// XML signature validator bound to one client's key.
#[derive(Debug, Clone)]
pub struct XmlSignatureValidator {
    key: VerificationKey,
}

impl XmlSignatureValidator {
    /// Creates a new validator for the given key.
    #[must_use]
    pub const fn new(key: VerificationKey) -> Self {
        Self { key }
    }

    /// Returns true if the document root carries an enveloped signature.
    #[must_use]
    pub fn has_signature(doc: &XmlDocument) -> bool {
        doc.root().child("Signature").is_some()
    }

    /// Validates the enveloped signature on the document root.
    ///
    /// The reference must point at the root's own `ID`; exactly one
    /// signature is allowed.
    pub fn validate_document(&self, doc: &XmlDocument) -> SamlResult<XmlSignature> {
        let root = doc.root();
        let root_id = root
            .attribute("ID")
            .ok_or_else(|| SamlError::SignatureInvalid("signed element has no ID".to_string()))?;

        if root.elements().filter(|e| e.matches("Signature")).count() != 1 {
            return Err(SamlError::SignatureInvalid(
                "expected exactly one Signature element".to_string(),
            ));
        }
        let signature_element = root
            .child("Signature")
            .ok_or_else(|| SamlError::SignatureInvalid("missing Signature element".to_string()))?;
        check_dsig_namespace(root, signature_element)?;

        let signature = parse_signature(signature_element)?;
        if signature.reference_uri != format!("#{root_id}") {
            return Err(SamlError::SignatureInvalid(format!(
                "reference {} does not point at the signed element",
                signature.reference_uri
            )));
        }

        let signed_info = signature_element
            .child("SignedInfo")
            .ok_or_else(|| SamlError::SignatureInvalid("missing SignedInfo".to_string()))?;
        let digest_algorithm = signed_info
            .descendant("DigestMethod")
            .and_then(|m| m.attribute("Algorithm"))
            .and_then(digest_algorithm_from_uri)
            .ok_or_else(|| SamlError::SignatureInvalid("unsupported digest method".to_string()))?;

        let reference_prefixes = signed_info
            .descendant("Transforms")
            .and_then(|transforms| {
                transforms.elements().find(|t| {
                    t.attribute("Algorithm") == Some(canonicalization_algorithms::EXCLUSIVE_C14N)
                })
            })
            .map(inclusive_prefixes)
            .unwrap_or_default();
        let mut unsigned = root.clone();
        unsigned.remove_child("Signature");
        let digest = kc_crypto::digest(
            digest_algorithm,
            unsigned.canonicalize_within(&[], &reference_prefixes).as_bytes(),
        );
        let expected = base64::engine::general_purpose::STANDARD.encode(digest);
        if expected != signature.digest_value {
            return Err(SamlError::SignatureInvalid("digest mismatch".to_string()));
        }

        let signed_info_prefixes = signed_info
            .child("CanonicalizationMethod")
            .map(inclusive_prefixes)
            .unwrap_or_default();
        self.key.verify(
            signed_info
                .canonicalize_within(&[root, signature_element], &signed_info_prefixes)
                .as_bytes(),
            &signature.signature_value,
            signature.algorithm,
        )?;

        Ok(signature)
    }

    /// Validates a detached signature for HTTP-Redirect binding.
    ///
    /// `signed_octets` must be the parameters exactly as received.
    pub fn validate_redirect_binding(
        &self,
        signed_octets: &str,
        signature_b64: &str,
        sig_alg: &str,
    ) -> SamlResult<()> {
        let algorithm = SignatureAlgorithm::from_uri(sig_alg).ok_or_else(|| {
            SamlError::SignatureInvalid(format!("unknown signature algorithm: {sig_alg}"))
        })?;

        self.key.verify(signed_octets.as_bytes(), signature_b64, algorithm)
    }
}

fn check_dsig_namespace(root: &XmlElement, signature: &XmlElement) -> SamlResult<()> {
    let prefix = signature.prefix();
    let namespace = signature
        .declared_namespace(prefix)
        .or_else(|| root.declared_namespace(prefix));
    if namespace == Some(XMLDSIG_NS) {
        Ok(())
    } else {
        Err(SamlError::SignatureInvalid(
            "Signature element is not in the XML-DSig namespace".to_string(),
        ))
    }
}

/// Prefixes named by an `ec:InclusiveNamespaces` child of a canonicalization
/// method or transform.
fn inclusive_prefixes(method: &XmlElement) -> Vec<&str> {
    method
        .child("InclusiveNamespaces")
        .and_then(|list| list.attribute("PrefixList"))
        .map(|list| list.split_whitespace().collect())
        .unwrap_or_default()
}

/// Reads the fields of a `ds:Signature` element.
fn parse_signature(element: &XmlElement) -> SamlResult<XmlSignature> {
    let signed_info = element
        .child("SignedInfo")
        .ok_or_else(|| SamlError::SignatureInvalid("missing SignedInfo".to_string()))?;

    let c14n = signed_info
        .child("CanonicalizationMethod")
        .and_then(|m| m.attribute("Algorithm"));
    if c14n != Some(canonicalization_algorithms::EXCLUSIVE_C14N) {
        return Err(SamlError::SignatureInvalid(
            "unsupported canonicalization method".to_string(),
        ));
    }

    let algorithm = signed_info
        .child("SignatureMethod")
        .and_then(|m| m.attribute("Algorithm"))
        .and_then(SignatureAlgorithm::from_uri)
        .ok_or_else(|| SamlError::SignatureInvalid("unsupported signature method".to_string()))?;

    let references: Vec<&XmlElement> = signed_info.elements().filter(|e| e.matches("Reference")).collect();
    let reference: &XmlElement = match references.as_slice() {
        [reference] => reference,
        _ => {
            return Err(SamlError::SignatureInvalid(
                "expected exactly one Reference".to_string(),
            ))
        }
    };

    let transforms_ok = reference.child("Transforms").is_some_and(|transforms| {
        transforms.elements().all(|t| {
            matches!(
                t.attribute("Algorithm"),
                Some(transform_algorithms::ENVELOPED_SIGNATURE | canonicalization_algorithms::EXCLUSIVE_C14N)
            )
        })
    });
    if !transforms_ok {
        return Err(SamlError::SignatureInvalid("unsupported transform".to_string()));
    }

    let text_of = |parent: &XmlElement, name: &str| -> SamlResult<String> {
        parent
            .child(name)
            .map(|e| e.text().trim().to_string())
            .ok_or_else(|| SamlError::SignatureInvalid(format!("missing {name}")))
    };

    Ok(XmlSignature {
        algorithm,
        reference_uri: reference.attribute("URI").unwrap_or_default().to_string(),
        digest_value: text_of(reference, "DigestValue")?,
        signature_value: text_of(element, "SignatureValue")?,
        x509_certificate: element
            .descendant("X509Certificate")
            .map(|c| c.text().trim().to_string()),
    })
}
