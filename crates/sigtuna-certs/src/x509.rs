#![forbid(unsafe_code)]

//! X.509 certificate facade.
//!
//! Wraps a parsed certificate and exposes exactly what signature
//! validation needs: subject and issuer as strings, the issuer as a raw
//! DER name, the serial as a decimal string, the DER re-encoding, and RSA
//! signature verification (both over a precomputed digest and over a DER
//! message).

use der::{Decode, Encode};
use sigtuna_core::{algorithm, Error};
use x509_cert::Certificate;

// RSA PKCS#1 v1.5 signature algorithm OIDs.
const SHA1_RSA: &str = "1.2.840.113549.1.1.5";
const SHA224_RSA: &str = "1.2.840.113549.1.1.14";
const SHA256_RSA: &str = "1.2.840.113549.1.1.11";
const SHA384_RSA: &str = "1.2.840.113549.1.1.12";
const SHA512_RSA: &str = "1.2.840.113549.1.1.13";

/// A parsed X.509 certificate together with its DER encoding.
#[derive(Debug, Clone)]
pub struct X509Cert {
    der: Vec<u8>,
    cert: Certificate,
}

impl X509Cert {
    /// Parse a certificate from DER bytes.
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("failed to parse certificate: {e}")))?;
        Ok(Self {
            der: der.to_vec(),
            cert,
        })
    }

    /// Parse a certificate from base64-encoded DER (whitespace tolerated).
    pub fn from_base64(text: &str) -> Result<Self, Error> {
        use base64::Engine;
        let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(&clean)
            .map_err(|e| Error::Base64(format!("X509Certificate: {e}")))?;
        Self::from_der(&der)
    }

    /// The DER encoding of this certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The parsed certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    /// Subject distinguished name, RFC 4514 rendering.
    pub fn subject(&self) -> String {
        self.cert.tbs_certificate.subject.to_string()
    }

    /// Issuer distinguished name, RFC 4514 rendering.
    pub fn issuer(&self) -> String {
        self.cert.tbs_certificate.issuer.to_string()
    }

    /// Issuer distinguished name as a DER-encoded Name.
    pub fn issuer_der(&self) -> Result<Vec<u8>, Error> {
        self.cert
            .tbs_certificate
            .issuer
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode issuer name: {e}")))
    }

    /// Subject distinguished name as a DER-encoded Name.
    pub fn subject_der(&self) -> Result<Vec<u8>, Error> {
        self.cert
            .tbs_certificate
            .subject
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode subject name: {e}")))
    }

    /// Serial number as a decimal string, the form `X509SerialNumber` uses.
    pub fn serial_decimal(&self) -> String {
        decimal_from_bytes(self.cert.tbs_certificate.serial_number.as_bytes())
    }

    /// Serial number content bytes.
    pub fn serial_bytes(&self) -> &[u8] {
        self.cert.tbs_certificate.serial_number.as_bytes()
    }

    /// SubjectPublicKeyInfo as DER.
    pub fn public_key_der(&self) -> Result<Vec<u8>, Error> {
        self.cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode public key: {e}")))
    }

    /// Raw bits of the subject public key (for OCSP responder key hashes).
    pub fn public_key_bits(&self) -> &[u8] {
        self.cert
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes()
    }

    /// Verify an RSA PKCS#1 v1.5 signature over a digest this certificate's
    /// key produced.  The digest method URI selects the DigestInfo encoding.
    pub fn verify_digest(
        &self,
        digest_uri: &str,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        use signature::hazmat::PrehashVerifier;

        let spki_der = self.public_key_der()?;
        let public_key = rsa_public_key(&spki_der)?;
        let sig = rsa::pkcs1v15::Signature::try_from(signature)
            .map_err(|e| Error::SignatureInvalid(format!("invalid RSA signature: {e}")))?;

        let result = match digest_uri {
            algorithm::SHA1 => rsa::pkcs1v15::VerifyingKey::<sha1::Sha1>::new(public_key)
                .verify_prehash(digest, &sig),
            algorithm::SHA224 => rsa::pkcs1v15::VerifyingKey::<sha2::Sha224>::new(public_key)
                .verify_prehash(digest, &sig),
            algorithm::SHA256 => rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(public_key)
                .verify_prehash(digest, &sig),
            _ => {
                return Err(Error::UnsupportedAlgorithm(format!(
                    "digest algorithm: {digest_uri}"
                )))
            }
        };

        result.map_err(|e| Error::SignatureInvalid(format!("RSA verification failed: {e}")))
    }

    /// Verify an RSA PKCS#1 v1.5 signature over a DER message with this
    /// certificate's key, selecting the hash by signature algorithm OID.
    /// Used for OCSP responses and certificate-to-certificate signatures.
    pub fn verify_der_message(
        &self,
        signature_oid: &str,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        let spki_der = self.public_key_der()?;
        verify_rsa_by_oid(&spki_der, signature_oid, message, signature)
    }
}

/// Parse an RSA public key from SPKI DER.
pub(crate) fn rsa_public_key(spki_der: &[u8]) -> Result<rsa::RsaPublicKey, Error> {
    use spki::DecodePublicKey;
    rsa::RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| Error::Certificate(format!("invalid RSA public key: {e}")))
}

/// Verify an RSA PKCS#1 v1.5 signature over a message, selecting the hash
/// from the signature algorithm OID.
pub fn verify_rsa_by_oid(
    spki_der: &[u8],
    signature_oid: &str,
    message: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    match signature_oid {
        SHA1_RSA => verify_rsa_signature::<sha1::Sha1>(spki_der, message, signature),
        SHA224_RSA => verify_rsa_signature::<sha2::Sha224>(spki_der, message, signature),
        SHA256_RSA => verify_rsa_signature::<sha2::Sha256>(spki_der, message, signature),
        SHA384_RSA => verify_rsa_signature::<sha2::Sha384>(spki_der, message, signature),
        SHA512_RSA => verify_rsa_signature::<sha2::Sha512>(spki_der, message, signature),
        _ => Err(Error::UnsupportedAlgorithm(format!(
            "signature algorithm OID: {signature_oid}"
        ))),
    }
}

fn verify_rsa_signature<D>(
    spki_der: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), Error>
where
    D: digest::Digest + digest::const_oid::AssociatedOid,
{
    use signature::Verifier;

    let public_key = rsa_public_key(spki_der)?;
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<D>::new(public_key);
    let sig = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|e| Error::SignatureInvalid(format!("invalid RSA signature: {e}")))?;

    verifying_key
        .verify(message, &sig)
        .map_err(|e| Error::SignatureInvalid(format!("RSA verification failed: {e}")))
}

/// Big-endian unsigned bytes rendered as a decimal string.
fn decimal_from_bytes(bytes: &[u8]) -> String {
    // Little-endian decimal digits, repeatedly multiplied by 256.
    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            let v = (*d as u32) * 256 + carry;
            *d = (v % 10) as u8;
            carry = v / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    while digits.len() > 1 && digits.last() == Some(&0) {
        digits.pop();
    }
    digits
        .iter()
        .rev()
        .map(|d| char::from(b'0' + d))
        .collect()
}
