#![forbid(unsafe_code)]

//! XML namespace constants used across the library.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XAdES 1.1.1 namespace
pub const XADES111: &str = "http://uri.etsi.org/01903/v1.1.1#";

/// XAdES 1.3.2 namespace
pub const XADES132: &str = "http://uri.etsi.org/01903/v1.3.2#";

/// Prefix of every reference `Type` that points at `SignedProperties`.
///
/// BDOC 1.0 writes `http://uri.etsi.org/01903#SignedProperties`, XAdES
/// writes `http://uri.etsi.org/01903/vX.Y.Z#SignedProperties`; both are
/// accepted.
pub const ETSI_URI_PREFIX: &str = "http://uri.etsi.org/01903";

/// Suffix of every reference `Type` that points at `SignedProperties`.
pub const SIGNED_PROPERTIES_SUFFIX: &str = "#SignedProperties";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const REFERENCE: &str = "Reference";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const OBJECT: &str = "Object";

    // KeyInfo elements
    pub const KEY_INFO: &str = "KeyInfo";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const X509_ISSUER_NAME: &str = "X509IssuerName";
    pub const X509_SERIAL_NUMBER: &str = "X509SerialNumber";

    // XAdES qualifying properties
    pub const QUALIFYING_PROPERTIES: &str = "QualifyingProperties";
    pub const SIGNED_PROPERTIES: &str = "SignedProperties";
    pub const SIGNED_SIGNATURE_PROPERTIES: &str = "SignedSignatureProperties";
    pub const SIGNATURE_POLICY_IDENTIFIER: &str = "SignaturePolicyIdentifier";
    pub const SIGNING_CERTIFICATE: &str = "SigningCertificate";
    pub const CERT: &str = "Cert";
    pub const CERT_DIGEST: &str = "CertDigest";
    pub const ISSUER_SERIAL: &str = "IssuerSerial";

    // XAdES unsigned properties
    pub const UNSIGNED_PROPERTIES: &str = "UnsignedProperties";
    pub const UNSIGNED_SIGNATURE_PROPERTIES: &str = "UnsignedSignatureProperties";
    pub const UNSIGNED_DATA_OBJECT_PROPERTIES: &str = "UnsignedDataObjectProperties";
    pub const CERTIFICATE_VALUES: &str = "CertificateValues";
    pub const ENCAPSULATED_X509_CERTIFICATE: &str = "EncapsulatedX509Certificate";
    pub const REVOCATION_VALUES: &str = "RevocationValues";
    pub const OCSP_VALUES: &str = "OCSPValues";
    pub const ENCAPSULATED_OCSP_VALUE: &str = "EncapsulatedOCSPValue";
    pub const COMPLETE_CERTIFICATE_REFS: &str = "CompleteCertificateRefs";
    pub const CERT_REFS: &str = "CertRefs";
    pub const COMPLETE_REVOCATION_REFS: &str = "CompleteRevocationRefs";
    pub const OCSP_REFS: &str = "OCSPRefs";
    pub const OCSP_REF: &str = "OCSPRef";
    pub const OCSP_IDENTIFIER: &str = "OCSPIdentifier";
    pub const RESPONDER_ID: &str = "ResponderID";
    pub const PRODUCED_AT: &str = "ProducedAt";
    pub const DIGEST_ALG_AND_VALUE: &str = "DigestAlgAndValue";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const ALGORITHM: &str = "Algorithm";
    pub const TARGET: &str = "Target";
}
