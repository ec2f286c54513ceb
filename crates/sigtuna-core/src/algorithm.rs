#![forbid(unsafe_code)]

//! Algorithm URI constants for XML signature verification.
//!
//! Each constant is the canonical URI string that appears in `Algorithm`
//! attributes.  The registry is closed: signature containers only ever use
//! the RSA/SHA family and the canonicalization variants listed here.

// ── Canonicalization ─────────────────────────────────────────────────

pub const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const C14N_WITH_COMMENTS: &str =
    "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";
pub const C14N11: &str = "http://www.w3.org/2006/12/xml-c14n11";
pub const C14N11_WITH_COMMENTS: &str = "http://www.w3.org/2006/12/xml-c14n11#WithComments";
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const EXC_C14N_WITH_COMMENTS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";

// ── Digest algorithms ────────────────────────────────────────────────

pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const SHA224: &str = "http://www.w3.org/2001/04/xmldsig-more#sha224";
pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

// ── RSA signature algorithms ─────────────────────────────────────────

pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const RSA_SHA224: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha224";
pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

/// The digest method used by a signature method.
///
/// `checkSignatureValue` recomputes the digest of the canonicalized
/// `SignedInfo` with the hash the signature method names.
pub fn digest_method_for_signature(signature_uri: &str) -> Option<&'static str> {
    match signature_uri {
        RSA_SHA1 => Some(SHA1),
        RSA_SHA224 => Some(SHA224),
        RSA_SHA256 => Some(SHA256),
        _ => None,
    }
}

/// Whether a signature method URI is one of the supported RSA variants.
pub fn is_supported_signature_method(uri: &str) -> bool {
    matches!(uri, RSA_SHA1 | RSA_SHA224 | RSA_SHA256)
}
