#![forbid(unsafe_code)]

//! OCSP request construction and the responder exchange.

use crate::conf::OcspConf;
use crate::verify::{verify_response, VerifiedResponse};
use der::asn1::{ObjectIdentifier, OctetString};
use der::{Any, AnyRef, Encode};
use sigtuna_certs::X509Cert;
use sigtuna_core::{algorithm, Error};
use sigtuna_crypto::digest;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::Extension;
use x509_ocsp::{CertId, OcspRequest, Request, TbsRequest, Version};

/// CertID hashes use SHA-1, the conventional choice of existing
/// responders; the configured digest URI governs the nonce instead.
const SHA1_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");

/// A single synchronous OCSP exchange.
///
/// Implementations send a DER-encoded request and return the DER-encoded
/// response.  Deadline expiry surfaces as a transport error; there are no
/// retries at this layer.
pub trait OcspTransport {
    fn exchange(&self, url: &str, request_der: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Blocking HTTP POST transport with a per-client deadline.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: std::time::Duration) -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl OcspTransport for HttpTransport {
    fn exchange(&self, url: &str, request_der: &[u8]) -> Result<Vec<u8>, Error> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/ocsp-request")
            .header("Accept", "application/ocsp-response")
            .body(request_der.to_vec())
            .send()
            .map_err(|e| Error::Transport(format!("OCSP exchange with {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "OCSP responder {url} returned HTTP {}",
                response.status()
            )));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| Error::Transport(format!("failed to read OCSP response: {e}")))
    }
}

/// Build a DER-encoded OCSP request for `cert` against `issuer`, carrying
/// `nonce` in the nonce extension.
pub fn build_request(
    cert: &X509Cert,
    issuer: &X509Cert,
    nonce: &[u8],
) -> Result<Vec<u8>, Error> {
    let issuer_name_hash = digest::digest(algorithm::SHA1, &issuer.subject_der()?)?;
    let issuer_key_hash = digest::digest(algorithm::SHA1, issuer.public_key_bits())?;

    let cert_id = CertId {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: SHA1_OID,
            parameters: Some(Any::from(AnyRef::NULL)),
        },
        issuer_name_hash: OctetString::new(issuer_name_hash)
            .map_err(|e| Error::Revocation(format!("issuer name hash: {e}")))?,
        issuer_key_hash: OctetString::new(issuer_key_hash)
            .map_err(|e| Error::Revocation(format!("issuer key hash: {e}")))?,
        serial_number: cert.certificate().tbs_certificate.serial_number.clone(),
    };

    let nonce_extension = Extension {
        extn_id: const_oid::db::rfc6960::ID_PKIX_OCSP_NONCE,
        critical: false,
        extn_value: OctetString::new(nonce.to_vec())
            .map_err(|e| Error::Revocation(format!("nonce extension: {e}")))?,
    };

    let request = OcspRequest {
        tbs_request: TbsRequest {
            version: Version::V1,
            requestor_name: None,
            request_list: vec![Request {
                req_cert: cert_id,
                single_request_extensions: None,
            }],
            request_extensions: Some(vec![nonce_extension]),
        },
        optional_signature: None,
    };

    request
        .to_der()
        .map_err(|e| Error::Revocation(format!("failed to encode OCSP request: {e}")))
}

/// OCSP client: one request/verify round against a configured responder.
pub struct OcspClient<'a> {
    conf: &'a OcspConf,
    transport: &'a dyn OcspTransport,
}

impl<'a> OcspClient<'a> {
    pub fn new(conf: &'a OcspConf, transport: &'a dyn OcspTransport) -> Self {
        Self { conf, transport }
    }

    /// Query the responder for `cert` and verify the answer: responder
    /// signature, freshness window, `good` status for this serial, and the
    /// echoed nonce.  Returns the raw response bytes alongside the
    /// verified data.
    pub fn check_cert(
        &self,
        cert: &X509Cert,
        issuer: &X509Cert,
        nonce: &[u8],
    ) -> Result<(Vec<u8>, VerifiedResponse), Error> {
        let request_der = build_request(cert, issuer, nonce)?;
        let response_der = self.transport.exchange(&self.conf.url, &request_der)?;
        let verified = verify_response(
            self.conf,
            &response_der,
            Some(&cert.certificate().tbs_certificate.serial_number),
            Some(nonce),
        )?;
        Ok((response_der, verified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Decode;

    #[test]
    fn request_round_trips_through_der() {
        let (cert, issuer) = crate::verify::tests::signer_and_issuer();
        let nonce = [0xA5u8; 32];

        let der_bytes = build_request(&cert, &issuer, &nonce).unwrap();
        let decoded = OcspRequest::from_der(&der_bytes).unwrap();

        assert_eq!(decoded.tbs_request.request_list.len(), 1);
        let req = &decoded.tbs_request.request_list[0];
        assert_eq!(
            req.req_cert.serial_number,
            cert.certificate().tbs_certificate.serial_number
        );
        assert_eq!(req.req_cert.issuer_name_hash.as_bytes().len(), 20);

        let extensions = decoded.tbs_request.request_extensions.unwrap();
        assert_eq!(extensions.len(), 1);
        assert_eq!(extensions[0].extn_id, const_oid::db::rfc6960::ID_PKIX_OCSP_NONCE);
        assert_eq!(extensions[0].extn_value.as_bytes(), nonce);
    }
}
