#![forbid(unsafe_code)]

//! OCSP response verification.
//!
//! A response is accepted when its signature verifies against one of the
//! configured responder certificates, its `producedAt` lies within
//! `[now - skew - maxAge, now + skew]`, it carries exactly one
//! `SingleResponse` whose status is `good`, and (when expected) its nonce
//! extension echoes the nonce that was sent.

use crate::conf::OcspConf;
use der::asn1::OctetString;
use der::{Decode, Encode};
use sigtuna_certs::X509Cert;
use sigtuna_core::Error;
use x509_cert::serial_number::SerialNumber;
use x509_ocsp::{BasicOcspResponse, CertStatus, OcspResponse, OcspResponseStatus};

/// The verified content of an OCSP response.
#[derive(Debug, Clone)]
pub struct VerifiedResponse {
    /// `producedAt`, seconds since the Unix epoch.
    pub produced_at: u64,
    /// The nonce extension value, unwrapped.
    pub nonce: Option<Vec<u8>>,
    /// The configured responder certificate that signed the response.
    pub responder: X509Cert,
}

/// Verify a DER-encoded OCSP response against a responder configuration.
///
/// `expected_serial` pins the single response to one certificate;
/// `expected_nonce` additionally requires the echoed nonce to match.
pub fn verify_response(
    conf: &OcspConf,
    response_der: &[u8],
    expected_serial: Option<&SerialNumber>,
    expected_nonce: Option<&[u8]>,
) -> Result<VerifiedResponse, Error> {
    let response = OcspResponse::from_der(response_der)
        .map_err(|e| Error::Revocation(format!("malformed OCSP response: {e}")))?;

    if response.response_status != OcspResponseStatus::Successful {
        return Err(Error::Revocation(format!(
            "OCSP response status is {:?}",
            response.response_status
        )));
    }

    let response_bytes = response
        .response_bytes
        .ok_or_else(|| Error::Revocation("OCSP response carries no response bytes".into()))?;
    if response_bytes.response_type != const_oid::db::rfc6960::ID_PKIX_OCSP_BASIC {
        return Err(Error::Revocation(format!(
            "unexpected OCSP response type {}",
            response_bytes.response_type
        )));
    }

    let basic = BasicOcspResponse::from_der(response_bytes.response.as_bytes())
        .map_err(|e| Error::Revocation(format!("malformed basic OCSP response: {e}")))?;

    // 1. The response must be signed by a configured responder.
    let tbs_der = basic
        .tbs_response_data
        .to_der()
        .map_err(|e| Error::Revocation(format!("failed to re-encode response data: {e}")))?;
    let signature = basic
        .signature
        .as_bytes()
        .ok_or_else(|| Error::Revocation("OCSP response has no signature bytes".into()))?;
    let signature_oid = basic.signature_algorithm.oid.to_string();

    let responder = conf
        .responder_certs
        .iter()
        .find(|cert| {
            cert.verify_der_message(&signature_oid, &tbs_der, signature)
                .is_ok()
        })
        .ok_or_else(|| {
            Error::Trust("OCSP response is not signed by a configured responder".into())
        })?
        .clone();

    // 2. Freshness window on producedAt.
    let produced_at = basic
        .tbs_response_data
        .produced_at
        .0
        .to_unix_duration()
        .as_secs();
    check_produced_at(produced_at, conf.skew, conf.max_age)?;

    // 3. Exactly one SingleResponse, status good, for the expected serial.
    if basic.tbs_response_data.responses.len() != 1 {
        return Err(Error::Revocation(format!(
            "expected exactly one SingleResponse, found {}",
            basic.tbs_response_data.responses.len()
        )));
    }
    let single = &basic.tbs_response_data.responses[0];

    if let Some(serial) = expected_serial {
        if single.cert_id.serial_number != *serial {
            return Err(Error::Revocation(
                "OCSP response is for a different certificate".into(),
            ));
        }
    }

    match &single.cert_status {
        CertStatus::Good(_) => {}
        CertStatus::Revoked(info) => {
            return Err(Error::Revocation(format!(
                "certificate is revoked (at {})",
                info.revocation_time.0.to_date_time()
            )));
        }
        CertStatus::Unknown(_) => {
            return Err(Error::Revocation("certificate status is unknown".into()));
        }
    }

    // 4. Nonce extraction and (optionally) comparison.
    let nonce = response_nonce(&basic);
    if let Some(expected) = expected_nonce {
        if nonce.as_deref() != Some(expected) {
            return Err(Error::Revocation(
                "OCSP response nonce does not match the request nonce".into(),
            ));
        }
    }

    Ok(VerifiedResponse {
        produced_at,
        nonce,
        responder,
    })
}

fn check_produced_at(produced_at: u64, skew: u64, max_age: u64) -> Result<(), Error> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| Error::Revocation(format!("system time error: {e}")))?
        .as_secs();

    let earliest = now.saturating_sub(skew).saturating_sub(max_age);
    let latest = now.saturating_add(skew);
    if produced_at < earliest || produced_at > latest {
        return Err(Error::Revocation(format!(
            "OCSP producedAt {produced_at} outside window [{earliest}, {latest}]"
        )));
    }
    Ok(())
}

/// Extract the nonce extension value from a basic OCSP response.
///
/// OpenSSL-built responders wrap the nonce in an extra OCTET STRING inside
/// the extension value; both the wrapped and the raw form are accepted.
pub fn response_nonce(basic: &BasicOcspResponse) -> Option<Vec<u8>> {
    let extensions = basic.tbs_response_data.response_extensions.as_ref()?;
    let nonce_ext = extensions
        .iter()
        .find(|e| e.extn_id == const_oid::db::rfc6960::ID_PKIX_OCSP_NONCE)?;
    let raw = nonce_ext.extn_value.as_bytes();
    match OctetString::from_der(raw) {
        Ok(inner) => Some(inner.as_bytes().to_vec()),
        Err(_) => Some(raw.to_vec()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::conf::OcspConf;
    use der::asn1::{GeneralizedTime, Null, ObjectIdentifier, OctetString};
    use der::{Any, AnyRef, Encode};
    use sigtuna_core::algorithm;
    use sigtuna_crypto::digest;
    use spki::AlgorithmIdentifierOwned;
    use std::str::FromStr;
    use std::time::Duration;
    use x509_cert::builder::{Builder, CertificateBuilder, Profile};
    use x509_cert::ext::Extension;
    use x509_cert::name::Name;
    use x509_cert::time::Validity;
    use x509_ocsp::{
        CertId, OcspGeneralizedTime, ResponderId, ResponseBytes, ResponseData, SingleResponse,
        Version,
    };

    const SHA1_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
    const SHA256_RSA_OID: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

    pub(crate) struct TestPki {
        pub ca: X509Cert,
        pub signer: X509Cert,
        pub responder: X509Cert,
        pub responder_key: rsa::RsaPrivateKey,
    }

    pub(crate) fn test_pki() -> &'static TestPki {
        static PKI: std::sync::OnceLock<TestPki> = std::sync::OnceLock::new();
        PKI.get_or_init(|| {
            let mut rng = rand::thread_rng();
            let ca_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
            let signer_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
            let responder_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();

            let ca = make_cert(Profile::Root, 1, "CN=OCSP Test CA,O=Sigtuna", &ca_key, &ca_key);
            let signer = make_cert(
                leaf_profile(),
                7,
                "CN=Signer,O=Sigtuna",
                &signer_key,
                &ca_key,
            );
            let responder = make_cert(
                leaf_profile(),
                9,
                "CN=Responder,O=Sigtuna",
                &responder_key,
                &ca_key,
            );
            TestPki {
                ca,
                signer,
                responder,
                responder_key,
            }
        })
    }

    fn leaf_profile() -> Profile {
        Profile::Leaf {
            issuer: Name::from_str("CN=OCSP Test CA,O=Sigtuna").unwrap(),
            enable_key_agreement: false,
            enable_key_encipherment: false,
        }
    }

    fn make_cert(
        profile: Profile,
        serial: u32,
        subject: &str,
        key: &rsa::RsaPrivateKey,
        signer_key: &rsa::RsaPrivateKey,
    ) -> X509Cert {
        use rsa::pkcs8::EncodePublicKey;
        use x509_cert::serial_number::SerialNumber;
        use x509_cert::spki::SubjectPublicKeyInfoOwned;

        let pub_der = key.to_public_key().to_public_key_der().unwrap();
        let spki = SubjectPublicKeyInfoOwned::try_from(pub_der.as_bytes()).unwrap();
        let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(signer_key.clone());

        let builder = CertificateBuilder::new(
            profile,
            SerialNumber::from(serial),
            Validity::from_now(Duration::from_secs(3600)).unwrap(),
            Name::from_str(subject).unwrap(),
            spki,
            &signer,
        )
        .unwrap();
        let cert = builder.build::<rsa::pkcs1v15::Signature>().unwrap();
        X509Cert::from_der(&cert.to_der().unwrap()).unwrap()
    }

    pub(crate) fn signer_and_issuer() -> (X509Cert, X509Cert) {
        let pki = test_pki();
        (pki.signer.clone(), pki.ca.clone())
    }

    fn now_secs() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    /// Build and sign a basic OCSP response for the test signer.
    pub(crate) fn build_response(
        pki: &TestPki,
        status: CertStatus,
        produced_at: u64,
        nonce: Option<&[u8]>,
    ) -> Vec<u8> {
        let name_hash = digest::digest(algorithm::SHA1, &pki.ca.subject_der().unwrap()).unwrap();
        let key_hash = digest::digest(algorithm::SHA1, pki.ca.public_key_bits()).unwrap();

        let cert_id = CertId {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: SHA1_OID,
                parameters: Some(Any::from(AnyRef::NULL)),
            },
            issuer_name_hash: OctetString::new(name_hash).unwrap(),
            issuer_key_hash: OctetString::new(key_hash).unwrap(),
            serial_number: pki.signer.certificate().tbs_certificate.serial_number.clone(),
        };

        let time: OcspGeneralizedTime =
            GeneralizedTime::from_unix_duration(Duration::from_secs(produced_at))
                .unwrap()
                .into();
        let single = SingleResponse {
            cert_id,
            cert_status: status,
            this_update: time,
            next_update: None,
            single_request_extensions: None,
        };

        let response_extensions = nonce.map(|n| {
            vec![Extension {
                extn_id: const_oid::db::rfc6960::ID_PKIX_OCSP_NONCE,
                critical: false,
                extn_value: OctetString::new(n.to_vec()).unwrap(),
            }]
        });

        let tbs = ResponseData {
            version: Version::V1,
            responder_id: ResponderId::ByName(
                pki.responder.certificate().tbs_certificate.subject.clone(),
            ),
            produced_at: time,
            responses: vec![single],
            response_extensions,
        };
        let tbs_der = tbs.to_der().unwrap();

        let signature = {
            use signature::{SignatureEncoding, Signer};
            let key = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(pki.responder_key.clone());
            key.sign(&tbs_der).to_vec()
        };

        let basic = BasicOcspResponse {
            tbs_response_data: tbs,
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: SHA256_RSA_OID,
                parameters: Some(Any::from(AnyRef::NULL)),
            },
            signature: der::asn1::BitString::from_bytes(&signature).unwrap(),
            certs: None,
        };
        let basic_der = basic.to_der().unwrap();

        OcspResponse {
            response_status: OcspResponseStatus::Successful,
            response_bytes: Some(ResponseBytes {
                response_type: const_oid::db::rfc6960::ID_PKIX_OCSP_BASIC,
                response: OctetString::new(basic_der).unwrap(),
            }),
        }
        .to_der()
        .unwrap()
    }

    pub(crate) fn conf_for(pki: &TestPki) -> OcspConf {
        OcspConf {
            url: "http://ocsp.test.sigtuna".into(),
            responder_certs: vec![pki.responder.clone()],
            skew: 300,
            max_age: 3600,
        }
    }

    #[test]
    fn good_response_verifies() {
        let pki = test_pki();
        let nonce = [7u8; 32];
        let der_bytes =
            build_response(pki, CertStatus::Good(Null), now_secs(), Some(&nonce));

        let verified = verify_response(
            &conf_for(pki),
            &der_bytes,
            Some(&pki.signer.certificate().tbs_certificate.serial_number),
            Some(&nonce),
        )
        .unwrap();
        assert_eq!(verified.nonce.as_deref(), Some(&nonce[..]));
        assert_eq!(verified.responder.der(), pki.responder.der());
    }

    #[test]
    fn unknown_responder_is_a_trust_failure() {
        let pki = test_pki();
        let der_bytes = build_response(pki, CertStatus::Good(Null), now_secs(), None);

        // The configured set only holds the CA, not the actual responder.
        let conf = OcspConf {
            responder_certs: vec![pki.ca.clone()],
            ..conf_for(pki)
        };
        let err = verify_response(&conf, &der_bytes, None, None).unwrap_err();
        assert!(matches!(err, Error::Trust(_)));
    }

    #[test]
    fn stale_produced_at_is_rejected() {
        let pki = test_pki();
        let stale = now_secs() - 3600 - 300 - 60;
        let der_bytes = build_response(pki, CertStatus::Good(Null), stale, None);
        let err = verify_response(&conf_for(pki), &der_bytes, None, None).unwrap_err();
        assert!(matches!(err, Error::Revocation(m) if m.contains("producedAt")));
    }

    #[test]
    fn revoked_status_is_rejected() {
        let pki = test_pki();
        let revoked = CertStatus::Revoked(x509_ocsp::RevokedInfo {
            revocation_time: GeneralizedTime::from_unix_duration(Duration::from_secs(
                now_secs() - 60,
            ))
            .unwrap()
            .into(),
            revocation_reason: None,
        });
        let der_bytes = build_response(pki, revoked, now_secs(), None);
        let err = verify_response(&conf_for(pki), &der_bytes, None, None).unwrap_err();
        assert!(matches!(err, Error::Revocation(m) if m.contains("revoked")));
    }

    #[test]
    fn nonce_mismatch_is_rejected() {
        let pki = test_pki();
        let der_bytes =
            build_response(pki, CertStatus::Good(Null), now_secs(), Some(&[1u8; 32]));
        let err = verify_response(&conf_for(pki), &der_bytes, None, Some(&[2u8; 32]))
            .unwrap_err();
        assert!(matches!(err, Error::Revocation(m) if m.contains("nonce")));
    }

    #[test]
    fn wrapped_nonce_is_unwrapped() {
        let pki = test_pki();
        // An OpenSSL-style responder stores the DER of an OCTET STRING.
        let inner = [9u8; 20];
        let wrapped = OctetString::new(inner.to_vec()).unwrap().to_der().unwrap();
        let der_bytes =
            build_response(pki, CertStatus::Good(Null), now_secs(), Some(&wrapped));
        let verified =
            verify_response(&conf_for(pki), &der_bytes, None, Some(&inner)).unwrap();
        assert_eq!(verified.nonce.as_deref(), Some(&inner[..]));
    }

    #[test]
    fn wrong_serial_is_rejected() {
        let pki = test_pki();
        let der_bytes = build_response(pki, CertStatus::Good(Null), now_secs(), None);
        let err = verify_response(
            &conf_for(pki),
            &der_bytes,
            Some(&pki.responder.certificate().tbs_certificate.serial_number),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Revocation(m) if m.contains("different certificate")));
    }
}
