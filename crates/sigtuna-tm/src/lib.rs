#![forbid(unsafe_code)]

//! Time-mark (TM) validation and acquisition.
//!
//! A TM signature embeds an OCSP response whose nonce is the digest of the
//! signature value, proving the certificate was not revoked at signing
//! time.  The offline path re-verifies an embedded response; the online
//! path obtains a fresh one and emits an augmented signature.

pub mod augment;

use sigtuna_certs::{TrustStore, X509Cert};
use sigtuna_core::Error;
use sigtuna_crypto::digest;
use sigtuna_ocsp::{issuer_cn, OcspClient, OcspConf, OcspConfRegistry, OcspTransport};
use sigtuna_ocsp::verify::verify_response;
use sigtuna_ocsp::VerifiedResponse;
use sigtuna_xades::SignatureDocument;

/// Validator for the TM profile of a parsed signature.
pub struct TmValidator<'a> {
    doc: &'a SignatureDocument,
    registry: &'a OcspConfRegistry,
    store: &'a dyn TrustStore,
    /// Digest URI used for the nonce and the reference hashes of freshly
    /// acquired responses.
    digest_uri: &'a str,
}

impl<'a> TmValidator<'a> {
    pub fn new(
        doc: &'a SignatureDocument,
        registry: &'a OcspConfRegistry,
        store: &'a dyn TrustStore,
        digest_uri: &'a str,
    ) -> Self {
        Self {
            doc,
            registry,
            store,
            digest_uri,
        }
    }

    /// Resolve the responder configuration (by signer-issuer CN) and the
    /// issuer certificate (by DER issuer name).
    fn prepare(&self) -> Result<(X509Cert, X509Cert, &'a OcspConf), Error> {
        let signing_cert = self.doc.signing_certificate()?;

        let cn = issuer_cn(&signing_cert.issuer())?;
        if !self.registry.has_conf(&cn) {
            return Err(Error::Config("Failed to find ocsp responder".into()));
        }
        let conf = self.registry.get_conf(&cn)?;

        let issuer = self
            .store
            .cert_by_issuer(&signing_cert.issuer_der()?)
            .ok_or_else(|| Error::Trust("Failed to load issuer certificate".into()))?;

        Ok((signing_cert, issuer, conf))
    }

    /// Re-verify the OCSP response already embedded in the signature.
    ///
    /// 1. The response verifies against the configured responder set and
    ///    is fresh.
    /// 2. Its nonce equals the digest of the signature value under the
    ///    algorithm the signature's own OCSP reference names.
    /// 3. The stored response hash matches the response bytes.
    pub fn validate_tm_offline(&self) -> Result<VerifiedResponse, Error> {
        let (signing_cert, _issuer, conf) = self.prepare()?;

        let response = self.doc.ocsp_response_value()?;
        let verified = verify_response(
            conf,
            &response,
            Some(&signing_cert.certificate().tbs_certificate.serial_number),
            None,
        )?;

        let nonce_method = self.doc.ocsp_digest_algorithm()?;
        let nonce = digest::digest(&nonce_method, self.doc.signature_value())?;
        if verified.nonce.as_deref() != Some(nonce.as_slice()) {
            return Err(Error::Revocation(
                "Calculated signature hash doesn't match to OCSP responder nonce field".into(),
            ));
        }

        let (stored_hash, hash_method) = self.doc.revocation_ocsp_ref()?;
        let response_hash = digest::digest(&hash_method, &response)?;
        if response_hash != stored_hash {
            return Err(Error::DigestMismatch(
                "OCSPRef value doesn't match with hash of OCSP response".into(),
            ));
        }

        Ok(verified)
    }

    /// Obtain a fresh OCSP proof for a BES signature and emit the
    /// augmented signature XML.
    pub fn acquire_tm_online(&self, transport: &dyn OcspTransport) -> Result<String, Error> {
        let (signing_cert, issuer, conf) = self.prepare()?;

        let nonce = digest::digest(self.digest_uri, self.doc.signature_value())?;
        let client = OcspClient::new(conf, transport);
        let (response_der, verified) = client.check_cert(&signing_cert, &issuer, &nonce)?;

        let responder_issuer = self
            .store
            .cert_by_issuer(&verified.responder.issuer_der()?)
            .ok_or_else(|| Error::Trust("Failed to load issuer certificate".into()))?;

        augment::augment_signature(
            self.doc,
            &issuer,
            &verified.responder,
            &responder_issuer,
            &response_der,
            verified.produced_at,
            self.digest_uri,
        )
    }

    /// `ProducedAt` of the embedded OCSP reference, for reporting.
    pub fn produced_at(&self) -> Result<String, Error> {
        self.doc.produced_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use der::asn1::{GeneralizedTime, Null, OctetStringRef};
    use der::{Any, AnyRef, Decode, Encode, ObjectIdentifier};
    use sigtuna_certs::MemoryTrustStore;
    use sigtuna_core::{algorithm, ns};
    use sigtuna_xades::{validate_offline, MemoryContainer};
    use sigtuna_xml::NodeSet;
    use spki::{AlgorithmIdentifierOwned, AlgorithmIdentifierRef};
    use std::str::FromStr;
    use std::time::Duration;
    use x509_cert::builder::{Builder, CertificateBuilder, Profile};
    use x509_cert::ext::Extension;
    use x509_cert::name::Name;
    use x509_cert::serial_number::SerialNumber;
    use x509_cert::spki::SubjectPublicKeyInfoOwned;
    use x509_cert::time::Validity;
    use x509_ocsp::{
        BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus,
        ResponderId, ResponseBytes, ResponseData, SingleResponse, Version,
    };

    const CA_SUBJECT: &str = "CN=TM Test CA,O=Sigtuna";
    const SHA1_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
    const SHA256_RSA_OID: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

    struct Pki {
        ca: X509Cert,
        signer_key: rsa::RsaPrivateKey,
        signer: X509Cert,
        responder_key: rsa::RsaPrivateKey,
        responder: X509Cert,
    }

    fn pki() -> &'static Pki {
        static PKI: std::sync::OnceLock<Pki> = std::sync::OnceLock::new();
        PKI.get_or_init(|| {
            let mut rng = rand::thread_rng();
            let ca_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
            let signer_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
            let responder_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();

            let ca = make_cert(Profile::Root, 1, CA_SUBJECT, &ca_key, &ca_key);
            let signer = make_cert(leaf(), 7, "CN=Signer,O=Sigtuna", &signer_key, &ca_key);
            let responder =
                make_cert(leaf(), 9, "CN=Responder,O=Sigtuna", &responder_key, &ca_key);

            Pki {
                ca,
                signer_key,
                signer,
                responder_key,
                responder,
            }
        })
    }

    fn leaf() -> Profile {
        Profile::Leaf {
            issuer: Name::from_str(CA_SUBJECT).unwrap(),
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

    fn b64(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    fn now_secs() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    /// Sign and assemble a one-document BES fixture in the given profile.
    fn build_bes(xades_ns: &str) -> (String, MemoryContainer) {
        let p = pki();
        let document = b"tm fixture document".to_vec();
        let doc_digest = digest::digest(algorithm::SHA256, &document).unwrap();
        let cert_digest = digest::digest(algorithm::SHA256, p.signer.der()).unwrap();

        let policy = if xades_ns == ns::XADES111 {
            "<SignaturePolicyIdentifier></SignaturePolicyIdentifier>"
        } else {
            ""
        };

        let mut xml = format!(
            "<ds:Signature xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\" Id=\"S1\">\
               <ds:SignedInfo>\
                 <ds:CanonicalizationMethod Algorithm=\"{c14n}\"></ds:CanonicalizationMethod>\
                 <ds:SignatureMethod Algorithm=\"{rsa_sha256}\"></ds:SignatureMethod>\
                 <ds:Reference URI=\"vote.txt\">\
                   <ds:DigestMethod Algorithm=\"{sha256}\"></ds:DigestMethod>\
                   <ds:DigestValue>{doc_digest}</ds:DigestValue>\
                 </ds:Reference>\
                 <ds:Reference Type=\"http://uri.etsi.org/01903#SignedProperties\" \
                               URI=\"#S1-SignedProperties\">\
                   <ds:DigestMethod Algorithm=\"{sha256}\"></ds:DigestMethod>\
                   <ds:DigestValue>SPDIGEST</ds:DigestValue>\
                 </ds:Reference>\
               </ds:SignedInfo>\
               <ds:SignatureValue>SIGVALUE</ds:SignatureValue>\
               <ds:KeyInfo><ds:X509Data>\
                 <ds:X509Certificate>{cert}</ds:X509Certificate>\
               </ds:X509Data></ds:KeyInfo>\
               <ds:Object>\
                 <QualifyingProperties xmlns=\"{xades}\" Target=\"#S1\">\
                   <SignedProperties Id=\"S1-SignedProperties\">\
                     <SignedSignatureProperties>\
                       <SigningTime>2013-10-15T14:04:08Z</SigningTime>\
                       <SigningCertificate><Cert>\
                         <CertDigest>\
                           <ds:DigestMethod Algorithm=\"{sha256}\"></ds:DigestMethod>\
                           <ds:DigestValue>{cert_digest}</ds:DigestValue>\
                         </CertDigest>\
                         <IssuerSerial>\
                           <ds:X509IssuerName>{issuer}</ds:X509IssuerName>\
                           <ds:X509SerialNumber>{serial}</ds:X509SerialNumber>\
                         </IssuerSerial>\
                       </Cert></SigningCertificate>\
                       {policy}\
                     </SignedSignatureProperties>\
                   </SignedProperties>\
                 </QualifyingProperties>\
               </ds:Object>\
             </ds:Signature>",
            c14n = algorithm::C14N,
            rsa_sha256 = algorithm::RSA_SHA256,
            sha256 = algorithm::SHA256,
            doc_digest = b64(&doc_digest),
            cert = b64(p.signer.der()),
            xades = xades_ns,
            cert_digest = b64(&cert_digest),
            issuer = p.signer.issuer(),
            serial = p.signer.serial_decimal(),
            policy = policy,
        );

        let sp_digest = subtree_digest(&xml, xades_ns, "SignedProperties");
        xml = xml.replacen("SPDIGEST", &b64(&sp_digest), 1);

        let signed_info = subtree_c14n(&xml, ns::DSIG, "SignedInfo");
        let signature = {
            use signature::{SignatureEncoding, Signer};
            let key = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(p.signer_key.clone());
            key.sign(&signed_info).to_vec()
        };
        xml = xml.replacen("SIGVALUE", &b64(&signature), 1);

        let mut container = MemoryContainer::new();
        container.add_document("vote.txt", document);
        (xml, container)
    }

    fn subtree_c14n(xml: &str, ns_uri: &str, tag: &str) -> Vec<u8> {
        let doc = sigtuna_xml::parse(xml).unwrap();
        let node = sigtuna_xml::find_element(&doc, ns_uri, tag).unwrap();
        let set = NodeSet::tree_without_comments(node);
        sigtuna_c14n::canonicalize_doc(
            &doc,
            sigtuna_c14n::C14nMode::Inclusive,
            Some(&set),
            &[],
        )
        .unwrap()
    }

    fn subtree_digest(xml: &str, ns_uri: &str, tag: &str) -> Vec<u8> {
        digest::digest(algorithm::SHA256, &subtree_c14n(xml, ns_uri, tag)).unwrap()
    }

    /// Build a signed basic OCSP response for the test signer.
    fn build_response(status: CertStatus, produced_at: u64, nonce: &[u8]) -> Vec<u8> {
        let p = pki();
        let name_hash = digest::digest(algorithm::SHA1, &p.ca.subject_der().unwrap()).unwrap();
        let key_hash = digest::digest(algorithm::SHA1, p.ca.public_key_bits()).unwrap();

        let time = GeneralizedTime::from_unix_duration(Duration::from_secs(produced_at)).unwrap();
        let tbs = ResponseData {
            version: Version::V1,
            responder_id: ResponderId::ByName(
                p.responder.certificate().tbs_certificate.subject.clone(),
            ),
            produced_at: time,
            responses: vec![SingleResponse {
                cert_id: CertId {
                    hash_algorithm: AlgorithmIdentifierRef {
                        oid: SHA1_OID,
                        parameters: Some(AnyRef::NULL),
                    },
                    issuer_name_hash: OctetStringRef::new(&name_hash).unwrap(),
                    issuer_key_hash: OctetStringRef::new(&key_hash).unwrap(),
                    serial_number: p.signer.certificate().tbs_certificate.serial_number.clone(),
                },
                cert_status: status,
                this_update: time,
                next_update: None,
                single_request_extensions: None,
            }],
            response_extensions: Some(vec![Extension {
                extn_id: const_oid::db::rfc6960::ID_PKIX_OCSP_NONCE,
                critical: false,
                extn_value: der::asn1::OctetString::new(nonce.to_vec()).unwrap(),
            }]),
        };
        let tbs_der = tbs.to_der().unwrap();

        let signature = {
            use signature::{SignatureEncoding, Signer};
            let key = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(p.responder_key.clone());
            key.sign(&tbs_der).to_vec()
        };

        let basic = BasicOcspResponse {
            tbs_response_data: tbs,
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: SHA256_RSA_OID,
                parameters: Some(Any::from(AnyRef::NULL)),
            },
            signature: der::asn1::BitStringRef::from_bytes(&signature).unwrap(),
            certs: None,
        };
        let basic_der = basic.to_der().unwrap();

        OcspResponse {
            response_status: OcspResponseStatus::Successful,
            response_bytes: Some(ResponseBytes {
                response_type: const_oid::db::rfc6960::ID_PKIX_OCSP_BASIC,
                response: OctetStringRef::new(&basic_der).unwrap(),
            }),
        }
        .to_der()
        .unwrap()
    }

    /// Embed an OCSP response plus its reference into a signed BES.
    fn embed_tm(xml: &str, response: &[u8], stored_hash: &[u8]) -> String {
        let produced_at = "2013-10-15T14:04:08Z";
        let block = format!(
            "<UnsignedProperties><UnsignedSignatureProperties>\
               <RevocationValues><OCSPValues>\
                 <EncapsulatedOCSPValue>{response}</EncapsulatedOCSPValue>\
               </OCSPValues></RevocationValues>\
               <CompleteRevocationRefs><OCSPRefs><OCSPRef>\
                 <OCSPIdentifier>\
                   <ResponderID>CN=Responder,O=Sigtuna</ResponderID>\
                   <ProducedAt>{produced_at}</ProducedAt>\
                 </OCSPIdentifier>\
                 <DigestAlgAndValue>\
                   <ds:DigestMethod Algorithm=\"{sha256}\"></ds:DigestMethod>\
                   <ds:DigestValue>{stored_hash}</ds:DigestValue>\
                 </DigestAlgAndValue>\
               </OCSPRef></OCSPRefs></CompleteRevocationRefs>\
             </UnsignedSignatureProperties></UnsignedProperties>",
            response = b64(response),
            produced_at = produced_at,
            sha256 = algorithm::SHA256,
            stored_hash = b64(stored_hash),
        );
        xml.replacen("</QualifyingProperties>", &format!("{block}</QualifyingProperties>"), 1)
    }

    fn registry() -> OcspConfRegistry {
        let p = pki();
        let mut registry = OcspConfRegistry::new();
        registry.insert(
            "TM Test CA",
            OcspConf {
                url: "http://ocsp.test.sigtuna".into(),
                responder_certs: vec![p.responder.clone()],
                skew: 300,
                max_age: 3600,
            },
        );
        registry
    }

    fn trust_store() -> MemoryTrustStore {
        let mut store = MemoryTrustStore::new();
        store.add(pki().ca.clone());
        store
    }

    /// A responder double: parses the request, echoes its nonce back in a
    /// `good` response.
    struct StubResponder;

    impl OcspTransport for StubResponder {
        fn exchange(&self, _url: &str, request_der: &[u8]) -> Result<Vec<u8>, Error> {
            let request = OcspRequest::from_der(request_der)
                .map_err(|e| Error::Transport(format!("stub: bad request: {e}")))?;
            let nonce = request
                .tbs_request
                .request_extensions
                .as_ref()
                .and_then(|exts| {
                    exts.iter()
                        .find(|e| e.extn_id == const_oid::db::rfc6960::ID_PKIX_OCSP_NONCE)
                })
                .map(|e| e.extn_value.as_bytes().to_vec())
                .unwrap_or_default();
            Ok(build_response(CertStatus::Good(Null), now_secs(), &nonce))
        }
    }

    /// A transport that must never be reached.
    struct FailingTransport;

    impl OcspTransport for FailingTransport {
        fn exchange(&self, url: &str, _request_der: &[u8]) -> Result<Vec<u8>, Error> {
            Err(Error::Transport(format!("unreachable responder {url}")))
        }
    }

    fn tm_xml(xades_ns: &str) -> (String, MemoryContainer) {
        let (xml, container) = build_bes(xades_ns);
        let doc = SignatureDocument::parse(xml.as_bytes()).unwrap();
        let nonce = digest::digest(algorithm::SHA256, doc.signature_value()).unwrap();
        let response = build_response(CertStatus::Good(Null), now_secs(), &nonce);
        let stored_hash = digest::digest(algorithm::SHA256, &response).unwrap();
        (embed_tm(&xml, &response, &stored_hash), container)
    }

    #[test]
    fn tm_offline_validates_v111_with_embedded_response() {
        let (xml, mut container) = tm_xml(ns::XADES111);
        let doc = SignatureDocument::parse(xml.as_bytes()).unwrap();
        let registry = registry();
        let store = trust_store();

        // The embedded material does not disturb the offline checks.
        validate_offline(&doc, &mut container, &store).unwrap();

        let validator = TmValidator::new(&doc, &registry, &store, algorithm::SHA256);
        let verified = validator.validate_tm_offline().unwrap();
        assert_eq!(verified.responder.der(), pki().responder.der());
        assert_eq!(validator.produced_at().unwrap(), "2013-10-15T14:04:08Z");
    }

    #[test]
    fn tm_offline_rejects_nonce_mismatch() {
        let (xml, _container) = build_bes(ns::XADES111);
        let wrong_nonce = digest::digest(algorithm::SHA256, b"unrelated data").unwrap();
        let response = build_response(CertStatus::Good(Null), now_secs(), &wrong_nonce);
        let stored_hash = digest::digest(algorithm::SHA256, &response).unwrap();
        let xml = embed_tm(&xml, &response, &stored_hash);

        let doc = SignatureDocument::parse(xml.as_bytes()).unwrap();
        let registry = registry();
        let store = trust_store();
        let validator = TmValidator::new(&doc, &registry, &store, algorithm::SHA256);
        let err = validator.validate_tm_offline().unwrap_err();
        assert!(matches!(err, Error::Revocation(m) if m.contains("nonce")));
    }

    #[test]
    fn tm_offline_rejects_wrong_response_hash() {
        let (xml, _container) = build_bes(ns::XADES111);
        let doc = SignatureDocument::parse(xml.as_bytes()).unwrap();
        let nonce = digest::digest(algorithm::SHA256, doc.signature_value()).unwrap();
        let response = build_response(CertStatus::Good(Null), now_secs(), &nonce);
        let bogus_hash = digest::digest(algorithm::SHA256, b"not the response").unwrap();
        let xml = embed_tm(&xml, &response, &bogus_hash);

        let doc = SignatureDocument::parse(xml.as_bytes()).unwrap();
        let registry = registry();
        let store = trust_store();
        let validator = TmValidator::new(&doc, &registry, &store, algorithm::SHA256);
        let err = validator.validate_tm_offline().unwrap_err();
        assert!(matches!(err, Error::DigestMismatch(_)));
    }

    #[test]
    fn tm_offline_rejects_untrusted_responder() {
        let (xml, _container) = tm_xml(ns::XADES111);
        let doc = SignatureDocument::parse(xml.as_bytes()).unwrap();

        // Configure the CA as the only acceptable responder certificate.
        let p = pki();
        let mut registry = OcspConfRegistry::new();
        registry.insert(
            "TM Test CA",
            OcspConf {
                url: "http://ocsp.test.sigtuna".into(),
                responder_certs: vec![p.ca.clone()],
                skew: 300,
                max_age: 3600,
            },
        );
        let store = trust_store();
        let validator = TmValidator::new(&doc, &registry, &store, algorithm::SHA256);
        let err = validator.validate_tm_offline().unwrap_err();
        assert!(matches!(err, Error::Trust(_)));
    }

    #[test]
    fn missing_conf_is_a_config_failure() {
        let (xml, _container) = tm_xml(ns::XADES111);
        let doc = SignatureDocument::parse(xml.as_bytes()).unwrap();
        let registry = OcspConfRegistry::new();
        let store = trust_store();
        let validator = TmValidator::new(&doc, &registry, &store, algorithm::SHA256);
        let err = validator.validate_tm_offline().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_issuer_in_store_is_a_trust_failure() {
        let (xml, _container) = tm_xml(ns::XADES111);
        let doc = SignatureDocument::parse(xml.as_bytes()).unwrap();
        let registry = registry();
        let empty_store = MemoryTrustStore::new();
        let validator = TmValidator::new(&doc, &registry, &empty_store, algorithm::SHA256);
        let err = validator.validate_tm_offline().unwrap_err();
        assert!(matches!(err, Error::Trust(_)));
    }

    #[test]
    fn online_acquisition_round_trips_through_tm_offline() {
        let (xml, mut container) = build_bes(ns::XADES132);
        let doc = SignatureDocument::parse(xml.as_bytes()).unwrap();
        let registry = registry();
        let store = trust_store();

        let validator = TmValidator::new(&doc, &registry, &store, algorithm::SHA256);
        let augmented = validator.acquire_tm_online(&StubResponder).unwrap();
        assert!(augmented.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));

        // The augmented signature still passes offline validation...
        let augmented_doc = SignatureDocument::parse(augmented.as_bytes()).unwrap();
        validate_offline(&augmented_doc, &mut container, &store).unwrap();

        // ...and its embedded OCSP material validates as a TM signature.
        let tm = TmValidator::new(&augmented_doc, &registry, &store, algorithm::SHA256);
        tm.validate_tm_offline().unwrap();
    }

    #[test]
    fn online_acquisition_propagates_transport_failure() {
        let (xml, _container) = build_bes(ns::XADES132);
        let doc = SignatureDocument::parse(xml.as_bytes()).unwrap();
        let registry = registry();
        let store = trust_store();
        let validator = TmValidator::new(&doc, &registry, &store, algorithm::SHA256);
        let err = validator.acquire_tm_online(&FailingTransport).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
