#![forbid(unsafe_code)]

//! Typed view over a `<Signature>` XML element.
//!
//! Parsing captures everything validation needs into owned data; the raw
//! text is retained because digests are recomputed over a canonical byte
//! stream that depends on the exact DOM the parser yields.  Re-parsing
//! with a whitespace-normalizing parser would make every digest fail.
//!
//! Two XAdES profiles are supported.  Both write the qualifying properties
//! as `Object/QualifyingProperties`; the element's namespace selects the
//! profile.  The profiles differ only in the cardinality of a few unsigned
//! properties and in the signature-policy rule; everything else is shared.

use base64::Engine;
use sigtuna_c14n::C14nMode;
use sigtuna_certs::X509Cert;
use sigtuna_core::{algorithm, ns, Error};
use sigtuna_crypto::digest;
use sigtuna_xml::NodeSet;

/// XAdES profile of a parsed signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// XAdES 1.1.1
    V111,
    /// XAdES 1.3.2
    V132,
}

impl Profile {
    pub fn xades_namespace(&self) -> &'static str {
        match self {
            Profile::V111 => ns::XADES111,
            Profile::V132 => ns::XADES132,
        }
    }
}

/// One `SignedInfo/Reference`.
#[derive(Debug, Clone)]
pub struct Reference {
    pub uri: Option<String>,
    pub ref_type: Option<String>,
    pub digest_method: String,
    pub digest_value: Vec<u8>,
}

impl Reference {
    /// Whether this reference points at `SignedProperties`.
    ///
    /// BDOC 1.0 writes `http://uri.etsi.org/01903#SignedProperties`, XAdES
    /// writes a versioned form; both are accepted.
    pub fn is_signed_properties_ref(&self) -> bool {
        match &self.ref_type {
            Some(t) => {
                t.starts_with(ns::ETSI_URI_PREFIX) && t.ends_with(ns::SIGNED_PROPERTIES_SUFFIX)
            }
            None => false,
        }
    }
}

/// `SignedProperties/SigningCertificate/Cert` contents.
#[derive(Debug, Clone)]
pub struct CertBinding {
    pub digest_method: String,
    pub digest_value: Vec<u8>,
    pub issuer_name: String,
    pub serial_number: String,
}

/// `CompleteRevocationRefs/OCSPRefs/OCSPRef` contents.
#[derive(Debug, Clone)]
pub struct OcspRefInfo {
    pub produced_at: String,
    pub digest_method: Option<String>,
    pub digest_value: Option<Vec<u8>>,
}

/// Qualifying-property structure shared by both profiles.
#[derive(Debug, Clone, Default)]
struct QualifyingInfo {
    target: Option<String>,
    signed_properties: bool,
    signed_signature_properties: bool,
    signing_certificate_certs: Vec<CertBinding>,
    signature_policy_identifier: bool,
    unsigned_properties: bool,
    unsigned_data_object_properties: bool,
    unsigned_signature_properties: bool,
    revocation_values_count: usize,
    ocsp_response: Option<Vec<u8>>,
    complete_revocation_refs_count: usize,
    ocsp_refs: Vec<OcspRefInfo>,
}

/// A parsed signature: raw XML plus the typed tree.
#[derive(Debug, Clone)]
pub struct SignatureDocument {
    text: String,
    profile: Profile,
    id: Option<String>,
    c14n_method: String,
    signature_method: String,
    references: Vec<Reference>,
    signature_value: Vec<u8>,
    key_info_present: bool,
    x509_data_count: usize,
    x509_certificate_count: usize,
    signing_cert_der: Option<Vec<u8>>,
    qp: QualifyingInfo,
}

impl SignatureDocument {
    /// Parse a signature from raw XML bytes.  The profile is determined
    /// once here and the bytes are retained for re-canonicalization.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::Parse(format!("invalid UTF-8: {e}")))?
            .to_owned();
        let doc = sigtuna_xml::parse(&text)?;

        let sig = sigtuna_xml::find_element(&doc, ns::DSIG, ns::node::SIGNATURE)
            .ok_or_else(|| Error::Structure("Signature element is missing".into()))?;
        let id = sig.attribute(ns::attr::ID).map(|s| s.to_owned());

        let signed_info = sigtuna_xml::find_child(sig, ns::DSIG, ns::node::SIGNED_INFO)
            .ok_or_else(|| Error::Structure("SignedInfo element is missing".into()))?;

        let c14n_method =
            sigtuna_xml::find_child(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
                .and_then(|n| n.attribute(ns::attr::ALGORITHM))
                .ok_or_else(|| Error::Structure("CanonicalizationMethod is missing".into()))?
                .to_owned();

        let signature_method =
            sigtuna_xml::find_child(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD)
                .and_then(|n| n.attribute(ns::attr::ALGORITHM))
                .ok_or_else(|| Error::Structure("SignatureMethod is missing".into()))?
                .to_owned();

        let mut references = Vec::new();
        for reference in sigtuna_xml::find_children(signed_info, ns::DSIG, ns::node::REFERENCE) {
            let digest_method =
                sigtuna_xml::find_child(reference, ns::DSIG, ns::node::DIGEST_METHOD)
                    .and_then(|n| n.attribute(ns::attr::ALGORITHM))
                    .ok_or_else(|| Error::Structure("Reference DigestMethod is missing".into()))?
                    .to_owned();
            let digest_value =
                sigtuna_xml::find_child(reference, ns::DSIG, ns::node::DIGEST_VALUE)
                    .map(sigtuna_xml::text_of)
                    .ok_or_else(|| Error::Structure("Reference DigestValue is missing".into()))?;
            references.push(Reference {
                uri: reference.attribute(ns::attr::URI).map(|s| s.to_owned()),
                ref_type: reference.attribute(ns::attr::TYPE).map(|s| s.to_owned()),
                digest_method,
                digest_value: decode_base64(digest_value, "DigestValue")?,
            });
        }

        let signature_value = sigtuna_xml::find_child(sig, ns::DSIG, ns::node::SIGNATURE_VALUE)
            .map(sigtuna_xml::text_of)
            .ok_or_else(|| Error::Structure("SignatureValue element is missing".into()))?;
        let signature_value = decode_base64(signature_value, "SignatureValue")?;

        // KeyInfo cardinality is recorded here and enforced on demand.
        let key_info = sigtuna_xml::find_child(sig, ns::DSIG, ns::node::KEY_INFO);
        let key_info_present = key_info.is_some();
        let mut x509_data_count = 0;
        let mut x509_certificate_count = 0;
        let mut signing_cert_der = None;
        if let Some(key_info) = key_info {
            for x509_data in sigtuna_xml::find_children(key_info, ns::DSIG, ns::node::X509_DATA) {
                x509_data_count += 1;
                for cert_node in
                    sigtuna_xml::find_children(x509_data, ns::DSIG, ns::node::X509_CERTIFICATE)
                {
                    x509_certificate_count += 1;
                    if signing_cert_der.is_none() {
                        signing_cert_der = Some(decode_base64(
                            sigtuna_xml::text_of(cert_node),
                            "X509Certificate",
                        )?);
                    }
                }
            }
        }

        let objects = sigtuna_xml::find_children(sig, ns::DSIG, ns::node::OBJECT);
        if objects.is_empty() {
            return Err(Error::Structure("Signature block 'Object' is missing".into()));
        }
        if objects.len() != 1 {
            return Err(Error::Structure(
                "Signature block contains more than one 'Object' block".into(),
            ));
        }
        let object = objects[0];

        let qp111 = sigtuna_xml::find_children(object, ns::XADES111, ns::node::QUALIFYING_PROPERTIES);
        let qp132 = sigtuna_xml::find_children(object, ns::XADES132, ns::node::QUALIFYING_PROPERTIES);

        let (profile, qp_nodes) = match (qp111.is_empty(), qp132.is_empty()) {
            (true, true) => {
                return Err(Error::Structure(
                    "Signature block 'QualifyingProperties' is missing".into(),
                ))
            }
            (false, true) => (Profile::V111, qp111),
            (true, false) => (Profile::V132, qp132),
            (false, false) => {
                return Err(Error::Structure(
                    "Signature block 'Object' contains more than one 'QualifyingProperties' block"
                        .into(),
                ))
            }
        };
        if qp_nodes.len() != 1 {
            return Err(Error::Structure(
                "Signature block 'Object' contains more than one 'QualifyingProperties' block"
                    .into(),
            ));
        }

        let qp = parse_qualifying(qp_nodes[0], profile.xades_namespace())?;

        Ok(Self {
            text,
            profile,
            id,
            c14n_method,
            signature_method,
            references,
            signature_value,
            key_info_present,
            x509_data_count,
            x509_certificate_count,
            signing_cert_der,
            qp,
        })
    }

    pub fn raw_text(&self) -> &str {
        &self.text
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn c14n_method(&self) -> &str {
        &self.c14n_method
    }

    pub fn signature_method(&self) -> &str {
        &self.signature_method
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn signature_value(&self) -> &[u8] {
        &self.signature_value
    }

    pub fn xades_namespace(&self) -> &'static str {
        self.profile.xades_namespace()
    }

    /// The signing certificate from `KeyInfo/X509Data/X509Certificate`.
    pub fn signing_certificate(&self) -> Result<X509Cert, Error> {
        if !self.key_info_present
            || self.x509_data_count == 0
            || self.x509_certificate_count == 0
        {
            return Err(Error::Structure(
                "Signature does not contain signer certificate".into(),
            ));
        }
        if self.x509_data_count != 1 || self.x509_certificate_count != 1 {
            return Err(Error::Structure(
                "Signature contains more than one signer certificate".into(),
            ));
        }
        let der = self.signing_cert_der.as_ref().ok_or_else(|| {
            Error::Structure("Signature does not contain signer certificate".into())
        })?;
        X509Cert::from_der(der)
    }

    /// Subject string of the signing certificate.
    pub fn subject(&self) -> Result<String, Error> {
        Ok(self.signing_certificate()?.subject())
    }

    /// The embedded OCSP response from
    /// `UnsignedSignatureProperties/RevocationValues/OCSPValues`.
    pub fn ocsp_response_value(&self) -> Result<Vec<u8>, Error> {
        if !self.qp.unsigned_signature_properties {
            return Err(Error::Structure(
                "Unsigned signature properties missing".into(),
            ));
        }
        if self.profile == Profile::V111 && self.qp.revocation_values_count > 1 {
            return Err(Error::Structure(
                "more than one RevocationValues block".into(),
            ));
        }
        self.qp
            .ocsp_response
            .clone()
            .ok_or_else(|| Error::Structure("Revocation values missing".into()))
    }

    /// The `DigestAlgAndValue` of the first `OCSPRef`: stored response hash
    /// plus the digest method URI that produced it.
    pub fn revocation_ocsp_ref(&self) -> Result<(Vec<u8>, String), Error> {
        if self.profile == Profile::V111 && self.qp.complete_revocation_refs_count > 1 {
            return Err(Error::Structure(
                "more than one CompleteRevocationRefs block".into(),
            ));
        }
        if let Some(first) = self.qp.ocsp_refs.first() {
            if let (Some(value), Some(method)) = (&first.digest_value, &first.digest_method) {
                return Ok((value.clone(), method.clone()));
            }
        }
        Err(Error::Structure(
            "Missing UnsignedProperties/UnsignedSignatureProperties/CompleteRevocationRefs\
             /OCSPRefs/OCSPRef/DigestAlgAndValue element"
                .into(),
        ))
    }

    /// Digest algorithm URI named by the first `OCSPRef`; this is also the
    /// algorithm whose digest of the signature value forms the OCSP nonce.
    pub fn ocsp_digest_algorithm(&self) -> Result<String, Error> {
        Ok(self.revocation_ocsp_ref()?.1)
    }

    /// `ProducedAt` of the first `OCSPRef`, as an xsd:dateTime string.
    pub fn produced_at(&self) -> Result<String, Error> {
        self.qp
            .ocsp_refs
            .first()
            .map(|r| r.produced_at.clone())
            .ok_or_else(|| Error::Structure("OCSPRef element is missing".into()))
    }

    /// Batch A of offline validation: qualifying-property structure.
    pub fn check_qualifying_properties(&self) -> Result<(), Error> {
        let id = self.id.as_deref().unwrap_or("");
        if id.is_empty() {
            return Err(Error::Structure(
                "Signature element mandatory attribute 'Id' is missing or empty".into(),
            ));
        }

        let expected_target = format!("#{id}");
        if self.qp.target.as_deref() != Some(expected_target.as_str()) {
            return Err(Error::Structure(
                "QualifyingProperties target is not Signature".into(),
            ));
        }

        if !self.qp.signed_properties {
            return Err(Error::Structure(
                "QualifyingProperties block 'SignedProperties' is missing".into(),
            ));
        }
        if !self.qp.signed_signature_properties {
            return Err(Error::Structure(
                "SignedProperties block 'SignedSignatureProperties' is missing".into(),
            ));
        }

        // v1.1.1 requires the policy by schema but its value is not
        // constrained; v1.3.2 forbids the element entirely.
        if self.profile == Profile::V132 && self.qp.signature_policy_identifier {
            return Err(Error::Structure("Signature policy is not valid".into()));
        }

        if self.qp.unsigned_properties && self.qp.unsigned_data_object_properties {
            return Err(Error::Structure(
                "unexpected UnsignedDataObjectProperties in Signature".into(),
            ));
        }

        Ok(())
    }

    /// The `SigningCertificate` binding checks: cardinality, issuer/serial
    /// match, certificate digest.
    pub fn check_key_info(&self) -> Result<(), Error> {
        let cert = self.signing_certificate()?;

        let certs = &self.qp.signing_certificate_certs;
        if certs.len() != 1 {
            return Err(Error::Structure(format!(
                "Number of SigningCertificates is {}, must be 1",
                certs.len()
            )));
        }
        let binding = &certs[0];

        if !digest::is_supported(&binding.digest_method) {
            return Err(Error::UnsupportedAlgorithm(format!(
                "digest algorithm {} for signing certificate",
                binding.digest_method
            )));
        }

        if binding.issuer_name != cert.issuer() || binding.serial_number != cert.serial_decimal()
        {
            return Err(Error::Structure(
                "Signing certificate issuer information invalid".into(),
            ));
        }

        let computed = digest::digest(&binding.digest_method, cert.der())?;
        if computed != binding.digest_value {
            return Err(Error::DigestMismatch(
                "Signing certificate digest does not match".into(),
            ));
        }

        Ok(())
    }

    /// Recompute a digest over the canonicalized form of the single element
    /// with the given namespace and tag.  Zero or multiple matches reject
    /// the signature.
    pub fn calc_digest_on_node(
        &self,
        digest_uri: &str,
        ns_uri: &str,
        tag: &str,
    ) -> Result<Vec<u8>, Error> {
        let doc = sigtuna_xml::parse(&self.text)?;

        let nodes = sigtuna_xml::find_elements(&doc, ns_uri, tag);
        if nodes.is_empty() {
            return Err(Error::Structure(format!(
                "Could not find '{tag}' node in '{ns_uri}' namespace in signature XML"
            )));
        }
        if nodes.len() > 1 {
            return Err(Error::Structure(format!(
                "Found {} '{tag}' nodes in '{ns_uri}' namespace in signature XML, \
                 can not calculate digest on XML node",
                nodes.len()
            )));
        }

        let (mode, inclusive_prefixes) = self.c14n_mode()?;
        let node_set = if mode.with_comments() {
            NodeSet::tree_with_comments(nodes[0])
        } else {
            NodeSet::tree_without_comments(nodes[0])
        };

        let canonical =
            sigtuna_c14n::canonicalize_doc(&doc, mode, Some(&node_set), &inclusive_prefixes)?;
        digest::digest(digest_uri, &canonical)
    }

    /// The canonicalization mode `SignedInfo` names, restricted to the
    /// variants signature containers may use.  Exclusive mode declares the
    /// `ds` prefix inclusive for compatibility with existing
    /// implementations.
    fn c14n_mode(&self) -> Result<(C14nMode, Vec<String>), Error> {
        match self.c14n_method.as_str() {
            algorithm::C14N => Ok((C14nMode::Inclusive, Vec::new())),
            algorithm::C14N_WITH_COMMENTS => Ok((C14nMode::InclusiveWithComments, Vec::new())),
            algorithm::EXC_C14N => Ok((C14nMode::Exclusive, vec!["ds".to_owned()])),
            algorithm::C14N11 => Ok((C14nMode::Inclusive11, Vec::new())),
            algorithm::C14N11_WITH_COMMENTS => {
                Ok((C14nMode::Inclusive11WithComments, Vec::new()))
            }
            other => Err(Error::UnsupportedAlgorithm(format!(
                "SignedInfo canonicalization method '{other}'"
            ))),
        }
    }
}

fn decode_base64(text: &str, what: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}

/// Find a direct child that may live in the DSig or the XAdES namespace.
///
/// XAdES embeds DSig types (`DigestMethod`, `DigestValue`,
/// `X509IssuerName`, ...) inside its own structures; real-world documents
/// qualify them either way depending on the generator.
fn find_dual<'a, 'i>(
    parent: roxmltree::Node<'a, 'i>,
    xades_ns: &str,
    name: &str,
) -> Option<roxmltree::Node<'a, 'i>> {
    sigtuna_xml::find_child(parent, ns::DSIG, name)
        .or_else(|| sigtuna_xml::find_child(parent, xades_ns, name))
}

fn parse_qualifying(
    qp: roxmltree::Node<'_, '_>,
    xades_ns: &str,
) -> Result<QualifyingInfo, Error> {
    let mut info = QualifyingInfo {
        target: qp.attribute(ns::attr::TARGET).map(|s| s.to_owned()),
        ..QualifyingInfo::default()
    };

    if let Some(signed_props) = sigtuna_xml::find_child(qp, xades_ns, ns::node::SIGNED_PROPERTIES)
    {
        info.signed_properties = true;

        if let Some(ssp) =
            sigtuna_xml::find_child(signed_props, xades_ns, ns::node::SIGNED_SIGNATURE_PROPERTIES)
        {
            info.signed_signature_properties = true;
            info.signature_policy_identifier =
                sigtuna_xml::find_child(ssp, xades_ns, ns::node::SIGNATURE_POLICY_IDENTIFIER)
                    .is_some();

            if let Some(signing_cert) =
                sigtuna_xml::find_child(ssp, xades_ns, ns::node::SIGNING_CERTIFICATE)
            {
                for cert in sigtuna_xml::find_children(signing_cert, xades_ns, ns::node::CERT) {
                    info.signing_certificate_certs
                        .push(parse_cert_binding(cert, xades_ns)?);
                }
            }
        }
    }

    if let Some(unsigned) = sigtuna_xml::find_child(qp, xades_ns, ns::node::UNSIGNED_PROPERTIES) {
        info.unsigned_properties = true;
        info.unsigned_data_object_properties =
            sigtuna_xml::find_child(unsigned, xades_ns, ns::node::UNSIGNED_DATA_OBJECT_PROPERTIES)
                .is_some();

        if let Some(usp) =
            sigtuna_xml::find_child(unsigned, xades_ns, ns::node::UNSIGNED_SIGNATURE_PROPERTIES)
        {
            info.unsigned_signature_properties = true;

            let revocation_values =
                sigtuna_xml::find_children(usp, xades_ns, ns::node::REVOCATION_VALUES);
            info.revocation_values_count = revocation_values.len();
            if let Some(first) = revocation_values.first() {
                if let Some(ocsp_values) =
                    sigtuna_xml::find_child(*first, xades_ns, ns::node::OCSP_VALUES)
                {
                    if let Some(value) = sigtuna_xml::find_children(
                        ocsp_values,
                        xades_ns,
                        ns::node::ENCAPSULATED_OCSP_VALUE,
                    )
                    .first()
                    {
                        info.ocsp_response = Some(decode_base64(
                            sigtuna_xml::text_of(*value),
                            "EncapsulatedOCSPValue",
                        )?);
                    }
                }
            }

            let revocation_refs =
                sigtuna_xml::find_children(usp, xades_ns, ns::node::COMPLETE_REVOCATION_REFS);
            info.complete_revocation_refs_count = revocation_refs.len();
            if let Some(first) = revocation_refs.first() {
                if let Some(ocsp_refs) =
                    sigtuna_xml::find_child(*first, xades_ns, ns::node::OCSP_REFS)
                {
                    for ocsp_ref in
                        sigtuna_xml::find_children(ocsp_refs, xades_ns, ns::node::OCSP_REF)
                    {
                        info.ocsp_refs.push(parse_ocsp_ref(ocsp_ref, xades_ns)?);
                    }
                }
            }
        }
    }

    Ok(info)
}

fn parse_cert_binding(
    cert: roxmltree::Node<'_, '_>,
    xades_ns: &str,
) -> Result<CertBinding, Error> {
    let cert_digest = sigtuna_xml::find_child(cert, xades_ns, ns::node::CERT_DIGEST)
        .ok_or_else(|| Error::Structure("SigningCertificate CertDigest is missing".into()))?;
    let digest_method = find_dual(cert_digest, xades_ns, ns::node::DIGEST_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::Structure("CertDigest DigestMethod is missing".into()))?
        .to_owned();
    let digest_value = find_dual(cert_digest, xades_ns, ns::node::DIGEST_VALUE)
        .map(sigtuna_xml::text_of)
        .ok_or_else(|| Error::Structure("CertDigest DigestValue is missing".into()))?;

    let issuer_serial = sigtuna_xml::find_child(cert, xades_ns, ns::node::ISSUER_SERIAL)
        .ok_or_else(|| Error::Structure("SigningCertificate IssuerSerial is missing".into()))?;
    let issuer_name = find_dual(issuer_serial, xades_ns, ns::node::X509_ISSUER_NAME)
        .map(sigtuna_xml::text_of)
        .ok_or_else(|| Error::Structure("IssuerSerial X509IssuerName is missing".into()))?
        .to_owned();
    let serial_number = find_dual(issuer_serial, xades_ns, ns::node::X509_SERIAL_NUMBER)
        .map(sigtuna_xml::text_of)
        .ok_or_else(|| Error::Structure("IssuerSerial X509SerialNumber is missing".into()))?
        .to_owned();

    Ok(CertBinding {
        digest_method,
        digest_value: decode_base64(digest_value, "CertDigest DigestValue")?,
        issuer_name,
        serial_number,
    })
}

fn parse_ocsp_ref(
    ocsp_ref: roxmltree::Node<'_, '_>,
    xades_ns: &str,
) -> Result<OcspRefInfo, Error> {
    let produced_at = sigtuna_xml::find_child(ocsp_ref, xades_ns, ns::node::OCSP_IDENTIFIER)
        .and_then(|id| sigtuna_xml::find_child(id, xades_ns, ns::node::PRODUCED_AT))
        .map(sigtuna_xml::text_of)
        .unwrap_or("")
        .to_owned();

    let mut digest_method = None;
    let mut digest_value = None;
    if let Some(dav) =
        sigtuna_xml::find_child(ocsp_ref, xades_ns, ns::node::DIGEST_ALG_AND_VALUE)
    {
        digest_method = find_dual(dav, xades_ns, ns::node::DIGEST_METHOD)
            .and_then(|n| n.attribute(ns::attr::ALGORITHM))
            .map(|s| s.to_owned());
        if let Some(value) = find_dual(dav, xades_ns, ns::node::DIGEST_VALUE) {
            digest_value = Some(decode_base64(
                sigtuna_xml::text_of(value),
                "OCSPRef DigestValue",
            )?);
        }
    }

    Ok(OcspRefInfo {
        produced_at,
        digest_method,
        digest_value,
    })
}
