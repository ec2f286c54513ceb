#![forbid(unsafe_code)]

//! Augmented-signature emission for the online TM path.
//!
//! The fresh OCSP material is spliced into the retained raw text as an
//! `UnsignedSignatureProperties` block, then the whole document is
//! serialized with C14N 1.0 behind an XML declaration.  Splicing into the
//! raw text keeps every signed byte exactly as received.

use base64::Engine;
use sigtuna_c14n::{escape, C14nMode};
use sigtuna_certs::X509Cert;
use sigtuna_core::{ns, Error};
use sigtuna_crypto::digest;
use sigtuna_xades::SignatureDocument;

/// Emit the augmented signature XML.
///
/// The block carries, in order: `CertificateValues` (responder and signer
/// issuer), `RevocationValues` with the response bytes,
/// `CompleteCertificateRefs` with the digest of the responder-issuer DER,
/// and `CompleteRevocationRefs` binding producedAt and the response hash.
#[allow(clippy::too_many_arguments)]
pub fn augment_signature(
    doc: &SignatureDocument,
    issuer: &X509Cert,
    responder: &X509Cert,
    responder_issuer: &X509Cert,
    response_der: &[u8],
    produced_at: u64,
    digest_uri: &str,
) -> Result<String, Error> {
    let b64 = |data: &[u8]| base64::engine::general_purpose::STANDARD.encode(data);

    let response_hash = digest::digest(digest_uri, response_der)?;
    let responder_issuer_digest = digest::digest(digest_uri, responder_issuer.der())?;
    let produced_at = format_produced_at(produced_at)?;

    let block = format!(
        "<UnsignedSignatureProperties xmlns=\"{xades}\" xmlns:ds=\"{dsig}\">\
           <CertificateValues>\
             <EncapsulatedX509Certificate>{responder_der}</EncapsulatedX509Certificate>\
             <EncapsulatedX509Certificate>{issuer_der}</EncapsulatedX509Certificate>\
           </CertificateValues>\
           <RevocationValues><OCSPValues>\
             <EncapsulatedOCSPValue>{response}</EncapsulatedOCSPValue>\
           </OCSPValues></RevocationValues>\
           <CompleteCertificateRefs><CertRefs><Cert>\
             <CertDigest>\
               <ds:DigestMethod Algorithm=\"{digest_uri}\"></ds:DigestMethod>\
               <ds:DigestValue>{responder_issuer_digest}</ds:DigestValue>\
             </CertDigest>\
             <IssuerSerial>\
               <ds:X509IssuerName>{responder_issuer_name}</ds:X509IssuerName>\
               <ds:X509SerialNumber>{responder_issuer_serial}</ds:X509SerialNumber>\
             </IssuerSerial>\
           </Cert></CertRefs></CompleteCertificateRefs>\
           <CompleteRevocationRefs><OCSPRefs><OCSPRef>\
             <OCSPIdentifier>\
               <ResponderID>{responder_id}</ResponderID>\
               <ProducedAt>{produced_at}</ProducedAt>\
             </OCSPIdentifier>\
             <DigestAlgAndValue>\
               <ds:DigestMethod Algorithm=\"{digest_uri}\"></ds:DigestMethod>\
               <ds:DigestValue>{response_hash}</ds:DigestValue>\
             </DigestAlgAndValue>\
           </OCSPRef></OCSPRefs></CompleteRevocationRefs>\
         </UnsignedSignatureProperties>",
        xades = doc.xades_namespace(),
        dsig = ns::DSIG,
        responder_der = b64(responder.der()),
        issuer_der = b64(issuer.der()),
        response = b64(response_der),
        digest_uri = digest_uri,
        responder_issuer_digest = b64(&responder_issuer_digest),
        responder_issuer_name = escape::escape_text(&responder_issuer.issuer()),
        responder_issuer_serial = responder_issuer.serial_decimal(),
        responder_id = escape::escape_text(&responder.subject()),
        produced_at = produced_at,
        response_hash = b64(&response_hash),
    );

    let augmented = insert_unsigned_block(doc, &block)?;

    let canonical =
        sigtuna_c14n::canonicalize(&augmented, C14nMode::Inclusive, None, &[])?;
    let canonical = String::from_utf8(canonical)
        .map_err(|e| Error::Parse(format!("canonical output is not UTF-8: {e}")))?;

    Ok(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{canonical}"
    ))
}

/// Splice the block under `UnsignedProperties`, creating that element
/// under `QualifyingProperties` when the signature does not carry one.
fn insert_unsigned_block(doc: &SignatureDocument, block: &str) -> Result<String, Error> {
    let text = doc.raw_text();
    let xades_ns = doc.xades_namespace();
    let parsed = sigtuna_xml::parse(text)?;

    if let Some(unsigned) =
        sigtuna_xml::find_element(&parsed, xades_ns, ns::node::UNSIGNED_PROPERTIES)
    {
        let range = unsigned.range();
        insert_into_element(text, range, block)
    } else {
        let qualifying =
            sigtuna_xml::find_element(&parsed, xades_ns, ns::node::QUALIFYING_PROPERTIES)
                .ok_or_else(|| {
                    Error::Structure("Signature block 'QualifyingProperties' is missing".into())
                })?;
        let range = qualifying.range();
        let wrapped = format!(
            "<UnsignedProperties xmlns=\"{xades_ns}\">{block}</UnsignedProperties>"
        );
        insert_into_element(text, range, &wrapped)
    }
}

/// Insert `content` just before the closing tag of the element covering
/// `range` in `text`; self-closing elements are expanded first.
fn insert_into_element(
    text: &str,
    range: std::ops::Range<usize>,
    content: &str,
) -> Result<String, Error> {
    let slice = &text[range.clone()];

    if let Some(pos) = slice.rfind("</") {
        let at = range.start + pos;
        return Ok(format!("{}{}{}", &text[..at], content, &text[at..]));
    }

    if let Some(open) = slice.strip_prefix('<').and_then(|s| s.strip_suffix("/>")) {
        let name = open.split_whitespace().next().unwrap_or(open);
        return Ok(format!(
            "{}<{}>{}</{}>{}",
            &text[..range.start],
            open.trim_end(),
            content,
            name,
            &text[range.end..]
        ));
    }

    Err(Error::Structure(
        "cannot locate insertion point for UnsignedSignatureProperties".into(),
    ))
}

/// Render a unix timestamp as the xsd:dateTime form `ProducedAt` uses.
fn format_produced_at(unix_secs: u64) -> Result<String, Error> {
    let datetime =
        der::DateTime::from_unix_duration(std::time::Duration::from_secs(unix_secs))
            .map_err(|e| Error::Revocation(format!("invalid producedAt: {e}")))?;
    Ok(datetime.to_string())
}
