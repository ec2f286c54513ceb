#![forbid(unsafe_code)]

//! Offline signature validation.
//!
//! Checks run in three batches; a failure short-circuits only its own
//! batch and the batches' failures are accumulated into one composite
//! error:
//!
//! - Batch A: qualifying-property structure
//! - Batch B: signature method, references, key info, signature value
//! - Batch C: signing certificate chain against the trust store

use crate::container::ContainerInfo;
use crate::tree::{Reference, SignatureDocument};
use sigtuna_certs::TrustStore;
use sigtuna_core::{algorithm, ns, Error, ValidationErrors};
use sigtuna_crypto::digest;

/// Validate everything that does not require network access.
pub fn validate_offline(
    doc: &SignatureDocument,
    container: &mut dyn ContainerInfo,
    store: &dyn TrustStore,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    errors.record(doc.check_qualifying_properties());
    errors.record(check_structure_and_crypto(doc, container));
    errors.record(check_signing_certificate(doc, store));

    errors.into_result()
}

/// Batch B: structural and cryptographic checks.
fn check_structure_and_crypto(
    doc: &SignatureDocument,
    container: &mut dyn ContainerInfo,
) -> Result<(), Error> {
    check_signature_method(doc)?;
    check_references(doc, container)?;
    doc.check_key_info()?;
    check_signature_value(doc)?;
    Ok(())
}

fn check_signature_method(doc: &SignatureDocument) -> Result<(), Error> {
    let method = doc.signature_method();
    if !algorithm::is_supported_signature_method(method) {
        return Err(Error::UnsupportedAlgorithm(format!(
            "SignedInfo signature method \"{method}\""
        )));
    }
    Ok(())
}

fn check_references(
    doc: &SignatureDocument,
    container: &mut dyn ContainerInfo,
) -> Result<(), Error> {
    let references = doc.references();

    // One reference per document plus the SignedProperties reference.
    let expected = container.document_count() + 1;
    if references.len() != expected {
        return Err(Error::Structure(format!(
            "Number of references in SignedInfo is invalid: found {}, expected {}",
            references.len(),
            expected
        )));
    }

    let mut got_signature_ref = false;
    for reference in references {
        if reference.is_signed_properties_ref() {
            if got_signature_ref {
                return Err(Error::Structure(
                    "SignedInfo element refers to more than one SignedProperties".into(),
                ));
            }
            got_signature_ref = true;
            check_signed_properties_ref(doc, reference)?;
        }
    }
    if !got_signature_ref {
        return Err(Error::Structure(
            "SignedInfo does not contain reference to SignedProperties".into(),
        ));
    }

    check_references_to_docs(doc, container)
}

fn check_signed_properties_ref(
    doc: &SignatureDocument,
    reference: &Reference,
) -> Result<(), Error> {
    if reference.uri.is_none() {
        return Err(Error::Structure(
            "SignedInfo reference to SignedProperties does not have attribute 'URI'".into(),
        ));
    }
    if !digest::is_supported(&reference.digest_method) {
        return Err(Error::UnsupportedAlgorithm(format!(
            "reference to SignedProperties digest method '{}'",
            reference.digest_method
        )));
    }

    let computed = doc.calc_digest_on_node(
        &reference.digest_method,
        doc.xades_namespace(),
        ns::node::SIGNED_PROPERTIES,
    )?;
    if computed != reference.digest_value {
        return Err(Error::DigestMismatch(
            "SignedProperties digest values do not match".into(),
        ));
    }
    Ok(())
}

fn check_references_to_docs(
    doc: &SignatureDocument,
    container: &mut dyn ContainerInfo,
) -> Result<(), Error> {
    container.check_documents_begin();

    for reference in doc.references() {
        if reference.is_signed_properties_ref() {
            continue;
        }
        let uri = reference.uri.as_deref().ok_or_else(|| {
            Error::Structure("Document reference is missing attribute 'URI'".into())
        })?;
        // File names in the manifest do not have '/' at front.
        let uri = uri.strip_prefix('/').unwrap_or(uri);
        container.check_document(uri, &reference.digest_method, &reference.digest_value);
    }

    if !container.check_documents_result() {
        return Err(Error::DigestMismatch("Document references didn't match".into()));
    }
    Ok(())
}

fn check_signature_value(doc: &SignatureDocument) -> Result<(), Error> {
    let cert = doc.signing_certificate()?;

    let method = doc.signature_method();
    let hash_uri = algorithm::digest_method_for_signature(method).ok_or_else(|| {
        Error::UnsupportedAlgorithm(format!(
            "couldn't extract hash method from signature method URI '{method}'"
        ))
    })?;

    let computed =
        doc.calc_digest_on_node(hash_uri, ns::DSIG, ns::node::SIGNED_INFO)?;
    cert.verify_digest(hash_uri, &computed, doc.signature_value())
}

/// Batch C: chain verification against the trust store.
fn check_signing_certificate(
    doc: &SignatureDocument,
    store: &dyn TrustStore,
) -> Result<(), Error> {
    let cert = doc.signing_certificate()?;
    if !store.verify_chain(&cert) {
        return Err(Error::Trust(format!(
            "Unable to verify signing certificate {}",
            cert.subject()
        )));
    }
    Ok(())
}
