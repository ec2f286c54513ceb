#![forbid(unsafe_code)]

//! Trust store: issuer lookup by DER name and chain verification.

use crate::x509::{verify_rsa_by_oid, X509Cert};
use der::Encode;
use sigtuna_core::Error;

/// Read-only trust anchor collection.
///
/// `cert_by_issuer` resolves the certificate whose *subject* equals the
/// given DER-encoded name; `verify_chain` walks a certificate up to a
/// trusted self-signed root.
pub trait TrustStore {
    fn cert_by_issuer(&self, issuer_der: &[u8]) -> Option<X509Cert>;
    fn verify_chain(&self, cert: &X509Cert) -> bool;
}

/// An in-memory trust store.
#[derive(Debug, Default)]
pub struct MemoryTrustStore {
    certs: Vec<X509Cert>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cert: X509Cert) {
        self.certs.push(cert);
    }

    /// Load every certificate from a PEM bundle.
    pub fn add_pem(&mut self, pem: &[u8]) -> Result<(), Error> {
        let certs = x509_cert::Certificate::load_pem_chain(pem)
            .map_err(|e| Error::Certificate(format!("failed to load PEM chain: {e}")))?;
        for cert in certs {
            let der = cert
                .to_der()
                .map_err(|e| Error::Certificate(format!("failed to re-encode: {e}")))?;
            self.certs.push(X509Cert::from_der(&der)?);
        }
        Ok(())
    }

    pub fn certs(&self) -> &[X509Cert] {
        &self.certs
    }

    pub fn into_certs(self) -> Vec<X509Cert> {
        self.certs
    }

    fn verify_chain_inner(&self, cert: &X509Cert) -> Result<(), Error> {
        check_time_validity(cert)?;

        // Directly trusted certificate.
        if self.certs.iter().any(|c| c.der() == cert.der()) {
            return Ok(());
        }

        // Walk issuer links inside the store until a self-signed root.
        let mut current = cert.clone();
        let mut visited: Vec<Vec<u8>> = vec![cert.der().to_vec()];
        let max_depth = 10;

        for _ in 0..max_depth {
            let issuer_der = current.issuer_der()?;

            let issuer = self
                .certs
                .iter()
                .filter(|c| !visited.iter().any(|v| v.as_slice() == c.der()))
                .find(|c| {
                    c.subject_der().map_or(false, |subject| subject == issuer_der)
                })
                .ok_or_else(|| {
                    Error::Trust(format!(
                        "cannot find issuer certificate for {}",
                        current.subject()
                    ))
                })?;

            check_time_validity(issuer)?;
            verify_issued_by(&current, issuer)?;

            let self_signed = issuer.subject_der()? == issuer.issuer_der()?;
            if self_signed {
                return Ok(());
            }

            visited.push(issuer.der().to_vec());
            current = issuer.clone();
        }

        Err(Error::Trust("certificate chain too long".into()))
    }
}

impl TrustStore for MemoryTrustStore {
    fn cert_by_issuer(&self, issuer_der: &[u8]) -> Option<X509Cert> {
        self.certs
            .iter()
            .find(|c| c.subject_der().map_or(false, |subject| subject == issuer_der))
            .cloned()
    }

    fn verify_chain(&self, cert: &X509Cert) -> bool {
        self.verify_chain_inner(cert).is_ok()
    }
}

/// Verify that `cert` carries a signature made by `issuer`'s key.
fn verify_issued_by(cert: &X509Cert, issuer: &X509Cert) -> Result<(), Error> {
    let certificate = cert.certificate();
    let tbs_der = certificate
        .tbs_certificate
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode TBS: {e}")))?;
    let sig_bytes = certificate
        .signature
        .as_bytes()
        .ok_or_else(|| Error::Certificate("no signature bytes".into()))?;
    let oid = certificate.signature_algorithm.oid.to_string();

    verify_rsa_by_oid(&issuer.public_key_der()?, &oid, &tbs_der, sig_bytes)
}

/// Check notBefore/notAfter against the current time.
fn check_time_validity(cert: &X509Cert) -> Result<(), Error> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| Error::Certificate(format!("system time error: {e}")))?;
    let now = der::DateTime::from_unix_duration(now)
        .map_err(|e| Error::Certificate(format!("time conversion error: {e}")))?;

    let validity = &cert.certificate().tbs_certificate.validity;
    let not_before = validity.not_before.to_date_time();
    let not_after = validity.not_after.to_date_time();

    if now < not_before {
        return Err(Error::Certificate(format!(
            "certificate {} is not yet valid",
            cert.subject()
        )));
    }
    if now > not_after {
        return Err(Error::Certificate(format!(
            "certificate {} has expired",
            cert.subject()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use x509_cert::builder::{Builder, CertificateBuilder, Profile};
    use x509_cert::name::Name;
    use x509_cert::serial_number::SerialNumber;
    use x509_cert::spki::SubjectPublicKeyInfoOwned;
    use x509_cert::time::Validity;

    fn generate_key() -> rsa::RsaPrivateKey {
        rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap()
    }

    fn build_cert(
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
            Validity::from_now(std::time::Duration::from_secs(3600)).unwrap(),
            Name::from_str(subject).unwrap(),
            spki,
            &signer,
        )
        .unwrap();
        let cert = builder.build::<rsa::pkcs1v15::Signature>().unwrap();
        X509Cert::from_der(&cert.to_der().unwrap()).unwrap()
    }

    #[test]
    fn chain_verification() {
        let ca_key = generate_key();
        let leaf_key = generate_key();

        let ca = build_cert(Profile::Root, 1, "CN=Test Root,O=Sigtuna", &ca_key, &ca_key);
        let leaf = build_cert(
            Profile::Leaf {
                issuer: Name::from_str("CN=Test Root,O=Sigtuna").unwrap(),
                enable_key_agreement: false,
                enable_key_encipherment: false,
            },
            2,
            "CN=Signer,O=Sigtuna",
            &leaf_key,
            &ca_key,
        );

        let mut store = MemoryTrustStore::new();
        store.add(ca.clone());

        assert!(store.verify_chain(&leaf));
        assert!(store.verify_chain(&ca));

        // Issuer lookup by DER name resolves the root.
        let issuer = store.cert_by_issuer(&leaf.issuer_der().unwrap()).unwrap();
        assert_eq!(issuer.der(), ca.der());
        assert!(store.cert_by_issuer(&leaf.subject_der().unwrap()).is_none());
    }

    #[test]
    fn unknown_issuer_fails() {
        let ca_key = generate_key();
        let rogue_key = generate_key();
        let leaf_key = generate_key();

        let ca = build_cert(Profile::Root, 1, "CN=Test Root,O=Sigtuna", &ca_key, &ca_key);
        // Same issuer name, signed by a different key.
        let forged = build_cert(
            Profile::Leaf {
                issuer: Name::from_str("CN=Test Root,O=Sigtuna").unwrap(),
                enable_key_agreement: false,
                enable_key_encipherment: false,
            },
            3,
            "CN=Forged,O=Sigtuna",
            &leaf_key,
            &rogue_key,
        );

        let mut store = MemoryTrustStore::new();
        store.add(ca);
        assert!(!store.verify_chain(&forged));
    }
}
