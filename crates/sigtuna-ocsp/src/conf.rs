#![forbid(unsafe_code)]

//! OCSP responder configuration, keyed by signer-issuer CN.

use sigtuna_certs::X509Cert;
use sigtuna_core::Error;
use std::collections::HashMap;

/// Configuration for one OCSP responder.
#[derive(Debug, Clone)]
pub struct OcspConf {
    /// Responder URL.
    pub url: String,
    /// Certificates the responder may sign with.
    pub responder_certs: Vec<X509Cert>,
    /// Allowed clock skew in seconds.
    pub skew: u64,
    /// Maximum age of a response in seconds.
    pub max_age: u64,
}

/// Responder configurations keyed by the CN of the signer's issuer.
#[derive(Debug, Default)]
pub struct OcspConfRegistry {
    confs: HashMap<String, OcspConf>,
}

impl OcspConfRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, issuer_cn: &str, conf: OcspConf) {
        self.confs.insert(issuer_cn.to_owned(), conf);
    }

    pub fn has_conf(&self, issuer_cn: &str) -> bool {
        self.confs.contains_key(issuer_cn)
    }

    pub fn get_conf(&self, issuer_cn: &str) -> Result<&OcspConf, Error> {
        self.confs
            .get(issuer_cn)
            .ok_or_else(|| Error::Config("Failed to find ocsp responder".into()))
    }
}

/// Extract the CN from an issuer string: the text after the literal
/// `CN=` up to the next `,`.
pub fn issuer_cn(issuer: &str) -> Result<String, Error> {
    let start = issuer
        .find("CN=")
        .ok_or_else(|| Error::Config(format!("no CN in issuer name '{issuer}'")))?
        + 3;
    let rest = &issuer[start..];
    let end = rest.find(',').unwrap_or(rest.len());
    Ok(rest[..end].to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cn_extraction() {
        assert_eq!(issuer_cn("CN=Test CA,O=Org,C=EE").unwrap(), "Test CA");
        assert_eq!(issuer_cn("O=Org,CN=Test CA").unwrap(), "Test CA");
        assert_eq!(issuer_cn("CN=Only").unwrap(), "Only");
        assert!(issuer_cn("O=No Common Name").is_err());
    }

    #[test]
    fn registry_lookup() {
        let mut registry = OcspConfRegistry::new();
        registry.insert(
            "Test CA",
            OcspConf {
                url: "http://ocsp.example.com".into(),
                responder_certs: Vec::new(),
                skew: 300,
                max_age: 3600,
            },
        );
        assert!(registry.has_conf("Test CA"));
        assert!(!registry.has_conf("Other CA"));
        assert!(matches!(
            registry.get_conf("Other CA"),
            Err(Error::Config(_))
        ));
    }
}
