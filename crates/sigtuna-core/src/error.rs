#![forbid(unsafe_code)]

use std::fmt;

/// Errors produced by the Sigtuna signature verification library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    Parse(String),

    #[error("invalid signature structure: {0}")]
    Structure(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("digest mismatch: {0}")]
    DigestMismatch(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("certificate trust error: {0}")]
    Trust(String),

    #[error("revocation check failed: {0}")]
    Revocation(String),

    #[error("OCSP transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Accumulator for independent validation failures.
///
/// Offline validation runs several batches of checks and must report every
/// batch failure in one pass.  Each batch records at most one cause here;
/// the collector is surfaced as a single error at the end.
#[derive(Debug, Default)]
pub struct ValidationErrors {
    causes: Vec<Error>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { causes: Vec::new() }
    }

    /// Record a failure.
    pub fn push(&mut self, cause: Error) {
        self.causes.push(cause);
    }

    /// Record the error of a result, if any, and return the success value.
    pub fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.causes.push(e);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    pub fn causes(&self) -> &[Error] {
        &self.causes
    }

    /// Convert into `Err(self)` if any failure was recorded.
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.causes.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signature is invalid")?;
        for (i, cause) in self.causes.iter().enumerate() {
            if i == 0 {
                write!(f, ": {cause}")?;
            } else {
                write!(f, "; {cause}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collector_is_ok() {
        let errors = ValidationErrors::new();
        assert!(errors.is_empty());
        assert!(errors.into_result().is_ok());
    }

    #[test]
    fn collector_joins_causes() {
        let mut errors = ValidationErrors::new();
        errors.push(Error::Structure("missing SignedProperties".into()));
        errors.push(Error::SignatureInvalid("bad value".into()));
        let err = errors.into_result().unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("signature is invalid: "));
        assert!(msg.contains("missing SignedProperties"));
        assert!(msg.contains("; "));
    }

    #[test]
    fn record_passes_through_ok() {
        let mut errors = ValidationErrors::new();
        assert_eq!(errors.record(Ok(7)), Some(7));
        let gone: Option<()> =
            errors.record(Err(Error::Config("no OCSP responder".into())));
        assert!(gone.is_none());
        assert_eq!(errors.causes().len(), 1);
    }
}
