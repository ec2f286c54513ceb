#![forbid(unsafe_code)]

//! X.509 certificate handling for the Sigtuna library.

pub mod store;
pub mod x509;

pub use store::{MemoryTrustStore, TrustStore};
pub use x509::X509Cert;
