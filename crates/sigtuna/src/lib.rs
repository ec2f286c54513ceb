#![forbid(unsafe_code)]

pub use sigtuna_c14n as c14n;
pub use sigtuna_certs as certs;
pub use sigtuna_core as core;
pub use sigtuna_crypto as crypto;
pub use sigtuna_ocsp as ocsp;
pub use sigtuna_tm as tm;
pub use sigtuna_xades as xades;
pub use sigtuna_xml as xml;
