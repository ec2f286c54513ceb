#![forbid(unsafe_code)]

//! OCSP subsystem: request construction, transport and response
//! verification.
//!
//! The nonce of every request is the digest of the signature value it
//! certifies, which cryptographically binds the responder's answer to one
//! specific signature.

pub mod client;
pub mod conf;
pub mod verify;

pub use client::{build_request, HttpTransport, OcspClient, OcspTransport};
pub use conf::{issuer_cn, OcspConf, OcspConfRegistry};
pub use verify::{verify_response, VerifiedResponse};
