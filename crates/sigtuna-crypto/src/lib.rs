#![forbid(unsafe_code)]

//! Cryptographic digest primitives for the Sigtuna library.

pub mod digest;
