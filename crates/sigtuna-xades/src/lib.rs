#![forbid(unsafe_code)]

//! XAdES signature parsing and offline validation.
//!
//! A [`SignatureDocument`] owns the raw signature XML together with a
//! typed view of it.  Structural and cryptographic checks run against the
//! typed view; every digest recomputation re-parses the raw bytes so the
//! canonical byte stream reflects the document exactly as received.

pub mod container;
pub mod tree;
pub mod validator;

pub use container::{ContainerInfo, MemoryContainer};
pub use tree::{Profile, Reference, SignatureDocument};
pub use validator::validate_offline;
