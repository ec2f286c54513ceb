#![forbid(unsafe_code)]

//! Container collaborator interface.
//!
//! The container unpacker owns the enclosed documents; validation only
//! ever asks it to confirm digest claims.  The protocol is a session:
//! `check_documents_begin`, one `check_document` per reference, then
//! `check_documents_result`, which is true iff every document was claimed
//! exactly once and every digest matched.

use sigtuna_crypto::digest;
use std::collections::{HashMap, HashSet};

pub trait ContainerInfo {
    /// Number of documents enclosed in the container.
    fn document_count(&self) -> usize;

    /// Start a verification session.
    fn check_documents_begin(&mut self);

    /// Record a digest claim for one document.
    fn check_document(&mut self, uri: &str, digest_uri: &str, expected_digest: &[u8]);

    /// Whether every document was claimed exactly once with a matching digest.
    fn check_documents_result(&self) -> bool;
}

/// In-memory container, used by the CLI and by tests.
#[derive(Debug, Default)]
pub struct MemoryContainer {
    documents: HashMap<String, Vec<u8>>,
    claimed: HashSet<String>,
    ok: bool,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            claimed: HashSet::new(),
            ok: true,
        }
    }

    pub fn add_document(&mut self, uri: &str, data: Vec<u8>) {
        self.documents.insert(uri.to_owned(), data);
    }
}

impl ContainerInfo for MemoryContainer {
    fn document_count(&self) -> usize {
        self.documents.len()
    }

    fn check_documents_begin(&mut self) {
        self.claimed.clear();
        self.ok = true;
    }

    fn check_document(&mut self, uri: &str, digest_uri: &str, expected_digest: &[u8]) {
        let Some(data) = self.documents.get(uri) else {
            self.ok = false;
            return;
        };
        if !self.claimed.insert(uri.to_owned()) {
            // Claimed twice.
            self.ok = false;
            return;
        }
        match digest::digest(digest_uri, data) {
            Ok(computed) if computed == expected_digest => {}
            _ => self.ok = false,
        }
    }

    fn check_documents_result(&self) -> bool {
        self.ok && self.claimed.len() == self.documents.len()
    }
}
