//! Content hashing
//!
//! Deterministic SHA-256 hashing used for module fingerprints and interface
//! hashes. Strings are NUL-terminated so that adjacent fields cannot run into
//! each other.

use sha2::{Digest, Sha256};

/// Hash raw source text
pub fn hash_source(source: &str) -> String {
    let mut hasher = ContentHasher::new();
    hasher.write_bytes(source.as_bytes());
    hasher.finalize()
}

/// Content hasher that produces deterministic hex digests
#[derive(Clone, Default)]
pub struct ContentHasher {
    hasher: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn finalize(self) -> String {
        let result = self.hasher.finalize();
        hex::encode(result)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn write_u8(&mut self, byte: u8) {
        self.hasher.update([byte]);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
        self.write_u8(0); // null terminator for disambiguation
    }

    /// Tagged field: a one-byte tag followed by a string
    pub fn write_field(&mut self, tag: u8, value: &str) {
        self.write_u8(tag);
        self.write_str(value);
    }
}
