//! Content checksums.
//!
//! Every published artifact is identified by the SHA-256 digest of its
//! bytes. [`ChecksumBuilder`] computes the digest incrementally so content
//! can be hashed while it streams to disk.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A SHA-256 digest, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Compute the checksum of a complete buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut builder = ChecksumBuilder::new();
        builder.update(data);
        builder.finish()
    }

    /// Parse a hex digest supplied by an upstream. Case-insensitive.
    pub fn parse(hex_digest: &str) -> Option<Self> {
        let trimmed = hex_digest.trim();
        let bytes = hex::decode(trimmed).ok()?;
        (bytes.len() == 32).then(|| Checksum(trimmed.to_ascii_lowercase()))
    }

    /// Get the hex string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental SHA-256 computation.
#[derive(Clone, Default)]
pub struct ChecksumBuilder {
    hasher: Sha256,
    len: u64,
}

impl fmt::Debug for ChecksumBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumBuilder").field("len", &self.len).finish()
    }
}

impl ChecksumBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finish hashing and return the checksum.
    pub fn finish(self) -> Checksum {
        Checksum(hex::encode(self.hasher.finalize()))
    }
}
