//! Storage error types.

use std::path::PathBuf;

use depot_core::Checksum;

/// Errors that can occur in the content store or entry store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Nothing is published at this path.
    #[error("artifact not found: {path}")]
    NotFound { path: String },

    /// Staged content did not match the digest declared by its origin.
    #[error("checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: Checksum,
        actual: Checksum,
    },

    /// A storage id, repository id or artifact path that cannot be stored.
    #[error("invalid storage path '{path}': {detail}")]
    InvalidPath { path: String, detail: String },

    /// Filesystem failure with context.
    #[error("storage error at {path}: {detail}")]
    Storage { path: PathBuf, detail: String },

    /// Entry record (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn storage(path: impl Into<PathBuf>, action: &str, err: std::io::Error) -> Self {
        StoreError::Storage {
            path: path.into(),
            detail: format!("{action}: {err}"),
        }
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
