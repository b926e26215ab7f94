//! Fetch error types.

use depot_core::Checksum;

use crate::transport::TransportError;

/// Errors from a single upstream fetch.
///
/// Cloneable so one outcome can be handed to every caller waiting on the
/// same download.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The upstream answered 404/410.
    #[error("not found upstream: {url}")]
    RemoteNotFound { url: String },

    /// Network failure, timeout or unexpected upstream status.
    #[error("upstream unavailable for {url}: {detail}")]
    RemoteUnavailable {
        url: String,
        /// HTTP status, if the upstream answered at all.
        status: Option<u16>,
        detail: String,
    },

    /// The upstream's declared digest disagrees with the received bytes.
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: Checksum,
        actual: Checksum,
    },

    /// Local content store failure while writing the download.
    #[error("storage error while fetching {url}: {detail}")]
    Storage { url: String, detail: String },
}

impl FetchError {
    /// Whether repeating the request could plausibly succeed.
    ///
    /// Transport failures, 5xx, 408 and 429 are retryable; any other status
    /// is a definite answer from the upstream.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::RemoteUnavailable { status: None, .. } => true,
            FetchError::RemoteUnavailable {
                status: Some(code), ..
            } => *code >= 500 || *code == 408 || *code == 429,
            _ => false,
        }
    }

    /// Nothing usable came back; timeouts are named in the detail.
    pub(crate) fn from_transport(url: &str, err: TransportError) -> Self {
        let detail = if err.timeout {
            format!("timed out: {}", err.detail)
        } else {
            err.detail
        };
        Self::unavailable(url, None, detail)
    }

    pub(crate) fn unavailable(url: &str, status: Option<u16>, detail: impl Into<String>) -> Self {
        FetchError::RemoteUnavailable {
            url: url.to_string(),
            status,
            detail: detail.into(),
        }
    }
}
