//! Upstream registry access for depot proxy repositories.
//!
//! The [`RemoteFetcher`] performs one upstream fetch per call: it issues a
//! streaming GET through an [`HttpTransport`], writes the body into a
//! content store staging area while hashing it, and commits the artifact
//! before reporting success. Upstream search APIs and npm package documents
//! are reached through the same transport.
//!
//! Failures are classified so callers can react:
//! - [`FetchError::RemoteNotFound`]: the upstream does not have it; never retried
//! - [`FetchError::RemoteUnavailable`]: network failure, timeout or server error
//! - [`FetchError::ChecksumMismatch`]: the upstream's declared digest disagrees

pub mod error;
pub mod fetcher;
pub mod package;
pub mod retry;
pub mod search;
#[cfg(any(test, feature = "test-util"))]
pub mod stub;
pub mod transport;

// Re-exports for convenience.
pub use error::FetchError;
pub use fetcher::{FetchedArtifact, RemoteFetcher, CHECKSUM_HEADER};
pub use retry::RetryPolicy;
pub use package::PackageMetadata;
pub use search::RemotePackage;
pub use transport::{BodyStream, HttpTransport, ReqwestTransport, TransportConfig, TransportError, TransportResponse};
