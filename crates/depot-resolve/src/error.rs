//! Resolution error types.

use depot_core::{CoreError, RepositoryKey};
use depot_remote::FetchError;
use depot_store::StoreError;

/// Errors from resolving, searching or deploying artifacts.
///
/// Cloneable so the outcome of one upstream fetch can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// The request path does not match the repository's layout.
    #[error("malformed coordinate: {detail}")]
    MalformedCoordinate { detail: String },

    /// The artifact exists nowhere this repository can reach.
    #[error("{path} not found in {repository}")]
    NotFound {
        repository: RepositoryKey,
        path: String,
    },

    /// An upstream could not be reached or answered with an error.
    #[error("upstream unavailable for {repository}: {detail}")]
    UpstreamUnavailable {
        repository: RepositoryKey,
        detail: String,
    },

    /// Downloaded bytes did not match the upstream's declared digest.
    #[error("checksum mismatch in {repository}: {detail}")]
    ChecksumMismatch {
        repository: RepositoryKey,
        detail: String,
    },

    /// Group membership loops back onto itself.
    #[error("repository cycle: {}", format_chain(.chain))]
    ConfigurationCycle { chain: Vec<RepositoryKey> },

    #[error("unknown repository: {key}")]
    UnknownRepository { key: RepositoryKey },

    /// Repository configuration that cannot be acted on.
    #[error("invalid configuration: {detail}")]
    InvalidConfiguration { detail: String },

    /// Local content or entry store failure.
    #[error("storage error: {detail}")]
    Storage { detail: String },

    /// The repository kind does not support the operation.
    #[error("{repository} does not support {operation}")]
    UnsupportedOperation {
        repository: RepositoryKey,
        operation: &'static str,
    },
}

fn format_chain(chain: &[RepositoryKey]) -> String {
    chain
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl ResolutionError {
    /// HTTP status a web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ResolutionError::MalformedCoordinate { .. } => 400,
            ResolutionError::NotFound { .. } => 404,
            ResolutionError::UnsupportedOperation { .. } => 405,
            ResolutionError::UpstreamUnavailable { .. } | ResolutionError::ChecksumMismatch { .. } => 502,
            ResolutionError::ConfigurationCycle { .. }
            | ResolutionError::UnknownRepository { .. }
            | ResolutionError::InvalidConfiguration { .. }
            | ResolutionError::Storage { .. } => 500,
        }
    }

    /// Errors that abort a group request instead of falling back to the
    /// next member.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ResolutionError::ConfigurationCycle { .. }
                | ResolutionError::UnknownRepository { .. }
                | ResolutionError::InvalidConfiguration { .. }
        )
    }

    pub(crate) fn from_fetch(repository: &RepositoryKey, path: &str, err: FetchError) -> Self {
        match err {
            FetchError::RemoteNotFound { .. } => ResolutionError::NotFound {
                repository: repository.clone(),
                path: path.to_string(),
            },
            FetchError::RemoteUnavailable { .. } => ResolutionError::UpstreamUnavailable {
                repository: repository.clone(),
                detail: err.to_string(),
            },
            FetchError::ChecksumMismatch { .. } => ResolutionError::ChecksumMismatch {
                repository: repository.clone(),
                detail: err.to_string(),
            },
            FetchError::Storage { .. } => ResolutionError::Storage {
                detail: err.to_string(),
            },
        }
    }
}

impl From<CoreError> for ResolutionError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MalformedCoordinate { .. } | CoreError::UnknownLayout(_) => {
                ResolutionError::MalformedCoordinate {
                    detail: err.to_string(),
                }
            }
            CoreError::InvalidReference { .. } => ResolutionError::InvalidConfiguration {
                detail: err.to_string(),
            },
        }
    }
}

impl From<StoreError> for ResolutionError {
    fn from(err: StoreError) -> Self {
        ResolutionError::Storage {
            detail: err.to_string(),
        }
    }
}

/// Result type alias for resolution operations.
pub type Result<T> = std::result::Result<T, ResolutionError>;
