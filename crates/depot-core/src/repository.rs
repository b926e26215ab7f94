//! Repository configuration values.
//!
//! A repository is hosted (local only), a proxy of one remote upstream, or a
//! group of ordered member repositories. Group member order is the fallback
//! priority for resolution and the tie-break order for search results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coordinate::Layout;
use crate::error::{CoreError, Result};

/// Identity of a repository: `(storageId, repositoryId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryKey {
    pub storage_id: String,
    pub repository_id: String,
}

impl RepositoryKey {
    pub fn new(storage_id: impl Into<String>, repository_id: impl Into<String>) -> Self {
        RepositoryKey {
            storage_id: storage_id.into(),
            repository_id: repository_id.into(),
        }
    }

    /// Parse a member reference.
    ///
    /// `storage:repo` names a repository explicitly; a bare `repo` refers to
    /// a repository in `default_storage`.
    pub fn parse_reference(reference: &str, default_storage: &str) -> Result<Self> {
        let invalid = |detail: &str| CoreError::InvalidReference {
            reference: reference.to_string(),
            detail: detail.to_string(),
        };
        match reference.split_once(':') {
            Some((storage, repo)) => {
                if storage.is_empty() || repo.is_empty() || repo.contains(':') {
                    return Err(invalid("expected <storage>:<repository>"));
                }
                Ok(RepositoryKey::new(storage, repo))
            }
            None if reference.is_empty() => Err(invalid("empty reference")),
            None => Ok(RepositoryKey::new(default_storage, reference)),
        }
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.storage_id, self.repository_id)
    }
}

/// The kind-specific part of a repository's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RepositoryKind {
    /// Artifacts deployed directly into local storage.
    Hosted,
    /// A caching proxy of one remote registry.
    Proxy {
        /// Base URL of the upstream registry.
        url: String,
    },
    /// An ordered set of member repositories.
    Group {
        /// Member references, highest priority first.
        #[serde(default)]
        members: Vec<String>,
    },
}

/// A configured repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Storage the repository belongs to.
    #[serde(rename = "storage")]
    pub storage_id: String,
    /// Repository identifier, unique within its storage.
    pub id: String,
    /// Path grammar for artifacts in this repository.
    pub layout: Layout,
    /// Hosted, proxy or group settings.
    #[serde(flatten)]
    pub kind: RepositoryKind,
}

impl Repository {
    pub fn hosted(storage_id: &str, id: &str, layout: Layout) -> Self {
        Repository {
            storage_id: storage_id.to_string(),
            id: id.to_string(),
            layout,
            kind: RepositoryKind::Hosted,
        }
    }

    pub fn proxy(storage_id: &str, id: &str, layout: Layout, url: &str) -> Self {
        Repository {
            storage_id: storage_id.to_string(),
            id: id.to_string(),
            layout,
            kind: RepositoryKind::Proxy {
                url: url.to_string(),
            },
        }
    }

    pub fn group(storage_id: &str, id: &str, layout: Layout, members: &[&str]) -> Self {
        Repository {
            storage_id: storage_id.to_string(),
            id: id.to_string(),
            layout,
            kind: RepositoryKind::Group {
                members: members.iter().map(|m| m.to_string()).collect(),
            },
        }
    }

    pub fn key(&self) -> RepositoryKey {
        RepositoryKey::new(&self.storage_id, &self.id)
    }

    /// Short label for the repository kind.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            RepositoryKind::Hosted => "hosted",
            RepositoryKind::Proxy { .. } => "proxy",
            RepositoryKind::Group { .. } => "group",
        }
    }

    /// Resolve the group member references into keys, in configured order.
    ///
    /// Returns an empty list for non-group repositories.
    pub fn member_keys(&self) -> Result<Vec<RepositoryKey>> {
        match &self.kind {
            RepositoryKind::Group { members } => members
                .iter()
                .map(|m| RepositoryKey::parse_reference(m, &self.storage_id))
                .collect(),
            _ => Ok(Vec::new()),
        }
    }
}
