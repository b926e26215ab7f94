//! Artifact entry records.
//!
//! One [`ArtifactEntry`] exists per `(repository, coordinate)`. The engine
//! flips `cached` to true only after the artifact's blob is durably
//! published in the content store, so a cached entry always points at a
//! complete, checksum-verified blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::integrity::Checksum;
use crate::repository::RepositoryKey;

/// Metadata the engine keeps about one artifact in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub storage_id: String,
    pub repository_id: String,
    pub coordinate: Coordinate,
    /// Whether the content store holds the artifact's bytes.
    pub cached: bool,
    pub checksum: Option<Checksum>,
    pub size_bytes: Option<u64>,
    pub last_updated: DateTime<Utc>,
    /// The member that materialised the artifact when resolved via a group.
    #[serde(default)]
    pub origin_repository_id: Option<String>,
}

impl ArtifactEntry {
    /// A record for an artifact known to exist upstream but not downloaded.
    pub fn remote(key: &RepositoryKey, coordinate: Coordinate) -> Self {
        ArtifactEntry {
            storage_id: key.storage_id.clone(),
            repository_id: key.repository_id.clone(),
            coordinate,
            cached: false,
            checksum: None,
            size_bytes: None,
            last_updated: Utc::now(),
            origin_repository_id: None,
        }
    }

    /// A record for an artifact whose bytes are already published.
    pub fn cached(key: &RepositoryKey, coordinate: Coordinate, checksum: Checksum, size: u64) -> Self {
        let mut entry = ArtifactEntry::remote(key, coordinate);
        entry.mark_cached(checksum, size);
        entry
    }

    /// Record a successful publish of the artifact's bytes.
    pub fn mark_cached(&mut self, checksum: Checksum, size: u64) {
        self.cached = true;
        self.checksum = Some(checksum);
        self.size_bytes = Some(size);
        self.last_updated = Utc::now();
    }

    /// Storage path of the artifact.
    pub fn path(&self) -> &str {
        self.coordinate.path()
    }

    pub fn repository_key(&self) -> RepositoryKey {
        RepositoryKey::new(&self.storage_id, &self.repository_id)
    }
}
