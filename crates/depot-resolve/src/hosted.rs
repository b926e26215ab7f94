//! Hosted repositories: artifacts deployed straight into local storage.

use std::sync::Arc;

use depot_core::{ArtifactEntry, Coordinate, Layout, RepositoryKey, SearchResult};
use depot_store::{ArtifactEntryStore, ContentStore};

use crate::error::{ResolutionError, Result};
use crate::search::result_from_entry;

/// Serves a repository that never talks to an upstream.
#[derive(Clone)]
pub struct HostedResolver {
    key: RepositoryKey,
    layout: Layout,
    entries: Arc<dyn ArtifactEntryStore>,
    content: ContentStore,
}

impl HostedResolver {
    pub fn new(
        key: RepositoryKey,
        layout: Layout,
        entries: Arc<dyn ArtifactEntryStore>,
        content: ContentStore,
    ) -> Self {
        HostedResolver {
            key,
            layout,
            entries,
            content,
        }
    }

    pub fn key(&self) -> &RepositoryKey {
        &self.key
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Return the entry for `coordinate` if its bytes are held locally.
    pub async fn resolve(&self, coordinate: &Coordinate) -> Result<ArtifactEntry> {
        let path = coordinate.path();
        match self.entries.find(&self.key, path)? {
            Some(entry) if entry.cached && self.content.exists(&self.key, path).await => {
                tracing::debug!(key = %self.key, path, "hosted hit");
                Ok(entry)
            }
            _ => Err(ResolutionError::NotFound {
                repository: self.key.clone(),
                path: path.to_string(),
            }),
        }
    }

    /// Publish `data` under `coordinate`, replacing any previous upload.
    pub async fn deploy(&self, coordinate: &Coordinate, data: &[u8]) -> Result<ArtifactEntry> {
        let published = self
            .content
            .write_all(&self.key, coordinate.path(), data, None)
            .await?;
        let entry = ArtifactEntry::cached(&self.key, coordinate.clone(), published.checksum, published.size);
        self.entries.save(&entry)?;
        tracing::info!(
            key = %self.key,
            path = coordinate.path(),
            size = published.size,
            "deployed artifact"
        );
        Ok(entry)
    }

    /// Locally held artifacts whose name contains `query`.
    pub fn search(&self, query: &str, size: usize) -> Result<Vec<SearchResult>> {
        Ok(self
            .entries
            .search(&self.key, query, size)?
            .into_iter()
            .map(result_from_entry)
            .collect())
    }
}

impl std::fmt::Debug for HostedResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedResolver")
            .field("key", &self.key)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
