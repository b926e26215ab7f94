//! Filesystem content store with atomic publish.
//!
//! Writes land in `<root>/.staging/<uuid>.part` while a rolling SHA-256 is
//! computed. [`WriteHandle::commit`] verifies the digest and renames the
//! staged file into place; any other exit (error, early return, dropped
//! future) removes the staged file via `Drop`.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use depot_core::{Checksum, ChecksumBuilder, RepositoryKey};

use crate::error::{Result, StoreError};

const STAGING_DIR: &str = ".staging";
const READ_BUFFER: usize = 64 * 1024;

/// Content-addressable artifact storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub checksum: Checksum,
    pub size: u64,
}

impl ContentStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ContentStore { root: root.into() }
    }

    /// Get the root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open a published artifact for reading.
    pub async fn open_for_read(&self, key: &RepositoryKey, path: &str) -> Result<File> {
        let target = self.artifact_path(key, path)?;
        match File::open(&target).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                path: format!("{key}/{path}"),
            }),
            Err(e) => Err(StoreError::storage(target, "opening artifact", e)),
        }
    }

    /// Read a published artifact completely into memory.
    pub async fn read(&self, key: &RepositoryKey, path: &str) -> Result<Vec<u8>> {
        let mut file = self.open_for_read(key, path).await?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Check whether a complete artifact is published at `path`.
    pub async fn exists(&self, key: &RepositoryKey, path: &str) -> bool {
        match self.artifact_path(key, path) {
            Ok(target) => fs::metadata(&target)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Size in bytes of a published artifact.
    pub async fn size(&self, key: &RepositoryKey, path: &str) -> Result<u64> {
        let target = self.artifact_path(key, path)?;
        match fs::metadata(&target).await {
            Ok(m) if m.is_file() => Ok(m.len()),
            Ok(_) => Err(StoreError::NotFound {
                path: format!("{key}/{path}"),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                path: format!("{key}/{path}"),
            }),
            Err(e) => Err(StoreError::storage(target, "reading metadata", e)),
        }
    }

    /// Recompute the digest of a published artifact and compare.
    pub async fn verify(&self, key: &RepositoryKey, path: &str, expected: &Checksum) -> Result<bool> {
        let mut file = self.open_for_read(key, path).await?;
        let mut builder = ChecksumBuilder::new();
        let mut buf = vec![0u8; READ_BUFFER];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            builder.update(&buf[..n]);
        }
        Ok(builder.finish() == *expected)
    }

    /// Start staging a new artifact for `path`.
    pub async fn begin_write(&self, key: &RepositoryKey, path: &str) -> Result<WriteHandle> {
        let target = self.artifact_path(key, path)?;
        let staging_dir = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging_dir)
            .await
            .map_err(|e| StoreError::storage(&staging_dir, "creating staging dir", e))?;

        let token = uuid::Uuid::new_v4();
        let staging = staging_dir.join(format!("{token}.part"));
        let file = File::create(&staging)
            .await
            .map_err(|e| StoreError::storage(&staging, "creating staging file", e))?;

        tracing::trace!(%key, path, staging = %staging.display(), "staging write");
        Ok(WriteHandle {
            file: Some(file),
            staging,
            target,
            display_path: format!("{key}/{path}"),
            checksum: ChecksumBuilder::new(),
            done: false,
        })
    }

    /// Stage, verify and publish a complete buffer in one call.
    pub async fn write_all(
        &self,
        key: &RepositoryKey,
        path: &str,
        data: &[u8],
        expected: Option<&Checksum>,
    ) -> Result<Published> {
        let mut handle = self.begin_write(key, path).await?;
        handle.write(data).await?;
        handle.commit(expected).await
    }

    fn artifact_path(&self, key: &RepositoryKey, path: &str) -> Result<PathBuf> {
        check_id(&key.storage_id)?;
        check_id(&key.repository_id)?;
        let mut target = self.root.join(&key.storage_id).join(&key.repository_id);
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return Err(StoreError::InvalidPath {
                    path: path.to_string(),
                    detail: format!("invalid segment '{segment}'"),
                });
            }
            target.push(segment);
        }
        Ok(target)
    }
}

/// Storage and repository ids become directory names.
fn check_id(id: &str) -> Result<()> {
    if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
        return Err(StoreError::InvalidPath {
            path: id.to_string(),
            detail: "ids must be non-empty, must not start with '.' and must not contain separators"
                .to_string(),
        });
    }
    Ok(())
}

/// An in-progress artifact write.
///
/// Dropping the handle without committing discards the staged content.
#[derive(Debug)]
pub struct WriteHandle {
    file: Option<File>,
    staging: PathBuf,
    target: PathBuf,
    display_path: String,
    checksum: ChecksumBuilder,
    done: bool,
}

impl WriteHandle {
    /// Append a chunk to the staged content.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| StoreError::Storage {
            path: self.staging.clone(),
            detail: "write after close".to_string(),
        })?;
        file.write_all(chunk)
            .await
            .map_err(|e| StoreError::storage(&self.staging, "writing staged content", e))?;
        self.checksum.update(chunk);
        Ok(())
    }

    /// Bytes staged so far.
    pub fn len(&self) -> u64 {
        self.checksum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checksum.is_empty()
    }

    /// Verify and atomically publish the staged content.
    ///
    /// When `expected` is given and differs from the computed digest the
    /// staged content is discarded and nothing is published.
    pub async fn commit(mut self, expected: Option<&Checksum>) -> Result<Published> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| StoreError::storage(&self.staging, "flushing staged content", e))?;
            file.sync_all()
                .await
                .map_err(|e| StoreError::storage(&self.staging, "syncing staged content", e))?;
        }

        let size = self.checksum.len();
        let actual = std::mem::take(&mut self.checksum).finish();
        if let Some(expected) = expected {
            if *expected != actual {
                tracing::warn!(
                    path = %self.display_path,
                    %expected,
                    %actual,
                    "checksum mismatch, discarding staged content"
                );
                return Err(StoreError::ChecksumMismatch {
                    path: self.display_path.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        if let Some(parent) = self.target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::storage(parent, "creating artifact dir", e))?;
        }
        fs::rename(&self.staging, &self.target)
            .await
            .map_err(|e| StoreError::storage(&self.target, "publishing artifact", e))?;
        self.done = true;

        tracing::debug!(path = %self.display_path, checksum = %actual, size, "published artifact");
        Ok(Published {
            checksum: actual,
            size,
        })
    }

    /// Discard the staged content.
    pub async fn abort(mut self) {
        self.file.take();
        if let Err(e) = fs::remove_file(&self.staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(staging = %self.staging.display(), "failed to remove staged file: {e}");
            }
        }
        self.done = true;
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.file.take();
        let _ = std::fs::remove_file(&self.staging);
    }
}
