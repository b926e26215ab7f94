//! Artifact entry persistence.
//!
//! The engine treats entry persistence as an external, synchronous and
//! strongly consistent (per key) collaborator. [`MemoryEntryStore`] keeps
//! records in a concurrent map; [`FileEntryStore`] writes one JSON record per
//! entry, replacing files atomically.

use std::io::Write;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use depot_core::{ArtifactEntry, Checksum, RepositoryKey};

use crate::error::{Result, StoreError};

/// Narrow interface to artifact entry persistence.
pub trait ArtifactEntryStore: Send + Sync {
    /// Look up the entry for `path` in the given repository.
    fn find(&self, key: &RepositoryKey, path: &str) -> Result<Option<ArtifactEntry>>;

    /// Insert or replace an entry. Replaying the same save is harmless.
    fn save(&self, entry: &ArtifactEntry) -> Result<()>;

    /// Insert an entry only if none exists for its key.
    ///
    /// Returns `true` when the entry was inserted.
    fn create(&self, entry: &ArtifactEntry) -> Result<bool>;

    /// Entries of one repository whose name contains `query`
    /// (ASCII case-insensitive), ordered by path.
    fn search(&self, key: &RepositoryKey, query: &str, limit: usize) -> Result<Vec<ArtifactEntry>>;
}

fn matches_query(entry: &ArtifactEntry, query: &str) -> bool {
    let query = query.to_ascii_lowercase();
    entry.coordinate.name().to_ascii_lowercase().contains(&query)
}

/// An in-memory entry store.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: DashMap<(RepositoryKey, String), ArtifactEntry>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ArtifactEntryStore for MemoryEntryStore {
    fn find(&self, key: &RepositoryKey, path: &str) -> Result<Option<ArtifactEntry>> {
        Ok(self
            .entries
            .get(&(key.clone(), path.to_string()))
            .map(|e| e.value().clone()))
    }

    fn save(&self, entry: &ArtifactEntry) -> Result<()> {
        self.entries.insert(
            (entry.repository_key(), entry.path().to_string()),
            entry.clone(),
        );
        Ok(())
    }

    fn create(&self, entry: &ArtifactEntry) -> Result<bool> {
        let mut inserted = false;
        self.entries
            .entry((entry.repository_key(), entry.path().to_string()))
            .or_insert_with(|| {
                inserted = true;
                entry.clone()
            });
        Ok(inserted)
    }

    fn search(&self, key: &RepositoryKey, query: &str, limit: usize) -> Result<Vec<ArtifactEntry>> {
        let mut found: Vec<ArtifactEntry> = self
            .entries
            .iter()
            .filter(|e| &e.key().0 == key && matches_query(e.value(), query))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.path().cmp(b.path()));
        found.truncate(limit);
        Ok(found)
    }
}

/// A filesystem entry store.
///
/// Layout:
/// ```text
/// <root>/
///   <storage>/<repository>/
///     <hh>/<sha256(path)>.json   # one record per artifact path
/// ```
#[derive(Debug, Clone)]
pub struct FileEntryStore {
    root: PathBuf,
}

impl FileEntryStore {
    /// Create an entry store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileEntryStore { root: root.into() }
    }

    /// Get the root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn repository_dir(&self, key: &RepositoryKey) -> Result<PathBuf> {
        for id in [&key.storage_id, &key.repository_id] {
            if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
                return Err(StoreError::InvalidPath {
                    path: id.clone(),
                    detail: "not a valid storage or repository id".to_string(),
                });
            }
        }
        Ok(self.root.join(&key.storage_id).join(&key.repository_id))
    }

    fn record_path(&self, key: &RepositoryKey, path: &str) -> Result<PathBuf> {
        let digest = Checksum::compute(path.as_bytes());
        let digest = digest.as_str();
        Ok(self
            .repository_dir(key)?
            .join(&digest[..2])
            .join(format!("{digest}.json")))
    }

    fn read_record(file: &Path) -> Result<Option<ArtifactEntry>> {
        match std::fs::read(file) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::storage(file, "reading entry", e)),
        }
    }

    /// Serialize into a temp file next to the record, ready to persist.
    fn stage_record(&self, entry: &ArtifactEntry) -> Result<(tempfile::NamedTempFile, PathBuf)> {
        let target = self.record_path(&entry.repository_key(), entry.path())?;
        let dir = target.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::storage(&dir, "creating entry dir", e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| StoreError::storage(&dir, "creating temp entry", e))?;
        serde_json::to_writer_pretty(&mut tmp, entry)?;
        tmp.flush()?;
        Ok((tmp, target))
    }
}

impl ArtifactEntryStore for FileEntryStore {
    fn find(&self, key: &RepositoryKey, path: &str) -> Result<Option<ArtifactEntry>> {
        let file = self.record_path(key, path)?;
        Self::read_record(&file)
    }

    fn save(&self, entry: &ArtifactEntry) -> Result<()> {
        let (tmp, target) = self.stage_record(entry)?;
        tmp.persist(&target)
            .map_err(|e| StoreError::storage(&target, "persisting entry", e.error))?;
        Ok(())
    }

    fn create(&self, entry: &ArtifactEntry) -> Result<bool> {
        let (tmp, target) = self.stage_record(entry)?;
        match tmp.persist_noclobber(&target) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::storage(&target, "persisting entry", e.error)),
        }
    }

    fn search(&self, key: &RepositoryKey, query: &str, limit: usize) -> Result<Vec<ArtifactEntry>> {
        let dir = self.repository_dir(key)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for bucket in std::fs::read_dir(&dir).map_err(|e| StoreError::storage(&dir, "listing entries", e))? {
            let bucket = bucket?.path();
            if !bucket.is_dir() {
                continue;
            }
            for record in std::fs::read_dir(&bucket)? {
                let record = record?.path();
                if record.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(entry) = Self::read_record(&record)? {
                    if matches_query(&entry, query) {
                        found.push(entry);
                    }
                }
            }
        }
        found.sort_by(|a, b| a.path().cmp(b.path()));
        found.truncate(limit);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{Coordinate, Layout};

    fn key() -> RepositoryKey {
        RepositoryKey::new("storage0", "npm-proxy")
    }

    fn npm_entry(name: &str, version: &str) -> ArtifactEntry {
        ArtifactEntry::remote(&key(), Coordinate::npm(None, name, version).unwrap())
    }

    fn exercise_store(store: &dyn ArtifactEntryStore) {
        let entry = npm_entry("compression", "1.7.2");
        assert!(store.find(&key(), entry.path()).unwrap().is_none());

        assert!(store.create(&entry).unwrap());
        assert!(!store.create(&entry).unwrap());

        let mut cached = entry.clone();
        cached.mark_cached(Checksum::compute(b"tgz"), 3);
        store.save(&cached).unwrap();
        // Replaying the save is harmless.
        store.save(&cached).unwrap();

        let found = store.find(&key(), entry.path()).unwrap().unwrap();
        assert!(found.cached);
        assert_eq!(found.checksum, Some(Checksum::compute(b"tgz")));

        // create() never downgrades an existing record.
        assert!(!store.create(&entry).unwrap());
        assert!(store.find(&key(), entry.path()).unwrap().unwrap().cached);

        // Other repositories are isolated.
        let other = RepositoryKey::new("storage0", "other");
        assert!(store.find(&other, entry.path()).unwrap().is_none());
    }

    fn exercise_search(store: &dyn ArtifactEntryStore) {
        store.save(&npm_entry("Reston", "0.2.0")).unwrap();
        store.save(&npm_entry("express", "4.18.2")).unwrap();
        store.save(&npm_entry("restify", "11.1.0")).unwrap();

        let hits = store.search(&key(), "rest", 10).unwrap();
        let names: Vec<_> = hits.iter().map(|e| e.coordinate.name().to_string()).collect();
        assert_eq!(names, vec!["Reston", "restify"]);

        assert_eq!(store.search(&key(), "rest", 1).unwrap().len(), 1);
        assert!(store
            .search(&RepositoryKey::new("storage0", "empty"), "rest", 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn memory_store_semantics() {
        let store = MemoryEntryStore::new();
        exercise_store(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_store_search() {
        exercise_search(&MemoryEntryStore::new());
    }

    #[test]
    fn file_store_semantics() {
        let dir = tempfile::tempdir().unwrap();
        exercise_store(&FileEntryStore::new(dir.path()));
    }

    #[test]
    fn file_store_search() {
        let dir = tempfile::tempdir().unwrap();
        exercise_search(&FileEntryStore::new(dir.path()));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let entry = ArtifactEntry::cached(
            &key(),
            Coordinate::parse(Layout::Raw, "tools/a.zip").unwrap(),
            Checksum::compute(b"zip"),
            3,
        );
        FileEntryStore::new(dir.path()).save(&entry).unwrap();

        let reopened = FileEntryStore::new(dir.path());
        assert_eq!(reopened.find(&key(), "tools/a.zip").unwrap(), Some(entry));
    }

    #[test]
    fn file_store_rejects_bad_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEntryStore::new(dir.path());
        assert!(store.find(&RepositoryKey::new("..", "r"), "a").is_err());
    }
}
