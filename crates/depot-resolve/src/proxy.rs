//! Proxy repositories: a local cache in front of one upstream registry.
//!
//! Resolution runs `CheckLocal -> Hit | Fetching -> Publish | Fail`:
//!
//! 1. A cached entry whose blob is present (and, with `verify_on_hit`,
//!    still matches its checksum) is a hit.
//! 2. Anything else is a miss. Misses go through the shared
//!    [`SingleFlight`], so concurrent requests for the same artifact cause
//!    one upstream download.
//! 3. The flight checks the cache once more, then downloads, commits the
//!    blob and saves the cached entry. It runs on its own task and finishes
//!    even if every caller left.

use std::sync::Arc;

use depot_core::coordinate::npm;
use depot_core::{ArtifactEntry, Coordinate, Layout, RepositoryKey, SearchResult};
use depot_remote::{PackageMetadata, RemoteFetcher, RemotePackage};
use depot_store::{ArtifactEntryStore, ContentStore};

use crate::error::{ResolutionError, Result};
use crate::single_flight::SingleFlight;

/// Key of one in-flight download: repository plus storage path.
pub type FlightKey = (RepositoryKey, String);

/// Flights shared by every proxy of an engine.
pub type FetchFlights = SingleFlight<FlightKey, Result<ArtifactEntry>>;

/// Serves a caching proxy of one upstream.
#[derive(Clone)]
pub struct ProxyResolver {
    key: RepositoryKey,
    layout: Layout,
    url: String,
    entries: Arc<dyn ArtifactEntryStore>,
    fetcher: RemoteFetcher,
    flights: FetchFlights,
    verify_on_hit: bool,
}

impl ProxyResolver {
    pub fn new(
        key: RepositoryKey,
        layout: Layout,
        url: impl Into<String>,
        entries: Arc<dyn ArtifactEntryStore>,
        fetcher: RemoteFetcher,
        flights: FetchFlights,
    ) -> Self {
        ProxyResolver {
            key,
            layout,
            url: url.into(),
            entries,
            fetcher,
            flights,
            verify_on_hit: false,
        }
    }

    /// Re-hash cached blobs before serving them.
    pub fn verify_on_hit(mut self, enabled: bool) -> Self {
        self.verify_on_hit = enabled;
        self
    }

    pub fn key(&self) -> &RepositoryKey {
        &self.key
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serve `coordinate` from the cache, fetching it from upstream on a miss.
    pub async fn resolve(&self, coordinate: &Coordinate) -> Result<ArtifactEntry> {
        let local = usable_entry(
            self.entries.as_ref(),
            self.fetcher.content(),
            &self.key,
            coordinate.path(),
            self.verify_on_hit,
        )
        .await?;
        if let Some(entry) = local {
            tracing::debug!(key = %self.key, path = coordinate.path(), "cache hit");
            return Ok(entry);
        }

        tracing::debug!(key = %self.key, path = coordinate.path(), "cache miss");
        let flight_key = (self.key.clone(), coordinate.path().to_string());
        let work = fetch_and_record(
            self.key.clone(),
            self.url.clone(),
            coordinate.clone(),
            self.fetcher.clone(),
            Arc::clone(&self.entries),
            self.verify_on_hit,
        );
        self.flights
            .run(flight_key, work)
            .await
            .map_err(|aborted| ResolutionError::Storage {
                detail: format!("fetch of {} in {}: {aborted}", coordinate.path(), self.key),
            })?
    }

    /// Query the upstream's search API.
    ///
    /// Every hit not yet known locally is recorded as an uncached entry;
    /// existing entries are left untouched.
    pub async fn search(&self, query: &str, size: usize) -> Result<Vec<SearchResult>> {
        let packages = self
            .fetcher
            .search(&self.url, self.layout, query, size)
            .await
            .map_err(|e| ResolutionError::UpstreamUnavailable {
                repository: self.key.clone(),
                detail: e.to_string(),
            })?;

        let mut results = Vec::with_capacity(packages.len());
        for package in packages {
            let coordinate = match self.package_coordinate(&package) {
                Ok(coordinate) => coordinate,
                Err(e) => {
                    tracing::debug!(key = %self.key, name = %package.name, "skipping search hit: {e}");
                    continue;
                }
            };
            let cached = self.record_remote(&coordinate)?;
            results.push(SearchResult {
                coordinate,
                repository_id: self.key.repository_id.clone(),
                display_name: package.name,
                description: package.description,
                cached,
            });
        }
        Ok(results)
    }

    /// Fetch the npm package document for `package_name` from upstream.
    ///
    /// The document is passed through unchanged. Every listed version not
    /// yet known locally is recorded as an uncached entry.
    pub async fn package_metadata(&self, package_name: &str) -> Result<PackageMetadata> {
        if !matches!(self.layout, Layout::Npm) {
            return Err(ResolutionError::UnsupportedOperation {
                repository: self.key.clone(),
                operation: "package metadata",
            });
        }
        npm::split_package_name(package_name)?;

        let metadata = self
            .fetcher
            .package_metadata(&self.url, package_name)
            .await
            .map_err(|e| ResolutionError::from_fetch(&self.key, package_name, e))?;

        for version in &metadata.versions {
            match npm::from_package(package_name, version) {
                Ok(coordinate) => {
                    self.record_remote(&coordinate)?;
                }
                Err(e) => {
                    tracing::debug!(key = %self.key, package = package_name, %version, "skipping version: {e}");
                }
            }
        }
        tracing::debug!(key = %self.key, package = package_name, versions = metadata.versions.len(), "served package document");
        Ok(metadata)
    }

    /// Record an uncached entry for `coordinate` unless one exists.
    /// Returns whether the artifact is cached.
    fn record_remote(&self, coordinate: &Coordinate) -> Result<bool> {
        match self.entries.find(&self.key, coordinate.path())? {
            Some(entry) => Ok(entry.cached),
            None => {
                self.entries
                    .create(&ArtifactEntry::remote(&self.key, coordinate.clone()))?;
                Ok(false)
            }
        }
    }

    fn package_coordinate(&self, package: &RemotePackage) -> Result<Coordinate> {
        match self.layout {
            Layout::Npm => Ok(npm::from_package(&package.name, &package.version)?),
            Layout::Maven2 | Layout::Raw => Err(ResolutionError::UnsupportedOperation {
                repository: self.key.clone(),
                operation: "upstream search",
            }),
        }
    }
}

/// The cached entry for `path` if its blob can be served as is.
///
/// An uncached entry, a missing blob or (with `verify`) a blob that no
/// longer matches its checksum all count as a miss.
async fn usable_entry(
    entries: &dyn ArtifactEntryStore,
    content: &ContentStore,
    key: &RepositoryKey,
    path: &str,
    verify: bool,
) -> Result<Option<ArtifactEntry>> {
    let Some(entry) = entries.find(key, path)? else {
        return Ok(None);
    };
    if !entry.cached {
        return Ok(None);
    }

    if !content.exists(key, path).await {
        tracing::warn!(%key, path, "entry marked cached but blob is missing");
        return Ok(None);
    }
    if verify {
        if let Some(checksum) = &entry.checksum {
            if !content.verify(key, path, checksum).await? {
                tracing::warn!(%key, path, "cached blob failed verification");
                return Ok(None);
            }
        }
    }
    Ok(Some(entry))
}

/// The shared work of a miss: re-check, download, publish, record.
///
/// A caller can observe a miss just before an earlier flight for the same
/// path records its entry and releases the key; the re-check serves that
/// caller from the cache instead of downloading again.
async fn fetch_and_record(
    key: RepositoryKey,
    url: String,
    coordinate: Coordinate,
    fetcher: RemoteFetcher,
    entries: Arc<dyn ArtifactEntryStore>,
    verify: bool,
) -> Result<ArtifactEntry> {
    if let Some(entry) = usable_entry(entries.as_ref(), fetcher.content(), &key, coordinate.path(), verify).await? {
        tracing::debug!(%key, path = entry.path(), "cached by an earlier fetch");
        return Ok(entry);
    }

    let fetched = fetcher
        .fetch(&url, &key, &coordinate)
        .await
        .map_err(|e| ResolutionError::from_fetch(&key, coordinate.path(), e))?;

    let entry = ArtifactEntry::cached(&key, coordinate, fetched.checksum, fetched.size);
    entries.save(&entry)?;
    tracing::info!(%key, path = entry.path(), url = %fetched.url, "recorded cached artifact");
    Ok(entry)
}

impl std::fmt::Debug for ProxyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyResolver")
            .field("key", &self.key)
            .field("layout", &self.layout)
            .field("url", &self.url)
            .field("verify_on_hit", &self.verify_on_hit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, UPSTREAM};
    use depot_core::Checksum;
    use depot_remote::stub::StubResponse;
    use depot_remote::CHECKSUM_HEADER;
    use depot_store::{MemoryEntryStore, StoreError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Entry store whose next lookup can be made to answer late, with what
    /// it saw when it was called.
    #[derive(Default)]
    struct LaggingEntries {
        inner: MemoryEntryStore,
        lag_next_find: AtomicBool,
    }

    impl ArtifactEntryStore for LaggingEntries {
        fn find(&self, key: &RepositoryKey, path: &str) -> std::result::Result<Option<ArtifactEntry>, StoreError> {
            let found = self.inner.find(key, path);
            if self.lag_next_find.swap(false, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(300));
            }
            found
        }

        fn save(&self, entry: &ArtifactEntry) -> std::result::Result<(), StoreError> {
            self.inner.save(entry)
        }

        fn create(&self, entry: &ArtifactEntry) -> std::result::Result<bool, StoreError> {
            self.inner.create(entry)
        }

        fn search(
            &self,
            key: &RepositoryKey,
            query: &str,
            limit: usize,
        ) -> std::result::Result<Vec<ArtifactEntry>, StoreError> {
            self.inner.search(key, query, limit)
        }
    }

    const TARBALL: &str = "compression/-/compression-1.7.2.tgz";

    fn compression() -> Coordinate {
        Coordinate::parse(Layout::Npm, TARBALL).unwrap()
    }

    fn tarball_url() -> String {
        format!("{UPSTREAM}/{TARBALL}")
    }

    #[tokio::test]
    async fn miss_fetches_and_records() {
        let h = Harness::new();
        h.stub.set(&tarball_url(), StubResponse::ok(b"gzip".to_vec()));
        let proxy = h.proxy("npm-proxy");

        let entry = proxy.resolve(&compression()).await.unwrap();
        assert!(entry.cached);
        assert_eq!(entry.checksum, Some(Checksum::compute(b"gzip")));
        assert_eq!(entry.size_bytes, Some(4));

        let stored = h.entries.find(proxy.key(), compression().path()).unwrap();
        assert_eq!(stored, Some(entry));
    }

    #[tokio::test]
    async fn second_resolve_is_served_from_cache() {
        let h = Harness::new();
        h.stub.set(&tarball_url(), StubResponse::ok(b"gzip".to_vec()));
        let proxy = h.proxy("npm-proxy");

        let first = proxy.resolve(&compression()).await.unwrap();
        let second = proxy.resolve(&compression()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.stub.calls(&tarball_url()), 1);
    }

    #[tokio::test]
    async fn not_found_creates_no_entry() {
        let h = Harness::new();
        let proxy = h.proxy("npm-proxy");

        let err = proxy.resolve(&compression()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { .. }));
        assert!(h.entries.is_empty());
    }

    #[tokio::test]
    async fn unreachable_upstream_is_unavailable() {
        let h = Harness::new();
        h.stub.set(&tarball_url(), StubResponse::unreachable());
        let proxy = h.proxy("npm-proxy");

        let err = proxy.resolve(&compression()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::UpstreamUnavailable { .. }));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn missing_blob_is_refetched() {
        let h = Harness::new();
        h.stub.set(&tarball_url(), StubResponse::ok(b"gzip".to_vec()));
        let proxy = h.proxy("npm-proxy");
        proxy.resolve(&compression()).await.unwrap();

        let blob = h
            .dir
            .path()
            .join("storage0/npm-proxy/compression/compression/1.7.2/compression-1.7.2.tgz");
        std::fs::remove_file(blob).unwrap();

        proxy.resolve(&compression()).await.unwrap();
        assert_eq!(h.stub.calls(&tarball_url()), 2);
    }

    #[tokio::test]
    async fn tampered_blob_is_refetched_when_verifying() {
        let h = Harness::new();
        h.stub.set(&tarball_url(), StubResponse::ok(b"gzip".to_vec()));
        let proxy = h.proxy("npm-proxy").verify_on_hit(true);
        proxy.resolve(&compression()).await.unwrap();

        let blob = h
            .dir
            .path()
            .join("storage0/npm-proxy/compression/compression/1.7.2/compression-1.7.2.tgz");
        std::fs::write(&blob, b"evil").unwrap();

        proxy.resolve(&compression()).await.unwrap();
        assert_eq!(h.stub.calls(&tarball_url()), 2);
        assert_eq!(std::fs::read(&blob).unwrap(), b"gzip");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_fetch_once() {
        let h = Harness::new();
        h.stub.set(
            &tarball_url(),
            StubResponse::ok(b"gzip".to_vec()).delay(Duration::from_millis(100)),
        );
        let proxy = h.proxy("npm-proxy");

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let proxy = proxy.clone();
            tasks.push(tokio::spawn(async move { proxy.resolve(&compression()).await }));
        }
        for task in tasks {
            let entry = task.await.unwrap().unwrap();
            assert_eq!(entry.checksum, Some(Checksum::compute(b"gzip")));
        }
        assert_eq!(h.stub.calls(&tarball_url()), 1);
    }

    #[tokio::test]
    async fn abandoned_request_still_populates_cache() {
        let h = Harness::new();
        h.stub.set(
            &tarball_url(),
            StubResponse::ok(b"gzip".to_vec()).delay(Duration::from_millis(100)),
        );
        let proxy = h.proxy("npm-proxy");

        let gave_up = tokio::time::timeout(Duration::from_millis(10), proxy.resolve(&compression())).await;
        assert!(gave_up.is_err());

        for _ in 0..50 {
            if h.flights.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let stored = h.entries.find(proxy.key(), compression().path()).unwrap().unwrap();
        assert!(stored.cached);

        proxy.resolve(&compression()).await.unwrap();
        assert_eq!(h.stub.calls(&tarball_url()), 1);
    }

    #[tokio::test]
    async fn search_records_uncached_entries() {
        let h = Harness::new();
        let search_url = depot_remote::search::search_url(UPSTREAM, Layout::Npm, "reston", 10).unwrap();
        h.stub.set(
            &search_url,
            StubResponse::json(&serde_json::json!({
                "objects": [{"package": {"name": "Reston", "version": "0.2.0"}}],
                "total": 1
            })),
        );
        let proxy = h.proxy("npm-proxy");

        let hits = proxy.search("reston", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_name, "Reston");
        assert!(!hits[0].cached);

        assert_eq!(h.entries.len(), 1);
        let entry = h
            .entries
            .find(proxy.key(), "Reston/Reston/0.2.0/Reston-0.2.0.tgz")
            .unwrap()
            .unwrap();
        assert!(!entry.cached);
    }

    #[tokio::test]
    async fn search_does_not_downgrade_cached_entries() {
        let h = Harness::new();
        let coord = Coordinate::npm(None, "Reston", "0.2.0").unwrap();
        let cached = ArtifactEntry::cached(&h.key("npm-proxy"), coord, Checksum::compute(b"x"), 1);
        h.entries.save(&cached).unwrap();

        let search_url = depot_remote::search::search_url(UPSTREAM, Layout::Npm, "reston", 10).unwrap();
        h.stub.set(
            &search_url,
            StubResponse::json(&serde_json::json!({
                "objects": [{"package": {"name": "Reston", "version": "0.2.0"}}]
            })),
        );

        let hits = h.proxy("npm-proxy").search("reston", 10).await.unwrap();
        assert!(hits[0].cached);
        let entry = h.entries.find(&h.key("npm-proxy"), cached.path()).unwrap().unwrap();
        assert_eq!(entry, cached);
    }

    #[tokio::test]
    async fn failing_search_is_unavailable() {
        let h = Harness::new();
        let search_url = depot_remote::search::search_url(UPSTREAM, Layout::Npm, "x", 10).unwrap();
        h.stub.set(&search_url, StubResponse::status(500));

        let err = h.proxy("npm-proxy").search("x", 10).await.unwrap_err();
        assert!(matches!(err, ResolutionError::UpstreamUnavailable { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn late_miss_after_earlier_fetch_is_served_from_cache() {
        let h = Harness::new();
        h.stub.set(
            &tarball_url(),
            StubResponse::ok(b"gzip".to_vec()).delay(Duration::from_millis(50)),
        );
        let entries = Arc::new(LaggingEntries::default());
        let proxy = ProxyResolver::new(
            h.key("npm-proxy"),
            Layout::Npm,
            UPSTREAM,
            entries.clone(),
            h.fetcher.clone(),
            h.flights.clone(),
        );

        let first = {
            let proxy = proxy.clone();
            tokio::spawn(async move { proxy.resolve(&compression()).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        // The second lookup misses now but answers after the first fetch
        // has recorded its entry and left the flight.
        entries.lag_next_find.store(true, Ordering::SeqCst);
        let second = {
            let proxy = proxy.clone();
            tokio::spawn(async move { proxy.resolve(&compression()).await })
        };

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(h.stub.calls(&tarball_url()), 1);
        assert_eq!(h.flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn checksum_mismatch_records_nothing() {
        let h = Harness::new();
        let wrong = Checksum::compute(b"something else");
        h.stub.set(
            &tarball_url(),
            StubResponse::ok(b"gzip".to_vec()).header(CHECKSUM_HEADER, wrong.as_str()),
        );
        let proxy = h.proxy("npm-proxy");

        let err = proxy.resolve(&compression()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::ChecksumMismatch { .. }), "got {err:?}");
        assert_eq!(err.status_code(), 502);
        assert_eq!(h.stub.calls(&tarball_url()), 1);
        assert!(h.entries.is_empty());
        assert!(!h.fetcher.content().exists(proxy.key(), compression().path()).await);
    }

    fn react_document() -> serde_json::Value {
        serde_json::json!({
            "name": "react",
            "dist-tags": {"latest": "16.5.0", "next": "16.6.0-alpha.0"},
            "versions": {
                "16.4.2": {"name": "react", "version": "16.4.2"},
                "16.5.0": {"name": "react", "version": "16.5.0"},
                "latest": {}
            }
        })
    }

    #[tokio::test]
    async fn package_metadata_passes_document_through() {
        let h = Harness::new();
        h.stub.set(&format!("{UPSTREAM}/react"), StubResponse::json(&react_document()));
        let proxy = h.proxy("npm-proxy");

        let metadata = proxy.package_metadata("react").await.unwrap();
        assert_eq!(metadata.name, "react");
        let served: serde_json::Value = serde_json::from_slice(&metadata.document).unwrap();
        assert_eq!(served, react_document());

        let entry = h
            .entries
            .find(proxy.key(), "react/react/16.5.0/react-16.5.0.tgz")
            .unwrap()
            .unwrap();
        assert!(!entry.cached);
        // "latest" is not a version and is skipped.
        assert_eq!(h.entries.len(), 2);
    }

    #[tokio::test]
    async fn package_metadata_keeps_cached_entries() {
        let h = Harness::new();
        let coord = Coordinate::npm(None, "react", "16.5.0").unwrap();
        let cached = ArtifactEntry::cached(&h.key("npm-proxy"), coord, Checksum::compute(b"x"), 1);
        h.entries.save(&cached).unwrap();
        h.stub.set(&format!("{UPSTREAM}/react"), StubResponse::json(&react_document()));

        h.proxy("npm-proxy").package_metadata("react").await.unwrap();
        let entry = h.entries.find(&h.key("npm-proxy"), cached.path()).unwrap().unwrap();
        assert_eq!(entry, cached);
    }

    #[tokio::test]
    async fn package_metadata_errors() {
        let h = Harness::new();
        let proxy = h.proxy("npm-proxy");

        let err = proxy.package_metadata("left-pad").await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { .. }), "got {err:?}");

        let err = proxy.package_metadata("../etc").await.unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedCoordinate { .. }), "got {err:?}");
        assert_eq!(h.stub.calls(&format!("{UPSTREAM}/../etc")), 0);

        let maven = ProxyResolver::new(
            h.key("maven-proxy"),
            Layout::Maven2,
            UPSTREAM,
            h.entries.clone(),
            h.fetcher.clone(),
            h.flights.clone(),
        );
        let err = maven.package_metadata("react").await.unwrap_err();
        assert!(matches!(err, ResolutionError::UnsupportedOperation { .. }), "got {err:?}");
        assert!(h.entries.is_empty());
    }
}
