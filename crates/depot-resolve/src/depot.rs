//! The resolution engine.
//!
//! [`Depot`] owns the stores, the upstream fetcher and the shared fetch
//! flights. It builds one [`Resolver`] per repository on first use from the
//! [`RepositoryProvider`] and dispatches every request to it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::fs::File;

use depot_core::{ArtifactEntry, Coordinate, Layout, Repository, RepositoryKey, RepositoryKind, SearchResult};
use depot_remote::{PackageMetadata, RemoteFetcher};
use depot_store::{ArtifactEntryStore, ContentStore};

use crate::error::{ResolutionError, Result};
use crate::group::{GroupResolver, Members};
use crate::hosted::HostedResolver;
use crate::path::ResolutionPath;
use crate::provider::RepositoryProvider;
use crate::proxy::{FetchFlights, ProxyResolver};

/// Engine-wide behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepotOptions {
    /// Re-hash cached proxy blobs before serving them.
    pub verify_on_hit: bool,
}

/// The resolver serving one repository.
#[derive(Debug, Clone)]
pub enum Resolver {
    Hosted(HostedResolver),
    Proxy(ProxyResolver),
    Group(GroupResolver),
}

impl Resolver {
    pub fn key(&self) -> &RepositoryKey {
        match self {
            Resolver::Hosted(r) => r.key(),
            Resolver::Proxy(r) => r.key(),
            Resolver::Group(r) => r.key(),
        }
    }

    pub fn layout(&self) -> Layout {
        match self {
            Resolver::Hosted(r) => r.layout(),
            Resolver::Proxy(r) => r.layout(),
            Resolver::Group(r) => r.layout(),
        }
    }
}

/// Artifact resolution engine over a set of repositories.
pub struct Depot {
    provider: Arc<dyn RepositoryProvider>,
    entries: Arc<dyn ArtifactEntryStore>,
    fetcher: RemoteFetcher,
    flights: FetchFlights,
    resolvers: DashMap<RepositoryKey, Arc<Resolver>>,
    options: DepotOptions,
}

impl Depot {
    /// Create an engine. Blobs live in the fetcher's content store.
    pub fn new(
        provider: Arc<dyn RepositoryProvider>,
        entries: Arc<dyn ArtifactEntryStore>,
        fetcher: RemoteFetcher,
    ) -> Self {
        Depot {
            provider,
            entries,
            fetcher,
            flights: FetchFlights::new(),
            resolvers: DashMap::new(),
            options: DepotOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DepotOptions) -> Self {
        self.options = options;
        self
    }

    pub fn content(&self) -> &ContentStore {
        self.fetcher.content()
    }

    /// All configured repositories.
    pub fn repositories(&self) -> Vec<Repository> {
        self.provider.repositories()
    }

    /// Upstream downloads currently running.
    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }

    /// The resolver for `key`, built on first use.
    pub fn resolver(&self, key: &RepositoryKey) -> Result<Arc<Resolver>> {
        if let Some(resolver) = self.resolvers.get(key) {
            return Ok(Arc::clone(resolver.value()));
        }
        let repository = self
            .provider
            .repository(key)
            .ok_or_else(|| ResolutionError::UnknownRepository { key: key.clone() })?;
        let resolver = Arc::new(self.build(repository)?);
        Ok(Arc::clone(
            self.resolvers.entry(key.clone()).or_insert(resolver).value(),
        ))
    }

    fn build(&self, repository: Repository) -> Result<Resolver> {
        let key = repository.key();
        let members = repository.member_keys()?;
        Ok(match repository.kind {
            RepositoryKind::Hosted => Resolver::Hosted(HostedResolver::new(
                key,
                repository.layout,
                Arc::clone(&self.entries),
                self.content().clone(),
            )),
            RepositoryKind::Proxy { url } => Resolver::Proxy(
                ProxyResolver::new(
                    key,
                    repository.layout,
                    url,
                    Arc::clone(&self.entries),
                    self.fetcher.clone(),
                    self.flights.clone(),
                )
                .verify_on_hit(self.options.verify_on_hit),
            ),
            RepositoryKind::Group { .. } => Resolver::Group(GroupResolver::new(key, repository.layout, members)),
        })
    }

    /// Resolve `coordinate` in repository `storage_id:repository_id`.
    pub async fn resolve(
        &self,
        storage_id: &str,
        repository_id: &str,
        coordinate: &Coordinate,
    ) -> Result<ArtifactEntry> {
        let key = RepositoryKey::new(storage_id, repository_id);
        self.resolve_in(&key, coordinate, &ResolutionPath::new()).await
    }

    /// Parse `raw_path` with the repository's layout and resolve it.
    pub async fn resolve_path(
        &self,
        storage_id: &str,
        repository_id: &str,
        raw_path: &str,
    ) -> Result<ArtifactEntry> {
        let key = RepositoryKey::new(storage_id, repository_id);
        let coordinate = Coordinate::parse(self.resolver(&key)?.layout(), raw_path)?;
        self.resolve_in(&key, &coordinate, &ResolutionPath::new()).await
    }

    /// Search repository `storage_id:repository_id`.
    pub async fn search(
        &self,
        storage_id: &str,
        repository_id: &str,
        query: &str,
        page_size: usize,
    ) -> Result<Vec<SearchResult>> {
        let key = RepositoryKey::new(storage_id, repository_id);
        self.search_in(&key, query, page_size, &ResolutionPath::new()).await
    }

    /// Upload `data` into a hosted repository.
    pub async fn deploy(
        &self,
        storage_id: &str,
        repository_id: &str,
        raw_path: &str,
        data: &[u8],
    ) -> Result<ArtifactEntry> {
        let key = RepositoryKey::new(storage_id, repository_id);
        let resolver = self.resolver(&key)?;
        match &*resolver {
            Resolver::Hosted(hosted) => {
                let coordinate = Coordinate::parse(hosted.layout(), raw_path)?;
                hosted.deploy(&coordinate, data).await
            }
            _ => Err(ResolutionError::UnsupportedOperation {
                repository: key,
                operation: "deploy",
            }),
        }
    }

    /// Fetch an npm package document through a proxy repository.
    pub async fn package_metadata(
        &self,
        storage_id: &str,
        repository_id: &str,
        package_name: &str,
    ) -> Result<PackageMetadata> {
        let key = RepositoryKey::new(storage_id, repository_id);
        let resolver = self.resolver(&key)?;
        match &*resolver {
            Resolver::Proxy(proxy) => proxy.package_metadata(package_name).await,
            _ => Err(ResolutionError::UnsupportedOperation {
                repository: key,
                operation: "package metadata",
            }),
        }
    }

    /// Open the published blob of a cached entry.
    pub async fn open(&self, entry: &ArtifactEntry) -> Result<File> {
        if !entry.cached {
            return Err(ResolutionError::NotFound {
                repository: entry.repository_key(),
                path: entry.path().to_string(),
            });
        }
        Ok(self
            .content()
            .open_for_read(&entry.repository_key(), entry.path())
            .await?)
    }

    /// Re-hash the blob of a cached artifact against its recorded checksum.
    ///
    /// Returns `false` when the blob is missing or its digest changed.
    pub async fn verify(&self, storage_id: &str, repository_id: &str, raw_path: &str) -> Result<bool> {
        let key = RepositoryKey::new(storage_id, repository_id);
        let coordinate = Coordinate::parse(self.resolver(&key)?.layout(), raw_path)?;
        let path = coordinate.path();
        let checksum = match self.entries.find(&key, path)? {
            Some(ArtifactEntry {
                cached: true,
                checksum: Some(checksum),
                ..
            }) => checksum,
            _ => {
                return Err(ResolutionError::NotFound {
                    repository: key,
                    path: path.to_string(),
                })
            }
        };
        if !self.content().exists(&key, path).await {
            return Ok(false);
        }
        Ok(self.content().verify(&key, path, &checksum).await?)
    }

    fn resolve_in<'a>(
        &'a self,
        key: &'a RepositoryKey,
        coordinate: &'a Coordinate,
        path: &'a ResolutionPath,
    ) -> BoxFuture<'a, Result<ArtifactEntry>> {
        async move {
            let path = path.enter(key)?;
            let resolver = self.resolver(key)?;
            match &*resolver {
                Resolver::Hosted(hosted) => hosted.resolve(coordinate).await,
                Resolver::Proxy(proxy) => proxy.resolve(coordinate).await,
                Resolver::Group(group) => group.resolve(self, coordinate, &path).await,
            }
        }
        .boxed()
    }

    fn search_in<'a>(
        &'a self,
        key: &'a RepositoryKey,
        query: &'a str,
        size: usize,
        path: &'a ResolutionPath,
    ) -> BoxFuture<'a, Result<Vec<SearchResult>>> {
        async move {
            let path = path.enter(key)?;
            let resolver = self.resolver(key)?;
            match &*resolver {
                Resolver::Hosted(hosted) => hosted.search(query, size),
                Resolver::Proxy(proxy) => proxy.search(query, size).await,
                Resolver::Group(group) => group.search(self, query, size, &path).await,
            }
        }
        .boxed()
    }
}

#[async_trait]
impl Members for Depot {
    async fn resolve_member(
        &self,
        member: &RepositoryKey,
        coordinate: &Coordinate,
        path: &ResolutionPath,
    ) -> Result<ArtifactEntry> {
        self.resolve_in(member, coordinate, path).await
    }

    async fn search_member(
        &self,
        member: &RepositoryKey,
        query: &str,
        size: usize,
        path: &ResolutionPath,
    ) -> Result<Vec<SearchResult>> {
        self.search_in(member, query, size, path).await
    }
}

impl std::fmt::Debug for Depot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Depot")
            .field("resolvers", &self.resolvers.len())
            .field("flights", &self.flights)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, STORAGE};
    use depot_core::Checksum;
    use depot_remote::stub::StubResponse;
    use depot_remote::CHECKSUM_HEADER;
    use tokio::io::AsyncReadExt;

    const FIRST: &str = "http://first.test";
    const SECOND: &str = "http://second.test";
    const TARBALL: &str = "compression/-/compression-1.7.2.tgz";

    fn npm_repos() -> Vec<Repository> {
        vec![
            Repository::hosted(STORAGE, "npm-hosted", Layout::Npm),
            Repository::proxy(STORAGE, "first", Layout::Npm, FIRST),
            Repository::proxy(STORAGE, "second", Layout::Npm, SECOND),
            Repository::group(STORAGE, "npm-group", Layout::Npm, &["npm-hosted", "first", "second"]),
        ]
    }

    fn compression() -> Coordinate {
        Coordinate::parse(Layout::Npm, TARBALL).unwrap()
    }

    #[tokio::test]
    async fn unknown_repository() {
        let h = Harness::new();
        let depot = h.depot(npm_repos());
        let err = depot.resolve(STORAGE, "nope", &compression()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownRepository { .. }));
    }

    #[tokio::test]
    async fn group_falls_back_in_member_order() {
        let h = Harness::new();
        h.stub.set(&format!("{SECOND}/{TARBALL}"), StubResponse::ok(b"second".to_vec()));
        let depot = h.depot(npm_repos());

        let entry = depot.resolve(STORAGE, "npm-group", &compression()).await.unwrap();
        assert_eq!(entry.repository_id, "second");
        assert_eq!(entry.origin_repository_id.as_deref(), Some("second"));
        assert_eq!(h.stub.calls(&format!("{FIRST}/{TARBALL}")), 1);
        assert_eq!(h.stub.calls(&format!("{SECOND}/{TARBALL}")), 1);

        // The group does not keep its own record; the member does.
        assert!(h.entries.find(&h.key("npm-group"), entry.path()).unwrap().is_none());
        assert!(h.entries.find(&h.key("second"), entry.path()).unwrap().is_some());
    }

    #[tokio::test]
    async fn group_stops_at_first_success() {
        let h = Harness::new();
        h.stub.set(&format!("{FIRST}/{TARBALL}"), StubResponse::ok(b"first".to_vec()));
        h.stub.set(&format!("{SECOND}/{TARBALL}"), StubResponse::ok(b"second".to_vec()));
        let depot = h.depot(npm_repos());

        let entry = depot.resolve(STORAGE, "npm-group", &compression()).await.unwrap();
        assert_eq!(entry.repository_id, "first");
        assert_eq!(h.stub.calls(&format!("{SECOND}/{TARBALL}")), 0);
    }

    #[tokio::test]
    async fn hosted_member_wins_over_proxies() {
        let h = Harness::new();
        h.stub.set(&format!("{FIRST}/{TARBALL}"), StubResponse::ok(b"first".to_vec()));
        let depot = h.depot(npm_repos());
        depot.deploy(STORAGE, "npm-hosted", TARBALL, b"local").await.unwrap();

        let entry = depot.resolve(STORAGE, "npm-group", &compression()).await.unwrap();
        assert_eq!(entry.origin_repository_id.as_deref(), Some("npm-hosted"));
        assert_eq!(h.stub.total_calls(), 0);
    }

    #[tokio::test]
    async fn group_with_unreachable_member_is_unavailable() {
        let h = Harness::new();
        h.stub.set(&format!("{FIRST}/{TARBALL}"), StubResponse::unreachable());
        let depot = h.depot(npm_repos());

        let err = depot.resolve(STORAGE, "npm-group", &compression()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::UpstreamUnavailable { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn member_checksum_mismatch_makes_group_unavailable() {
        let h = Harness::new();
        let wrong = Checksum::compute(b"not the tarball");
        h.stub.set(
            &format!("{FIRST}/{TARBALL}"),
            StubResponse::ok(b"tarball".to_vec()).header(CHECKSUM_HEADER, wrong.as_str()),
        );
        let depot = h.depot(npm_repos());

        let err = depot.resolve(STORAGE, "npm-group", &compression()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::UpstreamUnavailable { .. }), "got {err:?}");
        assert_eq!(err.status_code(), 502);
        // The remaining member was still tried.
        assert_eq!(h.stub.calls(&format!("{SECOND}/{TARBALL}")), 1);
        assert!(h.entries.is_empty());
        assert!(!depot.content().exists(&h.key("first"), compression().path()).await);
    }

    #[tokio::test]
    async fn member_checksum_mismatch_falls_back_to_next_member() {
        let h = Harness::new();
        let wrong = Checksum::compute(b"not the tarball");
        h.stub.set(
            &format!("{FIRST}/{TARBALL}"),
            StubResponse::ok(b"tarball".to_vec()).header(CHECKSUM_HEADER, wrong.as_str()),
        );
        h.stub.set(&format!("{SECOND}/{TARBALL}"), StubResponse::ok(b"tarball".to_vec()));
        let depot = h.depot(npm_repos());

        let entry = depot.resolve(STORAGE, "npm-group", &compression()).await.unwrap();
        assert_eq!(entry.origin_repository_id.as_deref(), Some("second"));
        assert!(h.entries.find(&h.key("first"), entry.path()).unwrap().is_none());
    }

    #[tokio::test]
    async fn package_metadata_requires_proxy() {
        let h = Harness::new();
        h.stub.set(
            &format!("{FIRST}/react"),
            StubResponse::json(&serde_json::json!({"name": "react", "versions": {"16.5.0": {}}})),
        );
        let depot = h.depot(npm_repos());

        let metadata = depot.package_metadata(STORAGE, "first", "react").await.unwrap();
        assert_eq!(metadata.versions, vec!["16.5.0"]);
        let entry = h
            .entries
            .find(&h.key("first"), "react/react/16.5.0/react-16.5.0.tgz")
            .unwrap()
            .unwrap();
        assert!(!entry.cached);

        for repository in ["npm-hosted", "npm-group"] {
            let err = depot.package_metadata(STORAGE, repository, "react").await.unwrap_err();
            assert!(matches!(err, ResolutionError::UnsupportedOperation { .. }), "got {err:?}");
            assert_eq!(err.status_code(), 405);
        }
    }

    #[tokio::test]
    async fn group_cycle_is_reported_per_request() {
        let h = Harness::new();
        let depot = h.depot(vec![
            Repository::group(STORAGE, "a", Layout::Npm, &["b"]),
            Repository::group(STORAGE, "b", Layout::Npm, &["a"]),
            Repository::hosted(STORAGE, "plain", Layout::Npm),
        ]);

        let err = depot.resolve(STORAGE, "a", &compression()).await.unwrap_err();
        match err {
            ResolutionError::ConfigurationCycle { chain } => {
                let ids: Vec<_> = chain.iter().map(|k| k.repository_id.as_str()).collect();
                assert_eq!(ids, vec!["a", "b", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(matches!(
            depot.search(STORAGE, "a", "x", 10).await,
            Err(ResolutionError::ConfigurationCycle { .. })
        ));

        // Unrelated repositories keep working.
        assert!(matches!(
            depot.resolve(STORAGE, "plain", &compression()).await,
            Err(ResolutionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn diamond_is_not_a_cycle() {
        let h = Harness::new();
        let depot = h.depot(vec![
            Repository::hosted(STORAGE, "shared", Layout::Npm),
            Repository::group(STORAGE, "left", Layout::Npm, &["shared"]),
            Repository::group(STORAGE, "right", Layout::Npm, &["shared"]),
            Repository::group(STORAGE, "top", Layout::Npm, &["left", "right"]),
        ]);

        let err = depot.resolve(STORAGE, "top", &compression()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { .. }), "got {err:?}");

        depot.deploy(STORAGE, "shared", TARBALL, b"tgz").await.unwrap();
        let entry = depot.resolve(STORAGE, "top", &compression()).await.unwrap();
        assert_eq!(entry.origin_repository_id.as_deref(), Some("shared"));
    }

    #[tokio::test]
    async fn group_search_deduplicates_by_priority() {
        let h = Harness::new();
        let search_url = depot_remote::search::search_url(FIRST, Layout::Npm, "reston", 10).unwrap();
        h.stub.set(
            &search_url,
            StubResponse::json(&serde_json::json!({
                "objects": [
                    {"package": {"name": "reston", "version": "0.2.0"}},
                    {"package": {"name": "reston-cli", "version": "1.0.0"}}
                ]
            })),
        );
        let depot = h.depot(npm_repos());
        depot
            .deploy(STORAGE, "npm-hosted", "reston/-/reston-0.2.0.tgz", b"tgz")
            .await
            .unwrap();

        let hits = depot.search(STORAGE, "npm-group", "reston", 10).await.unwrap();
        let got: Vec<_> = hits
            .iter()
            .map(|r| (r.repository_id.as_str(), r.display_name.as_str(), r.cached))
            .collect();
        assert_eq!(
            got,
            vec![("npm-hosted", "reston", true), ("first", "reston-cli", false)]
        );
    }

    #[tokio::test]
    async fn resolve_path_parses_with_repository_layout() {
        let h = Harness::new();
        h.stub.set(&format!("{FIRST}/{TARBALL}"), StubResponse::ok(b"first".to_vec()));
        let depot = h.depot(npm_repos());

        let entry = depot.resolve_path(STORAGE, "first", TARBALL).await.unwrap();
        assert_eq!(entry.path(), "compression/compression/1.7.2/compression-1.7.2.tgz");

        let err = depot
            .resolve_path(STORAGE, "first", "compression/-/")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedCoordinate { .. }));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn deploy_requires_hosted_repository() {
        let h = Harness::new();
        let depot = h.depot(npm_repos());
        let err = depot.deploy(STORAGE, "first", TARBALL, b"x").await.unwrap_err();
        assert!(matches!(err, ResolutionError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn open_reads_published_bytes() {
        let h = Harness::new();
        h.stub.set(&format!("{FIRST}/{TARBALL}"), StubResponse::ok(b"tarball".to_vec()));
        let depot = h.depot(npm_repos());

        let entry = depot.resolve(STORAGE, "npm-group", &compression()).await.unwrap();
        let mut file = depot.open(&entry).await.unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"tarball");

        let uncached = ArtifactEntry::remote(&h.key("first"), Coordinate::npm(None, "other", "1.0.0").unwrap());
        assert!(matches!(depot.open(&uncached).await, Err(ResolutionError::NotFound { .. })));
    }

    #[tokio::test]
    async fn verify_detects_tampering() {
        let h = Harness::new();
        let depot = h.depot(npm_repos());
        depot.deploy(STORAGE, "npm-hosted", TARBALL, b"tgz").await.unwrap();
        assert!(depot.verify(STORAGE, "npm-hosted", TARBALL).await.unwrap());

        let blob = h
            .dir
            .path()
            .join("storage0/npm-hosted/compression/compression/1.7.2/compression-1.7.2.tgz");
        std::fs::write(&blob, b"tampered").unwrap();
        assert!(!depot.verify(STORAGE, "npm-hosted", TARBALL).await.unwrap());

        std::fs::remove_file(&blob).unwrap();
        assert!(!depot.verify(STORAGE, "npm-hosted", TARBALL).await.unwrap());

        assert!(matches!(
            depot.verify(STORAGE, "first", TARBALL).await,
            Err(ResolutionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn resolvers_are_cached() {
        let h = Harness::new();
        let depot = h.depot(npm_repos());
        let a = depot.resolver(&h.key("first")).unwrap();
        let b = depot.resolver(&h.key("first")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.layout(), Layout::Npm);
    }
}
