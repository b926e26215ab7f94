//! Shared fixtures for resolver tests.

use std::sync::Arc;
use std::time::Duration;

use depot_core::{Layout, Repository, RepositoryKey};
use depot_remote::stub::StubTransport;
use depot_remote::{RemoteFetcher, RetryPolicy};
use depot_store::{ContentStore, MemoryEntryStore};

use crate::depot::Depot;
use crate::provider::StaticRepositories;
use crate::proxy::{FetchFlights, ProxyResolver};

pub(crate) const UPSTREAM: &str = "http://upstream.test";
pub(crate) const STORAGE: &str = "storage0";

pub(crate) struct Harness {
    pub dir: tempfile::TempDir,
    pub stub: Arc<StubTransport>,
    pub entries: Arc<MemoryEntryStore>,
    pub fetcher: RemoteFetcher,
    pub flights: FetchFlights,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubTransport::new());
        let fetcher = RemoteFetcher::new(
            stub.clone(),
            ContentStore::new(dir.path()),
            RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
            },
        );
        Harness {
            dir,
            stub,
            entries: Arc::new(MemoryEntryStore::new()),
            fetcher,
            flights: FetchFlights::new(),
        }
    }

    pub fn key(&self, id: &str) -> RepositoryKey {
        RepositoryKey::new(STORAGE, id)
    }

    /// An npm proxy of [`UPSTREAM`].
    pub fn proxy(&self, id: &str) -> ProxyResolver {
        ProxyResolver::new(
            self.key(id),
            Layout::Npm,
            UPSTREAM,
            self.entries.clone(),
            self.fetcher.clone(),
            self.flights.clone(),
        )
    }

    pub fn depot(&self, repositories: Vec<Repository>) -> Depot {
        Depot::new(
            Arc::new(StaticRepositories::new(repositories)),
            self.entries.clone(),
            self.fetcher.clone(),
        )
    }
}
