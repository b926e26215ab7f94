//! CLI command implementations.

pub mod deploy;
pub mod init;
pub mod repos;
pub mod resolve;
pub mod search;
pub mod verify;
pub mod view;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use depot_remote::{RemoteFetcher, ReqwestTransport};
use depot_resolve::{Depot, DepotOptions, StaticRepositories};
use depot_store::{ContentStore, FileEntryStore};

use crate::config::DepotConfig;

/// Build the engine described by `config`.
///
/// Blobs go under `<root>/content`, entry records under `<root>/entries`.
pub fn open_depot(config: &DepotConfig, base_dir: &Path) -> Result<Depot> {
    let root = config.storage_root(base_dir);
    let transport = ReqwestTransport::new(&config.remote.transport()).context("creating HTTP client")?;
    let fetcher = RemoteFetcher::new(
        Arc::new(transport),
        ContentStore::new(root.join("content")),
        config.remote.retry(),
    );
    let repositories = StaticRepositories::new(config.repositories.iter().cloned());
    let depot = Depot::new(
        Arc::new(repositories),
        Arc::new(FileEntryStore::new(root.join("entries"))),
        fetcher,
    )
    .with_options(DepotOptions {
        verify_on_hit: config.storage.verify_on_hit,
    });
    Ok(depot)
}
