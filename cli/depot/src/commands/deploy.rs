//! `depot deploy`: upload a file into a hosted repository.

use std::path::Path;

use anyhow::{Context, Result};

use depot_core::RepositoryKey;
use depot_resolve::Depot;

pub async fn run(depot: &Depot, key: &RepositoryKey, path: &str, file: &Path) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let entry = depot
        .deploy(&key.storage_id, &key.repository_id, path, &data)
        .await
        .with_context(|| format!("deploying {path} to {key}"))?;

    let checksum = entry.checksum.as_ref().map(|c| c.to_string()).unwrap_or_default();
    println!("Deployed {} to {key} ({} bytes, sha256 {checksum})", entry.path(), data.len());
    Ok(())
}
