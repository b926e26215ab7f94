//! `depot verify`: re-check a cached artifact's integrity.

use anyhow::{bail, Context, Result};

use depot_core::RepositoryKey;
use depot_resolve::Depot;

pub async fn run(depot: &Depot, key: &RepositoryKey, path: &str) -> Result<()> {
    let intact = depot
        .verify(&key.storage_id, &key.repository_id, path)
        .await
        .with_context(|| format!("verifying {path} in {key}"))?;
    if !intact {
        bail!("{path} in {key} does not match its recorded checksum");
    }
    println!("{path} in {key}: OK");
    Ok(())
}
