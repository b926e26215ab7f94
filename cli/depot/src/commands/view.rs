//! `depot view`: show an npm package document from a proxy repository.

use anyhow::{Context, Result};

use depot_core::RepositoryKey;
use depot_remote::PackageMetadata;
use depot_resolve::Depot;

pub async fn run(depot: &Depot, key: &RepositoryKey, package: &str, versions_only: bool) -> Result<()> {
    let metadata = depot
        .package_metadata(&key.storage_id, &key.repository_id, package)
        .await
        .with_context(|| format!("viewing {package} in {key}"))?;
    println!("{}", render(&metadata, versions_only));
    Ok(())
}

/// The document as served, or one version per line.
fn render(metadata: &PackageMetadata, versions_only: bool) -> String {
    if versions_only {
        metadata.versions.join("\n")
    } else {
        String::from_utf8_lossy(&metadata.document).into_owned()
    }
}
