//! `depot resolve`: fetch-through resolution of one artifact.

use std::path::Path;

use anyhow::{Context, Result};

use depot_core::{ArtifactEntry, RepositoryKey};
use depot_resolve::Depot;

pub async fn run(
    depot: &Depot,
    key: &RepositoryKey,
    path: &str,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let entry = depot
        .resolve_path(&key.storage_id, &key.repository_id, path)
        .await
        .with_context(|| format!("resolving {path} in {key}"))?;

    if let Some(output) = output {
        let mut source = depot.open(&entry).await?;
        let mut target = tokio::fs::File::create(output)
            .await
            .with_context(|| format!("creating {}", output.display()))?;
        let copied = tokio::io::copy(&mut source, &mut target)
            .await
            .with_context(|| format!("writing {}", output.display()))?;
        tracing::debug!(bytes = copied, output = %output.display(), "copied artifact");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("{}", summary(&entry));
    }
    Ok(())
}

fn summary(entry: &ArtifactEntry) -> String {
    let mut lines = vec![
        format!("Artifact:   {}", entry.path()),
        format!("Repository: {}", entry.repository_key()),
    ];
    if let Some(origin) = &entry.origin_repository_id {
        lines.push(format!("Origin:     {origin}"));
    }
    if let Some(checksum) = &entry.checksum {
        lines.push(format!("SHA-256:    {checksum}"));
    }
    if let Some(size) = entry.size_bytes {
        lines.push(format!("Size:       {size} bytes"));
    }
    lines.push(format!("Updated:    {}", entry.last_updated.to_rfc3339()));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{Checksum, Coordinate, Layout};

    #[test]
    fn summary_lists_integrity_fields() {
        let key = RepositoryKey::new("s", "npm-proxy");
        let coord = Coordinate::parse(Layout::Npm, "compression/-/compression-1.7.2.tgz").unwrap();
        let mut entry = ArtifactEntry::cached(&key, coord, Checksum::compute(b"tgz"), 3);
        entry.origin_repository_id = Some("npm-proxy".into());

        let text = summary(&entry);
        assert!(text.contains("compression/compression/1.7.2/compression-1.7.2.tgz"));
        assert!(text.contains("Origin:     npm-proxy"));
        assert!(text.contains(Checksum::compute(b"tgz").as_str()));
        assert!(text.contains("3 bytes"));
    }
}
