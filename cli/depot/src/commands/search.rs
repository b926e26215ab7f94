//! `depot search`: query a repository by name.

use anyhow::{Context, Result};

use depot_core::{RepositoryKey, SearchResult};
use depot_resolve::Depot;

pub async fn run(depot: &Depot, key: &RepositoryKey, query: &str, size: usize, json: bool) -> Result<()> {
    let results = depot
        .search(&key.storage_id, &key.repository_id, query, size)
        .await
        .with_context(|| format!("searching {key} for '{query}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results for '{query}' in {key}");
        return Ok(());
    }
    for result in &results {
        println!("{}", row(result));
    }
    Ok(())
}

fn row(result: &SearchResult) -> String {
    let version = result.coordinate.version().unwrap_or("-");
    let cached = if result.cached { "cached" } else { "remote" };
    let mut line = format!(
        "{:<40} {:<16} {:<24} {cached}",
        result.display_name, version, result.repository_id
    );
    if let Some(description) = &result.description {
        line.push_str("  ");
        line.push_str(description);
    }
    line
}
