//! Search result merging.

use std::collections::HashSet;

use depot_core::{ArtifactEntry, SearchResult};

/// Drop results whose coordinate was already seen, keeping the first.
///
/// Input order is priority order, so the highest-priority repository's
/// result survives.
pub fn dedup_by_coordinate(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.coordinate.path().to_string()))
        .collect()
}

/// A search hit for an artifact the repository holds a record of.
pub(crate) fn result_from_entry(entry: ArtifactEntry) -> SearchResult {
    SearchResult {
        display_name: entry.coordinate.name().to_string(),
        repository_id: entry.repository_id,
        coordinate: entry.coordinate,
        description: None,
        cached: entry.cached,
    }
}
