//! Group repositories: ordered fallback over member repositories.
//!
//! Members are referenced by key and resolved through a [`Members`]
//! implementation (the engine) on every request, so a member may itself be
//! a group. Resolution walks members in order and stops at the first
//! success; search asks all members at once and merges in member order.

use async_trait::async_trait;
use futures_util::future::join_all;

use depot_core::{ArtifactEntry, Coordinate, Layout, RepositoryKey, SearchResult};

use crate::error::{ResolutionError, Result};
use crate::path::ResolutionPath;
use crate::search::dedup_by_coordinate;

/// Resolves group members by key.
#[async_trait]
pub trait Members: Send + Sync {
    async fn resolve_member(
        &self,
        member: &RepositoryKey,
        coordinate: &Coordinate,
        path: &ResolutionPath,
    ) -> Result<ArtifactEntry>;

    async fn search_member(
        &self,
        member: &RepositoryKey,
        query: &str,
        size: usize,
        path: &ResolutionPath,
    ) -> Result<Vec<SearchResult>>;
}

/// Serves a group of member repositories.
#[derive(Debug, Clone)]
pub struct GroupResolver {
    key: RepositoryKey,
    layout: Layout,
    members: Vec<RepositoryKey>,
}

impl GroupResolver {
    pub fn new(key: RepositoryKey, layout: Layout, members: Vec<RepositoryKey>) -> Self {
        GroupResolver { key, layout, members }
    }

    pub fn key(&self) -> &RepositoryKey {
        &self.key
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Member keys, highest priority first.
    pub fn members(&self) -> &[RepositoryKey] {
        &self.members
    }

    /// Resolve through the members in order; the first success wins.
    ///
    /// The returned entry is the member's own, with `origin_repository_id`
    /// naming the member that materialised it (nested groups keep the
    /// innermost one). If every member fails, the result is `NotFound` when
    /// all of them reported `NotFound` and `UpstreamUnavailable` otherwise;
    /// a member's checksum mismatch counts as unavailable and the next
    /// member is tried.
    pub async fn resolve(
        &self,
        members: &dyn Members,
        coordinate: &Coordinate,
        path: &ResolutionPath,
    ) -> Result<ArtifactEntry> {
        let mut failures = Vec::new();
        for member in &self.members {
            match members.resolve_member(member, coordinate, path).await {
                Ok(mut entry) => {
                    if entry.origin_repository_id.is_none() {
                        entry.origin_repository_id = Some(member.repository_id.clone());
                    }
                    tracing::debug!(
                        group = %self.key,
                        %member,
                        path = coordinate.path(),
                        "resolved via member"
                    );
                    return Ok(entry);
                }
                Err(ResolutionError::NotFound { .. }) => continue,
                Err(e) if e.is_configuration_error() => return Err(e),
                Err(e) => {
                    tracing::warn!(group = %self.key, %member, path = coordinate.path(), "member failed: {e}");
                    failures.push(format!("{member}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            Err(ResolutionError::NotFound {
                repository: self.key.clone(),
                path: coordinate.path().to_string(),
            })
        } else {
            Err(ResolutionError::UpstreamUnavailable {
                repository: self.key.clone(),
                detail: failures.join("; "),
            })
        }
    }

    /// Search all members concurrently and merge the results.
    ///
    /// Results are concatenated in member order, de-duplicated by
    /// coordinate (first occurrence wins) and truncated to `size`. Failing
    /// members are skipped; the search fails only if every member failed.
    pub async fn search(
        &self,
        members: &dyn Members,
        query: &str,
        size: usize,
        path: &ResolutionPath,
    ) -> Result<Vec<SearchResult>> {
        let outcomes = join_all(
            self.members
                .iter()
                .map(|member| members.search_member(member, query, size, path)),
        )
        .await;

        let mut merged = Vec::new();
        let mut failures = Vec::new();
        for (member, outcome) in self.members.iter().zip(outcomes) {
            match outcome {
                Ok(results) => merged.extend(results),
                Err(e) if e.is_configuration_error() => return Err(e),
                Err(e) => {
                    tracing::warn!(group = %self.key, %member, query, "skipping member in search: {e}");
                    failures.push(format!("{member}: {e}"));
                }
            }
        }

        if !self.members.is_empty() && failures.len() == self.members.len() {
            return Err(ResolutionError::UpstreamUnavailable {
                repository: self.key.clone(),
                detail: failures.join("; "),
            });
        }

        let mut merged = dedup_by_coordinate(merged);
        merged.truncate(size);
        Ok(merged)
    }
}
