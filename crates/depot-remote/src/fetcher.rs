//! Single-artifact upstream fetch.

use std::sync::Arc;

use futures_util::StreamExt;

use depot_core::{Checksum, Coordinate, Layout, RepositoryKey};
use depot_store::{ContentStore, StoreError};

use crate::error::FetchError;
use crate::package::{self, PackageMetadata};
use crate::retry::RetryPolicy;
use crate::search::{self, RemotePackage};
use crate::transport::HttpTransport;

/// Response header carrying the upstream's SHA-256 of the artifact.
pub const CHECKSUM_HEADER: &str = "x-checksum-sha256";

/// An artifact downloaded and published into the content store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub url: String,
    pub checksum: Checksum,
    pub size: u64,
}

/// Downloads artifacts from upstream registries into a content store.
#[derive(Clone)]
pub struct RemoteFetcher {
    transport: Arc<dyn HttpTransport>,
    content: ContentStore,
    retry: RetryPolicy,
}

impl std::fmt::Debug for RemoteFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFetcher")
            .field("content", &self.content)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Join an upstream base URL and a relative path.
pub fn artifact_url(base: &str, remote_path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), remote_path.trim_start_matches('/'))
}

impl RemoteFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, content: ContentStore, retry: RetryPolicy) -> Self {
        RemoteFetcher {
            transport,
            content,
            retry,
        }
    }

    /// The content store downloads are published into.
    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Fetch `coordinate` from the upstream at `base_url` and publish it
    /// under `key` in the content store.
    ///
    /// Transient failures are retried according to the retry policy. On
    /// success the artifact is already committed.
    pub async fn fetch(
        &self,
        base_url: &str,
        key: &RepositoryKey,
        coordinate: &Coordinate,
    ) -> Result<FetchedArtifact, FetchError> {
        let url = artifact_url(base_url, coordinate.remote_path());
        let url = url.as_str();
        self.retry
            .run(|| self.fetch_once(url, key, coordinate))
            .await
    }

    async fn fetch_once(
        &self,
        url: &str,
        key: &RepositoryKey,
        coordinate: &Coordinate,
    ) -> Result<FetchedArtifact, FetchError> {
        tracing::info!(%key, %url, "fetching from upstream");
        let response = self
            .transport
            .get(url, &[])
            .await
            .map_err(|e| FetchError::from_transport(url, e))?;

        match response.status {
            200..=299 => {}
            404 | 410 => {
                return Err(FetchError::RemoteNotFound {
                    url: url.to_string(),
                })
            }
            status => {
                return Err(FetchError::unavailable(
                    url,
                    Some(status),
                    format!("upstream answered HTTP {status}"),
                ))
            }
        }

        let expected = response.header(CHECKSUM_HEADER).and_then(Checksum::parse);
        let storage = |e: StoreError| FetchError::Storage {
            url: url.to_string(),
            detail: e.to_string(),
        };

        // The handle removes the staged file if we bail out below.
        let mut handle = self
            .content
            .begin_write(key, coordinate.path())
            .await
            .map_err(storage)?;
        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_transport(url, e))?;
            handle.write(&chunk).await.map_err(storage)?;
        }

        let published = handle.commit(expected.as_ref()).await.map_err(|e| match e {
            StoreError::ChecksumMismatch {
                expected, actual, ..
            } => FetchError::ChecksumMismatch {
                url: url.to_string(),
                expected,
                actual,
            },
            other => storage(other),
        })?;

        tracing::info!(%key, %url, checksum = %published.checksum, size = published.size, "cached upstream artifact");
        Ok(FetchedArtifact {
            url: url.to_string(),
            checksum: published.checksum,
            size: published.size,
        })
    }

    /// Query the upstream's search API.
    ///
    /// Layouts without a search API and upstreams that do not serve one
    /// yield an empty list. Results are returned in upstream order with
    /// upstream casing.
    pub async fn search(
        &self,
        base_url: &str,
        layout: Layout,
        query: &str,
        size: usize,
    ) -> Result<Vec<RemotePackage>, FetchError> {
        let Some(url) = search::search_url(base_url, layout, query, size) else {
            return Ok(Vec::new());
        };
        let url = url.as_str();
        let transport = &self.transport;

        self.retry
            .run(|| async move {
                tracing::debug!(%url, "searching upstream");
                let response = transport
                    .get(url, &[("accept", "application/json")])
                    .await
                    .map_err(|e| FetchError::from_transport(url, e))?;

                match response.status {
                    200..=299 => {}
                    404 | 405 | 501 => return Ok(Vec::new()),
                    status => {
                        return Err(FetchError::unavailable(
                            url,
                            Some(status),
                            format!("search answered HTTP {status}"),
                        ))
                    }
                }

                let body = response
                    .collect_body()
                    .await
                    .map_err(|e| FetchError::from_transport(url, e))?;
                search::parse_response(layout, &body)
                    .map_err(|e| FetchError::unavailable(url, None, format!("malformed search response: {e}")))
            })
            .await
    }

    /// Fetch the npm package document for `package_name`.
    pub async fn package_metadata(&self, base_url: &str, package_name: &str) -> Result<PackageMetadata, FetchError> {
        let url = package::package_url(base_url, package_name);
        let url = url.as_str();
        let transport = &self.transport;

        self.retry
            .run(|| async move {
                tracing::debug!(%url, "fetching package document");
                let response = transport
                    .get(url, &[("accept", "application/json")])
                    .await
                    .map_err(|e| FetchError::from_transport(url, e))?;

                match response.status {
                    200..=299 => {}
                    404 | 410 => {
                        return Err(FetchError::RemoteNotFound {
                            url: url.to_string(),
                        })
                    }
                    status => {
                        return Err(FetchError::unavailable(
                            url,
                            Some(status),
                            format!("upstream answered HTTP {status}"),
                        ))
                    }
                }

                let body = response
                    .collect_body()
                    .await
                    .map_err(|e| FetchError::from_transport(url, e))?;
                package::parse_document(body)
                    .map_err(|e| FetchError::unavailable(url, None, format!("malformed package document: {e}")))
            })
            .await
    }
}
