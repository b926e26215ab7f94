//! HTTP transport abstraction.
//!
//! The fetcher needs very little from HTTP: a GET with request headers, the
//! response status and headers, and the body as a stream of chunks.
//! [`ReqwestTransport`] provides it over `reqwest` with connect and read
//! timeouts; tests substitute an in-memory transport.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};

/// Response body as a stream of byte chunks.
pub type BodyStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Transport-level failure: nothing usable came back from the upstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{detail}")]
pub struct TransportError {
    pub detail: String,
    /// Whether the failure was a connect or read timeout.
    pub timeout: bool,
}

impl TransportError {
    pub fn new(detail: impl Into<String>) -> Self {
        TransportError {
            detail: detail.into(),
            timeout: false,
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        TransportError {
            detail: detail.into(),
            timeout: true,
        }
    }
}

/// A streaming HTTP response.
pub struct TransportResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: BodyStream,
}

impl TransportResponse {
    /// Look up a header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Drain the body into memory.
    pub async fn collect_body(self) -> Result<Vec<u8>, TransportError> {
        let mut body = self.body;
        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Streaming GET against an upstream registry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<TransportResponse, TransportError>;
}

/// Timeouts and identification for outbound requests.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Maximum wait for response headers and for each body chunk.
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            user_agent: concat!("depot/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    read_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::new(format!("building HTTP client: {e}")))?;
        Ok(ReqwestTransport {
            client,
            read_timeout: config.read_timeout,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(err.to_string())
    } else {
        TransportError::new(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = tokio::time::timeout(self.read_timeout, request.send())
            .await
            .map_err(|_| TransportError::timeout(format!("no response from {url} within {:?}", self.read_timeout)))?
            .map_err(classify)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let read_timeout = self.read_timeout;
        let chunks = response.bytes_stream().boxed();
        let body = futures_util::stream::unfold(Some(chunks), move |state| async move {
            let mut chunks = match state {
                Some(chunks) => chunks,
                None => return None,
            };
            match tokio::time::timeout(read_timeout, chunks.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk.to_vec()), Some(chunks))),
                Ok(Some(Err(e))) => Some((Err(classify(e)), None)),
                Ok(None) => None,
                Err(_) => Some((
                    Err(TransportError::timeout(format!("body read stalled for {read_timeout:?}"))),
                    None,
                )),
            }
        })
        .boxed();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
