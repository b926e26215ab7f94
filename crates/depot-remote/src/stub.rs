//! In-memory [`HttpTransport`] for tests.
//!
//! Responses are registered per URL; unregistered URLs answer 404. Every
//! request is counted so tests can assert how often an upstream was hit.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};

use crate::transport::{HttpTransport, TransportError, TransportResponse};

/// A canned upstream response.
#[derive(Debug, Clone)]
pub struct StubResponse {
    status: u16,
    headers: HashMap<String, String>,
    chunks: Vec<Vec<u8>>,
    delay: Option<Duration>,
    fail_after_body: bool,
    unreachable: bool,
}

impl StubResponse {
    pub fn status(status: u16) -> Self {
        StubResponse {
            status,
            headers: HashMap::new(),
            chunks: Vec::new(),
            delay: None,
            fail_after_body: false,
            unreachable: false,
        }
    }

    pub fn ok(body: Vec<u8>) -> Self {
        Self::ok_chunked(vec![body])
    }

    pub fn ok_chunked(chunks: Vec<Vec<u8>>) -> Self {
        StubResponse {
            chunks,
            ..Self::status(200)
        }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self::ok(value.to_string().into_bytes()).header("content-type", "application/json")
    }

    /// A connection failure: no status at all.
    pub fn unreachable() -> Self {
        StubResponse {
            unreachable: true,
            ..Self::status(0)
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Wait before answering.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Break the connection after the body chunks were sent.
    pub fn fail_after_body(mut self) -> Self {
        self.fail_after_body = true;
        self
    }
}

/// Transport answering from a fixed table of responses.
#[derive(Debug, Default)]
pub struct StubTransport {
    responses: DashMap<String, StubResponse>,
    calls: DashMap<String, usize>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the response for `url`.
    pub fn with(self, url: &str, response: StubResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    /// Replace the response for `url` on a shared transport.
    pub fn set(&self, url: &str, response: StubResponse) {
        self.responses.insert(url.to_string(), response);
    }

    /// Requests made for `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.calls.get(url).map(|c| *c).unwrap_or(0)
    }

    /// Requests made for any URL.
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| *c.value()).sum()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn get(&self, url: &str, _headers: &[(&str, &str)]) -> Result<TransportResponse, TransportError> {
        *self.calls.entry(url.to_string()).or_insert(0) += 1;
        let response = self
            .responses
            .get(url)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| StubResponse::status(404));

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        if response.unreachable {
            return Err(TransportError::new(format!("connection refused: {url}")));
        }

        let mut items: Vec<Result<Vec<u8>, TransportError>> = response.chunks.into_iter().map(Ok).collect();
        if response.fail_after_body {
            items.push(Err(TransportError::new("connection reset")));
        }

        Ok(TransportResponse {
            status: response.status,
            headers: response.headers,
            body: stream::iter(items).boxed(),
        })
    }
}
