// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP transport used by [`ResilientServiceClient`](super::ResilientServiceClient).
//!
//! The client talks to the network only through [`HttpTransport`], so tests
//! can substitute a fake (see [`crate::testkit::MockTransport`]) and count
//! exactly how many requests reached the "network".

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

use crate::error::{CallError, CarParkError, Result};

/// A fully-formed outbound GET request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Target URL, query parameters included.
    pub url: String,
    /// Extra headers (e.g. `Authorization`).
    pub headers: HeaderMap,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Create a GET request with no extra headers.
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: HeaderMap::new(),
            timeout,
        }
    }
}

/// Raw response returned by a transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Create a response.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true if the status indicates success (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Failure reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request exceeded its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request was sent but no usable response came back.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<TransportError> for CallError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(timeout) => CallError::Timeout(timeout),
            other => CallError::unclassified_from(other.to_string(), other),
        }
    }
}

/// Performs outbound GET requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a GET request and return the raw response.
    async fn get(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a pooled `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns `CarParkError::Transport` if the client cannot be built
    /// (e.g. the TLS backend fails to initialize).
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| CarParkError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn get(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let timeout = request.timeout;
        let response = self
            .client
            .get(&request.url)
            .headers(request.headers)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| classify(e, timeout))?;

        Ok(HttpResponse { status, body })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::InvalidResponse(err.to_string())
    }
}
