// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracing spans for outbound availability requests.
//!
//! Every call made by a [`ResilientServiceClient`](crate::ResilientServiceClient)
//! runs inside a `carpark.http` span carrying the provider, dataset and target
//! URL. The outcome and duration are recorded on the span when the call ends.
//!
//! Spans follow OpenTelemetry HTTP semantic conventions where they apply:
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `http.request.method` | Always "GET" |
//! | `url.full` | Request URL |
//! | `parking.provider` | Provider name |
//! | `parking.dataset` | Dataset identifier |
//! | `parking.outcome` | `ok`, `circuit_open`, `timeout` or `error` |
//!
//! The library only depends on `tracing`; exporting spans is left to the
//! application's subscriber.

use std::time::{Duration, Instant};
use tracing::{field, info_span, Span};

/// A span for a single remote availability call.
#[derive(Debug)]
pub struct CallSpan {
    span: Span,
    start: Instant,
    provider: String,
}

impl CallSpan {
    /// Create a new span for a call to `url` made on behalf of `provider`.
    pub fn new(provider: &str, dataset: &str, url: &str) -> Self {
        let span = info_span!(
            "carpark.http",
            http.request.method = "GET",
            url.full = %url,
            parking.provider = %provider,
            parking.dataset = %dataset,
            parking.outcome = field::Empty,
            otel.status_code = field::Empty,
            error.message = field::Empty,
            duration_ms = field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            provider: provider.to_string(),
        }
    }

    /// Get the underlying `tracing::Span`.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Get the provider name.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Get elapsed time since span creation.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record a successful response.
    pub fn record_success(&self) {
        self.span.record("parking.outcome", "ok");
        self.span.record("otel.status_code", "OK");
        self.span
            .record("duration_ms", self.start.elapsed().as_millis() as i64);
    }

    /// Record a failed call with its classification.
    pub fn record_error(&self, outcome: &str, error: &str) {
        self.span.record("parking.outcome", outcome);
        self.span.record("otel.status_code", "ERROR");
        self.span.record("error.message", error);
        self.span
            .record("duration_ms", self.start.elapsed().as_millis() as i64);
    }
}
