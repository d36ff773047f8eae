// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory fakes for exercising clients and providers without a network.
//!
//! [`MockTransport`] replays scripted HTTP outcomes and counts how many
//! requests reached it, [`RecordingSink`] captures telemetry events and
//! [`RecordingLogger`] captures provider log lines.

use async_trait::async_trait;
use http::StatusCode;
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::client::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::runtime::{
    error_chain, LogContext, LogLevel, ProviderLogger, TelemetryEvent, TelemetrySink,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Scripted {
    Respond(HttpResponse, Option<Duration>),
    Fail(TransportError),
    Hang,
}

/// A transport that replays queued outcomes in order.
///
/// Once the queue is empty every request gets the fallback response, which
/// defaults to `200 {}`.
pub struct MockTransport {
    queue: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<HttpResponse>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(HttpResponse::new(StatusCode::OK, "{}")),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a `200` response carrying `body` serialized as JSON.
    pub fn respond_json(&self, body: serde_json::Value) -> &Self {
        self.respond(HttpResponse::new(StatusCode::OK, body.to_string()))
    }

    /// Queue a response with the given status and raw body.
    pub fn respond_status(&self, status: StatusCode, body: impl Into<bytes::Bytes>) -> &Self {
        self.respond(HttpResponse::new(status, body))
    }

    /// Queue an arbitrary response.
    pub fn respond(&self, response: HttpResponse) -> &Self {
        lock(&self.queue).push_back(Scripted::Respond(response, None));
        self
    }

    /// Queue a response that is only delivered after `delay`.
    pub fn respond_after(&self, delay: Duration, response: HttpResponse) -> &Self {
        lock(&self.queue).push_back(Scripted::Respond(response, Some(delay)));
        self
    }

    /// Queue a transport failure.
    pub fn fail_with(&self, error: TransportError) -> &Self {
        lock(&self.queue).push_back(Scripted::Fail(error));
        self
    }

    /// Queue a request that never completes.
    pub fn hang(&self) -> &Self {
        lock(&self.queue).push_back(Scripted::Hang);
        self
    }

    /// Replace the response used once the queue runs dry.
    pub fn set_fallback(&self, response: HttpResponse) {
        *lock(&self.fallback) = response;
    }

    /// Number of requests that reached the transport.
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        lock(&self.requests).push(request);

        let next = lock(&self.queue).pop_front();
        match next {
            Some(Scripted::Respond(response, None)) => Ok(response),
            Some(Scripted::Respond(response, Some(delay))) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang) => {
                std::future::pending::<()>().await;
                Err(TransportError::InvalidResponse("unreachable".into()))
            }
            None => Ok(lock(&self.fallback).clone()),
        }
    }
}

/// Telemetry sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        lock(&self.events).clone()
    }

    /// Events whose `status` field equals `status`.
    pub fn with_status(&self, status: &str) -> Vec<TelemetryEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.status() == Some(status))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&self, event: TelemetryEvent) {
        lock(&self.events).push(event);
    }
}

/// One captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub provider: String,
    pub dataset: String,
    pub message: String,
    /// Rendered error chain for lines logged with an error attached.
    pub error: Option<String>,
}

/// Provider logger that keeps every line in memory.
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        lock(&self.records).clone()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.records)
            .iter()
            .map(|r| r.message.clone())
            .collect()
    }

    fn push(&self, context: LogContext<'_>, message: &str, error: Option<String>) {
        lock(&self.records).push(LogRecord {
            level: LogLevel::Error,
            provider: context.provider.to_string(),
            dataset: context.dataset.to_string(),
            message: message.to_string(),
            error,
        });
    }
}

impl ProviderLogger for RecordingLogger {
    fn error(&self, context: LogContext<'_>, message: &str) {
        self.push(context, message, None);
    }

    fn exception(&self, context: LogContext<'_>, message: &str, error: &(dyn StdError + 'static)) {
        self.push(context, message, Some(error_chain(error)));
    }
}
