// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured telemetry events emitted for every remote call.
//!
//! A [`TelemetrySink`] receives one [`TelemetryEvent`] per call outcome. Sinks
//! are synchronous and must not block: they are invoked on the caller's task
//! right after the remote call completes.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Event name shared by every call outcome.
pub const PARKING_SERVICE_EVENT: &str = "parking_service";

/// Status recorded for a successful call.
pub const STATUS_OK: &str = "OK";

/// Status recorded for a failed call.
pub const STATUS_FAILURE: &str = "failure";

/// A single structured telemetry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryEvent {
    /// Event name, e.g. `parking_service`.
    pub name: String,
    /// Event fields, fixed ones merged with caller extras.
    pub fields: BTreeMap<String, String>,
}

impl TelemetryEvent {
    /// Create an event with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add or replace a field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Read a field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// The `status` field, if any.
    pub fn status(&self) -> Option<&str> {
        self.field("status")
    }
}

/// Destination for telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Record an event. Must return promptly and never fail the caller.
    fn record(&self, event: TelemetryEvent);
}

/// Default sink writing each event as a structured `tracing` line.
#[derive(Debug, Clone, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record(&self, event: TelemetryEvent) {
        let fields = serde_json::to_string(&event.fields).unwrap_or_default();
        info!(target: "carpark::telemetry", event = %event.name, %fields, "telemetry event");
    }
}

/// Forwards every event to several sinks.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    /// Create an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a downstream sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of downstream sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// True when no sink is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TelemetrySink for FanoutSink {
    fn record(&self, event: TelemetryEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::RecordingSink;

    #[test]
    fn test_event_builder() {
        let event = TelemetryEvent::new(PARKING_SERVICE_EVENT)
            .with_field("parking_service", "Acme")
            .with_field("status", STATUS_OK);

        assert_eq!(event.name, "parking_service");
        assert_eq!(event.field("parking_service"), Some("Acme"));
        assert_eq!(event.status(), Some("OK"));
        assert_eq!(event.field("missing"), None);
    }

    #[test]
    fn test_event_serializes_fields_in_order() {
        let event = TelemetryEvent::new("parking_service")
            .with_field("status", "failure")
            .with_field("dataset", "fr-idf");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "parking_service");
        assert_eq!(json["fields"]["dataset"], "fr-idf");
        assert_eq!(json["fields"]["status"], "failure");
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingTelemetrySink.record(TelemetryEvent::new("parking_service"));
    }

    #[test]
    fn test_fanout_sink() {
        let first = Arc::new(RecordingSink::new());
        let second = Arc::new(RecordingSink::new());
        let fanout = FanoutSink::new()
            .with_sink(first.clone())
            .with_sink(second.clone());

        assert_eq!(fanout.len(), 2);
        fanout.record(TelemetryEvent::new("parking_service").with_field("status", "OK"));

        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events()[0].status(), Some("OK"));
    }

    #[test]
    fn test_empty_fanout() {
        let fanout = FanoutSink::new();
        assert!(fanout.is_empty());
        fanout.record(TelemetryEvent::new("parking_service"));
    }
}
