// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime utilities for resilience and observability.
//!
//! This module provides the circuit breaker guarding remote calls, the
//! logging and telemetry seams every client reports through, and the
//! metrics collector and tracing spans built on top of them.

mod circuit_breaker;
mod logging;
pub mod metrics;
mod telemetry;
pub mod tracing;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, DEFAULT_FAIL_MAX, DEFAULT_RESET_TIMEOUT,
};
pub use logging::{
    error_chain, LogContext, LogLevel, LoggingConfig, ProviderLogger, TracingLogger,
};
pub use metrics::{MetricsCollector, MetricsConfig, MetricsSnapshot};
pub use telemetry::{
    FanoutSink, TelemetryEvent, TelemetrySink, TracingTelemetrySink, PARKING_SERVICE_EVENT,
    STATUS_FAILURE, STATUS_OK,
};
