// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus-compatible metrics for car park availability providers.
//!
//! [`MetricsCollector`] is a [`TelemetrySink`]: plug it into a client (alone or
//! through a [`FanoutSink`](super::FanoutSink)) and it counts every call
//! outcome per provider, dataset and status. Circuit breaker state can be
//! sampled with [`MetricsCollector::observe_breaker`].
//!
//! # Example
//!
//! ```rust
//! use carpark_client::runtime::{MetricsCollector, MetricsConfig, TelemetryEvent, TelemetrySink};
//!
//! let metrics = MetricsCollector::new(MetricsConfig::builder().namespace("parking").build());
//!
//! metrics.record(
//!     TelemetryEvent::new("parking_service")
//!         .with_field("parking_service", "Acme")
//!         .with_field("dataset", "fr-idf")
//!         .with_field("status", "OK"),
//! );
//!
//! assert_eq!(metrics.total_calls(), 1);
//! println!("{}", metrics.to_prometheus_text());
//! ```

use super::circuit_breaker::CircuitBreaker;
use super::telemetry::{TelemetryEvent, TelemetrySink, PARKING_SERVICE_EVENT, STATUS_FAILURE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Configuration for the metrics collector.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Metric namespace prefix (e.g., "carpark" -> "carpark_calls_total")
    pub namespace: String,
    /// Include dataset as a label
    pub dataset_label: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "carpark_client".to_string(),
            dataset_label: true,
        }
    }
}

impl MetricsConfig {
    /// Create a new builder for `MetricsConfig`.
    pub fn builder() -> MetricsConfigBuilder {
        MetricsConfigBuilder::default()
    }
}

/// Builder for `MetricsConfig`.
#[derive(Debug, Default)]
pub struct MetricsConfigBuilder {
    namespace: Option<String>,
    dataset_label: Option<bool>,
}

impl MetricsConfigBuilder {
    /// Set the metric namespace prefix.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Enable or disable dataset labels.
    pub fn dataset_label(mut self, enabled: bool) -> Self {
        self.dataset_label = Some(enabled);
        self
    }

    /// Build the `MetricsConfig`.
    pub fn build(self) -> MetricsConfig {
        let default = MetricsConfig::default();
        MetricsConfig {
            namespace: self.namespace.unwrap_or(default.namespace),
            dataset_label: self.dataset_label.unwrap_or(default.dataset_label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Labels {
    provider: String,
    dataset: Option<String>,
    status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FailureLabels {
    provider: String,
    reason: String,
}

#[derive(Debug, Default)]
struct BreakerGauges {
    state: AtomicU64,
    rejections: AtomicU64,
}

/// Thread-safe metrics collector fed by telemetry events.
#[derive(Debug)]
pub struct MetricsCollector {
    config: MetricsConfig,
    /// Counter: calls_total{provider, dataset, status}
    calls_total: RwLock<HashMap<Labels, AtomicU64>>,
    /// Counter: failures_total{provider, reason}
    failures_total: RwLock<HashMap<FailureLabels, AtomicU64>>,
    /// Gauges per breaker name
    breakers: RwLock<HashMap<String, BreakerGauges>>,
    /// Events that were not call outcomes
    ignored_events: AtomicU64,
    start_time: Instant,
}

fn bump<K>(map: &RwLock<HashMap<K, AtomicU64>>, key: K)
where
    K: std::hash::Hash + Eq,
{
    {
        let counters = map.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(counter) = counters.get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
    }
    let mut counters = map.write().unwrap_or_else(PoisonError::into_inner);
    counters
        .entry(key)
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
}

/// Escape a label value for the Prometheus text format.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl MetricsCollector {
    /// Create a new metrics collector with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            calls_total: RwLock::new(HashMap::new()),
            failures_total: RwLock::new(HashMap::new()),
            breakers: RwLock::new(HashMap::new()),
            ignored_events: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Create a new metrics collector with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MetricsConfig::default())
    }

    /// Sample the state and rejection count of a circuit breaker.
    pub fn observe_breaker(&self, breaker: &CircuitBreaker) {
        let state = breaker.state().as_gauge();
        let rejections = breaker.total_rejections();
        {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(gauges) = breakers.get(breaker.name()) {
                gauges.state.store(state, Ordering::Relaxed);
                gauges.rejections.store(rejections, Ordering::Relaxed);
                return;
            }
        }
        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        let gauges = breakers.entry(breaker.name().to_string()).or_default();
        gauges.state.store(state, Ordering::Relaxed);
        gauges.rejections.store(rejections, Ordering::Relaxed);
    }

    fn sum_calls(&self, filter: impl Fn(&Labels) -> bool) -> u64 {
        let counters = self.calls_total.read().unwrap_or_else(PoisonError::into_inner);
        counters
            .iter()
            .filter(|(labels, _)| filter(labels))
            .map(|(_, c)| c.load(Ordering::Relaxed))
            .sum()
    }

    /// Get the total number of recorded calls.
    pub fn total_calls(&self) -> u64 {
        self.sum_calls(|_| true)
    }

    /// Get the number of failed calls.
    pub fn failed_calls(&self) -> u64 {
        self.sum_calls(|labels| labels.status == STATUS_FAILURE)
    }

    /// Get the number of successful calls (any non-failure status).
    pub fn successful_calls(&self) -> u64 {
        self.sum_calls(|labels| labels.status != STATUS_FAILURE)
    }

    /// Get the number of calls recorded for one provider.
    pub fn provider_calls(&self, provider: &str) -> u64 {
        self.sum_calls(|labels| labels.provider == provider)
    }

    /// Get the number of failures recorded for a provider and reason.
    pub fn failures_by_reason(&self, provider: &str, reason: &str) -> u64 {
        let counters = self.failures_total.read().unwrap_or_else(PoisonError::into_inner);
        counters
            .iter()
            .filter(|(labels, _)| labels.provider == provider && labels.reason == reason)
            .map(|(_, c)| c.load(Ordering::Relaxed))
            .sum()
    }

    /// Get collector uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus_text(&self) -> String {
        let mut output = String::new();
        let ns = &self.config.namespace;

        output.push_str(&format!(
            "# HELP {ns}_calls_total Total number of availability calls\n"
        ));
        output.push_str(&format!("# TYPE {ns}_calls_total counter\n"));
        {
            let counters = self.calls_total.read().unwrap_or_else(PoisonError::into_inner);
            for (labels, count) in counters.iter() {
                let mut label_parts =
                    vec![format!("provider=\"{}\"", escape(&labels.provider))];
                if let Some(ref dataset) = labels.dataset {
                    label_parts.push(format!("dataset=\"{}\"", escape(dataset)));
                }
                label_parts.push(format!("status=\"{}\"", escape(&labels.status)));
                let label_str = label_parts.join(",");
                output.push_str(&format!(
                    "{ns}_calls_total{{{label_str}}} {}\n",
                    count.load(Ordering::Relaxed)
                ));
            }
        }
        output.push('\n');

        output.push_str(&format!(
            "# HELP {ns}_failures_total Failed calls by reason\n"
        ));
        output.push_str(&format!("# TYPE {ns}_failures_total counter\n"));
        {
            let counters = self.failures_total.read().unwrap_or_else(PoisonError::into_inner);
            for (labels, count) in counters.iter() {
                output.push_str(&format!(
                    "{ns}_failures_total{{provider=\"{}\",reason=\"{}\"}} {}\n",
                    escape(&labels.provider),
                    escape(&labels.reason),
                    count.load(Ordering::Relaxed)
                ));
            }
        }
        output.push('\n');

        output.push_str(&format!(
            "# HELP {ns}_circuit_breaker_state Circuit breaker state (0=closed, 1=half-open, 2=open)\n"
        ));
        output.push_str(&format!("# TYPE {ns}_circuit_breaker_state gauge\n"));
        {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            for (name, gauges) in breakers.iter() {
                output.push_str(&format!(
                    "{ns}_circuit_breaker_state{{breaker=\"{}\"}} {}\n",
                    escape(name),
                    gauges.state.load(Ordering::Relaxed)
                ));
            }
            output.push('\n');

            output.push_str(&format!(
                "# HELP {ns}_circuit_breaker_rejections_total Requests rejected by circuit breaker\n"
            ));
            output.push_str(&format!(
                "# TYPE {ns}_circuit_breaker_rejections_total counter\n"
            ));
            for (name, gauges) in breakers.iter() {
                output.push_str(&format!(
                    "{ns}_circuit_breaker_rejections_total{{breaker=\"{}\"}} {}\n",
                    escape(name),
                    gauges.rejections.load(Ordering::Relaxed)
                ));
            }
        }
        output.push('\n');

        output.push_str(&format!(
            "# HELP {ns}_uptime_seconds Collector uptime in seconds\n"
        ));
        output.push_str(&format!("# TYPE {ns}_uptime_seconds gauge\n"));
        output.push_str(&format!(
            "{ns}_uptime_seconds {}\n",
            self.uptime().as_secs_f64()
        ));

        output
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_calls: self.total_calls(),
            successful_calls: self.successful_calls(),
            failed_calls: self.failed_calls(),
            ignored_events: self.ignored_events.load(Ordering::Relaxed),
            uptime: self.uptime(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TelemetrySink for MetricsCollector {
    fn record(&self, event: TelemetryEvent) {
        if event.name != PARKING_SERVICE_EVENT {
            self.ignored_events.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let provider = event.field("parking_service").unwrap_or("unknown").to_string();
        let status = event.status().unwrap_or("unknown").to_string();

        if status == STATUS_FAILURE {
            let reason = event.field("reason").unwrap_or("error").to_string();
            bump(
                &self.failures_total,
                FailureLabels {
                    provider: provider.clone(),
                    reason,
                },
            );
        }

        let dataset = if self.config.dataset_label {
            event.field("dataset").map(str::to_string)
        } else {
            None
        };
        bump(
            &self.calls_total,
            Labels {
                provider,
                dataset,
                status,
            },
        );
    }
}

/// Snapshot of current metrics for programmatic access.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total recorded calls
    pub total_calls: u64,
    /// Calls with a non-failure status
    pub successful_calls: u64,
    /// Calls with status `failure`
    pub failed_calls: u64,
    /// Events with another name
    pub ignored_events: u64,
    /// Collector uptime
    pub uptime: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use crate::runtime::CircuitBreakerConfig;

    fn outcome(provider: &str, status: &str) -> TelemetryEvent {
        TelemetryEvent::new(PARKING_SERVICE_EVENT)
            .with_field("parking_service", provider)
            .with_field("dataset", "fr-idf")
            .with_field("status", status)
    }

    #[test]
    fn test_metrics_config_default() {
        let config = MetricsConfig::default();
        assert_eq!(config.namespace, "carpark_client");
        assert!(config.dataset_label);
    }

    #[test]
    fn test_metrics_config_builder() {
        let config = MetricsConfig::builder()
            .namespace("parking")
            .dataset_label(false)
            .build();

        assert_eq!(config.namespace, "parking");
        assert!(!config.dataset_label);
    }

    #[test]
    fn test_record_outcomes() {
        let metrics = MetricsCollector::with_defaults();
        metrics.record(outcome("Acme", "OK"));
        metrics.record(outcome("Acme", "OK"));
        metrics.record(outcome("Acme", "failure").with_field("reason", "timeout"));
        metrics.record(outcome("Other", "failure"));

        assert_eq!(metrics.total_calls(), 4);
        assert_eq!(metrics.successful_calls(), 2);
        assert_eq!(metrics.failed_calls(), 2);
        assert_eq!(metrics.provider_calls("Acme"), 3);
        assert_eq!(metrics.failures_by_reason("Acme", "timeout"), 1);
        assert_eq!(metrics.failures_by_reason("Other", "error"), 1);
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        let metrics = MetricsCollector::with_defaults();
        metrics.record(TelemetryEvent::new("something_else"));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_calls, 0);
        assert_eq!(snapshot.ignored_events, 1);
    }

    #[tokio::test]
    async fn test_observe_breaker() {
        let metrics = MetricsCollector::with_defaults();
        let breaker =
            CircuitBreaker::new(CircuitBreakerConfig::new().with_fail_max(1)).with_name("acme");

        metrics.observe_breaker(&breaker);
        assert!(metrics
            .to_prometheus_text()
            .contains("carpark_client_circuit_breaker_state{breaker=\"acme\"} 0"));

        let _ = breaker
            .call(|| async { Err::<(), _>(CallError::unclassified("down")) })
            .await;
        let _ = breaker.call(|| async { Ok::<_, CallError>(()) }).await;
        metrics.observe_breaker(&breaker);

        let output = metrics.to_prometheus_text();
        assert!(output.contains("carpark_client_circuit_breaker_state{breaker=\"acme\"} 2"));
        assert!(output
            .contains("carpark_client_circuit_breaker_rejections_total{breaker=\"acme\"} 1"));
    }

    #[test]
    fn test_prometheus_text_format() {
        let metrics = MetricsCollector::new(MetricsConfig {
            namespace: "test".to_string(),
            dataset_label: false,
        });
        metrics.record(outcome("Acme", "OK"));

        let output = metrics.to_prometheus_text();
        assert!(output.contains("# HELP test_calls_total"));
        assert!(output.contains("# TYPE test_calls_total counter"));
        assert!(output.contains("test_calls_total{provider=\"Acme\",status=\"OK\"} 1"));
        assert!(!output.contains("dataset="));
        assert!(output.contains("test_uptime_seconds"));
    }

    #[test]
    fn test_prometheus_label_values_are_escaped() {
        let metrics = MetricsCollector::with_defaults();
        metrics.record(
            TelemetryEvent::new(PARKING_SERVICE_EVENT)
                .with_field("parking_service", "Acme \"Central\"")
                .with_field("dataset", "fr\\idf\nnorth")
                .with_field("status", STATUS_FAILURE)
                .with_field("reason", "timeout"),
        );

        let output = metrics.to_prometheus_text();
        assert!(output.contains(
            "carpark_client_calls_total{provider=\"Acme \\\"Central\\\"\",\
             dataset=\"fr\\\\idf\\nnorth\",status=\"failure\"} 1"
        ));
        assert!(output.contains(
            "carpark_client_failures_total{provider=\"Acme \\\"Central\\\"\",reason=\"timeout\"} 1"
        ));
    }

    #[test]
    fn test_uptime_increases() {
        let metrics = MetricsCollector::with_defaults();
        let uptime1 = metrics.uptime();
        std::thread::sleep(Duration::from_millis(10));
        let uptime2 = metrics.uptime();
        assert!(uptime2 > uptime1);
    }
}
