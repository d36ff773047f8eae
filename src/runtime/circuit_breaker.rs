// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breaker guarding calls to a remote availability service.
//!
//! The circuit breaker turns a slow or dead remote endpoint into a fast local
//! failure once it has failed `fail_max` times in a row, and re-probes it after
//! `reset_timeout`.
//!
//! # States
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Requests immediately fail (endpoint is down)
//! - **Half-Open**: A single probe request is in flight
//!
//! # Example
//!
//! ```ignore
//! use carpark_client::runtime::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let config = CircuitBreakerConfig::default()
//!     .with_fail_max(3)
//!     .with_reset_timeout(Duration::from_secs(30));
//!
//! let breaker = CircuitBreaker::new(config).with_name("acme");
//!
//! let result = breaker.call(|| async { fetch().await }).await;
//! ```

use crate::error::CallError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Consecutive failures tolerated before the circuit opens.
pub const DEFAULT_FAIL_MAX: usize = 4;

/// Cool-down before an open circuit lets a probe through.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally.
    Closed,
    /// Circuit is open, requests fail immediately.
    Open,
    /// Circuit is half-open, a single probe decides what comes next.
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding used by metrics (0=closed, 1=half-open, 2=open).
    #[must_use]
    pub fn as_gauge(self) -> u64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub fail_max: usize,
    /// Duration to wait before transitioning from open to half-open.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            fail_max: DEFAULT_FAIL_MAX,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold.
    #[must_use]
    pub fn with_fail_max(mut self, fail_max: usize) -> Self {
        self.fail_max = fail_max;
        self
    }

    /// Set the reset timeout.
    #[must_use]
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker for protecting against cascading failures.
///
/// State transitions happen under a short-lived lock that is never held
/// while the guarded operation runs, so concurrent callers sharing one
/// breaker see a consistent state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    failure_count: AtomicUsize,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            name: "default".to_string(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                opened_at: None,
                probe_in_flight: false,
            }),
            failure_count: AtomicUsize::new(0),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Name the breaker; the name tags its state transition logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current circuit state.
    ///
    /// An open circuit whose cool-down has elapsed reports (and becomes)
    /// half-open.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        if inner.state == CircuitState::Open && self.cool_down_elapsed(&inner) {
            self.half_open(&mut inner);
        }
        inner.state
    }

    /// Check if the circuit would admit a request right now.
    pub fn can_execute(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.cool_down_elapsed(&inner),
            CircuitState::HalfOpen => !inner.probe_in_flight,
        }
    }

    /// Execute an async operation with circuit breaker protection.
    ///
    /// # Errors
    ///
    /// Returns `CallError::CircuitOpen` without running `operation` if the
    /// circuit is open, or while another caller holds the half-open probe.
    /// Otherwise returns the operation's own error, which counts as a failure.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let probing = self.admit()?;
        let mut guard = ProbeGuard {
            breaker: self,
            armed: probing,
        };

        let outcome = operation().await;
        guard.armed = false;

        match outcome {
            Ok(result) => {
                self.on_success(probing);
                Ok(result)
            }
            Err(e) => {
                self.on_failure(probing);
                Err(e)
            }
        }
    }

    /// Decide whether a call may proceed. `Ok(true)` means it is the probe.
    fn admit(&self) -> Result<bool, CallError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => return Ok(false),
            CircuitState::Open if self.cool_down_elapsed(&inner) => {
                self.half_open(&mut inner);
                inner.probe_in_flight = true;
                return Ok(true);
            }
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                return Ok(true);
            }
            CircuitState::Open | CircuitState::HalfOpen => {}
        }
        drop(inner);

        self.total_rejections.fetch_add(1, Ordering::Relaxed);
        let message = match self.time_until_retry() {
            Some(wait) if !wait.is_zero() => {
                format!("{} circuit is open, will retry after {wait:?}", self.name)
            }
            _ => format!("{} circuit is half-open, probe in flight", self.name),
        };
        Err(CallError::CircuitOpen(message))
    }

    fn on_success(&self, probing: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::HalfOpen if probing => {
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.probe_in_flight = false;
                self.failure_count.store(0, Ordering::Relaxed);
                info!(target: "carpark::breaker", breaker = %self.name, "circuit closed");
            }
            // A straggler admitted before the circuit opened; the probe decides.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, probing: bool) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.fail_max {
                    self.open(&mut inner, failures);
                }
            }
            CircuitState::HalfOpen if probing => {
                inner.probe_in_flight = false;
                let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                self.open(&mut inner, failures);
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut Inner, failures: usize) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        warn!(
            target: "carpark::breaker",
            breaker = %self.name,
            failures,
            reset_timeout = ?self.config.reset_timeout,
            "circuit opened"
        );
    }

    fn half_open(&self, inner: &mut Inner) {
        inner.state = CircuitState::HalfOpen;
        inner.probe_in_flight = false;
        info!(target: "carpark::breaker", breaker = %self.name, "circuit half-open");
    }

    fn cool_down_elapsed(&self, inner: &Inner) -> bool {
        inner
            .opened_at
            .is_some_and(|opened| opened.elapsed() >= self.config.reset_timeout)
    }

    /// Manually reset the circuit breaker to closed state.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        self.failure_count.store(0, Ordering::Relaxed);
    }

    /// Get the time until the circuit can retry (if open).
    pub fn time_until_retry(&self) -> Option<Duration> {
        let inner = self.lock();
        if inner.state != CircuitState::Open {
            return None;
        }

        inner
            .opened_at
            .map(|opened| self.config.reset_timeout.saturating_sub(opened.elapsed()))
    }

    /// Breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current consecutive failure count.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Get total number of calls.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// Get total number of failures.
    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Get total number of rejections (circuit open).
    #[must_use]
    pub fn total_rejections(&self) -> u64 {
        self.total_rejections.load(Ordering::Relaxed)
    }

    /// Get failure rate (0.0 to 1.0).
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let total = self.total_calls.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let failures = self.total_failures.load(Ordering::Relaxed);
        failures as f64 / total as f64
    }

    /// Get the circuit breaker configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

/// Frees the half-open slot if the probing future is dropped mid-flight.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.breaker.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.probe_in_flight = false;
            }
        }
    }
}
