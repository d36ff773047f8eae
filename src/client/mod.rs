// SPDX-License-Identifier: MIT OR Apache-2.0

//! The circuit-breaker guarded client for one remote availability service.
//!
//! [`ResilientServiceClient`] owns a [`CircuitBreaker`], bounds every request
//! by a timeout and reports each outcome through the injected logger and
//! telemetry sink. Callers only ever see data or nothing: failures are
//! absorbed, logged and recorded.
//!
//! # Example
//!
//! ```no_run
//! use carpark_client::config::ProviderConfig;
//! use carpark_client::ResilientServiceClient;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProviderConfig::new("Acme", ["Acme"], "fr-idf", "https://acme.example/api")
//!     .with_timeout(Duration::from_secs(1))
//!     .with_fail_max(3)
//!     .with_api_key("s3cr3t");
//!
//! let client = ResilientServiceClient::builder(&config).build()?;
//!
//! match client.call_remote_service("https://acme.example/api?id=P1").await {
//!     Some(document) => println!("{document}"),
//!     None => println!("temporarily unavailable"),
//! }
//! # Ok(())
//! # }
//! ```

mod transport;

pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};

use crate::config::{BreakerDefaults, FeedPublisher, ProviderConfig};
use crate::error::{CallError, CarParkError, Result};
use crate::resources::{Poi, ProviderStatus};
use crate::runtime::tracing::CallSpan;
use crate::runtime::{
    CircuitBreaker, LogContext, ProviderLogger, TelemetryEvent, TelemetrySink, TracingLogger,
    TracingTelemetrySink, PARKING_SERVICE_EVENT, STATUS_FAILURE, STATUS_OK,
};
use http::header::{HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Builder for [`ResilientServiceClient`].
pub struct ClientBuilder<'a> {
    config: &'a ProviderConfig,
    breaker_defaults: BreakerDefaults,
    transport: Option<Arc<dyn HttpTransport>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    logger: Option<Arc<dyn ProviderLogger>>,
}

impl<'a> ClientBuilder<'a> {
    /// Thresholds used when the provider config leaves them unset.
    #[must_use]
    pub fn breaker_defaults(mut self, defaults: BreakerDefaults) -> Self {
        self.breaker_defaults = defaults;
        self
    }

    /// Use a custom transport instead of the default `reqwest` one.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Send telemetry events to `sink`.
    #[must_use]
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Send failure log lines to `logger`.
    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn ProviderLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Validate the configuration and build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider configuration or the breaker defaults
    /// are invalid, the API key cannot be sent as a header, or the default
    /// transport cannot be built.
    pub fn build(self) -> Result<ResilientServiceClient> {
        let config = self.config;
        self.breaker_defaults.validate()?;
        config.validate()?;

        let authorization = config
            .api_key
            .as_ref()
            .map(|key| {
                let mut value = HeaderValue::from_str(&format!("apiKey {}", key.expose()))
                    .map_err(|_| {
                        CarParkError::Validation(format!(
                            "{}: api_key contains characters not allowed in a header",
                            config.name
                        ))
                    })?;
                value.set_sensitive(true);
                Ok::<_, CarParkError>(value)
            })
            .transpose()?;

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        let mut operators: Vec<String> = Vec::with_capacity(config.operators.len());
        for operator in &config.operators {
            let normalized = operator.to_lowercase();
            if !operators.contains(&normalized) {
                operators.push(normalized);
            }
        }

        let telemetry: Arc<dyn TelemetrySink> = match self.telemetry {
            Some(sink) => sink,
            None => Arc::new(TracingTelemetrySink),
        };
        let logger: Arc<dyn ProviderLogger> = match self.logger {
            Some(logger) => logger,
            None => Arc::new(TracingLogger::new()),
        };

        let breaker = CircuitBreaker::new(config.breaker_config(&self.breaker_defaults))
            .with_name(config.name.clone());

        Ok(ResilientServiceClient {
            provider_name: config.name.clone(),
            operators,
            dataset: config.dataset.clone(),
            timeout: config.timeout_duration(),
            authorization,
            feed_publisher: config.feed_publisher.clone(),
            breaker,
            transport,
            telemetry,
            logger,
        })
    }
}

/// Client for one configured remote availability service.
///
/// Long-lived: build it once per configured service and share it (it is
/// `Send + Sync`). The breaker is its only mutable state.
pub struct ResilientServiceClient {
    provider_name: String,
    operators: Vec<String>,
    dataset: String,
    timeout: Duration,
    authorization: Option<HeaderValue>,
    feed_publisher: Option<FeedPublisher>,
    breaker: CircuitBreaker,
    transport: Arc<dyn HttpTransport>,
    telemetry: Arc<dyn TelemetrySink>,
    logger: Arc<dyn ProviderLogger>,
}

impl std::fmt::Debug for ResilientServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientServiceClient")
            .field("provider_name", &self.provider_name)
            .field("operators", &self.operators)
            .field("dataset", &self.dataset)
            .field("timeout", &self.timeout)
            .field("breaker", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

impl ResilientServiceClient {
    /// Start building a client for `config`.
    pub fn builder(config: &ProviderConfig) -> ClientBuilder<'_> {
        ClientBuilder {
            config,
            breaker_defaults: BreakerDefaults::default(),
            transport: None,
            telemetry: None,
            logger: None,
        }
    }

    /// Whether this client serves `poi`, judged by its `operator` property.
    ///
    /// A missing operator is treated as the empty string and only matches if
    /// an empty operator was explicitly configured.
    pub fn supports_poi(&self, poi: &Poi) -> bool {
        let operator = poi.operator().unwrap_or_default().to_lowercase();
        self.operators.iter().any(|o| *o == operator)
    }

    /// GET `url` through the circuit breaker and decode the JSON body.
    ///
    /// Returns `None` when the breaker is open, the request times out or
    /// anything else goes wrong; the cause is logged and recorded as
    /// telemetry. `None` means "temporarily unavailable": the breaker already
    /// governs when the service is tried again.
    pub async fn call_remote_service(&self, url: &str) -> Option<Value> {
        let span = CallSpan::new(&self.provider_name, &self.dataset, url);
        let request = self.build_request(url);

        let outcome = self
            .breaker
            .call(|| self.fetch_json(request))
            .instrument(span.span().clone())
            .await;

        span.span().in_scope(|| match outcome {
            Ok(document) => {
                span.record_success();
                self.record_call(STATUS_OK, &[]);
                Some(document)
            }
            Err(err) => {
                span.record_error(err.reason(), &err.to_string());
                self.report_failure(&err);
                None
            }
        })
    }

    fn build_request(&self, url: &str) -> HttpRequest {
        let mut request = HttpRequest::get(url, self.timeout);
        if let Some(value) = &self.authorization {
            request.headers.insert(AUTHORIZATION, value.clone());
        }
        request
    }

    async fn fetch_json(&self, request: HttpRequest) -> std::result::Result<Value, CallError> {
        let response = tokio::time::timeout(self.timeout, self.transport.get(request))
            .await
            .map_err(|_| CallError::Timeout(self.timeout))??;

        if !response.is_success() {
            return Err(CallError::unclassified(format!(
                "unexpected HTTP status {}",
                response.status
            )));
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| CallError::unclassified_from("invalid JSON response", e))
    }

    fn report_failure(&self, err: &CallError) {
        let context = LogContext {
            provider: &self.provider_name,
            dataset: &self.dataset,
        };

        let message = match err {
            CallError::CircuitOpen(_) => {
                let message = format!("{} service dead (error: {})", self.provider_name, err);
                self.logger.error(context, &message);
                message
            }
            CallError::Timeout(_) => {
                let message = format!("{} service timeout (error: {})", self.provider_name, err);
                self.logger.error(context, &message);
                message
            }
            CallError::Unclassified { .. } => {
                let message = format!("{} service error", self.provider_name);
                self.logger.exception(context, &message, err);
                message
            }
        };

        self.record_call(
            STATUS_FAILURE,
            &[
                ("reason", err.reason()),
                ("message", message.as_str()),
                ("parking_system_id", self.provider_name.as_str()),
            ],
        );
    }

    /// Emit one `parking_service` telemetry event.
    ///
    /// The fixed fields `parking_service`, `dataset` and `status` are merged
    /// with `extra`; an extra field with the same key wins.
    pub fn record_call(&self, status: &str, extra: &[(&str, &str)]) {
        let mut event = TelemetryEvent::new(PARKING_SERVICE_EVENT)
            .with_field("parking_service", self.provider_name.as_str())
            .with_field("dataset", self.dataset.as_str())
            .with_field("status", status);
        for (key, value) in extra {
            event = event.with_field(*key, *value);
        }
        self.telemetry.record(event);
    }

    /// Read-only view of the served operators.
    pub fn status(&self) -> ProviderStatus {
        ProviderStatus {
            operators: self.operators.clone(),
        }
    }

    /// Attribution for the data this client serves.
    pub fn feed_publisher(&self) -> Option<&FeedPublisher> {
        self.feed_publisher.as_ref()
    }

    /// Human-readable provider name.
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Dataset tag of this client.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Timeout applied to every request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The breaker guarding this client.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}
