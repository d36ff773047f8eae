// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logging of remote call failures.
//!
//! Every failed call produces exactly one log line through a
//! [`ProviderLogger`], tagged with the provider name and dataset.
//!
//! # Example
//!
//! ```ignore
//! use carpark_client::runtime::{LogLevel, LoggingConfig, TracingLogger};
//!
//! // Downgrade provider failures to warnings and keep the error chain.
//! let logger = TracingLogger::with_config(
//!     LoggingConfig::new()
//!         .with_failure_level(LogLevel::Warn)
//!         .with_error_chain(true),
//! );
//! ```

use std::error::Error as StdError;
use std::fmt;
use tracing::{debug, error, info, trace, warn};

/// Log level for provider failure lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Trace level - most verbose.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warn level.
    Warn,
    /// Error level.
    #[default]
    Error,
    /// Disabled - no logging.
    Off,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Off => write!(f, "OFF"),
        }
    }
}

/// Identity attached to every log line of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogContext<'a> {
    /// Human-readable provider name.
    pub provider: &'a str,
    /// Dataset the provider serves.
    pub dataset: &'a str,
}

/// Receives error-level messages from a client.
pub trait ProviderLogger: Send + Sync {
    /// Log a failure described entirely by `message`.
    fn error(&self, context: LogContext<'_>, message: &str);

    /// Log a failure together with the error that caused it.
    fn exception(&self, context: LogContext<'_>, message: &str, error: &(dyn StdError + 'static));
}

/// Configuration for [`TracingLogger`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level used for failure lines.
    pub failure_level: LogLevel,
    /// Whether `exception` lines carry the full source chain.
    pub include_error_chain: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            failure_level: LogLevel::Error,
            include_error_chain: true,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure log level.
    #[must_use]
    pub fn with_failure_level(mut self, level: LogLevel) -> Self {
        self.failure_level = level;
        self
    }

    /// Enable or disable the error source chain.
    #[must_use]
    pub fn with_error_chain(mut self, enabled: bool) -> Self {
        self.include_error_chain = enabled;
        self
    }

    /// Create a quiet configuration that only warns.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            failure_level: LogLevel::Warn,
            include_error_chain: false,
        }
    }
}

/// Default [`ProviderLogger`] backed by `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    config: LoggingConfig,
}

impl TracingLogger {
    /// Create a logger with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger with custom configuration.
    #[must_use]
    pub fn with_config(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    fn emit(&self, context: LogContext<'_>, message: &str, chain: Option<&str>) {
        let LogContext { provider, dataset } = context;
        let chain = chain.unwrap_or("");
        match self.config.failure_level {
            LogLevel::Trace => {
                trace!(target: "carpark::provider", provider, dataset, error.chain = chain, "{}", message)
            }
            LogLevel::Debug => {
                debug!(target: "carpark::provider", provider, dataset, error.chain = chain, "{}", message)
            }
            LogLevel::Info => {
                info!(target: "carpark::provider", provider, dataset, error.chain = chain, "{}", message)
            }
            LogLevel::Warn => {
                warn!(target: "carpark::provider", provider, dataset, error.chain = chain, "{}", message)
            }
            LogLevel::Error => {
                error!(target: "carpark::provider", provider, dataset, error.chain = chain, "{}", message)
            }
            LogLevel::Off => {}
        }
    }
}

impl ProviderLogger for TracingLogger {
    fn error(&self, context: LogContext<'_>, message: &str) {
        self.emit(context, message, None);
    }

    fn exception(&self, context: LogContext<'_>, message: &str, error: &(dyn StdError + 'static)) {
        if self.config.include_error_chain {
            let chain = error_chain(error);
            self.emit(context, message, Some(&chain));
        } else {
            self.emit(context, message, Some(&error.to_string()));
        }
    }
}

/// Render an error and all of its sources as `outer: inner: root`.
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
