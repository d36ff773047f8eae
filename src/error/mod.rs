// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;
use thiserror::Error;

/// Errors raised while building clients or loading configuration.
#[derive(Debug, Error)]
pub enum CarParkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, CarParkError>;

/// Failure of a single call to a remote service.
///
/// Every failure falls in exactly one of these kinds. They never leave
/// [`ResilientServiceClient::call_remote_service`](crate::ResilientServiceClient::call_remote_service);
/// they only drive logging and telemetry.
#[derive(Debug, Error)]
pub enum CallError {
    /// The circuit breaker rejected the call without touching the network.
    #[error("Circuit breaker is open: {0}")]
    CircuitOpen(String),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Anything else: connection refused, DNS failure, bad status, bad JSON.
    #[error("{message}")]
    Unclassified {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CallError {
    /// Build an unclassified error without an underlying cause.
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::Unclassified {
            message: message.into(),
            source: None,
        }
    }

    /// Build an unclassified error wrapping its cause.
    pub fn unclassified_from<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unclassified {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Short machine-readable label used in telemetry.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            CallError::CircuitOpen(_) => "circuit_open",
            CallError::Timeout(_) => "timeout",
            CallError::Unclassified { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_reason() {
        assert_eq!(CallError::CircuitOpen("x".into()).reason(), "circuit_open");
        assert_eq!(
            CallError::Timeout(Duration::from_secs(1)).reason(),
            "timeout"
        );
        assert_eq!(CallError::unclassified("boom").reason(), "error");
    }

    #[test]
    fn test_unclassified_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = CallError::unclassified_from("connect failed", io);
        assert_eq!(err.to_string(), "connect failed");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("refused"));
    }

    #[test]
    fn test_config_error_display() {
        let err = CarParkError::Validation("fail_max must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "Validation error: fail_max must be at least 1"
        );
    }
}
