// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider configuration file parser
//!
//! A config file lists the remote availability services and the defaults
//! shared by their circuit breakers:
//!
//! ```yaml
//! circuit_breaker:
//!   fail_max: 4
//!   reset_timeout: 60
//! providers:
//!   - name: Acme Parking
//!     operators: [Acme]
//!     dataset: fr-idf
//!     url: https://data.acme.example/api/records
//!     timeout: 1.5
//!     api_key: s3cr3t
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CarParkError, Result};
use crate::runtime::{CircuitBreakerConfig, DEFAULT_FAIL_MAX, DEFAULT_RESET_TIMEOUT};

/// Path override for the config file.
pub const ENV_CARPARK_CONFIG: &str = "CARPARK_CONFIG";
/// Override for the default failure threshold.
pub const ENV_CARPARK_FAIL_MAX: &str = "CARPARK_FAIL_MAX";
/// Override for the default cool-down, in seconds.
pub const ENV_CARPARK_RESET_TIMEOUT: &str = "CARPARK_RESET_TIMEOUT";

/// Request timeout used when a provider does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Represents the entire provider configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CarParkConfig {
    /// Breaker thresholds applied to providers that do not set their own
    #[serde(default)]
    pub circuit_breaker: BreakerDefaults,

    /// Configured remote services
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Circuit breaker thresholds shared by all providers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerDefaults {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_fail_max")]
    pub fail_max: usize,

    /// Cool-down in seconds before a probe is let through
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout: f64,
}

impl Default for BreakerDefaults {
    fn default() -> Self {
        Self {
            fail_max: default_fail_max(),
            reset_timeout: default_reset_timeout(),
        }
    }
}

impl BreakerDefaults {
    /// Check the thresholds before they reach a breaker.
    ///
    /// # Errors
    ///
    /// Returns `CarParkError::Validation` if `fail_max` is zero or
    /// `reset_timeout` is not a non-negative number of seconds.
    pub fn validate(&self) -> Result<()> {
        if self.fail_max == 0 {
            return Err(CarParkError::Validation(
                "circuit_breaker.fail_max must be at least 1".to_string(),
            ));
        }
        if !(self.reset_timeout.is_finite() && self.reset_timeout >= 0.0) {
            return Err(CarParkError::Validation(
                "circuit_breaker.reset_timeout must be a non-negative number of seconds"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn default_fail_max() -> usize {
    DEFAULT_FAIL_MAX
}

fn default_reset_timeout() -> f64 {
    DEFAULT_RESET_TIMEOUT.as_secs_f64()
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT.as_secs_f64()
}

/// Secret sent as `Authorization: apiKey <key>`. Never printed by `Debug`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Attribution for the data served by a provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedPublisher {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub url: String,
}

/// Response layout read by the open-data provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenDataOptions {
    /// Query parameter carrying the POI reference
    pub id_param: String,
    /// Static query parameters appended to every request
    pub query: BTreeMap<String, String>,
    /// Key of the array of records in the response
    pub records_key: String,
    /// Key of the object holding the counts inside a record (empty = the record itself)
    pub fields_key: String,
    pub available_field: String,
    pub occupied_field: Option<String>,
    pub total_field: Option<String>,
    pub available_pmr_field: Option<String>,
    pub occupied_pmr_field: Option<String>,
}

impl Default for OpenDataOptions {
    fn default() -> Self {
        Self {
            id_param: "id".to_string(),
            query: BTreeMap::new(),
            records_key: "records".to_string(),
            fields_key: "fields".to_string(),
            available_field: "available".to_string(),
            occupied_field: Some("occupied".to_string()),
            total_field: None,
            available_pmr_field: None,
            occupied_pmr_field: None,
        }
    }
}

/// Configuration for a single remote availability service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Human-readable provider name used in logs and telemetry
    pub name: String,

    /// Operator names served by this provider (matched case-insensitively)
    pub operators: Vec<String>,

    /// Dataset tag attached to every log line and telemetry event
    pub dataset: String,

    /// Base URL of the remote service
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Provider-specific failure threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_max: Option<usize>,

    /// Provider-specific cool-down in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_timeout: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKey>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_publisher: Option<FeedPublisher>,

    #[serde(default)]
    pub open_data: OpenDataOptions,
}

impl ProviderConfig {
    /// Create a provider configuration with default timeout and thresholds.
    pub fn new(
        name: impl Into<String>,
        operators: impl IntoIterator<Item = impl Into<String>>,
        dataset: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            operators: operators.into_iter().map(Into::into).collect(),
            dataset: dataset.into(),
            url: url.into(),
            timeout: default_timeout(),
            fail_max: None,
            reset_timeout: None,
            api_key: None,
            feed_publisher: None,
            open_data: OpenDataOptions::default(),
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.as_secs_f64();
        self
    }

    /// Set the failure threshold.
    #[must_use]
    pub fn with_fail_max(mut self, fail_max: usize) -> Self {
        self.fail_max = Some(fail_max);
        self
    }

    /// Set the breaker cool-down.
    #[must_use]
    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = Some(reset_timeout.as_secs_f64());
        self
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(key));
        self
    }

    /// Set the feed publisher.
    #[must_use]
    pub fn with_feed_publisher(mut self, publisher: FeedPublisher) -> Self {
        self.feed_publisher = Some(publisher);
        self
    }

    /// Request timeout as a `Duration`.
    pub fn timeout_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout).unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Breaker configuration, falling back to `defaults` for unset fields.
    pub fn breaker_config(&self, defaults: &BreakerDefaults) -> CircuitBreakerConfig {
        let reset = self.reset_timeout.unwrap_or(defaults.reset_timeout);
        CircuitBreakerConfig::new()
            .with_fail_max(self.fail_max.unwrap_or(defaults.fail_max))
            .with_reset_timeout(
                Duration::try_from_secs_f64(reset).unwrap_or(DEFAULT_RESET_TIMEOUT),
            )
    }

    /// Semantic checks that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `CarParkError::Validation` naming the first offending field,
    /// or `CarParkError::InvalidUrl` if the URL does not parse.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CarParkError::Validation(
                "provider name must not be empty".to_string(),
            ));
        }
        if self.dataset.trim().is_empty() {
            return Err(CarParkError::Validation(format!(
                "{}: dataset must not be empty",
                self.name
            )));
        }
        url::Url::parse(&self.url)?;
        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(CarParkError::Validation(format!(
                "{}: timeout must be a positive number of seconds",
                self.name
            )));
        }
        if self.fail_max == Some(0) {
            return Err(CarParkError::Validation(format!(
                "{}: fail_max must be at least 1",
                self.name
            )));
        }
        if let Some(reset) = self.reset_timeout {
            if !(reset.is_finite() && reset >= 0.0) {
                return Err(CarParkError::Validation(format!(
                    "{}: reset_timeout must be a non-negative number of seconds",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl CarParkConfig {
    /// Load configuration from the default location
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config directory cannot be determined
    /// - The config file cannot be read
    /// - The config file is malformed or invalid
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from `CARPARK_CONFIG` (or the default location),
    /// then apply the `CARPARK_FAIL_MAX` / `CARPARK_RESET_TIMEOUT` overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or an override is not a number.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load_from_path(Self::config_path()?)?;
        config.apply_overrides(
            std::env::var(ENV_CARPARK_FAIL_MAX).ok().as_deref(),
            std::env::var(ENV_CARPARK_RESET_TIMEOUT).ok().as_deref(),
        )?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The file is malformed YAML
    /// - A provider fails validation
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            CarParkError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| CarParkError::Config(format!("Failed to parse config YAML: {}", e)))
    }

    /// Get the default config file path (`<config dir>/carpark/config.yaml`)
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            CarParkError::Config("Could not determine config directory".to_string())
        })?;

        Ok(dir.join("carpark").join("config.yaml"))
    }

    /// Get the path to the config file, respecting `CARPARK_CONFIG`
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined when
    /// `CARPARK_CONFIG` is not set
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var(ENV_CARPARK_CONFIG) {
            Ok(PathBuf::from(env_path))
        } else {
            Self::default_path()
        }
    }

    /// Override the shared breaker defaults.
    ///
    /// # Errors
    ///
    /// Returns `CarParkError::Config` if a value is not a number.
    pub fn apply_overrides(
        &mut self,
        fail_max: Option<&str>,
        reset_timeout: Option<&str>,
    ) -> Result<()> {
        if let Some(raw) = fail_max {
            self.circuit_breaker.fail_max = raw.trim().parse().map_err(|e| {
                CarParkError::Config(format!("Invalid {ENV_CARPARK_FAIL_MAX} '{raw}': {e}"))
            })?;
        }
        if let Some(raw) = reset_timeout {
            self.circuit_breaker.reset_timeout = raw.trim().parse().map_err(|e| {
                CarParkError::Config(format!("Invalid {ENV_CARPARK_RESET_TIMEOUT} '{raw}': {e}"))
            })?;
        }
        Ok(())
    }

    /// Validate the shared defaults and every provider.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<()> {
        self.circuit_breaker.validate()?;
        self.providers.iter().try_for_each(ProviderConfig::validate)
    }

    /// Get a provider by name
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// List all provider names
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_CONFIG: &str = r#"
circuit_breaker:
  fail_max: 3
  reset_timeout: 30
providers:
  - name: Acme Parking
    operators: [Acme, ACME Group]
    dataset: fr-idf
    url: https://data.acme.example/api/records
    timeout: 1.5
    api_key: s3cr3t
    feed_publisher:
      id: acme
      name: Acme open data
      license: ODbL
      url: https://data.acme.example
    open_data:
      id_param: refine.id
      available_field: free
      total_field: capacity
  - name: Star
    operators: [star]
    dataset: fr-bre
    url: http://star.example/parkings
    fail_max: 7
    reset_timeout: 120
"#;

    #[test]
    fn test_parse_basic_config() {
        let config = CarParkConfig::from_yaml(SAMPLE_CONFIG).unwrap();

        assert_eq!(config.circuit_breaker.fail_max, 3);
        assert_eq!(config.providers.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_fields() {
        let config = CarParkConfig::from_yaml(SAMPLE_CONFIG).unwrap();

        let acme = config.provider("Acme Parking").unwrap();
        assert_eq!(acme.operators, vec!["Acme", "ACME Group"]);
        assert_eq!(acme.timeout_duration(), Duration::from_millis(1500));
        assert_eq!(acme.api_key.as_ref().map(ApiKey::expose), Some("s3cr3t"));
        assert_eq!(acme.feed_publisher.as_ref().unwrap().license, "ODbL");
        assert_eq!(acme.open_data.id_param, "refine.id");
        assert_eq!(acme.open_data.records_key, "records");
        assert_eq!(acme.open_data.total_field.as_deref(), Some("capacity"));
    }

    #[test]
    fn test_breaker_config_falls_back_to_defaults() {
        let config = CarParkConfig::from_yaml(SAMPLE_CONFIG).unwrap();

        let acme = config
            .provider("Acme Parking")
            .unwrap()
            .breaker_config(&config.circuit_breaker);
        assert_eq!(acme.fail_max, 3);
        assert_eq!(acme.reset_timeout, Duration::from_secs(30));

        let star = config
            .provider("Star")
            .unwrap()
            .breaker_config(&config.circuit_breaker);
        assert_eq!(star.fail_max, 7);
        assert_eq!(star.reset_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_minimal_config_defaults() {
        let minimal = r#"
providers:
  - name: Minimal
    operators: [m]
    dataset: d
    url: http://127.0.0.1:8080
"#;

        let config = CarParkConfig::from_yaml(minimal).unwrap();
        assert_eq!(config.circuit_breaker, BreakerDefaults::default());

        let provider = config.provider("Minimal").unwrap();
        assert_eq!(provider.timeout_duration(), DEFAULT_TIMEOUT);
        assert!(provider.api_key.is_none());
        assert!(provider.feed_publisher.is_none());
        assert_eq!(provider.open_data, OpenDataOptions::default());
    }

    #[test]
    fn test_api_key_is_redacted_in_debug() {
        let provider = ProviderConfig::new("Acme", ["acme"], "d", "http://x").with_api_key("s3cr3t");
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_validation_errors() {
        let base = ProviderConfig::new("Acme", ["acme"], "fr-idf", "http://acme.example");
        assert!(base.validate().is_ok());

        let no_dataset = ProviderConfig {
            dataset: " ".to_string(),
            ..base.clone()
        };
        assert!(matches!(
            no_dataset.validate(),
            Err(CarParkError::Validation(_))
        ));

        let bad_url = ProviderConfig {
            url: "not a url".to_string(),
            ..base.clone()
        };
        assert!(matches!(bad_url.validate(), Err(CarParkError::InvalidUrl(_))));

        let zero_timeout = base.clone().with_timeout(Duration::ZERO);
        assert!(zero_timeout.validate().is_err());

        let zero_fail_max = base.clone().with_fail_max(0);
        assert!(zero_fail_max.validate().is_err());
    }

    #[test]
    fn test_breaker_defaults_validation() {
        assert!(BreakerDefaults::default().validate().is_ok());

        let mut config = CarParkConfig::from_yaml(SAMPLE_CONFIG).unwrap();
        config.circuit_breaker.fail_max = 0;
        assert!(matches!(config.validate(), Err(CarParkError::Validation(_))));

        config.circuit_breaker.fail_max = 4;
        config.circuit_breaker.reset_timeout = f64::INFINITY;
        assert!(matches!(config.validate(), Err(CarParkError::Validation(_))));
    }

    #[test]
    fn test_malformed_yaml() {
        let result = CarParkConfig::from_yaml("providers: [name: {");
        assert!(matches!(result, Err(CarParkError::Config(_))));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = CarParkConfig::from_yaml(SAMPLE_CONFIG).unwrap();
        config.apply_overrides(Some(" 9 "), Some("2.5")).unwrap();

        assert_eq!(config.circuit_breaker.fail_max, 9);
        assert_eq!(config.circuit_breaker.reset_timeout, 2.5);

        let err = config.apply_overrides(Some("many"), None);
        assert!(matches!(err, Err(CarParkError::Config(_))));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();

        let config = CarParkConfig::load_from_path(file.path()).unwrap();
        let mut names = config.provider_names();
        names.sort();
        assert_eq!(names, vec!["Acme Parking", "Star"]);
    }

    #[test]
    fn test_load_from_missing_path() {
        let result = CarParkConfig::load_from_path("/nonexistent/carpark_12345.yaml");
        match result {
            Err(CarParkError::Config(msg)) => assert!(msg.contains("Failed to read config file")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_rejects_invalid_provider() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
providers:
  - name: Broken
    operators: [b]
    dataset: d
    url: http://b.example
    fail_max: 0
"#,
        )
        .unwrap();

        let result = CarParkConfig::load_from_path(file.path());
        assert!(matches!(result, Err(CarParkError::Validation(_))));
    }
}
