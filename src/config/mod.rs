// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration management for car park availability providers
//!
//! This module loads the YAML file describing every remote availability
//! service: the operators it serves, its dataset, endpoint, timeout, circuit
//! breaker thresholds and optional API key.
//!
//! # Environment Variables
//!
//! The following environment variables are supported:
//!
//! - `CARPARK_CONFIG` - Path to the config file (default: `<config dir>/carpark/config.yaml`)
//! - `CARPARK_FAIL_MAX` - Override the default circuit breaker failure threshold
//! - `CARPARK_RESET_TIMEOUT` - Override the default circuit breaker cool-down (seconds)
//!
//! # Example
//!
//! ```no_run
//! use carpark_client::config::CarParkConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CarParkConfig::load_with_env()?;
//!
//! for provider in &config.providers {
//!     println!("{} serves {:?}", provider.name, provider.operators);
//! }
//! # Ok(())
//! # }
//! ```

mod providers;

pub use providers::{
    ApiKey, BreakerDefaults, CarParkConfig, FeedPublisher, OpenDataOptions, ProviderConfig,
    DEFAULT_TIMEOUT, ENV_CARPARK_CONFIG, ENV_CARPARK_FAIL_MAX, ENV_CARPARK_RESET_TIMEOUT,
};
