// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod resources;
pub mod runtime;
pub mod testkit;

pub use client::{ClientBuilder, HttpTransport, ReqwestTransport, ResilientServiceClient};
pub use error::{CallError, CarParkError};
pub use provider::{OpenDataProvider, Provider};
pub use resources::{ParkingPlaces, Poi, ProviderStatus};
