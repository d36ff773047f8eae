// SPDX-License-Identifier: MIT OR Apache-2.0

//! Availability results and client status.

use serde::{Deserialize, Serialize};

/// Real-time space counts for one car park.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkingPlaces {
    /// Free spaces.
    pub available: u64,
    /// Occupied spaces.
    pub occupied: u64,
    /// Free spaces reserved for persons with reduced mobility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_pmr: Option<u64>,
    /// Occupied spaces reserved for persons with reduced mobility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupied_pmr: Option<u64>,
    /// Capacity, when the remote service reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_places: Option<u64>,
}

impl ParkingPlaces {
    /// Create a result from free and occupied counts.
    #[must_use]
    pub fn new(available: u64, occupied: u64) -> Self {
        Self {
            available,
            occupied,
            ..Self::default()
        }
    }

    /// Create a result from free spaces and capacity.
    #[must_use]
    pub fn from_total(available: u64, total: u64) -> Self {
        Self {
            available,
            occupied: total.saturating_sub(available),
            total_places: Some(total),
            ..Self::default()
        }
    }

    /// Set the reduced-mobility counts.
    #[must_use]
    pub fn with_pmr(mut self, available: Option<u64>, occupied: Option<u64>) -> Self {
        self.available_pmr = available;
        self.occupied_pmr = occupied;
        self
    }
}

/// Read-only snapshot of a client's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    /// Normalized operator names served by the client.
    pub operators: Vec<String>,
}
