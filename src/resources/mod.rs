// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strongly typed domain types shared by clients and providers.
//!
//! A [`Poi`] comes in, a [`ParkingPlaces`] comes out; [`ProviderStatus`] is
//! the read-only view a client exposes about itself.

mod parking;
mod poi;

pub use parking::{ParkingPlaces, ProviderStatus};
pub use poi::Poi;
