// SPDX-License-Identifier: MIT OR Apache-2.0

//! Availability providers built on top of [`ResilientServiceClient`].
//!
//! A provider knows how to turn a [`Poi`] into a request URL and how to read
//! the remote document back into [`ParkingPlaces`]. Everything else
//! (breaker, timeout, logging, telemetry) is the client's job.

mod open_data;

pub use open_data::OpenDataProvider;

use async_trait::async_trait;

use crate::client::ResilientServiceClient;
use crate::config::FeedPublisher;
use crate::resources::{ParkingPlaces, Poi, ProviderStatus};

/// A source of real-time parking availability.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The guarded client used for every remote call.
    fn client(&self) -> &ResilientServiceClient;

    /// Fetch availability for `poi`.
    ///
    /// `None` means no data right now: unknown POI, remote failure or an
    /// open circuit. Implementations go through
    /// [`ResilientServiceClient::call_remote_service`].
    async fn fetch_information(&self, poi: &Poi) -> Option<ParkingPlaces>;

    fn supports_poi(&self, poi: &Poi) -> bool {
        self.client().supports_poi(poi)
    }

    fn status(&self) -> ProviderStatus {
        self.client().status()
    }

    fn feed_publisher(&self) -> Option<&FeedPublisher> {
        self.client().feed_publisher()
    }
}
