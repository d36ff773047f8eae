// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider for record-oriented open-data JSON APIs.
//!
//! The request is `<url>?<id_param>=<poi ref>` plus any static query
//! parameters from the configuration. The answer is read from the first
//! element of the records array:
//!
//! ```json
//! { "records": [ { "fields": { "available": 12, "occupied": "28" } } ] }
//! ```
//!
//! Counts may be JSON numbers or numeric strings. When the occupied count is
//! missing but a capacity is configured, `occupied = total - available`.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::Provider;
use crate::client::ResilientServiceClient;
use crate::config::{BreakerDefaults, OpenDataOptions, ProviderConfig};
use crate::error::Result;
use crate::resources::{ParkingPlaces, Poi};

/// Configurable provider for open-data availability endpoints.
#[derive(Debug)]
pub struct OpenDataProvider {
    client: ResilientServiceClient,
    options: OpenDataOptions,
    base_url: Url,
}

impl OpenDataProvider {
    /// Wrap an already built client, taking the URL and response layout from
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns `CarParkError::InvalidUrl` if `config.url` does not parse.
    pub fn new(client: ResilientServiceClient, config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client,
            options: config.open_data.clone(),
            base_url: Url::parse(&config.url)?,
        })
    }

    /// Build a client with the default transport, logger and telemetry
    /// sink, falling back to `defaults` for unset breaker thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &ProviderConfig, defaults: &BreakerDefaults) -> Result<Self> {
        let client = ResilientServiceClient::builder(config)
            .breaker_defaults(defaults.clone())
            .build()?;
        Self::new(client, config)
    }

    /// The URL queried for a POI with remote identifier `reference`.
    pub fn request_url(&self, reference: &str) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(&self.options.id_param, reference);
            for (key, value) in &self.options.query {
                query.append_pair(key, value);
            }
        }
        url
    }

    fn parse(&self, document: &Value) -> Option<ParkingPlaces> {
        let record = document
            .get(&self.options.records_key)?
            .as_array()?
            .first()?;
        let fields = if self.options.fields_key.is_empty() {
            record
        } else {
            record.get(&self.options.fields_key)?
        };

        let read = |key: &Option<String>| key.as_deref().and_then(|k| count(fields, k));

        let available = count(fields, &self.options.available_field)?;
        let total = read(&self.options.total_field);
        let occupied = read(&self.options.occupied_field)
            .or_else(|| total.map(|t| t.saturating_sub(available)))?;

        let mut places = ParkingPlaces::new(available, occupied).with_pmr(
            read(&self.options.available_pmr_field),
            read(&self.options.occupied_pmr_field),
        );
        places.total_places = total;
        Some(places)
    }
}

#[async_trait]
impl Provider for OpenDataProvider {
    fn client(&self) -> &ResilientServiceClient {
        &self.client
    }

    async fn fetch_information(&self, poi: &Poi) -> Option<ParkingPlaces> {
        let Some(reference) = poi.reference() else {
            debug!(target: "carpark::provider", poi = %poi.id, "no ref property, skipping");
            return None;
        };

        let url = self.request_url(reference);
        let document = self.client.call_remote_service(url.as_str()).await?;

        let places = self.parse(&document);
        if places.is_none() {
            warn!(
                target: "carpark::provider",
                provider = %self.client.provider_name(),
                dataset = %self.client.dataset(),
                reference,
                "response has no usable availability record"
            );
        }
        places
    }
}

/// Read a non-negative count given as a number or a numeric string.
fn count(fields: &Value, key: &str) -> Option<u64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockTransport, RecordingSink};
    use http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    fn config() -> ProviderConfig {
        ProviderConfig::new(
            "Acme",
            ["acme"],
            "fr-idf",
            "https://data.acme.example/api/records/1.0/search/",
        )
    }

    fn provider(config: &ProviderConfig) -> (OpenDataProvider, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let client = ResilientServiceClient::builder(config)
            .transport(transport.clone())
            .telemetry(Arc::new(RecordingSink::new()))
            .build()
            .unwrap();
        (OpenDataProvider::new(client, config).unwrap(), transport)
    }

    fn poi(reference: &str) -> Poi {
        Poi::new("poi:parking:1")
            .with_property("operator", "Acme")
            .with_property("ref", reference)
    }

    #[test]
    fn test_request_url() {
        let mut config = config();
        config.open_data.id_param = "refine.id".into();
        config
            .open_data
            .query
            .insert("dataset".into(), "parkings-temps-reel".into());
        let (provider, _) = provider(&config);

        let url = provider.request_url("P 12");
        assert_eq!(
            url.as_str(),
            "https://data.acme.example/api/records/1.0/search/?refine.id=P+12&dataset=parkings-temps-reel"
        );
    }

    #[tokio::test]
    async fn test_fetch_information() {
        let (provider, transport) = provider(&config());
        transport.respond_json(json!({
            "records": [{"fields": {"available": 12, "occupied": "28"}}]
        }));

        let places = provider.fetch_information(&poi("P1")).await;
        assert_eq!(places, Some(ParkingPlaces::new(12, 28)));
        assert!(transport.requests()[0].url.ends_with("?id=P1"));
    }

    #[tokio::test]
    async fn test_occupied_from_total() {
        let mut config = config();
        config.open_data.occupied_field = None;
        config.open_data.total_field = Some("capacity".into());
        config.open_data.available_pmr_field = Some("free_pmr".into());
        let (provider, transport) = provider(&config);
        transport.respond_json(json!({
            "records": [{"fields": {"available": 10, "capacity": 40.0, "free_pmr": "2"}}]
        }));

        let places = provider.fetch_information(&poi("P1")).await.unwrap();
        assert_eq!(places.occupied, 30);
        assert_eq!(places.total_places, Some(40));
        assert_eq!(places.available_pmr, Some(2));
        assert_eq!(places.occupied_pmr, None);
    }

    #[tokio::test]
    async fn test_fields_at_record_level() {
        let mut config = config();
        config.open_data.fields_key = String::new();
        let (provider, transport) = provider(&config);
        transport.respond_json(json!({"records": [{"available": 1, "occupied": 2}]}));

        let places = provider.fetch_information(&poi("P1")).await;
        assert_eq!(places, Some(ParkingPlaces::new(1, 2)));
    }

    #[tokio::test]
    async fn test_poi_without_ref_makes_no_call() {
        let (provider, transport) = provider(&config());
        let poi = Poi::new("poi:1").with_property("operator", "acme");

        assert!(provider.supports_poi(&poi));
        assert!(provider.fetch_information(&poi).await.is_none());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unusable_documents() {
        let (provider, transport) = provider(&config());
        transport
            .respond_json(json!({"records": []}))
            .respond_json(json!({"records": [{"fields": {"available": "n/a"}}]}))
            .respond_json(json!({"records": [{"fields": {"available": -3, "occupied": 1}}]}))
            .respond_json(json!({"nhits": 0}));

        for _ in 0..4 {
            assert!(provider.fetch_information(&poi("P1")).await.is_none());
        }
        // A well-formed but empty answer is not a service failure.
        assert_eq!(provider.client().breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_yields_none() {
        let (provider, transport) = provider(&config());
        transport.respond_status(StatusCode::INTERNAL_SERVER_ERROR, "");

        assert!(provider.fetch_information(&poi("P1")).await.is_none());
        assert_eq!(provider.client().breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_from_config_applies_defaults() {
        let defaults = BreakerDefaults {
            fail_max: 9,
            reset_timeout: 5.0,
        };
        let provider = OpenDataProvider::from_config(&config(), &defaults).unwrap();
        assert_eq!(provider.client().breaker().config().fail_max, 9);
        assert_eq!(provider.client().dataset(), "fr-idf");
    }

    #[test]
    fn test_status_and_publisher_delegate() {
        let (provider, _) = provider(&config());
        assert_eq!(provider.status().operators, vec!["acme".to_string()]);
        assert!(provider.feed_publisher().is_none());
    }

    #[test]
    fn test_count() {
        let fields = json!({"a": 3, "b": "7", "c": 2.5, "d": null, "e": " 4 "});
        assert_eq!(count(&fields, "a"), Some(3));
        assert_eq!(count(&fields, "b"), Some(7));
        assert_eq!(count(&fields, "c"), None);
        assert_eq!(count(&fields, "d"), None);
        assert_eq!(count(&fields, "e"), Some(4));
        assert_eq!(count(&fields, "missing"), None);
    }
}
