//! Geocoder adapter: address string -> (lat, lon).
//!
//! Locations travel through the system as strings. A `"lat,lon"` pair is
//! parsed locally; anything else goes to the external geocoding API. The
//! HTTP client carries a hard timeout; a timeout or transport failure is
//! `Upstream` (retryable by the caller), an unresolvable address is
//! `NotFound`.

use async_trait::async_trait;
use common::config::GeocoderConfig;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::DeliveryError;
use crate::eta::Point;

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Point, DeliveryError>;
}

/// Parse a `"lat,lon"` location string (with or without a space after the
/// comma). Returns `None` for anything that is not a plausible coordinate
/// pair, so street addresses fall through to the geocoder.
pub fn parse_latlon(raw: &str) -> Option<Point> {
    let (lat, lon) = raw.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon))
        .then_some(Point { lat, lon })
}

/// Resolve a location string to coordinates, geocoding only when needed.
pub async fn resolve_location(
    geocoder: &dyn Geocoder,
    raw: &str,
) -> Result<Point, DeliveryError> {
    match parse_latlon(raw) {
        Some(point) => Ok(point),
        None => geocoder.resolve(raw).await,
    }
}

/// Yandex-style geocoding API client.
pub struct YandexGeocoder {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    region_hint: Option<String>,
}

impl YandexGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, DeliveryError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| DeliveryError::validation(format!("invalid geocoder base_url: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| DeliveryError::upstream(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            region_hint: config.region_hint.clone(),
        })
    }
}

#[async_trait]
impl Geocoder for YandexGeocoder {
    async fn resolve(&self, address: &str) -> Result<Point, DeliveryError> {
        let query = match &self.region_hint {
            Some(hint) => format!("{}, {}", hint, address),
            None => address.to_string(),
        };
        debug!(address, "resolving address via geocoder");

        let response = self
            .client
            .get(self.base_url.clone())
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("geocode", query.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| DeliveryError::upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeliveryError::upstream(format!(
                "geocoder returned {}",
                response.status()
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DeliveryError::upstream(e.to_string()))?;

        extract_point(&data)
            .ok_or_else(|| DeliveryError::not_found(format!("location for address \"{}\"", address)))
    }
}

/// Walk the geocoder response down to the first result's `Point.pos` field.
/// The API returns `"lon lat"`, space separated.
pub fn extract_point(data: &serde_json::Value) -> Option<Point> {
    let pos = data
        .get("response")?
        .get("GeoObjectCollection")?
        .get("featureMember")?
        .get(0)?
        .get("GeoObject")?
        .get("Point")?
        .get("pos")?
        .as_str()?;

    let mut parts = pos.split_whitespace();
    let lon: f64 = parts.next()?.parse().ok()?;
    let lat: f64 = parts.next()?.parse().ok()?;
    Some(Point { lat, lon })
}
