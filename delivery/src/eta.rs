//! Great-circle distance and delivery ETA math.

use chrono::{DateTime, Duration, Utc};
use common::config::DeliveryConfig;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

/// Haversine distance in kilometers between two coordinate pairs.
pub fn haversine_km(a: Point, b: Point) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[derive(Debug, Clone)]
pub struct EtaSettings {
    pub average_speed_kmh: f64,
    pub fallback_preparation_minutes: i64,
}

impl From<&DeliveryConfig> for EtaSettings {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            average_speed_kmh: config.average_speed_kmh,
            fallback_preparation_minutes: config.fallback_preparation_minutes,
        }
    }
}

/// Travel time at the configured average speed.
pub fn travel_time(distance_km: f64, average_speed_kmh: f64) -> Duration {
    let hours = distance_km / average_speed_kmh;
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// ETA = order creation time + slowest dish preparation time + travel time.
/// Orders with no per-line preparation data fall back to the configured
/// constant.
pub fn expected_delivery_time(
    time_of_creation: DateTime<Utc>,
    max_preparation_minutes: Option<i32>,
    distance_km: f64,
    settings: &EtaSettings,
) -> DateTime<Utc> {
    let preparation_minutes = max_preparation_minutes
        .map(i64::from)
        .unwrap_or(settings.fallback_preparation_minutes);
    time_of_creation
        + Duration::minutes(preparation_minutes)
        + travel_time(distance_km, settings.average_speed_kmh)
}
