//! Courier assignment: bind an available courier to a prepared order and
//! compute its delivery ETA.

use metrics::histogram;
use tracing::{debug, info};

use crate::db_model::DbOrderRecord;
use crate::error::DeliveryError;
use crate::eta::{self, EtaSettings};
use crate::geocode::{Geocoder, resolve_location};
use crate::model::ModelId;
use crate::storage::DeliveryStore;

/// Claim an order for a courier.
///
/// The snapshot checks here give fast, readable errors; the authoritative
/// delivered/claimed/prepared re-check runs inside `claim_order`'s
/// transaction, so racing couriers still get exactly one winner.
pub async fn take_order(
    store: &dyn DeliveryStore,
    geocoder: &dyn Geocoder,
    settings: &EtaSettings,
    order_id: ModelId,
    courier_id: ModelId,
    requested_location: Option<&str>,
) -> Result<DbOrderRecord, DeliveryError> {
    let order = store.get_order(order_id).await?;
    if order.is_delivered {
        return Err(DeliveryError::conflict("order is already delivered"));
    }
    if order.courier_id.is_some() {
        return Err(DeliveryError::conflict(
            "order is already taken by another courier",
        ));
    }
    if !order.is_prepared {
        return Err(DeliveryError::conflict("order is not prepared yet"));
    }

    let courier = store.get_courier(courier_id).await?;
    let raw_location = requested_location
        .map(str::to_string)
        .or_else(|| courier.location.clone().filter(|l| !l.trim().is_empty()))
        .ok_or_else(|| DeliveryError::validation("courier location is unknown"))?;

    let courier_point = resolve_location(geocoder, &raw_location).await?;
    let delivery_point = resolve_location(geocoder, &order.location).await?;

    let distance_km = eta::haversine_km(courier_point, delivery_point);
    let max_preparation = store.max_preparation_minutes(order_id).await?;
    let expected = eta::expected_delivery_time(
        order.time_of_creation,
        max_preparation,
        distance_km,
        settings,
    );
    debug!(
        order_id,
        courier_id, distance_km, ?max_preparation, "computed delivery estimate"
    );

    let stored_location = format!("{},{}", courier_point.lat, courier_point.lon);
    let updated = store
        .claim_order(order_id, courier_id, &stored_location, expected)
        .await?;

    histogram!("order_claim_distance_km").record(distance_km);
    info!(order_id, courier_id, distance_km, "courier assigned to order");
    Ok(updated)
}
