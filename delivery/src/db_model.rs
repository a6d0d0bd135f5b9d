use chrono::{DateTime, Utc, serde::ts_seconds, serde::ts_seconds_option};
use serde::{Deserialize, Serialize};

use crate::model::ModelId;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DbDish {
    pub id: ModelId,
    pub name: String,
    pub price: f64,
    pub weight: f64,
    pub category: String,
    pub preparation_minutes: i32,
}

/// Creation payload for the dish catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDish {
    pub name: String,
    pub price: f64,
    pub weight: f64,
    pub category: String,
    pub preparation_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DbCustomer {
    pub id: ModelId,
    pub balance: f64,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DbCourier {
    pub id: ModelId,
    pub rating: Option<f64>,
    pub rate: f64,
    pub location: Option<String>,
}

/// One cart line joined with the dish it points at. The same shape feeds
/// the cart view, the checkout totals and the order line snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartLineDetail {
    pub dish_id: ModelId,
    pub quantity: i32,
    pub name: String,
    pub unit_price: f64,
    pub unit_weight: f64,
    pub preparation_minutes: i32,
}

/// Order row joined with its status flags.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DbOrderRecord {
    pub id: ModelId,
    pub customer_id: ModelId,
    pub courier_id: Option<ModelId>,
    pub kitchen_worker_id: Option<ModelId>,
    pub price: f64,
    pub weight: f64,
    pub location: String,
    #[serde(with = "ts_seconds")]
    pub time_of_creation: DateTime<Utc>,
    #[serde(with = "ts_seconds_option")]
    pub expected_time_of_delivery: Option<DateTime<Utc>>,
    #[serde(with = "ts_seconds_option")]
    pub time_of_delivery: Option<DateTime<Utc>>,
    pub is_prepared: bool,
    pub is_delivered: bool,
}
