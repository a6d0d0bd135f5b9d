use chrono::{DateTime, Utc, serde::ts_seconds, serde::ts_seconds_option};
use serde::{Deserialize, Serialize};
use std::error::Error;
use strum_macros::{Display as EnumDisplay, EnumString};

use crate::db_model::DbOrderRecord;
use crate::error::DeliveryError;

pub type ModelId = i64;

pub type GenericError = Box<dyn Error + Send + Sync>;

/// Closed set of actor roles. The upstream auth service issues the role
/// claim as a string; there is no numeric role id anywhere in this crate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumDisplay, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Customer,
    Courier,
    KitchenWorker,
    Admin,
}

/// Authenticated identity as supplied by the auth collaborator. The role
/// claim is trusted; credentials are never re-validated here.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub id: ModelId,
    pub role: Role,
    pub is_active: bool,
}

impl Principal {
    pub fn require(&self, role: Role) -> Result<(), DeliveryError> {
        if self.role == role {
            Ok(())
        } else {
            Err(DeliveryError::forbidden(format!("{} role required", role)))
        }
    }
}

/// Derived view of where an order sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumDisplay)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderState {
    Created,
    Prepared,
    Assigned,
    Delivered,
}

impl OrderState {
    pub fn of(record: &DbOrderRecord) -> Self {
        if record.is_delivered {
            Self::Delivered
        } else if record.courier_id.is_some() {
            Self::Assigned
        } else if record.is_prepared {
            Self::Prepared
        } else {
            Self::Created
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSchema {
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
    pub state: OrderState,
    pub is_prepared: bool,
    pub is_delivered: bool,
}

impl From<DbOrderRecord> for OrderSchema {
    fn from(record: DbOrderRecord) -> Self {
        let state = OrderState::of(&record);
        Self {
            id: record.id,
            customer_id: record.customer_id,
            courier_id: record.courier_id,
            kitchen_worker_id: record.kitchen_worker_id,
            price: record.price,
            weight: record.weight,
            location: record.location,
            time_of_creation: record.time_of_creation,
            expected_time_of_delivery: record.expected_time_of_delivery,
            time_of_delivery: record.time_of_delivery,
            state,
            is_prepared: record.is_prepared,
            is_delivered: record.is_delivered,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusSchema {
    pub order_id: ModelId,
    pub is_prepared: bool,
    pub is_delivered: bool,
}

impl From<&DbOrderRecord> for OrderStatusSchema {
    fn from(record: &DbOrderRecord) -> Self {
        Self {
            order_id: record.id,
            is_prepared: record.is_prepared,
            is_delivered: record.is_delivered,
        }
    }
}
