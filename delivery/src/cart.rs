//! Cart engine: line aggregation and checkout totals.
//!
//! The totals are computed here, in one place, from the joined cart lines;
//! the storage layer calls into this module inside the checkout transaction
//! so the debited amount and the stored order always agree.

use serde::{Deserialize, Serialize};

use crate::db_model::CartLineDetail;
use crate::model::ModelId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub price: f64,
    pub weight: f64,
}

/// Aggregate price and weight over cart lines: Σ(qty × unit price) and
/// Σ(qty × unit weight).
pub fn order_totals(lines: &[CartLineDetail]) -> Totals {
    let mut totals = Totals {
        price: 0.0,
        weight: 0.0,
    };
    for line in lines {
        let quantity = f64::from(line.quantity);
        totals.price += quantity * line.unit_price;
        totals.weight += quantity * line.unit_weight;
    }
    totals
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSchema {
    pub customer_id: ModelId,
    pub lines: Vec<CartLineDetail>,
    pub total_price: f64,
    pub total_weight: f64,
}

impl CartSchema {
    pub fn from_lines(customer_id: ModelId, lines: Vec<CartLineDetail>) -> Self {
        let totals = order_totals(&lines);
        Self {
            customer_id,
            lines,
            total_price: totals.price,
            total_weight: totals.weight,
        }
    }
}
