use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db_model::{CartLineDetail, DbCourier, DbCustomer, DbDish, DbOrderRecord, NewDish};
use crate::error::DeliveryError;
use crate::model::ModelId;

/// Cart operations: line accumulation and the checkout transition.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Add `quantity` of a dish to the customer's cart, merging into an
    /// existing line. Returns the full cart contents.
    async fn add_dish_to_cart(
        &self,
        customer_id: ModelId,
        dish_id: ModelId,
        quantity: i32,
    ) -> Result<Vec<CartLineDetail>, DeliveryError>;

    async fn cart_lines(&self, customer_id: ModelId) -> Result<Vec<CartLineDetail>, DeliveryError>;

    /// Convert the cart into an order: debit the balance, snapshot the
    /// lines, create the zero-state status row and empty the cart — all in
    /// one transaction.
    async fn checkout(&self, customer_id: ModelId) -> Result<DbOrderRecord, DeliveryError>;
}

/// Order lifecycle operations and role-scoped listings.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, order_id: ModelId) -> Result<DbOrderRecord, DeliveryError>;

    /// Orders a courier may claim: not delivered and not yet assigned.
    async fn list_claimable_orders(&self) -> Result<Vec<DbOrderRecord>, DeliveryError>;

    /// Orders the kitchen still has to prepare.
    async fn list_unprepared_orders(&self) -> Result<Vec<DbOrderRecord>, DeliveryError>;

    /// Undelivered orders assigned to the given courier.
    async fn list_courier_orders(
        &self,
        courier_id: ModelId,
    ) -> Result<Vec<DbOrderRecord>, DeliveryError>;

    async fn list_all_orders(&self) -> Result<Vec<DbOrderRecord>, DeliveryError>;

    /// Slowest preparation time across the order's line snapshots.
    async fn max_preparation_minutes(
        &self,
        order_id: ModelId,
    ) -> Result<Option<i32>, DeliveryError>;

    async fn mark_prepared(
        &self,
        order_id: ModelId,
        kitchen_worker_id: ModelId,
    ) -> Result<DbOrderRecord, DeliveryError>;

    async fn mark_delivered(
        &self,
        order_id: ModelId,
        courier_id: ModelId,
    ) -> Result<DbOrderRecord, DeliveryError>;

    /// Bind a courier to an order. The delivered/claimed/prepared checks
    /// run again inside the transaction under a row lock, so of two
    /// concurrent claimers exactly one wins and the other gets `Conflict`.
    async fn claim_order(
        &self,
        order_id: ModelId,
        courier_id: ModelId,
        courier_location: &str,
        expected_time_of_delivery: DateTime<Utc>,
    ) -> Result<DbOrderRecord, DeliveryError>;
}

/// Account and catalogue operations. `add_balance` is the only credit path;
/// `CartStore::checkout` is the only debit path.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_customer(&self, customer_id: ModelId) -> Result<DbCustomer, DeliveryError>;

    async fn get_courier(&self, courier_id: ModelId) -> Result<DbCourier, DeliveryError>;

    /// Credit the customer's balance. Returns the new balance.
    async fn add_balance(&self, customer_id: ModelId, amount: f64) -> Result<f64, DeliveryError>;

    async fn update_courier_location(
        &self,
        courier_id: ModelId,
        location: &str,
    ) -> Result<(), DeliveryError>;

    async fn create_dish(&self, dish: NewDish) -> Result<DbDish, DeliveryError>;

    async fn list_dishes(&self) -> Result<Vec<DbDish>, DeliveryError>;
}

/// The full storage surface the HTTP layer is constructed with.
pub trait DeliveryStore: CartStore + OrderStore + AccountStore {}

impl<T: CartStore + OrderStore + AccountStore> DeliveryStore for T {}
