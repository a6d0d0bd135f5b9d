//! Shared in-memory fakes for the delivery test suites.
//!
//! `MemoryStore` mirrors the Postgres store's semantics, including the
//! atomicity of `claim_order` and `checkout` (a single lock guards every
//! mutation), so the concurrency properties can be exercised without a
//! database.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use delivery::cart;
use delivery::db_model::{CartLineDetail, DbCourier, DbCustomer, DbDish, DbOrderRecord, NewDish};
use delivery::error::DeliveryError;
use delivery::eta::Point;
use delivery::geocode::Geocoder;
use delivery::model::ModelId;
use delivery::storage::{AccountStore, CartStore, OrderStore};

#[derive(Default)]
struct MemoryState {
    customers: HashMap<ModelId, DbCustomer>,
    couriers: HashMap<ModelId, DbCourier>,
    kitchen_workers: Vec<ModelId>,
    dishes: HashMap<ModelId, DbDish>,
    // (customer_id, dish_id) -> quantity
    cart_lines: HashMap<(ModelId, ModelId), i32>,
    orders: HashMap<ModelId, DbOrderRecord>,
    order_lines: HashMap<ModelId, Vec<CartLineDetail>>,
    next_order_id: ModelId,
    next_dish_id: ModelId,
}

pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_order_id: 1,
                next_dish_id: 1,
                ..MemoryState::default()
            }),
        }
    }

    pub fn with_customer(self, id: ModelId, balance: f64, location: Option<&str>) -> Self {
        self.state.lock().unwrap().customers.insert(
            id,
            DbCustomer {
                id,
                balance,
                location: location.map(str::to_string),
            },
        );
        self
    }

    pub fn with_courier(self, id: ModelId, location: Option<&str>) -> Self {
        self.state.lock().unwrap().couriers.insert(
            id,
            DbCourier {
                id,
                rating: None,
                rate: 0.1,
                location: location.map(str::to_string),
            },
        );
        self
    }

    pub fn with_kitchen_worker(self, id: ModelId) -> Self {
        self.state.lock().unwrap().kitchen_workers.push(id);
        self
    }

    pub fn with_dish(self, id: ModelId, name: &str, price: f64, weight: f64, preparation_minutes: i32) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.dishes.insert(
                id,
                DbDish {
                    id,
                    name: name.to_string(),
                    price,
                    weight,
                    category: "mains".to_string(),
                    preparation_minutes,
                },
            );
            state.next_dish_id = state.next_dish_id.max(id + 1);
        }
        self
    }

    /// Seed an order directly, bypassing checkout.
    pub fn seed_order(&self, record: DbOrderRecord, lines: Vec<CartLineDetail>) {
        let mut state = self.state.lock().unwrap();
        state.next_order_id = state.next_order_id.max(record.id + 1);
        state.order_lines.insert(record.id, lines);
        state.orders.insert(record.id, record);
    }

    pub fn customer_balance(&self, id: ModelId) -> f64 {
        self.state.lock().unwrap().customers[&id].balance
    }

    pub fn courier_location(&self, id: ModelId) -> Option<String> {
        self.state.lock().unwrap().couriers[&id].location.clone()
    }

    pub fn cart_is_empty(&self, customer_id: ModelId) -> bool {
        !self
            .state
            .lock()
            .unwrap()
            .cart_lines
            .keys()
            .any(|(customer, _)| *customer == customer_id)
    }

    pub fn order(&self, id: ModelId) -> DbOrderRecord {
        self.state.lock().unwrap().orders[&id].clone()
    }

    fn lines_for(state: &MemoryState, customer_id: ModelId) -> Vec<CartLineDetail> {
        let mut lines: Vec<CartLineDetail> = state
            .cart_lines
            .iter()
            .filter(|((customer, _), _)| *customer == customer_id)
            .map(|((_, dish_id), quantity)| {
                let dish = &state.dishes[dish_id];
                CartLineDetail {
                    dish_id: *dish_id,
                    quantity: *quantity,
                    name: dish.name.clone(),
                    unit_price: dish.price,
                    unit_weight: dish.weight,
                    preparation_minutes: dish.preparation_minutes,
                }
            })
            .collect();
        lines.sort_by_key(|line| line.dish_id);
        lines
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn add_dish_to_cart(
        &self,
        customer_id: ModelId,
        dish_id: ModelId,
        quantity: i32,
    ) -> Result<Vec<CartLineDetail>, DeliveryError> {
        if quantity <= 0 {
            return Err(DeliveryError::validation("quantity must be positive"));
        }
        let mut state = self.state.lock().unwrap();
        if !state.customers.contains_key(&customer_id) {
            return Err(DeliveryError::not_found("customer"));
        }
        if !state.dishes.contains_key(&dish_id) {
            return Err(DeliveryError::not_found("dish"));
        }
        *state.cart_lines.entry((customer_id, dish_id)).or_insert(0) += quantity;
        Ok(Self::lines_for(&state, customer_id))
    }

    async fn cart_lines(&self, customer_id: ModelId) -> Result<Vec<CartLineDetail>, DeliveryError> {
        let state = self.state.lock().unwrap();
        Ok(Self::lines_for(&state, customer_id))
    }

    async fn checkout(&self, customer_id: ModelId) -> Result<DbOrderRecord, DeliveryError> {
        let mut state = self.state.lock().unwrap();
        let customer = state
            .customers
            .get(&customer_id)
            .cloned()
            .ok_or_else(|| DeliveryError::not_found("customer"))?;

        let lines = Self::lines_for(&state, customer_id);
        if lines.is_empty() {
            return Err(DeliveryError::conflict("cart is empty"));
        }

        let totals = cart::order_totals(&lines);
        if customer.balance < totals.price {
            return Err(DeliveryError::PaymentRequired {
                required: totals.price,
                balance: customer.balance,
            });
        }

        let location = customer
            .location
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| DeliveryError::not_found("customer location"))?;

        state.customers.get_mut(&customer_id).unwrap().balance -= totals.price;

        let order_id = state.next_order_id;
        state.next_order_id += 1;
        let record = DbOrderRecord {
            id: order_id,
            customer_id,
            courier_id: None,
            kitchen_worker_id: None,
            price: totals.price,
            weight: totals.weight,
            location,
            time_of_creation: Utc::now(),
            expected_time_of_delivery: None,
            time_of_delivery: None,
            is_prepared: false,
            is_delivered: false,
        };
        state.order_lines.insert(order_id, lines);
        state.orders.insert(order_id, record.clone());
        state.cart_lines.retain(|(customer, _), _| *customer != customer_id);
        Ok(record)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get_order(&self, order_id: ModelId) -> Result<DbOrderRecord, DeliveryError> {
        self.state
            .lock()
            .unwrap()
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| DeliveryError::not_found("order"))
    }

    async fn list_claimable_orders(&self) -> Result<Vec<DbOrderRecord>, DeliveryError> {
        let state = self.state.lock().unwrap();
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| !order.is_delivered && order.courier_id.is_none())
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.id);
        Ok(orders)
    }

    async fn list_unprepared_orders(&self) -> Result<Vec<DbOrderRecord>, DeliveryError> {
        let state = self.state.lock().unwrap();
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| !order.is_prepared)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.id);
        Ok(orders)
    }

    async fn list_courier_orders(
        &self,
        courier_id: ModelId,
    ) -> Result<Vec<DbOrderRecord>, DeliveryError> {
        let state = self.state.lock().unwrap();
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| order.courier_id == Some(courier_id) && !order.is_delivered)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.id);
        Ok(orders)
    }

    async fn list_all_orders(&self) -> Result<Vec<DbOrderRecord>, DeliveryError> {
        let state = self.state.lock().unwrap();
        let mut orders: Vec<_> = state.orders.values().cloned().collect();
        orders.sort_by_key(|order| order.id);
        Ok(orders)
    }

    async fn max_preparation_minutes(
        &self,
        order_id: ModelId,
    ) -> Result<Option<i32>, DeliveryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .order_lines
            .get(&order_id)
            .and_then(|lines| lines.iter().map(|line| line.preparation_minutes).max()))
    }

    async fn mark_prepared(
        &self,
        order_id: ModelId,
        kitchen_worker_id: ModelId,
    ) -> Result<DbOrderRecord, DeliveryError> {
        let mut state = self.state.lock().unwrap();
        if !state.kitchen_workers.contains(&kitchen_worker_id) {
            return Err(DeliveryError::not_found("kitchen worker"));
        }
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| DeliveryError::not_found("order"))?;
        if order.is_delivered {
            return Err(DeliveryError::conflict("order is already delivered"));
        }
        order.is_prepared = true;
        order.kitchen_worker_id = Some(kitchen_worker_id);
        Ok(order.clone())
    }

    async fn mark_delivered(
        &self,
        order_id: ModelId,
        courier_id: ModelId,
    ) -> Result<DbOrderRecord, DeliveryError> {
        let mut state = self.state.lock().unwrap();
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| DeliveryError::not_found("order"))?;
        if order.courier_id != Some(courier_id) {
            return Err(DeliveryError::forbidden(
                "you are not the assigned courier for this order",
            ));
        }
        if order.is_delivered {
            return Err(DeliveryError::conflict("order is already delivered"));
        }
        if !order.is_prepared {
            return Err(DeliveryError::conflict("order is not prepared"));
        }
        order.is_delivered = true;
        order.time_of_delivery = Some(Utc::now());
        Ok(order.clone())
    }

    async fn claim_order(
        &self,
        order_id: ModelId,
        courier_id: ModelId,
        courier_location: &str,
        expected_time_of_delivery: DateTime<Utc>,
    ) -> Result<DbOrderRecord, DeliveryError> {
        // One lock guards the check and the write, matching the row-locked
        // transaction in the Postgres store.
        let mut state = self.state.lock().unwrap();
        if !state.couriers.contains_key(&courier_id) {
            return Err(DeliveryError::not_found("courier"));
        }
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| DeliveryError::not_found("order"))?;
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
        order.courier_id = Some(courier_id);
        order.expected_time_of_delivery = Some(expected_time_of_delivery);
        let updated = order.clone();
        state.couriers.get_mut(&courier_id).unwrap().location =
            Some(courier_location.to_string());
        Ok(updated)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_customer(&self, customer_id: ModelId) -> Result<DbCustomer, DeliveryError> {
        self.state
            .lock()
            .unwrap()
            .customers
            .get(&customer_id)
            .cloned()
            .ok_or_else(|| DeliveryError::not_found("customer"))
    }

    async fn get_courier(&self, courier_id: ModelId) -> Result<DbCourier, DeliveryError> {
        self.state
            .lock()
            .unwrap()
            .couriers
            .get(&courier_id)
            .cloned()
            .ok_or_else(|| DeliveryError::not_found("courier"))
    }

    async fn add_balance(&self, customer_id: ModelId, amount: f64) -> Result<f64, DeliveryError> {
        if amount <= 0.0 {
            return Err(DeliveryError::validation("amount must be positive"));
        }
        let mut state = self.state.lock().unwrap();
        let customer = state
            .customers
            .get_mut(&customer_id)
            .ok_or_else(|| DeliveryError::not_found("customer"))?;
        customer.balance += amount;
        Ok(customer.balance)
    }

    async fn update_courier_location(
        &self,
        courier_id: ModelId,
        location: &str,
    ) -> Result<(), DeliveryError> {
        if location.trim().is_empty() {
            return Err(DeliveryError::validation("location must not be empty"));
        }
        let mut state = self.state.lock().unwrap();
        let courier = state
            .couriers
            .get_mut(&courier_id)
            .ok_or_else(|| DeliveryError::not_found("courier"))?;
        courier.location = Some(location.to_string());
        Ok(())
    }

    async fn create_dish(&self, dish: NewDish) -> Result<DbDish, DeliveryError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_dish_id;
        state.next_dish_id += 1;
        let created = DbDish {
            id,
            name: dish.name,
            price: dish.price,
            weight: dish.weight,
            category: dish.category,
            preparation_minutes: dish.preparation_minutes,
        };
        state.dishes.insert(id, created.clone());
        Ok(created)
    }

    async fn list_dishes(&self) -> Result<Vec<DbDish>, DeliveryError> {
        let state = self.state.lock().unwrap();
        let mut dishes: Vec<_> = state.dishes.values().cloned().collect();
        dishes.sort_by_key(|dish| dish.id);
        Ok(dishes)
    }
}

/// Geocoder backed by a fixed address table.
pub struct StaticGeocoder {
    known: HashMap<String, Point>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self {
            known: HashMap::new(),
        }
    }

    pub fn with_address(mut self, address: &str, lat: f64, lon: f64) -> Self {
        self.known.insert(address.to_string(), Point { lat, lon });
        self
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn resolve(&self, address: &str) -> Result<Point, DeliveryError> {
        self.known
            .get(address)
            .copied()
            .ok_or_else(|| DeliveryError::not_found(format!("location for address \"{}\"", address)))
    }
}

/// Geocoder that always fails as the external API would on a timeout.
pub struct UnavailableGeocoder;

#[async_trait]
impl Geocoder for UnavailableGeocoder {
    async fn resolve(&self, _address: &str) -> Result<Point, DeliveryError> {
        Err(DeliveryError::upstream("geocoder request timed out"))
    }
}

/// Order record builder for seeding lifecycle tests.
pub fn order_record(
    id: ModelId,
    customer_id: ModelId,
    location: &str,
    is_prepared: bool,
    courier_id: Option<ModelId>,
) -> DbOrderRecord {
    DbOrderRecord {
        id,
        customer_id,
        courier_id,
        kitchen_worker_id: None,
        price: 250.0,
        weight: 500.0,
        location: location.to_string(),
        time_of_creation: Utc::now(),
        expected_time_of_delivery: None,
        time_of_delivery: None,
        is_prepared,
        is_delivered: false,
    }
}

pub fn snapshot_line(dish_id: ModelId, quantity: i32, preparation_minutes: i32) -> CartLineDetail {
    CartLineDetail {
        dish_id,
        quantity,
        name: format!("dish-{}", dish_id),
        unit_price: 100.0,
        unit_weight: 200.0,
        preparation_minutes,
    }
}
