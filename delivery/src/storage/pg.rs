use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::db_model::{DbCourier, DbCustomer, DbDish, NewDish};
use crate::error::DeliveryError;
use crate::model::ModelId;
use crate::storage::store::AccountStore;

/// Postgres-backed storage. One pool shared by every request; each mutating
/// operation is a single transaction.
#[derive(Clone)]
pub struct PgDeliveryStore {
    pub pool: PgPool,
}

impl PgDeliveryStore {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../migrations").run(&self.pool).await
    }
}

#[async_trait]
impl AccountStore for PgDeliveryStore {
    async fn get_customer(&self, customer_id: ModelId) -> Result<DbCustomer, DeliveryError> {
        sqlx::query_as::<_, DbCustomer>("SELECT id, balance, location FROM customers WHERE id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DeliveryError::not_found("customer"))
    }

    async fn get_courier(&self, courier_id: ModelId) -> Result<DbCourier, DeliveryError> {
        sqlx::query_as::<_, DbCourier>("SELECT id, rating, rate, location FROM couriers WHERE id = $1")
            .bind(courier_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DeliveryError::not_found("courier"))
    }

    async fn add_balance(&self, customer_id: ModelId, amount: f64) -> Result<f64, DeliveryError> {
        if amount <= 0.0 {
            return Err(DeliveryError::validation("amount must be positive"));
        }

        let balance = sqlx::query_scalar::<_, f64>(
            "UPDATE customers SET balance = balance + $1 WHERE id = $2 RETURNING balance",
        )
        .bind(amount)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DeliveryError::not_found("customer"))?;

        info!(customer_id, amount, balance, "credited customer balance");
        Ok(balance)
    }

    async fn update_courier_location(
        &self,
        courier_id: ModelId,
        location: &str,
    ) -> Result<(), DeliveryError> {
        if location.trim().is_empty() {
            return Err(DeliveryError::validation("location must not be empty"));
        }

        let result = sqlx::query("UPDATE couriers SET location = $1 WHERE id = $2")
            .bind(location)
            .bind(courier_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DeliveryError::not_found("courier"));
        }
        debug!(courier_id, location, "updated courier location");
        Ok(())
    }

    async fn create_dish(&self, dish: NewDish) -> Result<DbDish, DeliveryError> {
        if dish.name.trim().is_empty() {
            return Err(DeliveryError::validation("dish name must not be empty"));
        }
        if dish.price < 0.0 || dish.weight < 0.0 || dish.preparation_minutes < 0 {
            return Err(DeliveryError::validation(
                "price, weight and preparation time must not be negative",
            ));
        }

        let created = sqlx::query_as::<_, DbDish>(
            r#"
            INSERT INTO dishes (name, price, weight, category, preparation_minutes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, price, weight, category, preparation_minutes
            "#,
        )
        .bind(&dish.name)
        .bind(dish.price)
        .bind(dish.weight)
        .bind(&dish.category)
        .bind(dish.preparation_minutes)
        .fetch_one(&self.pool)
        .await?;

        info!(dish_id = created.id, name = %created.name, "created dish");
        Ok(created)
    }

    async fn list_dishes(&self) -> Result<Vec<DbDish>, DeliveryError> {
        let dishes = sqlx::query_as::<_, DbDish>(
            "SELECT id, name, price, weight, category, preparation_minutes FROM dishes ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(dishes)
    }
}
