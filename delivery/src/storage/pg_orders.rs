use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::info;

use crate::db_model::DbOrderRecord;
use crate::error::DeliveryError;
use crate::model::ModelId;
use crate::storage::pg::PgDeliveryStore;
use crate::storage::store::OrderStore;

const SELECT_ORDER: &str = r#"
SELECT o.id, o.customer_id, o.courier_id, o.kitchen_worker_id,
       o.price, o.weight, o.location,
       o.time_of_creation, o.expected_time_of_delivery, o.time_of_delivery,
       s.is_prepared, s.is_delivered
FROM orders o
JOIN order_status s ON s.order_id = o.id
WHERE o.id = $1
"#;

// Locks both the order row and its status row so the check-then-set in the
// lifecycle transitions cannot interleave with a concurrent claimer.
const SELECT_ORDER_FOR_UPDATE: &str = r#"
SELECT o.id, o.customer_id, o.courier_id, o.kitchen_worker_id,
       o.price, o.weight, o.location,
       o.time_of_creation, o.expected_time_of_delivery, o.time_of_delivery,
       s.is_prepared, s.is_delivered
FROM orders o
JOIN order_status s ON s.order_id = o.id
WHERE o.id = $1
FOR UPDATE OF o, s
"#;

const LIST_CLAIMABLE: &str = r#"
SELECT o.id, o.customer_id, o.courier_id, o.kitchen_worker_id,
       o.price, o.weight, o.location,
       o.time_of_creation, o.expected_time_of_delivery, o.time_of_delivery,
       s.is_prepared, s.is_delivered
FROM orders o
JOIN order_status s ON s.order_id = o.id
WHERE s.is_delivered = FALSE AND o.courier_id IS NULL
ORDER BY o.id
"#;

const LIST_UNPREPARED: &str = r#"
SELECT o.id, o.customer_id, o.courier_id, o.kitchen_worker_id,
       o.price, o.weight, o.location,
       o.time_of_creation, o.expected_time_of_delivery, o.time_of_delivery,
       s.is_prepared, s.is_delivered
FROM orders o
JOIN order_status s ON s.order_id = o.id
WHERE s.is_prepared = FALSE
ORDER BY o.id
"#;

const LIST_FOR_COURIER: &str = r#"
SELECT o.id, o.customer_id, o.courier_id, o.kitchen_worker_id,
       o.price, o.weight, o.location,
       o.time_of_creation, o.expected_time_of_delivery, o.time_of_delivery,
       s.is_prepared, s.is_delivered
FROM orders o
JOIN order_status s ON s.order_id = o.id
WHERE o.courier_id = $1 AND s.is_delivered = FALSE
ORDER BY o.id
"#;

const LIST_ALL: &str = r#"
SELECT o.id, o.customer_id, o.courier_id, o.kitchen_worker_id,
       o.price, o.weight, o.location,
       o.time_of_creation, o.expected_time_of_delivery, o.time_of_delivery,
       s.is_prepared, s.is_delivered
FROM orders o
JOIN order_status s ON s.order_id = o.id
ORDER BY o.id
"#;

async fn order_for_update(
    conn: &mut PgConnection,
    order_id: ModelId,
) -> Result<DbOrderRecord, DeliveryError> {
    sqlx::query_as::<_, DbOrderRecord>(SELECT_ORDER_FOR_UPDATE)
        .bind(order_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DeliveryError::not_found("order"))
}

#[async_trait]
impl OrderStore for PgDeliveryStore {
    async fn get_order(&self, order_id: ModelId) -> Result<DbOrderRecord, DeliveryError> {
        sqlx::query_as::<_, DbOrderRecord>(SELECT_ORDER)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DeliveryError::not_found("order"))
    }

    async fn list_claimable_orders(&self) -> Result<Vec<DbOrderRecord>, DeliveryError> {
        Ok(sqlx::query_as::<_, DbOrderRecord>(LIST_CLAIMABLE)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_unprepared_orders(&self) -> Result<Vec<DbOrderRecord>, DeliveryError> {
        Ok(sqlx::query_as::<_, DbOrderRecord>(LIST_UNPREPARED)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_courier_orders(
        &self,
        courier_id: ModelId,
    ) -> Result<Vec<DbOrderRecord>, DeliveryError> {
        Ok(sqlx::query_as::<_, DbOrderRecord>(LIST_FOR_COURIER)
            .bind(courier_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_all_orders(&self) -> Result<Vec<DbOrderRecord>, DeliveryError> {
        Ok(sqlx::query_as::<_, DbOrderRecord>(LIST_ALL)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn max_preparation_minutes(
        &self,
        order_id: ModelId,
    ) -> Result<Option<i32>, DeliveryError> {
        let max = sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(preparation_minutes) FROM order_lines WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(max)
    }

    async fn mark_prepared(
        &self,
        order_id: ModelId,
        kitchen_worker_id: ModelId,
    ) -> Result<DbOrderRecord, DeliveryError> {
        let mut tx = self.pool.begin().await?;

        let mut order = order_for_update(&mut tx, order_id).await?;
        if order.is_delivered {
            // A delivered order is terminal; re-preparing it is a logic
            // error, not something to overwrite.
            return Err(DeliveryError::conflict("order is already delivered"));
        }

        sqlx::query_scalar::<_, ModelId>("SELECT id FROM kitchen_workers WHERE id = $1")
            .bind(kitchen_worker_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DeliveryError::not_found("kitchen worker"))?;

        sqlx::query("UPDATE order_status SET is_prepared = TRUE, is_delivered = FALSE WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE orders SET kitchen_worker_id = $1 WHERE id = $2")
            .bind(kitchen_worker_id)
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        order.is_prepared = true;
        order.kitchen_worker_id = Some(kitchen_worker_id);
        info!(order_id, kitchen_worker_id, "order marked prepared");
        Ok(order)
    }

    async fn mark_delivered(
        &self,
        order_id: ModelId,
        courier_id: ModelId,
    ) -> Result<DbOrderRecord, DeliveryError> {
        let mut tx = self.pool.begin().await?;

        let mut order = order_for_update(&mut tx, order_id).await?;
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

        sqlx::query("UPDATE order_status SET is_delivered = TRUE WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        let delivered_at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "UPDATE orders SET time_of_delivery = NOW() WHERE id = $1 RETURNING time_of_delivery",
        )
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        order.is_delivered = true;
        order.time_of_delivery = delivered_at;
        info!(order_id, courier_id, "order delivered");
        Ok(order)
    }

    async fn claim_order(
        &self,
        order_id: ModelId,
        courier_id: ModelId,
        courier_location: &str,
        expected_time_of_delivery: DateTime<Utc>,
    ) -> Result<DbOrderRecord, DeliveryError> {
        let mut tx = self.pool.begin().await?;

        // Re-check under the row lock: of two couriers racing for the same
        // order, the second sees the first one's courier_id and conflicts.
        let mut order = order_for_update(&mut tx, order_id).await?;
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

        sqlx::query("UPDATE orders SET courier_id = $1, expected_time_of_delivery = $2 WHERE id = $3")
            .bind(courier_id)
            .bind(expected_time_of_delivery)
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE couriers SET location = $1 WHERE id = $2")
            .bind(courier_location)
            .bind(courier_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DeliveryError::not_found("courier"));
        }

        tx.commit().await?;

        order.courier_id = Some(courier_id);
        order.expected_time_of_delivery = Some(expected_time_of_delivery);
        info!(order_id, courier_id, "courier claimed order");
        Ok(order)
    }
}
