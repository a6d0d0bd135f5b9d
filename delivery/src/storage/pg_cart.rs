use async_trait::async_trait;
use sqlx::PgConnection;
use tracing::{debug, info};

use crate::cart;
use crate::db_model::{CartLineDetail, DbCustomer, DbOrderRecord};
use crate::error::DeliveryError;
use crate::model::ModelId;
use crate::storage::pg::PgDeliveryStore;
use crate::storage::store::CartStore;

const SELECT_CART_LINES: &str = r#"
SELECT cl.dish_id, cl.quantity, d.name,
       d.price AS unit_price, d.weight AS unit_weight, d.preparation_minutes
FROM cart_lines cl
JOIN dishes d ON d.id = cl.dish_id
WHERE cl.customer_id = $1
ORDER BY cl.dish_id
"#;

async fn cart_lines_in(
    conn: &mut PgConnection,
    customer_id: ModelId,
) -> Result<Vec<CartLineDetail>, sqlx::Error> {
    sqlx::query_as::<_, CartLineDetail>(SELECT_CART_LINES)
        .bind(customer_id)
        .fetch_all(conn)
        .await
}

#[async_trait]
impl CartStore for PgDeliveryStore {
    async fn add_dish_to_cart(
        &self,
        customer_id: ModelId,
        dish_id: ModelId,
        quantity: i32,
    ) -> Result<Vec<CartLineDetail>, DeliveryError> {
        if quantity <= 0 {
            return Err(DeliveryError::validation("quantity must be positive"));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, ModelId>("SELECT id FROM customers WHERE id = $1")
            .bind(customer_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DeliveryError::not_found("customer"))?;

        sqlx::query_scalar::<_, ModelId>("SELECT id FROM dishes WHERE id = $1")
            .bind(dish_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DeliveryError::not_found("dish"))?;

        // Merging an already-present dish increments the line instead of
        // duplicating it.
        sqlx::query(
            r#"
            INSERT INTO cart_lines (customer_id, dish_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id, dish_id)
            DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity
            "#,
        )
        .bind(customer_id)
        .bind(dish_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        let lines = cart_lines_in(&mut tx, customer_id).await?;
        tx.commit().await?;

        debug!(customer_id, dish_id, quantity, "added dish to cart");
        Ok(lines)
    }

    async fn cart_lines(&self, customer_id: ModelId) -> Result<Vec<CartLineDetail>, DeliveryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(cart_lines_in(&mut conn, customer_id).await?)
    }

    async fn checkout(&self, customer_id: ModelId) -> Result<DbOrderRecord, DeliveryError> {
        let mut tx = self.pool.begin().await?;

        // The customer row lock serializes concurrent checkouts for the
        // same customer, so a cart cannot be spent twice.
        let customer = sqlx::query_as::<_, DbCustomer>(
            "SELECT id, balance, location FROM customers WHERE id = $1 FOR UPDATE",
        )
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DeliveryError::not_found("customer"))?;

        let lines = cart_lines_in(&mut tx, customer_id).await?;
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

        sqlx::query("UPDATE customers SET balance = balance - $1 WHERE id = $2")
            .bind(totals.price)
            .bind(customer_id)
            .execute(&mut *tx)
            .await?;

        let order = sqlx::query_as::<_, DbOrderRecord>(
            r#"
            INSERT INTO orders (customer_id, price, weight, location)
            VALUES ($1, $2, $3, $4)
            RETURNING id, customer_id, courier_id, kitchen_worker_id,
                      price, weight, location,
                      time_of_creation, expected_time_of_delivery, time_of_delivery,
                      FALSE AS is_prepared, FALSE AS is_delivered
            "#,
        )
        .bind(customer_id)
        .bind(totals.price)
        .bind(totals.weight)
        .bind(&location)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO order_status (order_id) VALUES ($1)")
            .bind(order.id)
            .execute(&mut *tx)
            .await?;

        for line in &lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines
                    (order_id, dish_id, quantity, unit_price, unit_weight, preparation_minutes)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id)
            .bind(line.dish_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.unit_weight)
            .bind(line.preparation_minutes)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM cart_lines WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            order_id = order.id,
            customer_id,
            price = order.price,
            weight = order.weight,
            "created order from cart"
        );
        Ok(order)
    }
}
