//! `orders` table queries
//!
//! Mutations run on a caller-held transaction; the change trigger fires once
//! per committed statement.

use shared::order::{NewOrder, Order};
use sqlx::{PgConnection, PgPool};

pub async fn list(pool: &PgPool) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, customer_name, product_name, status, created_at, updated_at
         FROM orders ORDER BY id DESC",
    )
    .fetch_all(pool)
    .await
}

pub async fn insert(conn: &mut PgConnection, order: &NewOrder) -> Result<Order, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO orders (customer_name, product_name, status)
         VALUES ($1, $2, $3)
         RETURNING id, customer_name, product_name, status, created_at, updated_at",
    )
    .bind(&order.customer_name)
    .bind(&order.product_name)
    .bind(&order.status)
    .fetch_one(conn)
    .await
}

pub async fn update_status(
    conn: &mut PgConnection,
    id: i64,
    status: &str,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = now()
         WHERE id = $2
         RETURNING id, customer_name, product_name, status, created_at, updated_at",
    )
    .bind(status)
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        "DELETE FROM orders WHERE id = $1
         RETURNING id, customer_name, product_name, status, created_at, updated_at",
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}
