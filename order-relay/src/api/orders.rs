//! Order CRUD handlers
//!
//! Request validation happens before a connection is taken from the pool.

use axum::Json;
use axum::extract::{Path, State};
use shared::error::AppError;
use shared::order::{CreateOrderRequest, Order, UpdateOrderRequest, parse_order_id};

use super::ApiResult;
use crate::db::orders;
use crate::state::AppState;

/// GET /orders
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<Order>> {
    let orders = orders::list(&state.pool).await?;
    Ok(Json(orders))
}

/// POST /orders
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    let new_order = req.validate()?;

    let mut tx = state.pool.begin().await?;
    let order = orders::insert(&mut tx, &new_order).await?;
    tx.commit().await?;

    tracing::info!(order_id = order.id, customer = %order.customer_name, "Order created");
    Ok(Json(order))
}

/// PUT /orders/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(req): Json<UpdateOrderRequest>,
) -> ApiResult<Order> {
    let id = parse_order_id(&raw_id)?;
    let status = req.validate()?;

    let mut tx = state.pool.begin().await?;
    let order = orders::update_status(&mut tx, id, &status)
        .await?
        .ok_or_else(|| AppError::order_not_found(id))?;
    tx.commit().await?;

    tracing::info!(order_id = id, %status, "Order status updated");
    Ok(Json(order))
}

/// DELETE /orders/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Order> {
    let id = parse_order_id(&raw_id)?;

    let mut tx = state.pool.begin().await?;
    let order = orders::delete(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::order_not_found(id))?;
    tx.commit().await?;

    tracing::info!(order_id = id, "Order deleted");
    Ok(Json(order))
}
