//! API routes for order-relay

pub mod health;
pub mod orders;
pub mod triggers;
pub mod ws;

use std::path::Path;

use axum::Router;
use axum::routing::{get, put};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

type ApiResult<T> = Result<axum::Json<T>, crate::error::ServiceError>;

/// Create the combined router; unmatched paths fall through to static assets
pub fn create_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let order_routes = Router::new()
        .route("/orders", get(orders::list).post(orders::create))
        .route("/orders/{id}", put(orders::update).delete(orders::delete));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/verify-triggers", get(triggers::verify_triggers))
        .route("/ws", get(ws::handle_client_ws))
        .merge(order_routes)
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
