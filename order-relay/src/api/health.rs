//! Health check endpoint

use axum::Json;
use axum::extract::State;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let relay = state.relay_status.borrow().clone();
    Json(serde_json::json!({
        "status": "ok",
        "service": "order-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "relay": relay,
        "clients": state.registry.len(),
    }))
}
