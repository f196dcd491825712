//! Trigger verification endpoint

use axum::Json;
use axum::extract::State;

use super::ApiResult;
use crate::db::triggers::{self, TriggerReport};
use crate::state::AppState;

/// GET /verify-triggers
pub async fn verify_triggers(State(state): State<AppState>) -> ApiResult<TriggerReport> {
    let report = triggers::inspect(&state.pool).await?;
    if !report.function_exists || report.triggers.is_empty() {
        tracing::warn!(
            function_exists = report.function_exists,
            triggers = report.triggers.len(),
            "Change trigger is not fully installed"
        );
    }
    Ok(Json(report))
}
