//! Change-trigger introspection

use serde::Serialize;
use sqlx::PgPool;

pub const NOTIFY_FUNCTION: &str = "notify_orders_change";
const SOURCE_PREVIEW_CHARS: usize = 200;

/// One row of `information_schema.triggers` for the orders table
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TriggerInfo {
    pub trigger_name: Option<String>,
    pub event_manipulation: Option<String>,
    pub action_timing: Option<String>,
    pub action_statement: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerReport {
    pub triggers: Vec<TriggerInfo>,
    pub function_exists: bool,
    pub function_source: String,
}

pub async fn inspect(pool: &PgPool) -> Result<TriggerReport, sqlx::Error> {
    let triggers: Vec<TriggerInfo> = sqlx::query_as(
        "SELECT trigger_name::text, event_manipulation::text,
                action_timing::text, action_statement::text
         FROM information_schema.triggers
         WHERE event_object_table = 'orders'
         ORDER BY trigger_name, event_manipulation",
    )
    .fetch_all(pool)
    .await?;

    let source: Option<String> = sqlx::query_scalar("SELECT prosrc FROM pg_proc WHERE proname = $1")
        .bind(NOTIFY_FUNCTION)
        .fetch_optional(pool)
        .await?;

    Ok(TriggerReport {
        triggers,
        function_exists: source.is_some(),
        function_source: preview_source(source.as_deref()),
    })
}

fn preview_source(source: Option<&str>) -> String {
    match source {
        Some(src) => {
            let head: String = src.chars().take(SOURCE_PREVIEW_CHARS).collect();
            format!("{head}...")
        }
        None => "Not found".to_string(),
    }
}
