//! Order record and request DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Status assigned when a create request omits one
pub const DEFAULT_ORDER_STATUS: &str = "pending";

/// A row of the `orders` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    pub customer_name: String,
    pub product_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// POST /orders
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_name: Option<String>,
    pub product_name: Option<String>,
    pub status: Option<String>,
}

/// Validated insert parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_name: String,
    pub product_name: String,
    pub status: String,
}

impl CreateOrderRequest {
    pub fn validate(self) -> Result<NewOrder, AppError> {
        let customer_name = non_blank(self.customer_name);
        let product_name = non_blank(self.product_name);
        let (Some(customer_name), Some(product_name)) = (customer_name, product_name) else {
            return Err(AppError::validation(
                "customer_name and product_name required",
            ));
        };
        Ok(NewOrder {
            customer_name,
            product_name,
            status: non_blank(self.status).unwrap_or_else(|| DEFAULT_ORDER_STATUS.to_string()),
        })
    }
}

/// PUT /orders/{id}
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: Option<String>,
}

impl UpdateOrderRequest {
    pub fn validate(self) -> Result<String, AppError> {
        non_blank(self.status).ok_or_else(|| AppError::validation("Status required"))
    }
}

/// Parse a path id the way a lenient client expects: leading digits win
pub fn parse_order_id(raw: &str) -> Result<i64, AppError> {
    let trimmed = raw.trim();
    let digits_end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..digits_end]
        .parse::<i64>()
        .map_err(|_| AppError::invalid_request("Invalid order ID"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
