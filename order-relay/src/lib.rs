//! order-relay: order API and change-notification relay
//!
//! Serves CRUD endpoints over the `orders` table and relays every committed
//! change, delivered by a database trigger on a notification channel, to all
//! connected WebSocket clients.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod relay;
pub mod state;

pub use config::Config;
pub use error::{ServiceError, ServiceResult};
pub use state::AppState;
