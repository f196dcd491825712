//! Order records
//!
//! The order table is the only monitored table: every committed insert,
//! update or delete on it emits one change notification.

pub mod types;

pub use types::*;
