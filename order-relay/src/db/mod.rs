//! Database access layer

pub mod orders;
pub mod triggers;
