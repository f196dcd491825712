//! Shared types for the order relay
//!
//! Common types used by the service and its clients: the unified error
//! system, the order record, and the real-time WebSocket protocol.

pub mod error;
pub mod order;
pub mod realtime;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult, ErrorCode};
pub use realtime::{ChangeEvent, ChangeOperation, ConnectedAck, DecodeFailure, RelayPayload};
