//! Real-time WebSocket protocol types
//!
//! Server → client push only. The client never sends application messages;
//! its only traffic is the Pong answering a liveness Ping.

pub mod ws;

pub use ws::*;
