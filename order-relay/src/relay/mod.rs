//! Change-notification relay
//!
//! ```text
//!  orders trigger ── pg_notify ──▶ ChangeSession (LISTEN)
//!                                        │
//!                                   Supervisor ── keep-alive / reconnect
//!                                        │ decode
//!                                        ▼
//!                                   Broadcaster ── snapshot ──▶ ClientRegistry
//!                                                                  │ try_send
//!                                                                  ▼
//!                                                        per-session outbox ──▶ WebSocket
//! ```
//!
//! The supervisor owns the only upstream connection. Clients never learn
//! about upstream reconnects: their sessions stay registered throughout.

pub mod broadcaster;
pub mod decoder;
pub mod memory;
pub mod registry;
pub mod source;
pub mod supervisor;

pub use broadcaster::{BroadcastReport, Broadcaster};
pub use decoder::decode;
pub use memory::MemoryChangeSource;
pub use registry::{ClientRegistry, ClientSession, DEFAULT_OUTBOX_CAPACITY, DeliveryError, SweepReport};
pub use source::{ChangeSession, ChangeSource, Notification, PgChangeSource, SourceError};
pub use supervisor::{
    ConnectionState, DEFAULT_CHANNEL, Supervisor, SupervisorConfig, SupervisorStatus,
};
