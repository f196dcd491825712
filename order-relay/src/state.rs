//! Application state shared by the HTTP and WebSocket handlers

use sqlx::PgPool;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::relay::{ClientRegistry, SupervisorStatus};

#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL pool for the order endpoints
    pub pool: PgPool,
    /// Live WebSocket sessions
    pub registry: ClientRegistry,
    /// Latest relay supervisor status
    pub relay_status: watch::Receiver<SupervisorStatus>,
    /// Fires on process shutdown; open WebSocket sessions close on it
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        registry: ClientRegistry,
        relay_status: watch::Receiver<SupervisorStatus>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pool,
            registry,
            relay_status,
            shutdown,
        }
    }
}
