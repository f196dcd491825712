//! Upstream change source
//!
//! The relay only consumes a notification channel. [`ChangeSource`] opens a
//! listening session, [`ChangeSession`] subscribes, verifies, pings and yields
//! notifications. [`PgChangeSource`] is the PostgreSQL `LISTEN` implementation.

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use thiserror::Error;

/// A raw notification as delivered by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
}

/// Upstream failure; every variant leads to Disconnected + scheduled reconnect
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("subscribe to {channel} failed: {reason}")]
    Subscribe { channel: String, reason: String },
    #[error("verification failed: {0}")]
    Verify(String),
    #[error("session is not listening on {0}")]
    NotListening(String),
    #[error("keepalive failed: {0}")]
    Keepalive(String),
    #[error("upstream connection lost")]
    ConnectionLost,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Factory for listening sessions
#[async_trait]
pub trait ChangeSource: Send + Sync + 'static {
    type Session: ChangeSession;

    /// Open a fresh upstream transport
    async fn open(&self) -> Result<Self::Session, SourceError>;
}

/// One upstream listening connection
#[async_trait]
pub trait ChangeSession: Send + 'static {
    /// Issue the subscribe-once command for `channel`
    async fn subscribe(&mut self, channel: &str) -> Result<(), SourceError>;

    /// Confirm the session is actually listening on `channel`
    async fn verify(&mut self, channel: &str) -> Result<(), SourceError>;

    /// Trivial round-trip used as a keep-alive probe
    async fn ping(&mut self) -> Result<(), SourceError>;

    /// Wait for the next notification. Connection loss is an error.
    async fn next_notification(&mut self) -> Result<Notification, SourceError>;

    /// Best-effort teardown
    async fn close(&mut self);
}

/// PostgreSQL `LISTEN`/`NOTIFY` source
#[derive(Debug, Clone)]
pub struct PgChangeSource {
    database_url: String,
}

impl PgChangeSource {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl ChangeSource for PgChangeSource {
    type Session = PgChangeSession;

    async fn open(&self) -> Result<PgChangeSession, SourceError> {
        let mut listener = PgListener::connect(&self.database_url)
            .await
            .map_err(|e| SourceError::Connect(e.to_string()))?;

        let (database, user, version): (String, String, String) = sqlx::query_as(
            "SELECT current_database()::text, session_user::text, version()",
        )
        .fetch_one(&mut listener)
        .await
        .map_err(|e| SourceError::Connect(e.to_string()))?;
        tracing::info!(%database, %user, %version, "Upstream connection opened");

        Ok(PgChangeSession { listener })
    }
}

/// Listening session backed by a dedicated [`PgListener`] connection
pub struct PgChangeSession {
    listener: PgListener,
}

#[async_trait]
impl ChangeSession for PgChangeSession {
    async fn subscribe(&mut self, channel: &str) -> Result<(), SourceError> {
        self.listener
            .listen(channel)
            .await
            .map_err(|e| SourceError::Subscribe {
                channel: channel.to_string(),
                reason: e.to_string(),
            })
    }

    async fn verify(&mut self, channel: &str) -> Result<(), SourceError> {
        let channels: Vec<String> = sqlx::query_scalar("SELECT pg_listening_channels()::text")
            .fetch_all(&mut self.listener)
            .await
            .map_err(|e| SourceError::Verify(e.to_string()))?;
        if !channels.iter().any(|c| c == channel) {
            return Err(SourceError::NotListening(channel.to_string()));
        }

        let (pid, application_name, state): (i32, Option<String>, Option<String>) =
            sqlx::query_as(
                "SELECT pid, application_name, state FROM pg_stat_activity
                 WHERE pid = pg_backend_pid()",
            )
            .fetch_one(&mut self.listener)
            .await
            .map_err(|e| SourceError::Verify(e.to_string()))?;
        tracing::info!(
            pid,
            application_name = application_name.as_deref().unwrap_or(""),
            state = state.as_deref().unwrap_or(""),
            channel,
            "Listening session verified"
        );
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), SourceError> {
        sqlx::query("SELECT 1 AS keepalive, now() AS ping_time")
            .execute(&mut self.listener)
            .await
            .map(|_| ())
            .map_err(|e| SourceError::Keepalive(e.to_string()))
    }

    async fn next_notification(&mut self) -> Result<Notification, SourceError> {
        // try_recv yields None once the connection is gone; unlike recv it
        // does not silently reconnect and drop the gap.
        match self.listener.try_recv().await {
            Ok(Some(notification)) => Ok(Notification {
                channel: notification.channel().to_string(),
                payload: notification.payload().to_string(),
            }),
            Ok(None) => Err(SourceError::ConnectionLost),
            Err(e) => Err(SourceError::Transport(e.to_string())),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.listener.unlisten_all().await {
            tracing::debug!("UNLISTEN during close failed: {e}");
        }
    }
}
