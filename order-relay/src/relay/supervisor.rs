//! Relay supervisor owning the single upstream listening connection
//!
//! ```text
//!                connect()               ok
//!  Disconnected ──────────▶ Connecting ──────▶ Connected
//!       ▲                       │ err             │ keep-alive / transport failure
//!       │                       ▼                 ▼
//!       └──── reconnect timer ◀─┴── schedule_reconnect (fixed delay, one pending)
//! ```
//!
//! All state lives in one task. Timers, notifications and shutdown are
//! multiplexed by a single `select!`, so transitions never interleave and a
//! burst of failure signals collapses into one reconnect.

use std::future::pending;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::broadcaster::Broadcaster;
use super::decoder;
use super::source::{ChangeSession, ChangeSource, Notification, SourceError};

pub const DEFAULT_CHANNEL: &str = "messages_channel";
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the teardown round-trip during shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const PAYLOAD_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Observable supervisor state, published on every change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    pub state: ConnectionState,
    pub channel: String,
    pub keepalive_active: bool,
    pub reconnect_pending: bool,
    pub connect_attempts: u64,
    pub sessions_established: u64,
    pub disconnects: u64,
    pub notifications_relayed: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub channel: String,
    pub keepalive_interval: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    /// A ping that has not answered within this window counts as failed
    pub keepalive_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
        }
    }
}

enum Event {
    Shutdown,
    ReconnectDue,
    KeepaliveDue,
    Notification(Notification),
    TransportError(SourceError),
}

pub struct Supervisor<S: ChangeSource> {
    source: S,
    config: SupervisorConfig,
    broadcaster: Broadcaster,
    shutdown: CancellationToken,
    state: ConnectionState,
    session: Option<S::Session>,
    keepalive: Option<Interval>,
    reconnect_at: Option<Instant>,
    status: watch::Sender<SupervisorStatus>,
}

impl<S: ChangeSource> Supervisor<S> {
    pub fn new(
        source: S,
        config: SupervisorConfig,
        broadcaster: Broadcaster,
        shutdown: CancellationToken,
    ) -> Self {
        let (status, _) = watch::channel(SupervisorStatus {
            channel: config.channel.clone(),
            ..Default::default()
        });
        Self {
            source,
            config,
            broadcaster,
            shutdown,
            state: ConnectionState::Disconnected,
            session: None,
            keepalive: None,
            reconnect_at: None,
            status,
        }
    }

    /// Subscribe to status updates
    pub fn status(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run until the shutdown token fires
    pub async fn run(mut self) {
        tracing::info!(channel = %self.config.channel, "Relay supervisor started");

        self.connect().await;

        loop {
            match self.next_event().await {
                Event::Shutdown => break,
                Event::ReconnectDue => {
                    self.set_reconnect(None);
                    tracing::info!("Attempting reconnection");
                    self.connect().await;
                }
                Event::KeepaliveDue => self.keepalive().await,
                Event::Notification(notification) => self.relay(notification),
                Event::TransportError(e) => {
                    tracing::error!("Upstream connection error: {e}");
                    self.fail(&e);
                }
            }
        }

        self.stop().await;
        tracing::info!("Relay supervisor stopped");
    }

    async fn next_event(&mut self) -> Event {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Event::Shutdown,
            _ = sleep_until(self.reconnect_at) => Event::ReconnectDue,
            _ = tick(self.keepalive.as_mut()) => Event::KeepaliveDue,
            received = recv(self.session.as_mut()) => match received {
                Ok(notification) => Event::Notification(notification),
                Err(e) => Event::TransportError(e),
            },
        }
    }

    /// Open, subscribe and verify a fresh session
    ///
    /// No-op unless Disconnected. On failure the supervisor is Disconnected
    /// with a reconnect scheduled.
    pub async fn connect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            tracing::debug!(state = ?self.state, "Connect skipped");
            return;
        }

        self.transition(ConnectionState::Connecting);
        self.set_reconnect(None);
        self.status.send_modify(|s| s.connect_attempts += 1);
        tracing::info!(channel = %self.config.channel, "Connecting to upstream");

        let attempt = tokio::time::timeout(
            self.config.connect_timeout,
            Self::establish(&self.source, &self.config.channel),
        );
        let outcome = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            result = attempt => Some(result.unwrap_or_else(|_| {
                Err(SourceError::Connect("connection attempt timed out".to_string()))
            })),
        };

        match outcome {
            Some(Ok(session)) => {
                self.session = Some(session);
                self.transition(ConnectionState::Connected);
                self.start_keepalive();
                self.status.send_modify(|s| {
                    s.sessions_established += 1;
                    s.last_error = None;
                });
                tracing::info!(channel = %self.config.channel, "Listening for notifications");
            }
            Some(Err(e)) => {
                tracing::error!("Connection failed: {e}");
                self.record_error(&e);
                self.transition(ConnectionState::Disconnected);
                self.schedule_reconnect();
            }
            None => {
                tracing::info!("Connection attempt abandoned for shutdown");
                self.transition(ConnectionState::Disconnected);
            }
        }
    }

    async fn establish(source: &S, channel: &str) -> Result<S::Session, SourceError> {
        let mut session = source.open().await?;

        let ready = async {
            session.subscribe(channel).await?;
            session.verify(channel).await
        }
        .await;

        match ready {
            Ok(()) => Ok(session),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    /// Handle a failure signal from any source
    ///
    /// Only the first signal for a given connection acts; returns whether
    /// this call transitioned.
    pub fn fail(&mut self, error: &SourceError) -> bool {
        if self.state == ConnectionState::Disconnected {
            tracing::debug!("Failure already handled: {error}");
            return false;
        }

        self.session = None;
        self.stop_keepalive();
        self.transition(ConnectionState::Disconnected);
        self.record_error(error);
        self.status.send_modify(|s| s.disconnects += 1);
        self.schedule_reconnect();
        true
    }

    /// Arm the reconnect timer unless one is already pending
    fn schedule_reconnect(&mut self) {
        if self.reconnect_at.is_some() {
            tracing::debug!("Reconnection already scheduled");
            return;
        }
        tracing::info!(
            delay_secs = self.config.reconnect_delay.as_secs(),
            "Scheduling reconnection"
        );
        self.set_reconnect(Some(Instant::now() + self.config.reconnect_delay));
    }

    /// Start the keep-alive timer, replacing any running one
    fn start_keepalive(&mut self) {
        let period = self.config.keepalive_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keepalive = Some(interval);
        self.status.send_modify(|s| s.keepalive_active = true);
    }

    fn stop_keepalive(&mut self) {
        if self.keepalive.take().is_some() {
            self.status.send_modify(|s| s.keepalive_active = false);
        }
    }

    async fn keepalive(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let probe = tokio::time::timeout(self.config.keepalive_timeout, session.ping());
        let outcome = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            result = probe => result.unwrap_or_else(|_| {
                Err(SourceError::Keepalive("timed out".to_string()))
            }),
        };

        match outcome {
            Ok(()) => tracing::debug!("Keepalive ping successful"),
            Err(e) => {
                tracing::error!("Keepalive failed: {e}");
                self.fail(&e);
            }
        }
    }

    fn relay(&mut self, notification: Notification) {
        let preview: String = notification
            .payload
            .chars()
            .take(PAYLOAD_PREVIEW_CHARS)
            .collect();
        tracing::info!(
            channel = %notification.channel,
            payload_length = notification.payload.len(),
            payload_preview = %preview,
            "Notification received"
        );

        let payload = decoder::decode(&notification.payload);
        self.broadcaster.broadcast(&payload);
        self.status.send_modify(|s| s.notifications_relayed += 1);
    }

    /// Clear both timers, then close the session
    async fn stop(&mut self) {
        self.set_reconnect(None);
        self.stop_keepalive();

        if let Some(mut session) = self.session.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await {
                Ok(()) => tracing::info!("Upstream connection closed"),
                Err(_) => tracing::warn!("Upstream close timed out, dropping connection"),
            }
        }
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::info!(from = ?self.state, to = ?next, "Relay connection state changed");
        self.state = next;
        self.status.send_modify(|s| s.state = next);
    }

    fn set_reconnect(&mut self, at: Option<Instant>) {
        self.reconnect_at = at;
        self.status.send_modify(|s| s.reconnect_pending = at.is_some());
    }

    fn record_error(&self, error: &SourceError) {
        let message = error.to_string();
        self.status.send_modify(|s| s.last_error = Some(message));
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn recv<T: ChangeSession>(session: Option<&mut T>) -> Result<Notification, SourceError> {
    match session {
        Some(session) => session.next_notification().await,
        None => pending().await,
    }
}
