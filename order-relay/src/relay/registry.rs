//! Registry of live WebSocket sessions
//!
//! Membership lives in a `DashMap` and is only mutated through
//! `register` / `unregister` / `sweep`. Readers take a snapshot of
//! `Arc<ClientSession>` so no shard lock is held while queueing frames.
//!
//! Each session owns a bounded outbox drained by its WebSocket task; queueing
//! is `try_send`, so a slow client can never stall the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use dashmap::DashMap;
use shared::realtime::ConnectedAck;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Default per-session outbox capacity
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("session outbox is full")]
    Full,
    #[error("session is closed")]
    Closed,
}

/// One connected duplex client
#[derive(Debug)]
pub struct ClientSession {
    id: Uuid,
    /// Cleared by each sweep, set again by the client's Pong
    alive: AtomicBool,
    /// Cleared on terminate; closed sessions are skipped by broadcast
    open: AtomicBool,
    outbox: mpsc::Sender<Message>,
    terminate: CancellationToken,
    connected_at: i64,
}

impl ClientSession {
    fn new(outbox: mpsc::Sender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alive: AtomicBool::new(false),
            open: AtomicBool::new(true),
            outbox,
            terminate: CancellationToken::new(),
            connected_at: shared::util::now_millis(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connected_at(&self) -> i64 {
        self.connected_at
    }

    /// Milliseconds since the session registered
    pub fn connected_for_ms(&self) -> i64 {
        shared::util::now_millis() - self.connected_at
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Open and still drained by its WebSocket task
    pub fn is_ready(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.outbox.is_closed()
    }

    /// Queue a frame without waiting
    pub fn try_deliver(&self, msg: Message) -> Result<(), DeliveryError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }
        self.outbox.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Liveness probe acknowledged
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Stop accepting frames and tell the WebSocket task to drop the connection
    pub fn terminate(&self) {
        self.open.store(false, Ordering::Release);
        self.terminate.cancel();
    }

    /// Resolves once [`terminate`](Self::terminate) was called
    pub fn terminated(&self) -> WaitForCancellationFuture<'_> {
        self.terminate.cancelled()
    }
}

/// Result of one liveness sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions that were alive and got a new Ping
    pub probed: usize,
    /// Sessions that never answered the previous Ping
    pub reaped: usize,
}

/// Set of live client sessions
#[derive(Debug, Clone)]
pub struct ClientRegistry {
    sessions: Arc<DashMap<Uuid, Arc<ClientSession>>>,
    outbox_capacity: usize,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl ClientRegistry {
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Add a session and queue its `connected` acknowledgment
    ///
    /// The returned receiver is the session's outbox; the caller's WebSocket
    /// task must drain it. The ack is queued before the session becomes
    /// visible, so it is always the first frame.
    pub fn register(&self) -> (Arc<ClientSession>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        let session = Arc::new(ClientSession::new(tx));

        match serde_json::to_string(&ConnectedAck::now()) {
            Ok(json) => {
                if let Err(e) = session.try_deliver(Message::Text(json.into())) {
                    tracing::warn!(client_id = %session.id, "Failed to queue connected ack: {e}");
                }
            }
            Err(e) => tracing::error!("Failed to serialize connected ack: {e}"),
        }
        session.mark_alive();

        self.sessions.insert(session.id, session.clone());
        tracing::info!(client_id = %session.id, clients = self.len(), "WebSocket client connected");
        (session, rx)
    }

    /// Remove a session regardless of its alive flag
    pub fn unregister(&self, id: &Uuid) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.terminate();
                tracing::info!(
                    client_id = %id,
                    clients = self.len(),
                    connected_ms = session.connected_for_ms(),
                    "WebSocket client disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Record a liveness acknowledgment
    pub fn mark_alive(&self, id: &Uuid) -> bool {
        match self.sessions.get(id) {
            Some(session) => {
                session.mark_alive();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Point-in-time copy of the membership
    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// One liveness pass: reap silent sessions, probe the rest
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for session in self.snapshot() {
            if !session.alive.swap(false, Ordering::AcqRel) {
                session.terminate();
                self.sessions.remove(&session.id);
                report.reaped += 1;
                tracing::info!(
                    client_id = %session.id,
                    connected_ms = session.connected_for_ms(),
                    "Terminated unresponsive WebSocket client"
                );
                continue;
            }

            if let Err(e) = session.try_deliver(Message::Ping(Bytes::new())) {
                tracing::debug!(client_id = %session.id, "Liveness ping not queued: {e}");
            }
            report.probed += 1;
        }

        report
    }

    /// Periodic sweep until `shutdown` fires
    pub async fn run_liveness(self, period: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // skip immediate

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep();
                    if report.reaped > 0 {
                        tracing::info!(
                            probed = report.probed,
                            reaped = report.reaped,
                            "Liveness sweep pruned sessions"
                        );
                    } else {
                        tracing::debug!(probed = report.probed, "Liveness sweep");
                    }
                }
            }
        }

        tracing::info!("Liveness sweep stopped");
    }
}
