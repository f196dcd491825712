//! In-process change source
//!
//! Stands in for the database in tests and local demos: the controlling
//! handle pushes notifications, drops the connection, makes opens and
//! keep-alive pings fail, or leaves round-trips unanswered.

use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::source::{ChangeSession, ChangeSource, Notification, SourceError};

type Feed = mpsc::UnboundedSender<Result<Notification, SourceError>>;

#[derive(Debug, Default)]
struct Inner {
    opens: AtomicUsize,
    failing_opens: AtomicUsize,
    pings: AtomicUsize,
    failing_pings: AtomicBool,
    /// Pings and closes never complete, as on a half-open socket
    unresponsive: AtomicBool,
    /// Feed of the most recently opened session
    current: Mutex<Option<Feed>>,
}

impl Inner {
    fn current(&self) -> MutexGuard<'_, Option<Feed>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cloneable handle; every clone controls the same source
#[derive(Debug, Clone, Default)]
pub struct MemoryChangeSource {
    inner: Arc<Inner>,
}

impl MemoryChangeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `payload` on `channel` through the open session
    pub fn notify(&self, channel: &str, payload: impl Into<String>) -> bool {
        let notification = Notification {
            channel: channel.to_string(),
            payload: payload.into(),
        };
        match self.inner.current().as_ref() {
            Some(feed) => feed.send(Ok(notification)).is_ok(),
            None => false,
        }
    }

    /// Sever the open session; its next read reports the connection lost
    pub fn drop_connection(&self) -> bool {
        self.inner.current().take().is_some()
    }

    /// Push an out-of-band transport error into the open session
    pub fn inject_error(&self, error: SourceError) -> bool {
        match self.inner.current().as_ref() {
            Some(feed) => feed.send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// Make the next `n` opens fail
    pub fn fail_next_opens(&self, n: usize) {
        self.inner.failing_opens.store(n, Ordering::SeqCst);
    }

    pub fn set_ping_failure(&self, failing: bool) {
        self.inner.failing_pings.store(failing, Ordering::SeqCst);
    }

    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.inner.unresponsive.store(unresponsive, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.inner.pings.load(Ordering::SeqCst)
    }

    /// A session is open and still being read
    pub fn is_connected(&self) -> bool {
        self.inner
            .current()
            .as_ref()
            .is_some_and(|feed| !feed.is_closed())
    }
}

#[async_trait]
impl ChangeSource for MemoryChangeSource {
    type Session = MemorySession;

    async fn open(&self) -> Result<MemorySession, SourceError> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .inner
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SourceError::Connect("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.current() = Some(tx);
        Ok(MemorySession {
            rx,
            inner: self.inner.clone(),
            listening: None,
        })
    }
}

pub struct MemorySession {
    rx: mpsc::UnboundedReceiver<Result<Notification, SourceError>>,
    inner: Arc<Inner>,
    listening: Option<String>,
}

#[async_trait]
impl ChangeSession for MemorySession {
    async fn subscribe(&mut self, channel: &str) -> Result<(), SourceError> {
        self.listening = Some(channel.to_string());
        Ok(())
    }

    async fn verify(&mut self, channel: &str) -> Result<(), SourceError> {
        match self.listening.as_deref() {
            Some(c) if c == channel => Ok(()),
            _ => Err(SourceError::NotListening(channel.to_string())),
        }
    }

    async fn ping(&mut self) -> Result<(), SourceError> {
        self.inner.pings.fetch_add(1, Ordering::SeqCst);
        if self.inner.unresponsive.load(Ordering::SeqCst) {
            pending::<()>().await;
        }
        if self.inner.failing_pings.load(Ordering::SeqCst) {
            return Err(SourceError::Keepalive("ping refused".to_string()));
        }
        Ok(())
    }

    async fn next_notification(&mut self) -> Result<Notification, SourceError> {
        match self.rx.recv().await {
            Some(item) => item,
            None => Err(SourceError::ConnectionLost),
        }
    }

    async fn close(&mut self) {
        if self.inner.unresponsive.load(Ordering::SeqCst) {
            pending::<()>().await;
        }
        self.rx.close();
    }
}
