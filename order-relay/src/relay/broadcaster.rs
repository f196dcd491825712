//! Fan-out of decoded notifications to every ready session

use axum::extract::ws::{Message, Utf8Bytes};
use shared::realtime::RelayPayload;

use super::registry::ClientRegistry;

/// Per-call delivery accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions in the registry snapshot
    pub total: usize,
    /// Frames queued
    pub delivered: usize,
    /// Sessions not in a ready state
    pub skipped: usize,
    /// Ready sessions whose outbox rejected the frame
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: ClientRegistry,
    forward_decode_failures: bool,
}

impl Broadcaster {
    pub fn new(registry: ClientRegistry) -> Self {
        Self {
            registry,
            forward_decode_failures: true,
        }
    }

    /// Whether [`RelayPayload::Failure`] is pushed to clients (default: yes)
    pub fn with_decode_failures(mut self, forward: bool) -> Self {
        self.forward_decode_failures = forward;
        self
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Serialize once and queue the frame on every ready session
    ///
    /// Never waits on a client: each session gets a `try_send`, and a full or
    /// closed outbox only affects that session.
    pub fn broadcast(&self, payload: &RelayPayload) -> BroadcastReport {
        if payload.is_failure() && !self.forward_decode_failures {
            tracing::debug!("Decode failure not forwarded to clients");
            return BroadcastReport::default();
        }

        let sessions = self.registry.snapshot();
        let mut report = BroadcastReport {
            total: sessions.len(),
            ..Default::default()
        };
        if sessions.is_empty() {
            tracing::info!("No WebSocket clients connected");
            return report;
        }

        let text: Utf8Bytes = match serde_json::to_string(payload) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!("Failed to serialize relay payload: {e}");
                return report;
            }
        };

        for session in &sessions {
            if !session.is_ready() {
                report.skipped += 1;
                continue;
            }
            match session.try_deliver(Message::Text(text.clone())) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(client_id = %session.id(), "Broadcast delivery failed: {e}");
                }
            }
        }

        tracing::info!(
            delivered = report.delivered,
            total = report.total,
            "Broadcasted to {}/{} clients",
            report.delivered,
            report.total
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::realtime::{ChangeEvent, DecodeFailure};
    use tokio::sync::mpsc;

    fn insert_event() -> RelayPayload {
        let event: ChangeEvent = serde_json::from_value(json!({
            "operation": "insert",
            "table": "orders",
            "row": {"id": 7, "customer_name": "Ann"}
        }))
        .unwrap();
        RelayPayload::Event(event)
    }

    fn drain_ack(rx: &mut mpsc::Receiver<Message>) {
        assert!(matches!(rx.try_recv(), Ok(Message::Text(_))));
    }

    #[test]
    fn empty_registry_is_a_no_op() {
        let broadcaster = Broadcaster::new(ClientRegistry::default());
        assert_eq!(broadcaster.broadcast(&insert_event()), BroadcastReport::default());
    }

    #[test]
    fn every_ready_session_gets_one_copy() {
        let registry = ClientRegistry::default();
        let broadcaster = Broadcaster::new(registry.clone());
        let mut receivers: Vec<_> = (0..3).map(|_| registry.register().1).collect();
        receivers.iter_mut().for_each(drain_ack);

        let report = broadcaster.broadcast(&insert_event());
        assert_eq!(report.delivered, 3);
        assert_eq!(report.total, 3);

        for rx in &mut receivers {
            match rx.try_recv().unwrap() {
                Message::Text(text) => {
                    let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                    assert_eq!(value["row"]["customer_name"], "Ann");
                }
                other => panic!("Expected Text, got {other:?}"),
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn sessions_not_ready_are_skipped() {
        let registry = ClientRegistry::default();
        let broadcaster = Broadcaster::new(registry.clone());

        let (_live, mut live_rx) = registry.register();
        let (_gone, gone_rx) = registry.register();
        let (closing, mut closing_rx) = registry.register();
        drop(gone_rx);
        closing.terminate();
        drain_ack(&mut live_rx);
        drain_ack(&mut closing_rx);

        let report = broadcaster.broadcast(&insert_event());
        assert_eq!(
            report,
            BroadcastReport {
                total: 3,
                delivered: 1,
                skipped: 2,
                failed: 0
            }
        );
        assert!(live_rx.try_recv().is_ok());
        assert!(closing_rx.try_recv().is_err());
        // skipped sessions stay registered until the sweep reaps them
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn full_outbox_is_isolated() {
        let registry = ClientRegistry::new(1);
        let broadcaster = Broadcaster::new(registry.clone());

        let (_slow, _slow_rx) = registry.register(); // ack fills capacity 1
        let (_fast, mut fast_rx) = registry.register();
        drain_ack(&mut fast_rx);

        let report = broadcaster.broadcast(&insert_event());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(fast_rx.try_recv().is_ok());
    }

    #[test]
    fn decode_failures_can_be_withheld() {
        let registry = ClientRegistry::default();
        let (_s, mut rx) = registry.register();
        drain_ack(&mut rx);

        let failure = RelayPayload::Failure(DecodeFailure::new("garbage"));

        let withheld = Broadcaster::new(registry.clone()).with_decode_failures(false);
        assert_eq!(withheld.broadcast(&failure).delivered, 0);
        assert!(rx.try_recv().is_err());

        let forwarded = Broadcaster::new(registry);
        assert_eq!(forwarded.broadcast(&failure).delivered, 1);
        match rx.try_recv().unwrap() {
            Message::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(value["raw_payload"], "garbage");
            }
            other => panic!("Expected Text, got {other:?}"),
        }
    }
}
