//! Relay path from notification channel to client outboxes, driven by the
//! in-memory change source.

use std::time::Duration;

use axum::extract::ws::Message;
use order_relay::relay::{
    Broadcaster, ClientRegistry, ConnectionState, DEFAULT_CHANNEL, MemoryChangeSource, Supervisor,
    SupervisorConfig, SupervisorStatus,
};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Relay {
    source: MemoryChangeSource,
    registry: ClientRegistry,
    status: watch::Receiver<SupervisorStatus>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Relay {
    fn start() -> Self {
        let source = MemoryChangeSource::new();
        let registry = ClientRegistry::default();
        let shutdown = CancellationToken::new();
        let supervisor = Supervisor::new(
            source.clone(),
            SupervisorConfig::default(),
            Broadcaster::new(registry.clone()),
            shutdown.clone(),
        );
        let status = supervisor.status();
        let task = tokio::spawn(supervisor.run());
        Self {
            source,
            registry,
            status,
            shutdown,
            task,
        }
    }

    async fn wait_for(&mut self, f: impl FnMut(&SupervisorStatus) -> bool) {
        tokio::time::timeout(Duration::from_secs(120), self.status.wait_for(f))
            .await
            .expect("status condition timed out")
            .expect("supervisor stopped");
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap();
    }
}

async fn next_json(rx: &mut mpsc::Receiver<Message>) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("frame timed out")
        .expect("outbox closed");
    match frame {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("Expected Text, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn insert_reaches_connected_client_after_ack() {
    let mut relay = Relay::start();
    relay
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await;

    let (_session, mut rx) = relay.registry.register();
    let ack = next_json(&mut rx).await;
    assert_eq!(ack["info"], "connected");

    let payload = json!({
        "operation": "insert",
        "table": "orders",
        "row": {"id": 7, "customer_name": "Ann", "product_name": "Lamp", "status": "pending"}
    });
    assert!(relay.source.notify(DEFAULT_CHANNEL, payload.to_string()));

    let event = next_json(&mut rx).await;
    assert_eq!(event, payload);

    relay.stop().await;
}

#[tokio::test(start_paused = true)]
async fn every_client_receives_the_same_event() {
    let mut relay = Relay::start();
    relay
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await;

    let mut clients: Vec<_> = (0..4).map(|_| relay.registry.register()).collect();
    for (_, rx) in &mut clients {
        next_json(rx).await;
    }

    relay.source.notify(
        DEFAULT_CHANNEL,
        r#"{"operation":"update","table":"orders","row":{"id":2,"status":"shipped"}}"#,
    );

    for (_, rx) in &mut clients {
        let event = next_json(rx).await;
        assert_eq!(event["operation"], "update");
        assert_eq!(event["row"]["status"], "shipped");
    }

    relay.stop().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_is_forwarded_as_parse_failure() {
    let mut relay = Relay::start();
    relay
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await;
    let (_session, mut rx) = relay.registry.register();
    next_json(&mut rx).await;

    relay.source.notify(DEFAULT_CHANNEL, "not-json{");

    let frame = next_json(&mut rx).await;
    assert_eq!(frame["error"], "Parse failed");
    assert_eq!(frame["raw_payload"], "not-json{");
    assert!(frame["when"].is_string());

    relay.stop().await;
}

#[tokio::test(start_paused = true)]
async fn clients_survive_upstream_reconnect() {
    let mut relay = Relay::start();
    relay
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await;
    let (session, mut rx) = relay.registry.register();
    next_json(&mut rx).await;

    relay.source.fail_next_opens(1);
    assert!(relay.source.drop_connection());
    relay.wait_for(|s| s.disconnects == 1).await;

    // one failed attempt at +5s, success at +10s
    relay.wait_for(|s| s.sessions_established == 2).await;
    assert_eq!(relay.status.borrow().connect_attempts, 3);
    assert!(relay.registry.contains(&session.id()));

    relay.source.notify(
        DEFAULT_CHANNEL,
        r#"{"operation":"delete","table":"orders","row":{"id":7}}"#,
    );
    let event = next_json(&mut rx).await;
    assert_eq!(event["operation"], "delete");
    assert_eq!(event["row"]["id"], 7);

    relay.stop().await;
}

#[tokio::test(start_paused = true)]
async fn notifications_are_relayed_in_commit_order() {
    let mut relay = Relay::start();
    relay
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await;
    let (_session, mut rx) = relay.registry.register();
    next_json(&mut rx).await;

    for id in 1..=5 {
        relay.source.notify(
            DEFAULT_CHANNEL,
            json!({"operation": "insert", "table": "orders", "row": {"id": id}}).to_string(),
        );
    }

    for id in 1..=5 {
        assert_eq!(next_json(&mut rx).await["row"]["id"], id);
    }

    relay.stop().await;
}

#[tokio::test(start_paused = true)]
async fn silent_client_is_reaped_without_affecting_others() {
    let mut relay = Relay::start();
    relay
        .wait_for(|s| s.state == ConnectionState::Connected)
        .await;

    let (silent, mut silent_rx) = relay.registry.register();
    let (responsive, mut responsive_rx) = relay.registry.register();
    next_json(&mut responsive_rx).await;

    relay.registry.sweep();
    relay.registry.mark_alive(&responsive.id());
    relay.registry.sweep();

    assert!(!relay.registry.contains(&silent.id()));
    assert!(relay.registry.contains(&responsive.id()));

    assert!(matches!(responsive_rx.recv().await, Some(Message::Ping(_))));
    assert!(matches!(responsive_rx.recv().await, Some(Message::Ping(_))));

    relay.source.notify(
        DEFAULT_CHANNEL,
        r#"{"operation":"insert","table":"orders","row":{"id":11}}"#,
    );
    assert_eq!(next_json(&mut responsive_rx).await["row"]["id"], 11);

    // the reaped client only ever saw its ack and the first liveness ping
    let mut frames = Vec::new();
    while let Ok(frame) = silent_rx.try_recv() {
        frames.push(frame);
    }
    assert_eq!(frames.len(), 2, "{frames:?}");
    assert!(matches!(&frames[0], Message::Text(text) if text.as_str().contains("\"connected\"")));
    assert!(matches!(frames[1], Message::Ping(_)));

    relay.stop().await;
}
