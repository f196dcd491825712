//! WebSocket handler for relay clients
//!
//! A client is receive-only: after the `connected` ack it gets relay frames
//! from its outbox and liveness Pings. The only inbound frames that matter
//! are Pong (liveness) and Close.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::relay::{ClientRegistry, ClientSession};
use crate::state::AppState;

/// GET /ws: upgrade to WebSocket
pub async fn handle_client_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (session, outbox) = state.registry.register();
    let (sink, stream) = socket.split();
    run_session(
        sink,
        stream,
        &state.registry,
        session,
        outbox,
        state.shutdown.clone(),
    )
    .await;
}

/// Pump one session until the client leaves, the session is reaped, or the
/// process shuts down. The session is always unregistered on return.
pub async fn run_session<Si, St, E>(
    mut sink: Si,
    mut stream: St,
    registry: &ClientRegistry,
    session: Arc<ClientSession>,
    mut outbox: mpsc::Receiver<Message>,
    shutdown: CancellationToken,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let client_id = session.id();

    loop {
        tokio::select! {
            _ = session.terminated() => {
                tracing::debug!(%client_id, "Session terminated");
                break;
            }

            _ = shutdown.cancelled() => break,

            // Relay frames and liveness pings
            frame = outbox.recv() => {
                match frame {
                    Some(msg) => {
                        if let Err(e) = sink.send(msg).await {
                            tracing::warn!(%client_id, "WebSocket send failed: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        registry.mark_alive(&client_id);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(%client_id, "WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(%client_id, "WebSocket error: {e}");
                        break;
                    }
                    _ => {} // other inbound frames are ignored
                }
            }
        }
    }

    registry.unregister(&client_id);

    // Send Close frame (best-effort)
    let _ = sink.close().await;
}
