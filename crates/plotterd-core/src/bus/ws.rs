//! WebSocket front door for the event bus.
//!
//! One task pair per connection: the writer forwards bus frames to the
//! socket, the reader handles `subscribe`/`unsubscribe`/`ping` requests and
//! pong frames. The heartbeat task probes every client on an interval and
//! the registry terminates those that never answer between probes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use super::{BusFrame, ClientMessage, Event, EventBus, EventType};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(bus): State<Arc<EventBus>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, bus))
}

async fn handle_socket(socket: WebSocket, bus: Arc<EventBus>) {
    let (client_id, mut frames) = bus.register();
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let message = match frame {
                BusFrame::Event(event) => match serde_json::to_string(&event) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        tracing::warn!("event serialization failed: {}", e);
                        continue;
                    }
                },
                BusFrame::Ping => Message::Ping(Vec::new().into()),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { job_id }) => bus.subscribe(client_id, job_id),
                Ok(ClientMessage::Unsubscribe { job_id }) => {
                    bus.unsubscribe(client_id, job_id)
                }
                Ok(ClientMessage::Ping) => {
                    bus.touch(client_id);
                    bus.send_to(
                        client_id,
                        Event::new(EventType::Pong, serde_json::json!({})),
                    );
                }
                Err(e) => {
                    bus.send_to(
                        client_id,
                        Event::new(
                            EventType::Error,
                            serde_json::json!({ "message": format!("bad request: {e}") }),
                        ),
                    );
                }
            },
            Ok(Message::Pong(_)) => bus.touch(client_id),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    bus.remove(client_id);
    writer.abort();
}

/// Periodic liveness probe; clients that fail to answer between probes are
/// terminated and unsubscribed everywhere.
pub fn spawn_heartbeat(bus: Arc<EventBus>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let dropped = bus.sweep();
            if dropped > 0 {
                tracing::info!(dropped, "heartbeat dropped silent clients");
            }
        }
    })
}
