// WebSocket transport for the chat session router.
//
// Each connection gets a process-unique id and an unbounded outbound queue.
// The read loop owns the socket receiver and parses client events; a spawned
// writer task drains the queue onto the socket. The session router never sees
// the socket itself, only the `EventSink` wrapper around the queue.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::core::chat::{ClientEvent, EventSink, ServerEvent};
use crate::gateway::http::AppState;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Outbound half of a connection. Sends never block; if the writer task is
/// gone the connection is already closing and the event is dropped.
struct WsSink(UnboundedSender<ServerEvent>);

impl EventSink for WsSink {
    fn send(&self, event: ServerEvent) {
        let _ = self.0.send(event);
    }
}

pub async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = format!(
        "conn-{}",
        NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
    );
    tracing::info!("WebSocket connected: {}", connection_id);

    let (mut socket_tx, mut socket_rx) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let sink: Arc<dyn EventSink> = Arc::new(WsSink(event_tx));

    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!("Failed to serialize server event: {}", err);
                    continue;
                }
            };
            if socket_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = socket_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    state.chat.handle_event(&connection_id, &sink, event).await;
                }
                Err(err) => {
                    tracing::warn!("Malformed event from {}: {}", connection_id, err);
                    sink.send(ServerEvent::Error {
                        message: "Malformed event".to_string(),
                    });
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            // Pings are answered by axum; other frame types carry nothing
            // for the router.
            Ok(_) => {}
        }
    }

    state.chat.handle_disconnect(&connection_id).await;
    writer.abort();

    tracing::info!(
        "WebSocket disconnected: {} ({} visitors online)",
        connection_id,
        state.chat.online_visitor_count()
    );
}
