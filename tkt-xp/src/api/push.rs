//! Push channel endpoints
//!
//! `/ws` is the primary transport; `/events` mirrors the same session stream
//! over Server-Sent Events for browser clients. Either way a session gets
//! `connected` first, then `datafile_updated` after every applied sync.

use crate::notifier::Notifier;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{
        sse::{Event, KeepAlive, Sse},
        Response,
    },
    routing::get,
    Router,
};
use futures::{SinkExt, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Deregisters a session when the transport goes away
struct SessionGuard {
    notifier: Arc<Notifier>,
    id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.notifier.disconnect(&self.id);
    }
}

/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.notifier))
}

async fn handle_socket(socket: WebSocket, notifier: Arc<Notifier>) {
    let session = notifier.connect();
    let _guard = SessionGuard {
        notifier: Arc::clone(&notifier),
        id: session.id,
    };
    let mut events = session.receiver;
    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize push event: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    debug!(session_id = %session.id, "WebSocket send failed, closing");
                    break;
                }
            }
            message = incoming.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(session_id = %session.id, "WebSocket error: {}", e);
                        break;
                    }
                    // Clients have nothing to say; pings are answered by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// GET /events
pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = state.notifier.connect();
    let guard = SessionGuard {
        notifier: Arc::clone(&state.notifier),
        id: session.id,
    };

    let mut events = session.receiver;

    let stream = async_stream::stream! {
        // Dropped with the stream when the client goes away
        let _guard = guard;
        while let Some(event) = events.recv().await {
            match event.to_json() {
                Ok(json) => {
                    debug!("SSE: Sending {}", event.event_name());
                    yield Ok(Event::default().event(event.event_name()).data(json));
                }
                Err(e) => warn!("Failed to serialize push event: {}", e),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

pub fn push_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/events", get(sse_handler))
}
