// src/api/ws.rs
// Live session stream. Subscribers receive every message and resolution
// event for a session; inbound frames submit new turns. Auth rides a query
// parameter since browsers cannot set headers on WebSocket upgrades.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/chat/{session_id}/stream", get(ws_stream_handler))
}

#[derive(Debug, Deserialize)]
struct StreamAuth {
    token: String,
}

/// Frames the client may send once connected.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Message {
        content: String,
        #[serde(default)]
        metadata: Option<serde_json::Value>,
    },
}

type SharedSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Token and ownership are checked before the upgrade completes, so an
/// unauthorized caller never holds an open socket.
async fn ws_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(auth): Query<StreamAuth>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state
        .tokens
        .verify(&auth.token)
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;
    state.orchestrator.authorize(user_id, session_id)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, session_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid, session_id: Uuid) {
    info!("WS client connected to session {}", session_id);

    let (sender, mut receiver) = socket.split();
    let sender: SharedSink = Arc::new(Mutex::new(sender));

    let (subscriber_id, mut events) = state.channels.subscribe(session_id);

    // Forward session events to this socket until the receiver side drops.
    let forward_sender = sender.clone();
    let forward = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!("Failed to serialize session event: {}", err);
                    continue;
                }
            };
            let mut lock = forward_sender.lock().await;
            if lock.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!("WS receive error on session {}: {}", session_id, err);
                break;
            }
        };

        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Message { content, metadata }) => {
                    // The turn runs as its own task: closing the socket
                    // mid-turn must not cancel invocation or persistence.
                    let state = state.clone();
                    let sender = sender.clone();
                    tokio::spawn(async move {
                        if let Err(err) = state
                            .orchestrator
                            .run_turn(user_id, session_id, content, metadata)
                            .await
                        {
                            send_error(&sender, &err.to_string()).await;
                        }
                    });
                }
                Err(err) => {
                    debug!("Unparsable WS frame on session {}: {}", session_id, err);
                    send_error(&sender, "unrecognized frame").await;
                }
            },
            Message::Ping(data) => {
                let mut lock = sender.lock().await;
                let _ = lock.send(Message::Pong(data)).await;
            }
            Message::Close(_) => {
                debug!("WS close frame on session {}", session_id);
                break;
            }
            _ => {}
        }
    }

    state.channels.unsubscribe(session_id, subscriber_id);
    forward.abort();

    if let Ok(mut lock) = sender.try_lock() {
        let _ = lock.send(Message::Close(None)).await;
        let _ = lock.close().await;
    }

    info!("WS client disconnected from session {}", session_id);
}

async fn send_error(sender: &SharedSink, message: &str) {
    let frame = json!({ "type": "error", "message": message }).to_string();
    let mut lock = sender.lock().await;
    let _ = lock.send(Message::Text(frame.into())).await;
}
