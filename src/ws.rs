use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt, Sink};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::protocol::{ClientAction, PushMessage};
use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(msg: &PushMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!("Failed to encode {} message: {}", msg.kind(), e);
            None
        }
    }
}

/// Restate the session's current phase after missed broadcasts.
/// Returns false once the socket is gone.
async fn send_resync<S>(sender: &mut S, state: &AppState, session_id: &str) -> bool
where
    S: Sink<Message> + Unpin,
{
    for msg in state.resync(session_id).await {
        if let Some(frame) = encode(&msg) {
            if sender.send(frame).await.is_err() {
                return false;
            }
        }
    }
    true
}

/// Handle one push socket.
///
/// The socket starts unbound; a `joinSession` action attaches it to a
/// session's broadcast group. Binding again moves it to the new session.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut bound: Option<(String, broadcast::Receiver<PushMessage>)> = None;

    loop {
        tokio::select! {
            // Session broadcasts (only once bound)
            push = async {
                match &mut bound {
                    Some((_, rx)) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match push {
                    Ok(msg) => {
                        if let Some(frame) = encode(&msg) {
                            if sender.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        let Some((session_id, _)) = &bound else { continue };
                        tracing::warn!(
                            "Push socket on {} lagged, skipped {} message(s); resyncing",
                            session_id,
                            skipped
                        );
                        if !send_resync(&mut sender, &state, session_id).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        // Session was archived
                        bound = None;
                    }
                }
            }

            // Client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        match serde_json::from_str::<ClientAction>(&text) {
                            Ok(ClientAction::JoinSession { session_id }) => {
                                match state.bind_channel(&session_id).await {
                                    Ok((rx, catch_up)) => {
                                        tracing::info!("Socket bound to session {}", session_id);
                                        bound = Some((session_id, rx));
                                        if let Some(frame) = catch_up.as_ref().and_then(encode) {
                                            if sender.send(frame).await.is_err() {
                                                break;
                                            }
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("Cannot bind socket: {}", e);
                                    }
                                }
                            }
                            Ok(ClientAction::Unknown) => {
                                tracing::debug!("Ignoring unknown action: {}", text);
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    match bound {
        Some((session_id, _)) => {
            tracing::info!("WebSocket connection closed for session {}", session_id)
        }
        None => tracing::info!("Unbound WebSocket connection closed"),
    }
}
