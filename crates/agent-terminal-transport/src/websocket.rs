//! WebSocket sessions.

use agent_terminal_core::{SessionId, SessionState};
use agent_terminal_session::CommandEvent;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::{
    protocol::{ClientMessage, ServerMessage, greeting},
    state::AppState,
};

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    tracing::debug!(session_id = %session_id, state = ?SessionState::Connecting, "Session connecting");

    let (mut sender, mut receiver) = socket.split();
    let (tx, rx) = state.hub.channel();

    // Queue the greeting before registering so it precedes any broadcast.
    if tx.try_send(greeting()).is_err() {
        return;
    }
    state.hub.register(session_id, tx);
    tracing::info!(
        session_id = %session_id,
        state = ?state.hub.state(session_id),
        sessions = state.hub.len(),
        "Session open"
    );

    // Forward queued events to the socket. Ends when the hub drops the
    // session or the client goes away.
    let mut send_task = tokio::spawn(async move {
        let mut events = ReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(s) => s,
                        Err(_) => continue,
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, "WebSocket error: {e}");
                        break;
                    }
                };
                handle_message(&state, session_id, &text);
            }
            _ = &mut send_task => {
                tracing::debug!(session_id = %session_id, "Session writer finished");
                break;
            }
        }
    }

    state.hub.unregister(session_id);
    send_task.abort();
    tracing::info!(
        session_id = %session_id,
        state = ?state.hub.state(session_id),
        sessions = state.hub.len(),
        "Session closed"
    );
}

fn handle_message(state: &AppState, session_id: SessionId, text: &str) {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(session_id = %session_id, "Invalid client message: {e}");
            state.hub.send_to(
                session_id,
                ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                },
            );
            return;
        }
    };

    match client_msg {
        ClientMessage::ExecuteCommand { command, terminal } => {
            state.router.dispatch(CommandEvent {
                session: session_id,
                command,
                terminal,
            });
        }
        ClientMessage::GetContainerStatus => {
            let state = state.clone();
            tokio::spawn(async move {
                let containers = state.router.container_status().await;
                state
                    .hub
                    .send_to(session_id, ServerMessage::ContainerStatus { containers });
            });
        }
        ClientMessage::Ping => {
            state.hub.send_to(session_id, ServerMessage::Pong);
        }
    }
}
