//! WebSocket connection state machine.
//!
//! Runs the read/write loop for a single connection: dispatches commands
//! against the session service and forwards room broadcasts that pass
//! the audience filter.
//!
//! # Ordering
//!
//! Acknowledgments are written inline in the command branch, before the
//! loop drains any room envelopes buffered during the service call. A
//! joiner therefore always sees their acknowledgment first (their own
//! `participant:joined` is additionally excluded by audience), and a
//! submitter sees their acknowledgment before the whole-room results
//! broadcast their submission may have triggered.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use crate::app_state::AppState;
use crate::domain::session_event::Envelope;
use crate::domain::{OptionId, ParticipantId, SessionCode};
use crate::error::CoordinatorError;

/// Room binding of a connection after a successful join.
struct RoomBinding {
    code: SessionCode,
    receiver: broadcast::Receiver<Envelope>,
}

/// Runs the read/write loop for a single WebSocket connection.
///
/// The connection owns one [`ParticipantId`] for its lifetime. Closing
/// the socket without an explicit leave flips presence to offline but
/// preserves membership (disconnect is not removal).
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let pid = ParticipantId::new();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut binding: Option<RoomBinding> = None;

    tracing::debug!(%pid, "ws connection opened");

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let done = handle_text_message(
                            &text, &state, pid, &mut binding, &mut ws_tx,
                        )
                        .await;
                        if done {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Envelope from the session room
            envelope = room_recv(&mut binding) => {
                match envelope {
                    Ok(envelope) => {
                        if envelope.audience.includes(pid) {
                            let msg = event_message(&envelope);
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%pid, lagged = n, "ws client lagged behind room bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Room is gone (session deleted or expired); the
                        // binding is stale and must not trigger a
                        // disconnect cleanup later.
                        binding = None;
                    }
                }
            }
        }
    }

    // Disconnect is not removal: presence flips offline, membership and
    // submissions survive. Failures here are logged by the service and
    // swallowed — nobody is waiting for a response.
    if let Some(RoomBinding { code, receiver }) = binding.take() {
        drop(receiver);
        state.session_service.handle_disconnect(&code, pid).await;
        state.room_bus.cleanup(&code).await;
    }
    tracing::debug!(%pid, "ws connection closed");
}

/// Awaits the next room envelope, or pends forever while unbound.
async fn room_recv(
    binding: &mut Option<RoomBinding>,
) -> Result<Envelope, broadcast::error::RecvError> {
    match binding {
        Some(room) => room.receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Handles one text frame. Returns `true` when the connection should
/// close (socket write failed).
async fn handle_text_message(
    text: &str,
    state: &AppState,
    pid: ParticipantId,
    binding: &mut Option<RoomBinding>,
    ws_tx: &mut SplitSink<WebSocket, Message>,
) -> bool {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        let err = error_message(
            String::new(),
            "malformed_message",
            "malformed JSON envelope",
        );
        return send(ws_tx, &err).await;
    };

    let command = match serde_json::from_value::<WsCommand>(msg.payload.clone()) {
        Ok(command) => command,
        Err(_) => {
            let err = error_message(msg.id, "unknown_command", "unknown or malformed command");
            return send(ws_tx, &err).await;
        }
    };

    let response = dispatch(state, pid, binding, msg.id, command).await;
    send(ws_tx, &response).await
}

/// Executes a command and builds the acknowledgment (or error) frame.
async fn dispatch(
    state: &AppState,
    pid: ParticipantId,
    binding: &mut Option<RoomBinding>,
    msg_id: String,
    command: WsCommand,
) -> WsMessage {
    match command {
        WsCommand::Join { code, display_name } => {
            if binding.is_some() {
                return error_message(msg_id, "already_joined", "connection is already in a session");
            }
            // Subscribe before joining so no envelope published between
            // the join and the first poll can be missed.
            let receiver = match SessionCode::parse(&code) {
                Ok(parsed) => Some((parsed.clone(), state.room_bus.subscribe(&parsed).await)),
                Err(_) => None,
            };
            match state.session_service.join_session(&code, pid, &display_name).await {
                Ok(outcome) => {
                    if let Some((parsed, receiver)) = receiver {
                        *binding = Some(RoomBinding {
                            code: parsed,
                            receiver,
                        });
                    }
                    response_message(msg_id, &outcome)
                }
                Err(e) => {
                    if let Some((parsed, receiver)) = receiver {
                        drop(receiver);
                        state.room_bus.cleanup(&parsed).await;
                    }
                    coordinator_error_message(msg_id, &e)
                }
            }
        }
        WsCommand::Submit { option_ids } => {
            let Some(room) = binding.as_ref() else {
                return error_message(msg_id, "not_in_session", "join a session first");
            };
            let ids: Vec<OptionId> = option_ids.into_iter().map(OptionId::new).collect();
            match state
                .session_service
                .submit_selections(room.code.as_str(), pid, &ids)
                .await
            {
                Ok(outcome) => response_message(msg_id, &outcome),
                Err(e) => coordinator_error_message(msg_id, &e),
            }
        }
        WsCommand::Restart => {
            let Some(room) = binding.as_ref() else {
                return error_message(msg_id, "not_in_session", "join a session first");
            };
            match state
                .session_service
                .restart_session(room.code.as_str(), pid)
                .await
            {
                Ok(snapshot) => response_message(msg_id, &snapshot),
                Err(e) => coordinator_error_message(msg_id, &e),
            }
        }
        WsCommand::Leave => {
            let Some(room) = binding.take() else {
                return error_message(msg_id, "not_in_session", "join a session first");
            };
            match state
                .session_service
                .leave_session(room.code.as_str(), pid)
                .await
            {
                Ok(()) => {
                    let code = room.code.clone();
                    drop(room);
                    state.room_bus.cleanup(&code).await;
                    response_message(msg_id, &serde_json::json!({ "left": true }))
                }
                Err(e) => {
                    // Membership is unchanged; keep the binding so the
                    // client can retry.
                    *binding = Some(room);
                    coordinator_error_message(msg_id, &e)
                }
            }
        }
    }
}

async fn send(ws_tx: &mut SplitSink<WebSocket, Message>, msg: &WsMessage) -> bool {
    let json = serde_json::to_string(msg).unwrap_or_default();
    ws_tx.send(Message::text(json)).await.is_err()
}

fn response_message<T: serde::Serialize>(id: String, payload: &T) -> WsMessage {
    WsMessage {
        id,
        msg_type: WsMessageType::Response,
        timestamp: chrono::Utc::now(),
        payload: serde_json::to_value(payload).unwrap_or_default(),
    }
}

fn event_message(envelope: &Envelope) -> WsMessage {
    WsMessage {
        id: uuid::Uuid::new_v4().to_string(),
        msg_type: WsMessageType::Event,
        timestamp: chrono::Utc::now(),
        payload: serde_json::to_value(&envelope.event).unwrap_or_default(),
    }
}

fn error_message(id: String, code: &str, message: &str) -> WsMessage {
    WsMessage {
        id,
        msg_type: WsMessageType::Error,
        timestamp: chrono::Utc::now(),
        payload: serde_json::json!({
            "code": code,
            "message": message,
        }),
    }
}

fn coordinator_error_message(id: String, error: &CoordinatorError) -> WsMessage {
    error_message(id, error.error_code(), &error.client_message())
}
