use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::{
    metrics::LIVE_SOCKETS_ACTIVE,
    models::message::{ClientMessage, ErrorPayload, JoinPayload, RejectedPayload},
    models::ServerMessage,
    services::{live_session::SessionError, runner::SessionHandle, AppState},
};

use super::error_response;

/// Live channel endpoint, one connection per quiz attempt.
/// GET /api/v1/quizzes/{id}/live
pub async fn quiz_socket(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = state
        .registry
        .get(&session_id)
        .await
        .map_err(error_response)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, handle)))
}

async fn handle_socket(socket: WebSocket, handle: SessionHandle) {
    LIVE_SOCKETS_ACTIVE.inc();
    let (mut sender, mut receiver) = socket.split();

    let joined = establish(&handle, &mut sender, &mut receiver).await;
    if let Some(user_id) = &joined {
        pump(&handle, user_id, &mut sender, &mut receiver).await;
        handle.disconnect(user_id.clone()).await;
    }
    LIVE_SOCKETS_ACTIVE.dec();
}

/// Waits for the mandatory `join` first frame and registers the
/// participant. Returns the joined user id, or `None` when the handshake
/// failed and the socket should close.
async fn establish(
    handle: &SessionHandle,
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
) -> Option<String> {
    let join = match await_join_frame(receiver).await {
        Ok(join) => join,
        Err(Some(frame)) => {
            let _ = send_frame(sender, &frame).await;
            return None;
        }
        Err(None) => return None,
    };

    if join.quiz_id != handle.session_id {
        let _ = send_frame(sender, &rejected(&SessionError::NotFound)).await;
        return None;
    }

    match handle.join(join.user_id.clone(), join.username.clone()).await {
        Ok(frames) => {
            for frame in frames {
                if send_frame(sender, &frame).await.is_err() {
                    return None;
                }
            }
            Some(join.user_id)
        }
        Err(err) => {
            tracing::info!(
                "Join rejected: session={}, user={}, reason={}",
                handle.session_id,
                join.user_id,
                err.reason_code()
            );
            let _ = send_frame(sender, &rejected(&err)).await;
            None
        }
    }
}

/// Reads frames until a text frame arrives. `Err(Some(frame))` asks the
/// caller to send a rejection before closing.
async fn await_join_frame(
    receiver: &mut SplitStream<WebSocket>,
) -> Result<JoinPayload, Option<ServerMessage>> {
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                return match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(ClientMessage::Join(join)) => Ok(join),
                    Ok(_) => Err(Some(ServerMessage::Rejected(RejectedPayload {
                        reason: "join_required".to_string(),
                        message: "first frame must be a join".to_string(),
                    }))),
                    Err(_) => Err(Some(ServerMessage::Rejected(RejectedPayload {
                        reason: "malformed_message".to_string(),
                        message: "could not parse join frame".to_string(),
                    }))),
                };
            }
            Some(Ok(Message::Close(_))) | None => return Err(None),
            Some(Ok(_)) => continue,
            Some(Err(_)) => return Err(None),
        }
    }
}

/// Main connection loop: forwards broadcast frames to the socket and
/// routes client frames to the session task.
async fn pump(
    handle: &SessionHandle,
    user_id: &str,
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
) {
    // Subscribed after join, so the first frames this connection sees
    // include the participant_update its own join produced.
    let mut events = handle.subscribe();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_frame(handle, user_id, text.as_str()).await {
                            if send_frame(sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(
                            "Socket error: session={}, user={}, error={}",
                            handle.session_id, user_id, e
                        );
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(frame) => {
                        if send_frame(sender, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "Slow live connection skipped {} frame(s): session={}, user={}",
                            skipped, handle.session_id, user_id
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

/// One client frame in, at most one private frame back. A malformed frame
/// is answered and dropped; it never takes the session down.
async fn handle_client_frame(
    handle: &SessionHandle,
    user_id: &str,
    text: &str,
) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(
                "Malformed client frame: session={}, user={}, error={}",
                handle.session_id,
                user_id,
                e
            );
            return Some(ServerMessage::Error(ErrorPayload {
                message: "malformed message".to_string(),
            }));
        }
    };

    match message {
        ClientMessage::Join(_) => Some(ServerMessage::Error(ErrorPayload {
            message: "already joined".to_string(),
        })),
        ClientMessage::Start(cmd) => match handle.start(cmd.host_key).await {
            Ok(()) => None,
            Err(err) => Some(rejected(&err)),
        },
        ClientMessage::End(cmd) => match handle.end(cmd.host_key).await {
            Ok(()) => None,
            Err(err) => Some(rejected(&err)),
        },
        ClientMessage::SubmitAnswer(payload) => {
            if payload.user_id != user_id {
                return Some(ServerMessage::Error(ErrorPayload {
                    message: "userId does not match this connection".to_string(),
                }));
            }
            match handle.submit_answer(payload).await {
                Ok(verdict) => Some(ServerMessage::AnswerResult(verdict)),
                Err(err) => Some(rejected(&err)),
            }
        }
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerMessage,
) -> Result<(), axum::Error> {
    sender.send(Message::Text(frame.to_json().into())).await
}

fn rejected(err: &SessionError) -> ServerMessage {
    ServerMessage::Rejected(RejectedPayload {
        reason: err.reason_code().to_string(),
        message: err.to_string(),
    })
}
