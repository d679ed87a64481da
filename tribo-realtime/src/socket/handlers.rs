//! Socket.IO gateway. Thin over the services: deserialize the payload, check
//! the connection is authenticated, delegate, report failures as `error`
//! events. All chat writes go through ChatService so REST and socket clients
//! share one set of rules.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use socketioxide::extract::{SocketRef, TryData};
use uuid::Uuid;

use tribo_shared::errors::{AppError, ErrorCode};
use tribo_shared::middleware::decode_token;

use crate::live::{chat_room, user_room, LiveEvent, RoomEventPayload};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct AuthSuccessPayload {
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct AuthPayload {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ChatRoomPayload {
    chat_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    chat_id: Uuid,
    content: String,
    #[serde(default)]
    image_url: Option<String>,
}

fn emit_error(socket: &SocketRef, err: &AppError) {
    let _ = socket.emit(
        "error",
        &ErrorPayload {
            code: err.error_code().to_owned(),
            message: err.to_string(),
        },
    );
}

fn emit_unauthenticated(socket: &SocketRef) {
    emit_error(
        socket,
        &AppError::new(ErrorCode::Unauthorized, "authenticate first"),
    );
}

fn emit_malformed(socket: &SocketRef, event: &str) {
    emit_error(
        socket,
        &AppError::new(
            ErrorCode::ValidationError,
            format!("malformed {event} payload"),
        ),
    );
}

fn authed_user(socket: &SocketRef) -> Option<Uuid> {
    socket.extensions.get::<Uuid>()
}

pub fn on_connect(socket: SocketRef, state: Arc<AppState>) {
    tracing::debug!(sid = %socket.id, "socket connected");

    socket.on("auth", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<AuthPayload>(payload)| {
            let state = state.clone();
            async move {
                on_auth(socket, payload, &state);
            }
        }
    });

    socket.on("chat:join", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<ChatRoomPayload>(payload)| {
            let state = state.clone();
            async move {
                on_chat_join(socket, payload, &state);
            }
        }
    });

    socket.on("chat:leave", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<ChatRoomPayload>(payload)| {
            let state = state.clone();
            async move {
                on_chat_leave(socket, payload, &state);
            }
        }
    });

    socket.on("message:send", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<SendMessagePayload>(payload)| {
            let state = state.clone();
            async move {
                on_message_send(socket, payload, &state);
            }
        }
    });

    socket.on("message:mark-read", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<ChatRoomPayload>(payload)| {
            let state = state.clone();
            async move {
                on_mark_read(socket, payload, &state);
            }
        }
    });

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                on_disconnect(socket, &state);
            }
        }
    });
}

fn on_auth(socket: SocketRef, payload: Result<AuthPayload, serde_json::Error>, state: &AppState) {
    let Ok(payload) = payload else {
        emit_malformed(&socket, "auth");
        return;
    };
    let claims = match decode_token(&payload.token) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(sid = %socket.id, error = %err, "socket auth failed");
            emit_error(&socket, &err);
            return;
        }
    };

    let user_id = claims.sub;
    socket.extensions.insert(user_id);
    state.presence.authenticate(&socket.id.to_string(), user_id);
    socket.join(user_room(user_id)).ok();

    tracing::info!(user_id = %user_id, sid = %socket.id, "socket authenticated");
    let _ = socket.emit("auth:success", &AuthSuccessPayload { user_id });
}

/// Presence only. Room membership tracks who is watching the chat right now;
/// persisted chat membership is checked where messages are written.
fn on_chat_join(
    socket: SocketRef,
    payload: Result<ChatRoomPayload, serde_json::Error>,
    state: &AppState,
) {
    let Some(user_id) = authed_user(&socket) else {
        emit_unauthenticated(&socket);
        return;
    };
    let Ok(payload) = payload else {
        emit_malformed(&socket, "chat:join");
        return;
    };

    socket.join(chat_room(payload.chat_id)).ok();
    state.presence.join_chat(&socket.id.to_string(), payload.chat_id);

    let event = LiveEvent::UserJoined(RoomEventPayload {
        chat_id: payload.chat_id,
        user_id,
        timestamp: Utc::now(),
    });
    let _ = socket.to(chat_room(payload.chat_id)).emit(event.name(), &event);
}

fn on_chat_leave(
    socket: SocketRef,
    payload: Result<ChatRoomPayload, serde_json::Error>,
    state: &AppState,
) {
    let Some(user_id) = authed_user(&socket) else {
        emit_unauthenticated(&socket);
        return;
    };
    let Ok(payload) = payload else {
        emit_malformed(&socket, "chat:leave");
        return;
    };

    socket.leave(chat_room(payload.chat_id)).ok();
    state.presence.leave_chat(&socket.id.to_string(), payload.chat_id);

    let event = LiveEvent::UserLeft(RoomEventPayload {
        chat_id: payload.chat_id,
        user_id,
        timestamp: Utc::now(),
    });
    let _ = socket.to(chat_room(payload.chat_id)).emit(event.name(), &event);
}

fn on_message_send(
    socket: SocketRef,
    payload: Result<SendMessagePayload, serde_json::Error>,
    state: &AppState,
) {
    let Some(user_id) = authed_user(&socket) else {
        emit_unauthenticated(&socket);
        return;
    };
    let Ok(payload) = payload else {
        emit_malformed(&socket, "message:send");
        return;
    };

    // ChatService broadcasts message:new and chat:list-update itself.
    if let Err(err) =
        state
            .chats
            .send_message(payload.chat_id, user_id, payload.content, payload.image_url)
    {
        emit_error(&socket, &err);
    }
}

fn on_mark_read(
    socket: SocketRef,
    payload: Result<ChatRoomPayload, serde_json::Error>,
    state: &AppState,
) {
    let Some(user_id) = authed_user(&socket) else {
        emit_unauthenticated(&socket);
        return;
    };
    let Ok(payload) = payload else {
        emit_malformed(&socket, "message:mark-read");
        return;
    };

    if let Err(err) = state.chats.mark_messages_read(payload.chat_id, user_id) {
        emit_error(&socket, &err);
    }
}

/// Cleanup only. A dropped connection never mutates chat state; rooms the
/// socket was presence-joined to just see the user leave.
fn on_disconnect(socket: SocketRef, state: &AppState) {
    let socket_id = socket.id.to_string();
    if let Some(user_id) = state.presence.user_for(&socket_id) {
        for chat_id in state.presence.chats_for(&socket_id) {
            let event = LiveEvent::UserLeft(RoomEventPayload {
                chat_id,
                user_id,
                timestamp: Utc::now(),
            });
            let _ = socket.to(chat_room(chat_id)).emit(event.name(), &event);
        }
    }
    state.presence.disconnect(&socket_id);
    tracing::debug!(sid = %socket.id, "socket disconnected");
}
