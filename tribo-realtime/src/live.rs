//! Typed live events and the broadcaster seam between business rules and the
//! Socket.IO transport. Broadcasts are best-effort projections of persisted
//! state; emitting into an empty room is a silent no-op.

use chrono::{DateTime, Utc};
use serde::Serialize;
use socketioxide::SocketIo;
use uuid::Uuid;

use crate::models::ChatMessage;

pub fn chat_room(chat_id: Uuid) -> String {
    format!("chat:{chat_id}")
}

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

// --- Event payloads ---

#[derive(Debug, Clone, Serialize)]
pub struct RoomEventPayload {
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatListUpdatePayload {
    pub chat_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Every server→client event the live channel can carry. One variant per
/// event name; payload shapes are fixed here rather than built ad hoc at the
/// emit sites.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LiveEvent {
    MessageNew(ChatMessage),
    MessageMarkedRead(RoomEventPayload),
    UserJoined(RoomEventPayload),
    UserLeft(RoomEventPayload),
    ChatListUpdate(ChatListUpdatePayload),
    NotificationNew(NotificationPayload),
}

impl LiveEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::MessageNew(_) => "message:new",
            LiveEvent::MessageMarkedRead(_) => "message:marked-read",
            LiveEvent::UserJoined(_) => "chat:user-joined",
            LiveEvent::UserLeft(_) => "chat:user-left",
            LiveEvent::ChatListUpdate(_) => "chat:list-update",
            LiveEvent::NotificationNew(_) => "notification:new",
        }
    }
}

// --- Broadcaster seam ---

/// Fan-out to currently-connected clients. Injectable so services can be
/// tested without a live transport.
pub trait LiveBroadcaster: Send + Sync {
    fn to_chat(&self, chat_id: Uuid, event: &LiveEvent);
    fn to_user(&self, user_id: Uuid, event: &LiveEvent);
    fn global(&self, event: &LiveEvent);
}

pub struct SocketBroadcaster {
    io: SocketIo,
}

impl SocketBroadcaster {
    pub fn new(io: SocketIo) -> Self {
        Self { io }
    }
}

impl LiveBroadcaster for SocketBroadcaster {
    fn to_chat(&self, chat_id: Uuid, event: &LiveEvent) {
        let _ = self.io.to(chat_room(chat_id)).emit(event.name(), event);
    }

    fn to_user(&self, user_id: Uuid, event: &LiveEvent) {
        let _ = self.io.to(user_room(user_id)).emit(event.name(), event);
    }

    fn global(&self, event: &LiveEvent) {
        let _ = self.io.emit(event.name(), event);
    }
}

/// Records emitted events instead of sending them. Test double.
#[derive(Default)]
pub struct RecordingBroadcaster {
    events: std::sync::Mutex<Vec<RecordedEvent>>,
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub target: RecordedTarget,
    pub name: &'static str,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedTarget {
    Chat(Uuid),
    User(Uuid),
    Global,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, target: RecordedTarget, event: &LiveEvent) {
        self.events.lock().unwrap().push(RecordedEvent {
            target,
            name: event.name(),
            payload: serde_json::to_value(event).unwrap_or_default(),
        });
    }
}

impl LiveBroadcaster for RecordingBroadcaster {
    fn to_chat(&self, chat_id: Uuid, event: &LiveEvent) {
        self.record(RecordedTarget::Chat(chat_id), event);
    }

    fn to_user(&self, user_id: Uuid, event: &LiveEvent) {
        self.record(RecordedTarget::User(user_id), event);
    }

    fn global(&self, event: &LiveEvent) {
        self.record(RecordedTarget::Global, event);
    }
}
