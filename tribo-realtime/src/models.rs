use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tribo_shared::types::auth::UserRole;

// --- Chat ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatType {
    Private,
    Group,
    Event,
}

impl std::fmt::Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatType::Private => write!(f, "PRIVATE"),
            ChatType::Group => write!(f, "GROUP"),
            ChatType::Event => write!(f, "EVENT"),
        }
    }
}

impl std::str::FromStr for ChatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRIVATE" => Ok(ChatType::Private),
            "GROUP" => Ok(ChatType::Group),
            "EVENT" => Ok(ChatType::Event),
            _ => Err(format!("unknown chat type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub chat_type: ChatType,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_by: Uuid,
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChat {
    pub chat_type: ChatType,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_by: Uuid,
}

/// Partial update of a chat's mutable details. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct ChatDetailsChange {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

// --- ChatMember ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatRole {
    Admin,
    Member,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRole::Admin => write!(f, "ADMIN"),
            ChatRole::Member => write!(f, "MEMBER"),
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(ChatRole::Admin),
            "MEMBER" => Ok(ChatRole::Member),
            _ => Err(format!("unknown chat role: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMember {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub role: ChatRole,
    pub name_color: Option<String>,
    pub background_theme: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewChatMember {
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub role: ChatRole,
}

// --- ChatMessage ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub chat_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
}

// --- Notification ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub data: Option<serde_json::Value>,
}

// --- User (identity mirror, read-mostly here) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub role: UserRole,
    #[serde(skip_serializing)]
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
}
