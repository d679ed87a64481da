//! REST surface for chats. Handlers parse and delegate; every rule lives in
//! ChatService so the socket gateway shares it.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use tribo_shared::errors::AppResult;
use tribo_shared::types::api::ApiResponse;
use tribo_shared::types::auth::AuthUser;
use tribo_shared::types::pagination::{Page, PageParams};

use crate::models::{Chat, ChatDetailsChange, ChatMember, ChatMessage};
use crate::services::chat_service::{ChatDetail, ChatPreview, CreateChatInput};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMembersRequest {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChatRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MemberColorRequest {
    pub color: String,
}

#[derive(Debug, Deserialize)]
pub struct MemberBackgroundRequest {
    pub theme: String,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

// --- Handlers ---

/// POST /chats/group
pub async fn create_group(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateChatInput>,
) -> AppResult<Json<ApiResponse<ChatDetail>>> {
    let detail = state.chats.create_group_chat(auth.id, body)?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// POST /chats/private/:user_id - idempotent 1:1 chat
pub async fn create_private(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ChatDetail>>> {
    let detail = state.chats.create_private_chat(auth.id, user_id)?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// GET /chats?skip&take
pub async fn list_chats(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<ApiResponse<Page<ChatPreview>>>> {
    let page = state.chats.list_chats(auth.id, &params)?;
    Ok(Json(ApiResponse::ok(page)))
}

/// GET /chats/:id - detail with members
pub async fn get_chat(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ChatDetail>>> {
    let detail = state.chats.get_chat(chat_id, auth.id)?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// PATCH /chats/:id - admin only
pub async fn update_chat(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<UpdateChatRequest>,
) -> AppResult<Json<ApiResponse<Chat>>> {
    let chat = state.chats.update_chat_details(
        chat_id,
        auth.id,
        ChatDetailsChange {
            name: body.name,
            description: body.description,
            image_url: body.image_url,
        },
    )?;
    Ok(Json(ApiResponse::ok(chat)))
}

/// DELETE /chats/:id - creator only
pub async fn delete_chat(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.chats.delete_chat(chat_id, auth.id)?;
    Ok(Json(ApiResponse::ok(())))
}

/// POST /chats/:id/leave - succession / auto-delete applies
pub async fn leave_chat(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.chats.leave_chat(chat_id, auth.id)?;
    Ok(Json(ApiResponse::ok(())))
}

/// POST /chats/:id/members - admin only, already-present ids skipped
pub async fn add_members(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<AddMembersRequest>,
) -> AppResult<Json<ApiResponse<Vec<ChatMember>>>> {
    let members = state.chats.add_members(chat_id, auth.id, body.user_ids)?;
    Ok(Json(ApiResponse::ok(members)))
}

/// DELETE /chats/:id/members/:member_id - admin only
pub async fn remove_member(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((chat_id, member_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.chats.remove_member(chat_id, auth.id, member_id)?;
    Ok(Json(ApiResponse::ok(())))
}

/// PATCH /chats/:id/members/:member_id/promote - admin only
pub async fn promote_member(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((chat_id, member_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.chats.promote_to_admin(chat_id, auth.id, member_id)?;
    Ok(Json(ApiResponse::ok(())))
}

/// PATCH /chats/:id/my-color
pub async fn update_my_color(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<MemberColorRequest>,
) -> AppResult<Json<ApiResponse<ChatMember>>> {
    let member = state.chats.update_member_color(chat_id, auth.id, body.color)?;
    Ok(Json(ApiResponse::ok(member)))
}

/// PATCH /chats/:id/my-background
pub async fn update_my_background(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<MemberBackgroundRequest>,
) -> AppResult<Json<ApiResponse<ChatMember>>> {
    let member = state
        .chats
        .update_member_background(chat_id, auth.id, body.theme)?;
    Ok(Json(ApiResponse::ok(member)))
}

/// POST /chats/:id/messages
pub async fn send_message(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<ChatMessage>>> {
    let message = state
        .chats
        .send_message(chat_id, auth.id, body.content, body.image_url)?;
    Ok(Json(ApiResponse::ok(message)))
}

/// GET /chats/:id/messages?skip&take - oldest to newest within the window
pub async fn list_messages(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<ApiResponse<Page<ChatMessage>>>> {
    let page = state.chats.get_messages(chat_id, auth.id, &params)?;
    Ok(Json(ApiResponse::ok(page)))
}

/// POST /chats/:id/mark-as-read
pub async fn mark_as_read(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.chats.mark_messages_read(chat_id, auth.id)?;
    Ok(Json(ApiResponse::ok(())))
}

/// PATCH /chats/messages/:id - author only
pub async fn edit_message(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<Uuid>,
    Json(body): Json<EditMessageRequest>,
) -> AppResult<Json<ApiResponse<ChatMessage>>> {
    let message = state.chats.edit_message(message_id, auth.id, body.content)?;
    Ok(Json(ApiResponse::ok(message)))
}

/// DELETE /chats/messages/:id - author only
pub async fn delete_message(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.chats.delete_message(message_id, auth.id)?;
    Ok(Json(ApiResponse::ok(())))
}
