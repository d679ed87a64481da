use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use tribo_shared::errors::AppResult;
use tribo_shared::types::api::ApiResponse;
use tribo_shared::middleware::AdminUser;
use tribo_shared::types::auth::AuthUser;
use tribo_shared::types::pagination::{Page, PageParams};

use crate::models::Notification;
use crate::services::notification_service::NotificationInput;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct BroadcastResult {
    pub recipients: usize,
}

/// GET /notifications?skip&take - newest first
pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<ApiResponse<Page<Notification>>>> {
    let page = state.notifications.list(auth.id, &params)?;
    Ok(Json(ApiResponse::ok(page)))
}

/// PATCH /notifications/:id/read - only the owner's rows are reachable
pub async fn mark_read(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let notification = state.notifications.mark_read(auth.id, notification_id)?;
    Ok(Json(ApiResponse::ok(notification)))
}

/// PATCH /notifications/read-all
pub async fn mark_all_read(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.notifications.mark_all_read(auth.id)?;
    Ok(Json(ApiResponse::ok(())))
}

/// POST /notifications/admin-broadcast - site admin only
pub async fn admin_broadcast(
    AdminUser(_admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<NotificationInput>,
) -> AppResult<Json<ApiResponse<BroadcastResult>>> {
    let recipients = state.notifications.broadcast(body).await?;
    Ok(Json(ApiResponse::ok(BroadcastResult { recipients })))
}
