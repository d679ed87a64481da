//! Notification pipeline: persist first, then live delivery, then mobile
//! push, then retention pruning. Only persistence failures abort the request.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use tribo_shared::errors::{AppError, AppResult, ErrorCode};
use tribo_shared::types::pagination::{Page, PageParams};

use crate::live::{LiveBroadcaster, LiveEvent, NotificationPayload};
use crate::models::{NewNotification, Notification, User};
use crate::push::{PushDispatcher, PushMessage};
use crate::store::{NotificationStore, UserStore};

const ADMIN_ICON: &str = "shield";

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationInput {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    users: Arc<dyn UserStore>,
    live: Arc<dyn LiveBroadcaster>,
    push: PushDispatcher,
    retention: usize,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        users: Arc<dyn UserStore>,
        live: Arc<dyn LiveBroadcaster>,
        push: PushDispatcher,
        retention: usize,
    ) -> Self {
        Self {
            store,
            users,
            live,
            push,
            retention,
        }
    }

    pub async fn send_to_user(
        &self,
        user_id: Uuid,
        input: NotificationInput,
    ) -> AppResult<Notification> {
        let user = self
            .users
            .find_user(user_id)?
            .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

        let notification = self.persist_and_prune(&user, &input)?;
        self.live
            .to_user(user.id, &LiveEvent::NotificationNew(live_payload(&input)));
        self.push
            .dispatch(push_messages(std::slice::from_ref(&user), &input))
            .await;
        Ok(notification)
    }

    /// One persisted row and one live event per site-wide admin; all their
    /// tokens go out in a single batched push dispatch.
    pub async fn notify_admins(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> AppResult<usize> {
        let input = NotificationInput {
            title: title.into(),
            body: body.into(),
            icon: Some(ADMIN_ICON.to_owned()),
            data,
        };
        let admins = self.users.list_admins()?;
        for admin in &admins {
            self.persist_and_prune(admin, &input)?;
            self.live
                .to_user(admin.id, &LiveEvent::NotificationNew(live_payload(&input)));
        }
        self.push.dispatch(push_messages(&admins, &input)).await;
        Ok(admins.len())
    }

    /// Global announcement. Rows are materialized per user so every recipient
    /// owns their copy; the live event goes out once to everyone connected.
    pub async fn broadcast(&self, input: NotificationInput) -> AppResult<usize> {
        let users = self.users.list_users()?;
        for user in &users {
            self.persist_and_prune(user, &input)?;
        }
        self.live
            .global(&LiveEvent::NotificationNew(live_payload(&input)));
        self.push.dispatch(push_messages(&users, &input)).await;
        Ok(users.len())
    }

    pub fn list(&self, user_id: Uuid, params: &PageParams) -> AppResult<Page<Notification>> {
        let (notifications, total) =
            self.store
                .list_for_user(user_id, params.offset(), params.limit())?;
        Ok(Page::new(notifications, total as u64, params))
    }

    pub fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> AppResult<Notification> {
        self.store.mark_read(user_id, notification_id)
    }

    pub fn mark_all_read(&self, user_id: Uuid) -> AppResult<usize> {
        self.store.mark_all_read(user_id)
    }

    fn persist_and_prune(&self, user: &User, input: &NotificationInput) -> AppResult<Notification> {
        let notification = self.store.insert_notification(NewNotification {
            user_id: user.id,
            title: input.title.clone(),
            body: input.body.clone(),
            icon: input.icon.clone(),
            data: input.data.clone(),
        })?;
        let evicted = self.store.prune_oldest(user.id, self.retention)?;
        if evicted > 0 {
            tracing::debug!(user_id = %user.id, evicted, "pruned notifications past retention");
        }
        Ok(notification)
    }
}

fn live_payload(input: &NotificationInput) -> NotificationPayload {
    NotificationPayload {
        title: input.title.clone(),
        message: input.body.clone(),
        kind: input.icon.clone(),
        data: input.data.clone(),
    }
}

fn push_messages(recipients: &[User], input: &NotificationInput) -> Vec<PushMessage> {
    recipients
        .iter()
        .filter_map(|user| user.push_token.as_ref())
        .map(|token| {
            PushMessage::new(
                token.clone(),
                input.title.clone(),
                input.body.clone(),
                input.data.clone(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::{RecordedTarget, RecordingBroadcaster};
    use crate::push::RecordingPushGateway;
    use crate::store::memory::MemoryStore;
    use chrono::Utc;
    use tribo_shared::types::auth::UserRole;

    struct Harness {
        service: NotificationService,
        store: Arc<MemoryStore>,
        live: Arc<RecordingBroadcaster>,
        push: Arc<RecordingPushGateway>,
    }

    fn harness(retention: usize) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let live = Arc::new(RecordingBroadcaster::new());
        let push = Arc::new(RecordingPushGateway::new());
        let service = NotificationService::new(
            store.clone(),
            store.clone(),
            live.clone(),
            PushDispatcher::new(push.clone(), 100),
            retention,
        );
        Harness {
            service,
            store,
            live,
            push,
        }
    }

    fn seed_user(store: &MemoryStore, role: UserRole, token: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        store.add_user(User {
            id,
            display_name: format!("user-{id}"),
            role,
            push_token: token.map(str::to_owned),
            created_at: Utc::now(),
        });
        id
    }

    fn input(title: &str) -> NotificationInput {
        NotificationInput {
            title: title.to_owned(),
            body: "body".to_owned(),
            icon: None,
            data: None,
        }
    }

    #[tokio::test]
    async fn send_to_user_persists_emits_and_pushes() {
        let h = harness(50);
        let user = seed_user(&h.store, UserRole::User, Some("ExponentPushToken[tok]"));

        h.service.send_to_user(user, input("hello")).await.unwrap();

        assert_eq!(h.store.count_for_user(user).unwrap(), 1);
        let events = h.live.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "notification:new");
        assert_eq!(events[0].target, RecordedTarget::User(user));

        let chunks = h.push.chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0][0].to, "ExponentPushToken[tok]");
    }

    #[tokio::test]
    async fn send_to_unknown_user_is_not_found() {
        let h = harness(50);
        let err = h
            .service
            .send_to_user(Uuid::new_v4(), input("hello"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "E3001");
    }

    #[tokio::test]
    async fn retention_evicts_oldest_beyond_ceiling() {
        let h = harness(50);
        let user = seed_user(&h.store, UserRole::User, None);

        for i in 0..55 {
            h.service
                .send_to_user(user, input(&format!("n{i}")))
                .await
                .unwrap();
        }

        assert_eq!(h.store.count_for_user(user).unwrap(), 50);
        let (page, total) = h.store.list_for_user(user, 0, 100).unwrap();
        assert_eq!(total, 50);
        // newest-first listing: n54 survives, n0..n4 are gone
        assert_eq!(page.first().unwrap().title, "n54");
        assert!(page.iter().all(|n| n.title != "n0" && n.title != "n4"));
    }

    #[tokio::test]
    async fn notify_admins_targets_admins_only() {
        let h = harness(50);
        let admin_a = seed_user(&h.store, UserRole::Admin, Some("ExponentPushToken[a]"));
        let admin_b = seed_user(&h.store, UserRole::Admin, None);
        let regular = seed_user(&h.store, UserRole::User, Some("ExponentPushToken[r]"));

        let reached = h
            .service
            .notify_admins("report", "new report filed", None)
            .await
            .unwrap();

        assert_eq!(reached, 2);
        assert_eq!(h.store.count_for_user(admin_a).unwrap(), 1);
        assert_eq!(h.store.count_for_user(admin_b).unwrap(), 1);
        assert_eq!(h.store.count_for_user(regular).unwrap(), 0);

        let (rows, _) = h.store.list_for_user(admin_a, 0, 10).unwrap();
        assert_eq!(rows[0].icon.as_deref(), Some("shield"));

        // single dispatch carrying only the admin token
        let chunks = h.push.chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 1);
        assert_eq!(chunks[0][0].to, "ExponentPushToken[a]");
    }

    #[tokio::test]
    async fn broadcast_materializes_one_row_per_user() {
        let h = harness(50);
        let a = seed_user(&h.store, UserRole::User, Some("ExponentPushToken[a]"));
        let b = seed_user(&h.store, UserRole::User, Some("not-a-push-token"));
        let c = seed_user(&h.store, UserRole::Admin, None);

        let reached = h.service.broadcast(input("maintenance")).await.unwrap();

        assert_eq!(reached, 3);
        for user in [a, b, c] {
            assert_eq!(h.store.count_for_user(user).unwrap(), 1);
        }

        let events = h.live.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, RecordedTarget::Global);

        // invalid token filtered out at dispatch
        let chunks = h.push.chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 1);
        assert_eq!(chunks[0][0].to, "ExponentPushToken[a]");
    }

    #[tokio::test]
    async fn mark_read_flags_a_single_row() {
        let h = harness(50);
        let user = seed_user(&h.store, UserRole::User, None);
        let first = h.service.send_to_user(user, input("n0")).await.unwrap();
        h.service.send_to_user(user, input("n1")).await.unwrap();

        let updated = h.service.mark_read(user, first.id).unwrap();
        assert!(updated.is_read);

        let (rows, _) = h.store.list_for_user(user, 0, 10).unwrap();
        let other = rows.iter().find(|n| n.id != first.id).unwrap();
        assert!(!other.is_read);
    }

    #[tokio::test]
    async fn mark_read_rejects_missing_and_foreign_rows() {
        let h = harness(50);
        let owner = seed_user(&h.store, UserRole::User, None);
        let intruder = seed_user(&h.store, UserRole::User, None);
        let row = h.service.send_to_user(owner, input("mine")).await.unwrap();

        let err = h.service.mark_read(owner, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.error_code(), "E3002");

        let err = h.service.mark_read(intruder, row.id).unwrap_err();
        assert_eq!(err.error_code(), "E3002");
        let (rows, _) = h.store.list_for_user(owner, 0, 10).unwrap();
        assert!(!rows[0].is_read);
    }

    #[tokio::test]
    async fn mark_all_read_flags_everything() {
        let h = harness(50);
        let user = seed_user(&h.store, UserRole::User, None);
        for i in 0..3 {
            h.service
                .send_to_user(user, input(&format!("n{i}")))
                .await
                .unwrap();
        }

        let updated = h.service.mark_all_read(user).unwrap();
        assert_eq!(updated, 3);
        let (rows, _) = h.store.list_for_user(user, 0, 10).unwrap();
        assert!(rows.iter().all(|n| n.is_read));
    }
}
