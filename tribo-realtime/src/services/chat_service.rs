//! Chat business rules over the persistence and broadcast seams. Handlers
//! (REST and socket) stay thin; every invariant lives here.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tribo_shared::errors::{AppError, AppResult, ErrorCode};
use tribo_shared::types::pagination::{Page, PageParams};

use crate::live::{ChatListUpdatePayload, LiveBroadcaster, LiveEvent, RoomEventPayload};
use crate::models::{
    Chat, ChatDetailsChange, ChatMember, ChatMessage, ChatRole, ChatType, NewChat, NewChatMember,
    NewChatMessage,
};
use crate::store::{ChatStore, UserStore};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChatInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

/// A chat together with its full membership.
#[derive(Debug, Clone, Serialize)]
pub struct ChatDetail {
    #[serde(flatten)]
    pub chat: Chat,
    pub members: Vec<ChatMember>,
}

/// One entry of a user's chat list: the chat, its last message resolved via
/// the pointer, and the unread count derived from the member's last_read_at.
#[derive(Debug, Clone, Serialize)]
pub struct ChatPreview {
    #[serde(flatten)]
    pub chat: Chat,
    pub last_message: Option<ChatMessage>,
    pub unread_count: i64,
    pub my_role: ChatRole,
}

/// The surviving member inheriting ADMIN when a chat loses its last admin:
/// earliest joined_at, ties broken by ascending user id.
pub(crate) fn succession_candidate(members: &[ChatMember]) -> Option<Uuid> {
    members
        .iter()
        .min_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.user_id.cmp(&b.user_id)))
        .map(|m| m.user_id)
}

pub struct ChatService {
    store: Arc<dyn ChatStore>,
    users: Arc<dyn UserStore>,
    live: Arc<dyn LiveBroadcaster>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        users: Arc<dyn UserStore>,
        live: Arc<dyn LiveBroadcaster>,
    ) -> Self {
        Self { store, users, live }
    }

    // --- membership guards ---

    fn require_chat(&self, chat_id: Uuid) -> AppResult<Chat> {
        self.store
            .find_chat(chat_id)?
            .ok_or_else(|| AppError::new(ErrorCode::ChatNotFound, "chat not found"))
    }

    fn require_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<ChatMember> {
        self.store.find_member(chat_id, user_id)?.ok_or_else(|| {
            AppError::new(ErrorCode::NotChatMember, "you are not a member of this chat")
        })
    }

    fn require_admin(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<ChatMember> {
        let member = self.require_member(chat_id, user_id)?;
        if member.role != ChatRole::Admin {
            return Err(AppError::new(
                ErrorCode::NotChatAdmin,
                "only a chat admin can do this",
            ));
        }
        Ok(member)
    }

    // --- chats ---

    pub fn create_group_chat(&self, creator: Uuid, input: CreateChatInput) -> AppResult<ChatDetail> {
        let name = input.name.trim().to_owned();
        if name.is_empty() {
            return Err(AppError::new(
                ErrorCode::ChatNameRequired,
                "a group chat needs a name",
            ));
        }

        let chat = self.store.insert_chat(NewChat {
            chat_type: ChatType::Group,
            name,
            description: input.description,
            image_url: input.image_url,
            created_by: creator,
        })?;
        self.store.insert_member(NewChatMember {
            chat_id: chat.id,
            user_id: creator,
            role: ChatRole::Admin,
        })?;

        let extra: Vec<NewChatMember> = input
            .member_ids
            .into_iter()
            .filter(|id| *id != creator)
            .map(|user_id| NewChatMember {
                chat_id: chat.id,
                user_id,
                role: ChatRole::Member,
            })
            .collect();
        if !extra.is_empty() {
            self.store.insert_members(extra)?;
        }

        let members = self.store.list_members(chat.id)?;
        for member in &members {
            self.live.to_user(
                member.user_id,
                &LiveEvent::ChatListUpdate(ChatListUpdatePayload { chat_id: chat.id }),
            );
        }
        Ok(ChatDetail { chat, members })
    }

    /// Idempotent: the existing 1:1 chat between the two users is returned
    /// when there is one, regardless of who created it.
    pub fn create_private_chat(&self, user: Uuid, target: Uuid) -> AppResult<ChatDetail> {
        if user == target {
            return Err(AppError::new(
                ErrorCode::BadRequest,
                "cannot open a private chat with yourself",
            ));
        }
        let target_user = self
            .users
            .find_user(target)?
            .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

        if let Some(existing) = self.store.find_private_chat_between(user, target)? {
            let members = self.store.list_members(existing.id)?;
            return Ok(ChatDetail {
                chat: existing,
                members,
            });
        }

        let chat = self.store.insert_chat(NewChat {
            chat_type: ChatType::Private,
            name: target_user.display_name,
            description: None,
            image_url: None,
            created_by: user,
        })?;
        self.store.insert_member(NewChatMember {
            chat_id: chat.id,
            user_id: user,
            role: ChatRole::Admin,
        })?;
        self.store.insert_member(NewChatMember {
            chat_id: chat.id,
            user_id: target,
            role: ChatRole::Member,
        })?;

        let members = self.store.list_members(chat.id)?;
        self.live.to_user(
            target,
            &LiveEvent::ChatListUpdate(ChatListUpdatePayload { chat_id: chat.id }),
        );
        Ok(ChatDetail { chat, members })
    }

    pub fn get_chat(&self, chat_id: Uuid, user: Uuid) -> AppResult<ChatDetail> {
        let chat = self.require_chat(chat_id)?;
        self.require_member(chat_id, user)?;
        let members = self.store.list_members(chat_id)?;
        Ok(ChatDetail { chat, members })
    }

    pub fn list_chats(&self, user: Uuid, params: &PageParams) -> AppResult<Page<ChatPreview>> {
        let (rows, total) =
            self.store
                .list_chats_for_user(user, params.offset(), params.limit())?;

        let mut previews = Vec::with_capacity(rows.len());
        for (chat, membership) in rows {
            let last_message = match chat.last_message_id {
                Some(id) => self.store.find_message(id)?,
                None => None,
            };
            let unread_count =
                self.store
                    .count_messages_after(chat.id, membership.last_read_at, user)?;
            previews.push(ChatPreview {
                chat,
                last_message,
                unread_count,
                my_role: membership.role,
            });
        }
        Ok(Page::new(previews, total as u64, params))
    }

    pub fn update_chat_details(
        &self,
        chat_id: Uuid,
        actor: Uuid,
        change: ChatDetailsChange,
    ) -> AppResult<Chat> {
        self.require_chat(chat_id)?;
        self.require_admin(chat_id, actor)?;
        if let Some(name) = &change.name {
            if name.trim().is_empty() {
                return Err(AppError::new(
                    ErrorCode::ChatNameRequired,
                    "chat name cannot be empty",
                ));
            }
        }
        let chat = self.store.update_chat_details(chat_id, change)?;
        self.notify_chat_list(chat_id)?;
        Ok(chat)
    }

    pub fn delete_chat(&self, chat_id: Uuid, user: Uuid) -> AppResult<()> {
        let chat = self.require_chat(chat_id)?;
        if chat.created_by != user {
            return Err(AppError::new(
                ErrorCode::NotChatCreator,
                "only the chat creator can delete it",
            ));
        }
        let members = self.store.list_members(chat_id)?;
        self.store.delete_chat(chat_id)?;
        for member in members {
            self.live.to_user(
                member.user_id,
                &LiveEvent::ChatListUpdate(ChatListUpdatePayload { chat_id }),
            );
        }
        Ok(())
    }

    // --- membership ---

    pub fn add_members(
        &self,
        chat_id: Uuid,
        actor: Uuid,
        user_ids: Vec<Uuid>,
    ) -> AppResult<Vec<ChatMember>> {
        self.require_chat(chat_id)?;
        self.require_admin(chat_id, actor)?;

        let current: std::collections::HashSet<Uuid> = self
            .store
            .list_members(chat_id)?
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        // Check-then-insert can race; the store's conflict-ignoring bulk
        // insert keeps the membership unique regardless.
        let fresh: Vec<NewChatMember> = user_ids
            .into_iter()
            .filter(|id| !current.contains(id))
            .map(|user_id| NewChatMember {
                chat_id,
                user_id,
                role: ChatRole::Member,
            })
            .collect();
        if !fresh.is_empty() {
            let fresh_ids: Vec<Uuid> = fresh.iter().map(|m| m.user_id).collect();
            self.store.insert_members(fresh)?;
            for user_id in fresh_ids {
                self.live.to_user(
                    user_id,
                    &LiveEvent::ChatListUpdate(ChatListUpdatePayload { chat_id }),
                );
            }
        }
        self.store.list_members(chat_id)
    }

    pub fn promote_to_admin(&self, chat_id: Uuid, actor: Uuid, target: Uuid) -> AppResult<()> {
        self.require_chat(chat_id)?;
        self.require_admin(chat_id, actor)?;
        if self.store.find_member(chat_id, target)?.is_none() {
            return Err(AppError::new(
                ErrorCode::MemberNotFound,
                "member not found in this chat",
            ));
        }
        self.store.update_member_role(chat_id, target, ChatRole::Admin)
    }

    pub fn remove_member(&self, chat_id: Uuid, actor: Uuid, target: Uuid) -> AppResult<()> {
        self.require_chat(chat_id)?;
        self.require_admin(chat_id, actor)?;
        // self-removal is a departure: succession and empty-chat cleanup apply
        if actor == target {
            return self.leave_chat(chat_id, actor);
        }
        let removed = self.store.remove_member(chat_id, target)?;
        if removed == 0 {
            return Err(AppError::new(
                ErrorCode::MemberNotFound,
                "member not found in this chat",
            ));
        }
        self.live.to_user(
            target,
            &LiveEvent::ChatListUpdate(ChatListUpdatePayload { chat_id }),
        );
        Ok(())
    }

    /// Removes the caller's membership. The last member leaving deletes the
    /// chat outright; a departure that leaves the chat without an admin
    /// promotes exactly one deterministic successor.
    pub fn leave_chat(&self, chat_id: Uuid, user: Uuid) -> AppResult<()> {
        self.require_chat(chat_id)?;
        self.require_member(chat_id, user)?;
        self.store.remove_member(chat_id, user)?;

        let remaining = self.store.list_members(chat_id)?;
        if remaining.is_empty() {
            self.store.delete_chat(chat_id)?;
            return Ok(());
        }
        if !remaining.iter().any(|m| m.role == ChatRole::Admin) {
            if let Some(next) = succession_candidate(&remaining) {
                self.store.update_member_role(chat_id, next, ChatRole::Admin)?;
            }
        }

        self.live.to_chat(
            chat_id,
            &LiveEvent::UserLeft(RoomEventPayload {
                chat_id,
                user_id: user,
                timestamp: Utc::now(),
            }),
        );
        for member in &remaining {
            self.live.to_user(
                member.user_id,
                &LiveEvent::ChatListUpdate(ChatListUpdatePayload { chat_id }),
            );
        }
        Ok(())
    }

    pub fn update_member_color(
        &self,
        chat_id: Uuid,
        user: Uuid,
        color: String,
    ) -> AppResult<ChatMember> {
        self.require_chat(chat_id)?;
        self.require_member(chat_id, user)?;
        self.store.set_member_color(chat_id, user, color)
    }

    pub fn update_member_background(
        &self,
        chat_id: Uuid,
        user: Uuid,
        theme: String,
    ) -> AppResult<ChatMember> {
        self.require_chat(chat_id)?;
        self.require_member(chat_id, user)?;
        self.store.set_member_background(chat_id, user, theme)
    }

    // --- messages ---

    pub fn send_message(
        &self,
        chat_id: Uuid,
        author: Uuid,
        content: String,
        image_url: Option<String>,
    ) -> AppResult<ChatMessage> {
        let content = content.trim().to_owned();
        if content.is_empty() && image_url.is_none() {
            return Err(AppError::validation("message content cannot be empty"));
        }
        self.require_chat(chat_id)?;
        self.require_member(chat_id, author)?;

        let message = self.store.insert_message(NewChatMessage {
            chat_id,
            author_id: author,
            content,
            image_url,
        })?;
        self.store
            .set_last_message(chat_id, message.id, message.created_at)?;

        self.live
            .to_chat(chat_id, &LiveEvent::MessageNew(message.clone()));
        self.notify_chat_list(chat_id)?;
        Ok(message)
    }

    /// History window, oldest to newest. Fetched newest-first so the window
    /// anchors at the tail, then reversed for the client.
    pub fn get_messages(
        &self,
        chat_id: Uuid,
        user: Uuid,
        params: &PageParams,
    ) -> AppResult<Page<ChatMessage>> {
        self.require_chat(chat_id)?;
        self.require_member(chat_id, user)?;
        let (mut messages, total) =
            self.store
                .list_messages(chat_id, params.offset(), params.limit())?;
        messages.reverse();
        Ok(Page::new(messages, total as u64, params))
    }

    pub fn mark_messages_read(&self, chat_id: Uuid, user: Uuid) -> AppResult<()> {
        self.require_chat(chat_id)?;
        self.require_member(chat_id, user)?;
        let read_at = Utc::now();
        self.store.mark_chat_messages_read(chat_id)?;
        self.store.set_member_last_read(chat_id, user, read_at)?;

        self.live.to_chat(
            chat_id,
            &LiveEvent::MessageMarkedRead(RoomEventPayload {
                chat_id,
                user_id: user,
                timestamp: read_at,
            }),
        );
        self.notify_chat_list(chat_id)?;
        Ok(())
    }

    pub fn edit_message(
        &self,
        message_id: Uuid,
        user: Uuid,
        content: String,
    ) -> AppResult<ChatMessage> {
        let content = content.trim().to_owned();
        if content.is_empty() {
            return Err(AppError::validation("message content cannot be empty"));
        }
        let message = self.require_message(message_id)?;
        if message.author_id != user {
            return Err(AppError::new(
                ErrorCode::NotMessageAuthor,
                "only the author can edit a message",
            ));
        }
        self.store.update_message_content(message_id, content)
    }

    pub fn delete_message(&self, message_id: Uuid, user: Uuid) -> AppResult<()> {
        let message = self.require_message(message_id)?;
        if message.author_id != user {
            return Err(AppError::new(
                ErrorCode::NotMessageAuthor,
                "only the author can delete a message",
            ));
        }
        self.store.delete_message(message_id)
    }

    fn require_message(&self, message_id: Uuid) -> AppResult<ChatMessage> {
        self.store
            .find_message(message_id)?
            .ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "message not found"))
    }

    fn notify_chat_list(&self, chat_id: Uuid) -> AppResult<()> {
        for member in self.store.list_members(chat_id)? {
            self.live.to_user(
                member.user_id,
                &LiveEvent::ChatListUpdate(ChatListUpdatePayload { chat_id }),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::{RecordedTarget, RecordingBroadcaster};
    use crate::models::User;
    use crate::store::memory::MemoryStore;
    use chrono::{Duration, TimeZone};
    use tribo_shared::types::auth::UserRole;

    struct Harness {
        service: ChatService,
        store: Arc<MemoryStore>,
        live: Arc<RecordingBroadcaster>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let live = Arc::new(RecordingBroadcaster::new());
        let service = ChatService::new(store.clone(), store.clone(), live.clone());
        Harness {
            service,
            store,
            live,
        }
    }

    fn seed_user(store: &MemoryStore, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        store.add_user(User {
            id,
            display_name: name.to_owned(),
            role: UserRole::User,
            push_token: None,
            created_at: Utc::now(),
        });
        id
    }

    fn group_with(service: &ChatService, creator: Uuid, members: Vec<Uuid>) -> ChatDetail {
        service
            .create_group_chat(
                creator,
                CreateChatInput {
                    name: "trip planning".into(),
                    description: None,
                    image_url: None,
                    member_ids: members,
                },
            )
            .unwrap()
    }

    fn member(members: &[ChatMember], user: Uuid) -> &ChatMember {
        members.iter().find(|m| m.user_id == user).unwrap()
    }

    #[test]
    fn creator_becomes_admin() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");

        let detail = group_with(&h.service, alice, vec![bob]);
        assert_eq!(detail.members.len(), 2);
        assert_eq!(member(&detail.members, alice).role, ChatRole::Admin);
        assert_eq!(member(&detail.members, bob).role, ChatRole::Member);
    }

    #[test]
    fn group_chat_requires_name() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let err = h
            .service
            .create_group_chat(
                alice,
                CreateChatInput {
                    name: "   ".into(),
                    description: None,
                    image_url: None,
                    member_ids: vec![],
                },
            )
            .unwrap_err();
        assert_eq!(err.error_code(), "E2008");
    }

    #[test]
    fn private_chat_is_idempotent_in_both_orders() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");

        let first = h.service.create_private_chat(alice, bob).unwrap();
        let again = h.service.create_private_chat(alice, bob).unwrap();
        let reversed = h.service.create_private_chat(bob, alice).unwrap();

        assert_eq!(first.chat.id, again.chat.id);
        assert_eq!(first.chat.id, reversed.chat.id);
        assert_eq!(first.members.len(), 2);
    }

    #[test]
    fn private_chat_rejects_unknown_target() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let err = h
            .service
            .create_private_chat(alice, Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.error_code(), "E3001");
    }

    #[test]
    fn add_members_skips_existing_silently() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");
        let carol = seed_user(&h.store, "carol");

        let detail = group_with(&h.service, alice, vec![bob]);
        let members = h
            .service
            .add_members(detail.chat.id, alice, vec![bob, carol, carol])
            .unwrap();

        assert_eq!(members.len(), 3);
        assert_eq!(
            members.iter().filter(|m| m.user_id == carol).count(),
            1
        );
    }

    #[test]
    fn only_admins_add_members() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");
        let carol = seed_user(&h.store, "carol");

        let detail = group_with(&h.service, alice, vec![bob]);
        let err = h
            .service
            .add_members(detail.chat.id, bob, vec![carol])
            .unwrap_err();
        assert_eq!(err.error_code(), "E2003");
    }

    #[test]
    fn non_member_cannot_send() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let mallory = seed_user(&h.store, "mallory");

        let detail = group_with(&h.service, alice, vec![]);
        let err = h
            .service
            .send_message(detail.chat.id, mallory, "hi".into(), None)
            .unwrap_err();
        assert_eq!(err.error_code(), "E2002");
    }

    #[test]
    fn send_message_advances_pointer_and_broadcasts() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");

        let detail = group_with(&h.service, alice, vec![bob]);
        let message = h
            .service
            .send_message(detail.chat.id, alice, "hello".into(), None)
            .unwrap();

        let chat = h.store.find_chat(detail.chat.id).unwrap().unwrap();
        assert_eq!(chat.last_message_id, Some(message.id));

        let events = h.live.events();
        assert!(events
            .iter()
            .any(|e| e.name == "message:new" && e.target == RecordedTarget::Chat(detail.chat.id)));
        assert!(events
            .iter()
            .any(|e| e.name == "chat:list-update" && e.target == RecordedTarget::User(bob)));
    }

    #[test]
    fn empty_message_is_rejected() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let detail = group_with(&h.service, alice, vec![]);
        let err = h
            .service
            .send_message(detail.chat.id, alice, "   ".into(), None)
            .unwrap_err();
        assert_eq!(err.error_code(), "E0002");
    }

    #[test]
    fn message_window_is_oldest_to_newest() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let detail = group_with(&h.service, alice, vec![]);
        for i in 0..5 {
            h.service
                .send_message(detail.chat.id, alice, format!("m{i}"), None)
                .unwrap();
        }

        let page = h
            .service
            .get_messages(detail.chat.id, alice, &PageParams { skip: 0, take: 3 })
            .unwrap();
        assert_eq!(page.total, 5);
        // newest three, in chronological order
        let contents: Vec<&str> = page.data.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn unread_counts_follow_last_read_at() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");
        let detail = group_with(&h.service, alice, vec![bob]);

        h.service
            .send_message(detail.chat.id, bob, "one".into(), None)
            .unwrap();
        h.service
            .send_message(detail.chat.id, bob, "two".into(), None)
            .unwrap();

        let page = h.service.list_chats(alice, &PageParams::default()).unwrap();
        assert_eq!(page.data[0].unread_count, 2);
        // own messages never count against the author
        let bob_page = h.service.list_chats(bob, &PageParams::default()).unwrap();
        assert_eq!(bob_page.data[0].unread_count, 0);

        h.service.mark_messages_read(detail.chat.id, alice).unwrap();
        let page = h.service.list_chats(alice, &PageParams::default()).unwrap();
        assert_eq!(page.data[0].unread_count, 0);

        h.service
            .send_message(detail.chat.id, bob, "three".into(), None)
            .unwrap();
        let page = h.service.list_chats(alice, &PageParams::default()).unwrap();
        assert_eq!(page.data[0].unread_count, 1);
        assert_eq!(page.data[0].last_message.as_ref().unwrap().content, "three");
    }

    #[test]
    fn last_member_leaving_deletes_the_chat() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let detail = group_with(&h.service, alice, vec![]);
        h.service
            .send_message(detail.chat.id, alice, "note to self".into(), None)
            .unwrap();

        h.service.leave_chat(detail.chat.id, alice).unwrap();

        assert!(h.store.find_chat(detail.chat.id).unwrap().is_none());
        let (messages, total) = h.store.list_messages(detail.chat.id, 0, 10).unwrap();
        assert!(messages.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn admin_departure_promotes_exactly_one_survivor() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");
        let carol = seed_user(&h.store, "carol");
        let detail = group_with(&h.service, alice, vec![bob, carol]);

        let before = h.store.list_members(detail.chat.id).unwrap();
        let survivors: Vec<ChatMember> = before
            .iter()
            .filter(|m| m.user_id != alice)
            .cloned()
            .collect();
        let expected = succession_candidate(&survivors).unwrap();

        h.service.leave_chat(detail.chat.id, alice).unwrap();

        let after = h.store.list_members(detail.chat.id).unwrap();
        let admins: Vec<&ChatMember> =
            after.iter().filter(|m| m.role == ChatRole::Admin).collect();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].user_id, expected);
    }

    #[test]
    fn admin_self_removal_promotes_a_successor() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");
        let detail = group_with(&h.service, alice, vec![bob]);

        h.service
            .remove_member(detail.chat.id, alice, alice)
            .unwrap();

        let after = h.store.list_members(detail.chat.id).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].user_id, bob);
        assert_eq!(after[0].role, ChatRole::Admin);
    }

    #[test]
    fn sole_member_self_removal_deletes_the_chat() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let detail = group_with(&h.service, alice, vec![]);

        h.service
            .remove_member(detail.chat.id, alice, alice)
            .unwrap();

        assert!(h.store.find_chat(detail.chat.id).unwrap().is_none());
    }

    #[test]
    fn mark_read_stamp_matches_broadcast_timestamp() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");
        let detail = group_with(&h.service, alice, vec![bob]);
        h.service
            .send_message(detail.chat.id, bob, "hi".into(), None)
            .unwrap();

        h.service.mark_messages_read(detail.chat.id, alice).unwrap();

        let member = h
            .store
            .find_member(detail.chat.id, alice)
            .unwrap()
            .unwrap();
        let last_read = member.last_read_at.unwrap();

        let events = h.live.events();
        let marked = events
            .iter()
            .find(|e| e.name == "message:marked-read")
            .unwrap();
        let broadcast: chrono::DateTime<Utc> =
            serde_json::from_value(marked.payload["timestamp"].clone()).unwrap();
        assert_eq!(broadcast, last_read);
    }

    #[test]
    fn non_admin_departure_keeps_roles() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");
        let detail = group_with(&h.service, alice, vec![bob]);

        h.service.leave_chat(detail.chat.id, bob).unwrap();

        let after = h.store.list_members(detail.chat.id).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].user_id, alice);
        assert_eq!(after[0].role, ChatRole::Admin);
    }

    #[test]
    fn succession_breaks_joined_at_ties_by_user_id() {
        let joined = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        let chat_id = Uuid::new_v4();

        let make = |user_id: Uuid, joined_at| ChatMember {
            id: Uuid::new_v4(),
            chat_id,
            user_id,
            role: ChatRole::Member,
            name_color: None,
            background_theme: None,
            joined_at,
            last_read_at: None,
        };

        let members = vec![make(high, joined), make(low, joined)];
        assert_eq!(succession_candidate(&members), Some(low));

        let earlier = vec![
            make(low, joined),
            make(high, joined - Duration::minutes(5)),
        ];
        assert_eq!(succession_candidate(&earlier), Some(high));
    }

    #[test]
    fn only_creator_deletes_chat() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");
        let detail = group_with(&h.service, alice, vec![bob]);

        h.service.promote_to_admin(detail.chat.id, alice, bob).unwrap();
        let err = h.service.delete_chat(detail.chat.id, bob).unwrap_err();
        assert_eq!(err.error_code(), "E2007");

        h.service.delete_chat(detail.chat.id, alice).unwrap();
        assert!(h.store.find_chat(detail.chat.id).unwrap().is_none());
    }

    #[test]
    fn promote_requires_existing_member() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let detail = group_with(&h.service, alice, vec![]);
        let err = h
            .service
            .promote_to_admin(detail.chat.id, alice, Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.error_code(), "E2004");
    }

    #[test]
    fn edit_and_delete_are_author_only() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let bob = seed_user(&h.store, "bob");
        let detail = group_with(&h.service, alice, vec![bob]);

        let message = h
            .service
            .send_message(detail.chat.id, alice, "draft".into(), None)
            .unwrap();

        let err = h
            .service
            .edit_message(message.id, bob, "hijacked".into())
            .unwrap_err();
        assert_eq!(err.error_code(), "E2006");
        let err = h.service.delete_message(message.id, bob).unwrap_err();
        assert_eq!(err.error_code(), "E2006");

        let edited = h
            .service
            .edit_message(message.id, alice, "final".into())
            .unwrap();
        assert_eq!(edited.content, "final");
        h.service.delete_message(message.id, alice).unwrap();
        assert!(h.store.find_message(message.id).unwrap().is_none());
    }

    #[test]
    fn member_customization_is_member_only() {
        let h = harness();
        let alice = seed_user(&h.store, "alice");
        let outsider = seed_user(&h.store, "outsider");
        let detail = group_with(&h.service, alice, vec![]);

        let updated = h
            .service
            .update_member_color(detail.chat.id, alice, "#ff8800".into())
            .unwrap();
        assert_eq!(updated.name_color.as_deref(), Some("#ff8800"));

        let err = h
            .service
            .update_member_background(detail.chat.id, outsider, "dark".into())
            .unwrap_err();
        assert_eq!(err.error_code(), "E2002");
    }
}
