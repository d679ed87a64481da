//! In-memory store implementations. They back the service-level tests so
//! business rules can be exercised without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tribo_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{
    Chat, ChatDetailsChange, ChatMember, ChatMessage, ChatRole, NewChat, NewChatMember,
    NewChatMessage, NewNotification, Notification, User,
};
use crate::store::{ChatStore, NotificationStore, UserStore};

#[derive(Default)]
struct Inner {
    chats: HashMap<Uuid, Chat>,
    members: Vec<ChatMember>,
    messages: Vec<ChatMessage>,
    notifications: Vec<Notification>,
    users: HashMap<Uuid, User>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: User) {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(user.id, user);
    }
}

impl ChatStore for MemoryStore {
    fn insert_chat(&self, chat: NewChat) -> AppResult<Chat> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let stored = Chat {
            id: Uuid::new_v4(),
            chat_type: chat.chat_type,
            name: chat.name,
            description: chat.description,
            image_url: chat.image_url,
            created_by: chat.created_by,
            last_message_id: None,
            created_at: now,
            updated_at: now,
        };
        inner.chats.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn find_chat(&self, id: Uuid) -> AppResult<Option<Chat>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.chats.get(&id).cloned())
    }

    fn find_private_chat_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Chat>> {
        let inner = self.inner.lock().unwrap();
        let chat = inner
            .chats
            .values()
            .filter(|c| c.chat_type == crate::models::ChatType::Private)
            .find(|c| {
                let in_chat = |u: Uuid| {
                    inner
                        .members
                        .iter()
                        .any(|m| m.chat_id == c.id && m.user_id == u)
                };
                in_chat(a) && in_chat(b)
            })
            .cloned();
        Ok(chat)
    }

    fn list_chats_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<(Chat, ChatMember)>, i64)> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<(Chat, ChatMember)> = inner
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| inner.chats.get(&m.chat_id).map(|c| (c.clone(), m.clone())))
            .collect();
        rows.sort_by(|a, b| b.0.updated_at.cmp(&a.0.updated_at).then(a.0.id.cmp(&b.0.id)));
        let total = rows.len() as i64;
        let rows = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((rows, total))
    }

    fn update_chat_details(&self, id: Uuid, change: ChatDetailsChange) -> AppResult<Chat> {
        let mut inner = self.inner.lock().unwrap();
        let chat = inner
            .chats
            .get_mut(&id)
            .ok_or_else(|| AppError::new(ErrorCode::ChatNotFound, "chat not found"))?;
        if let Some(name) = change.name {
            chat.name = name;
        }
        if let Some(description) = change.description {
            chat.description = Some(description);
        }
        if let Some(image_url) = change.image_url {
            chat.image_url = Some(image_url);
        }
        chat.updated_at = Utc::now();
        Ok(chat.clone())
    }

    fn set_last_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(chat) = inner.chats.get_mut(&chat_id) {
            chat.last_message_id = Some(message_id);
            chat.updated_at = at;
        }
        Ok(())
    }

    fn delete_chat(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.chats.remove(&id);
        inner.members.retain(|m| m.chat_id != id);
        inner.messages.retain(|m| m.chat_id != id);
        Ok(())
    }

    fn insert_member(&self, member: NewChatMember) -> AppResult<ChatMember> {
        let mut inner = self.inner.lock().unwrap();
        let stored = ChatMember {
            id: Uuid::new_v4(),
            chat_id: member.chat_id,
            user_id: member.user_id,
            role: member.role,
            name_color: None,
            background_theme: None,
            joined_at: Utc::now(),
            last_read_at: None,
        };
        inner.members.push(stored.clone());
        Ok(stored)
    }

    fn insert_members(&self, members: Vec<NewChatMember>) -> AppResult<()> {
        for member in members {
            let exists = {
                let inner = self.inner.lock().unwrap();
                inner
                    .members
                    .iter()
                    .any(|m| m.chat_id == member.chat_id && m.user_id == member.user_id)
            };
            if !exists {
                self.insert_member(member)?;
            }
        }
        Ok(())
    }

    fn find_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<Option<ChatMember>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .members
            .iter()
            .find(|m| m.chat_id == chat_id && m.user_id == user_id)
            .cloned())
    }

    fn list_members(&self, chat_id: Uuid) -> AppResult<Vec<ChatMember>> {
        let inner = self.inner.lock().unwrap();
        let mut members: Vec<ChatMember> = inner
            .members
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(members)
    }

    fn update_member_role(&self, chat_id: Uuid, user_id: Uuid, role: ChatRole) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(member) = inner
            .members
            .iter_mut()
            .find(|m| m.chat_id == chat_id && m.user_id == user_id)
        {
            member.role = role;
        }
        Ok(())
    }

    fn set_member_color(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        color: String,
    ) -> AppResult<ChatMember> {
        let mut inner = self.inner.lock().unwrap();
        let member = inner
            .members
            .iter_mut()
            .find(|m| m.chat_id == chat_id && m.user_id == user_id)
            .ok_or_else(|| AppError::new(ErrorCode::MemberNotFound, "member not found"))?;
        member.name_color = Some(color);
        Ok(member.clone())
    }

    fn set_member_background(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        theme: String,
    ) -> AppResult<ChatMember> {
        let mut inner = self.inner.lock().unwrap();
        let member = inner
            .members
            .iter_mut()
            .find(|m| m.chat_id == chat_id && m.user_id == user_id)
            .ok_or_else(|| AppError::new(ErrorCode::MemberNotFound, "member not found"))?;
        member.background_theme = Some(theme);
        Ok(member.clone())
    }

    fn set_member_last_read(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(member) = inner
            .members
            .iter_mut()
            .find(|m| m.chat_id == chat_id && m.user_id == user_id)
        {
            member.last_read_at = Some(at);
        }
        Ok(())
    }

    fn remove_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.members.len();
        inner
            .members
            .retain(|m| !(m.chat_id == chat_id && m.user_id == user_id));
        Ok(before - inner.members.len())
    }

    fn insert_message(&self, message: NewChatMessage) -> AppResult<ChatMessage> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let stored = ChatMessage {
            id: Uuid::new_v4(),
            chat_id: message.chat_id,
            author_id: message.author_id,
            content: message.content,
            image_url: message.image_url,
            is_read: false,
            created_at: now,
            updated_at: now,
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    fn find_message(&self, id: Uuid) -> AppResult<Option<ChatMessage>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.messages.iter().find(|m| m.id == id).cloned())
    }

    fn list_messages(
        &self,
        chat_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<ChatMessage>, i64)> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = rows.len() as i64;
        let rows = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((rows, total))
    }

    fn update_message_content(&self, id: Uuid, content: String) -> AppResult<ChatMessage> {
        let mut inner = self.inner.lock().unwrap();
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "message not found"))?;
        message.content = content;
        message.updated_at = Utc::now();
        Ok(message.clone())
    }

    fn delete_message(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.messages.retain(|m| m.id != id);
        Ok(())
    }

    fn mark_chat_messages_read(&self, chat_id: Uuid) -> AppResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = 0;
        for message in inner
            .messages
            .iter_mut()
            .filter(|m| m.chat_id == chat_id && !m.is_read)
        {
            message.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    fn count_messages_after(
        &self,
        chat_id: Uuid,
        after: Option<DateTime<Utc>>,
        exclude_author: Uuid,
    ) -> AppResult<i64> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && m.author_id != exclude_author)
            .filter(|m| after.map_or(true, |t| m.created_at > t))
            .count();
        Ok(count as i64)
    }
}

impl NotificationStore for MemoryStore {
    fn insert_notification(&self, notification: NewNotification) -> AppResult<Notification> {
        let mut inner = self.inner.lock().unwrap();
        let stored = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            title: notification.title,
            body: notification.body,
            icon: notification.icon,
            data: notification.data,
            is_read: false,
            created_at: Utc::now(),
        };
        inner.notifications.push(stored.clone());
        Ok(stored)
    }

    fn list_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Notification>, i64)> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Notification> = inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = rows.len() as i64;
        let rows = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((rows, total))
    }

    fn mark_read(&self, user_id: Uuid, id: Uuid) -> AppResult<Notification> {
        let mut inner = self.inner.lock().unwrap();
        let notification = inner
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .ok_or_else(|| {
                AppError::new(ErrorCode::NotificationNotFound, "notification not found")
            })?;
        notification.is_read = true;
        Ok(notification.clone())
    }

    fn mark_all_read(&self, user_id: Uuid) -> AppResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = 0;
        for notification in inner
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            notification.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    fn count_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .count() as i64)
    }

    fn prune_oldest(&self, user_id: Uuid, keep: usize) -> AppResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let mut own: Vec<(Uuid, DateTime<Utc>)> = inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| (n.id, n.created_at))
            .collect();
        if own.len() <= keep {
            return Ok(0);
        }
        // newest first; everything past `keep` goes
        own.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
        let stale: Vec<Uuid> = own.into_iter().skip(keep).map(|(id, _)| id).collect();
        inner.notifications.retain(|n| !stale.contains(&n.id));
        Ok(stale.len())
    }
}

impl UserStore for MemoryStore {
    fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.get(&id).cloned())
    }

    fn list_admins(&self) -> AppResult<Vec<User>> {
        let inner = self.inner.lock().unwrap();
        let mut admins: Vec<User> = inner
            .users
            .values()
            .filter(|u| u.role == tribo_shared::types::auth::UserRole::Admin)
            .cloned()
            .collect();
        admins.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(admins)
    }

    fn list_users(&self) -> AppResult<Vec<User>> {
        let inner = self.inner.lock().unwrap();
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }
}
