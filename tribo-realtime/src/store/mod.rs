pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tribo_shared::errors::AppResult;

use crate::models::{
    Chat, ChatDetailsChange, ChatMember, ChatMessage, ChatRole, NewChat, NewChatMember,
    NewChatMessage, NewNotification, Notification, User,
};

/// Durable persistence for chats, memberships and messages.
///
/// Fetch granularity is explicit at the call site: `find_chat` returns the
/// bare row, `list_members` pulls the membership separately. There is no
/// eager-loading flag.
pub trait ChatStore: Send + Sync {
    fn insert_chat(&self, chat: NewChat) -> AppResult<Chat>;
    fn find_chat(&self, id: Uuid) -> AppResult<Option<Chat>>;
    /// The existing PRIVATE chat that has both users as members, if any.
    fn find_private_chat_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Chat>>;
    /// Chats the user belongs to, paired with that user's own membership,
    /// newest activity first. Also returns the unpaginated total.
    fn list_chats_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<(Chat, ChatMember)>, i64)>;
    fn update_chat_details(&self, id: Uuid, change: ChatDetailsChange) -> AppResult<Chat>;
    fn set_last_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()>;
    /// Deletes the chat; members and messages cascade with it.
    fn delete_chat(&self, id: Uuid) -> AppResult<()>;

    fn insert_member(&self, member: NewChatMember) -> AppResult<ChatMember>;
    /// Bulk insert that ignores (chat_id, user_id) pairs already present.
    fn insert_members(&self, members: Vec<NewChatMember>) -> AppResult<()>;
    fn find_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<Option<ChatMember>>;
    fn list_members(&self, chat_id: Uuid) -> AppResult<Vec<ChatMember>>;
    fn update_member_role(&self, chat_id: Uuid, user_id: Uuid, role: ChatRole) -> AppResult<()>;
    fn set_member_color(&self, chat_id: Uuid, user_id: Uuid, color: String)
        -> AppResult<ChatMember>;
    fn set_member_background(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        theme: String,
    ) -> AppResult<ChatMember>;
    fn set_member_last_read(&self, chat_id: Uuid, user_id: Uuid, at: DateTime<Utc>)
        -> AppResult<()>;
    /// Returns the number of rows removed (0 when the member was absent).
    fn remove_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<usize>;

    fn insert_message(&self, message: NewChatMessage) -> AppResult<ChatMessage>;
    fn find_message(&self, id: Uuid) -> AppResult<Option<ChatMessage>>;
    /// Messages newest-first within the window, plus the unpaginated total.
    fn list_messages(
        &self,
        chat_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<ChatMessage>, i64)>;
    fn update_message_content(&self, id: Uuid, content: String) -> AppResult<ChatMessage>;
    fn delete_message(&self, id: Uuid) -> AppResult<()>;
    /// Flags every unread message in the chat as read.
    fn mark_chat_messages_read(&self, chat_id: Uuid) -> AppResult<usize>;
    /// Messages in the chat newer than `after` (all of them when `None`),
    /// excluding the given author's own.
    fn count_messages_after(
        &self,
        chat_id: Uuid,
        after: Option<DateTime<Utc>>,
        exclude_author: Uuid,
    ) -> AppResult<i64>;
}

/// Durable persistence of per-user notifications with bounded retention.
pub trait NotificationStore: Send + Sync {
    fn insert_notification(&self, notification: NewNotification) -> AppResult<Notification>;
    fn list_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Notification>, i64)>;
    /// Flags one of the user's notifications as read. `NotificationNotFound`
    /// when the row does not exist or belongs to someone else.
    fn mark_read(&self, user_id: Uuid, id: Uuid) -> AppResult<Notification>;
    fn mark_all_read(&self, user_id: Uuid) -> AppResult<usize>;
    fn count_for_user(&self, user_id: Uuid) -> AppResult<i64>;
    /// Deletes the user's oldest notifications beyond `keep`. Returns the
    /// number evicted.
    fn prune_oldest(&self, user_id: Uuid, keep: usize) -> AppResult<usize>;
}

/// Read access to the identity mirror. Users are written by the identity
/// service; this service only looks them up.
pub trait UserStore: Send + Sync {
    fn find_user(&self, id: Uuid) -> AppResult<Option<User>>;
    fn list_admins(&self) -> AppResult<Vec<User>>;
    fn list_users(&self) -> AppResult<Vec<User>>;
}
