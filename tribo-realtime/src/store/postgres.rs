use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use uuid::Uuid;

use tribo_shared::clients::db::DbPool;
use tribo_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{
    Chat, ChatDetailsChange, ChatMember, ChatMessage, ChatRole, ChatType, NewChat, NewChatMember,
    NewChatMessage, NewNotification, Notification, User,
};
use crate::schema::{chat_members, chat_messages, chats, notifications, users};
use crate::store::{ChatStore, NotificationStore, UserStore};

/// Postgres-backed store. Enum-typed fields live as VARCHAR columns and are
/// converted at this boundary.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<PooledConnection<ConnectionManager<PgConnection>>> {
        self.pool.get().map_err(|e| AppError::Internal(e.into()))
    }
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> AppError {
    AppError::internal(format!("corrupt {field} column: {err}"))
}

// --- Row types ---

#[derive(Debug, Queryable)]
struct ChatRow {
    id: Uuid,
    chat_type: String,
    name: String,
    description: Option<String>,
    image_url: Option<String>,
    created_by: Uuid,
    last_message_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ChatRow {
    fn into_domain(self) -> AppResult<Chat> {
        Ok(Chat {
            id: self.id,
            chat_type: self
                .chat_type
                .parse::<ChatType>()
                .map_err(|e| corrupt("chat_type", e))?,
            name: self.name,
            description: self.description,
            image_url: self.image_url,
            created_by: self.created_by,
            last_message_id: self.last_message_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chats)]
struct NewChatRow {
    chat_type: String,
    name: String,
    description: Option<String>,
    image_url: Option<String>,
    created_by: Uuid,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = chats)]
struct ChatDetailsChangeset {
    name: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Queryable)]
struct ChatMemberRow {
    id: Uuid,
    chat_id: Uuid,
    user_id: Uuid,
    role: String,
    name_color: Option<String>,
    background_theme: Option<String>,
    joined_at: DateTime<Utc>,
    last_read_at: Option<DateTime<Utc>>,
}

impl ChatMemberRow {
    fn into_domain(self) -> AppResult<ChatMember> {
        Ok(ChatMember {
            id: self.id,
            chat_id: self.chat_id,
            user_id: self.user_id,
            role: self
                .role
                .parse::<ChatRole>()
                .map_err(|e| corrupt("role", e))?,
            name_color: self.name_color,
            background_theme: self.background_theme,
            joined_at: self.joined_at,
            last_read_at: self.last_read_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_members)]
struct NewChatMemberRow {
    chat_id: Uuid,
    user_id: Uuid,
    role: String,
}

impl From<NewChatMember> for NewChatMemberRow {
    fn from(m: NewChatMember) -> Self {
        Self {
            chat_id: m.chat_id,
            user_id: m.user_id,
            role: m.role.to_string(),
        }
    }
}

#[derive(Debug, Queryable)]
struct ChatMessageRow {
    id: Uuid,
    chat_id: Uuid,
    author_id: Uuid,
    content: String,
    image_url: Option<String>,
    is_read: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(r: ChatMessageRow) -> Self {
        Self {
            id: r.id,
            chat_id: r.chat_id,
            author_id: r.author_id,
            content: r.content,
            image_url: r.image_url,
            is_read: r.is_read,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_messages)]
struct NewChatMessageRow {
    chat_id: Uuid,
    author_id: Uuid,
    content: String,
    image_url: Option<String>,
}

#[derive(Debug, Queryable)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    body: String,
    icon: Option<String>,
    data: Option<serde_json::Value>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(r: NotificationRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            title: r.title,
            body: r.body,
            icon: r.icon,
            data: r.data,
            is_read: r.is_read,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
struct NewNotificationRow {
    user_id: Uuid,
    title: String,
    body: String,
    icon: Option<String>,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Queryable)]
struct UserRow {
    id: Uuid,
    display_name: String,
    role: String,
    push_token: Option<String>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_domain(self) -> AppResult<User> {
        Ok(User {
            id: self.id,
            display_name: self.display_name,
            role: self.role.parse().map_err(|e| corrupt("role", e))?,
            push_token: self.push_token,
            created_at: self.created_at,
        })
    }
}

// --- ChatStore ---

impl ChatStore for PgStore {
    fn insert_chat(&self, chat: NewChat) -> AppResult<Chat> {
        let mut conn = self.conn()?;
        let row: ChatRow = diesel::insert_into(chats::table)
            .values(NewChatRow {
                chat_type: chat.chat_type.to_string(),
                name: chat.name,
                description: chat.description,
                image_url: chat.image_url,
                created_by: chat.created_by,
            })
            .get_result(&mut conn)?;
        row.into_domain()
    }

    fn find_chat(&self, id: Uuid) -> AppResult<Option<Chat>> {
        let mut conn = self.conn()?;
        let row: Option<ChatRow> = chats::table.find(id).first(&mut conn).optional()?;
        row.map(ChatRow::into_domain).transpose()
    }

    fn find_private_chat_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Chat>> {
        let mut conn = self.conn()?;

        let a_chats: Vec<Uuid> = chat_members::table
            .filter(chat_members::user_id.eq(a))
            .select(chat_members::chat_id)
            .load(&mut conn)?;
        if a_chats.is_empty() {
            return Ok(None);
        }

        let shared: Vec<Uuid> = chat_members::table
            .filter(chat_members::user_id.eq(b))
            .filter(chat_members::chat_id.eq_any(&a_chats))
            .select(chat_members::chat_id)
            .load(&mut conn)?;
        if shared.is_empty() {
            return Ok(None);
        }

        let row: Option<ChatRow> = chats::table
            .filter(chats::id.eq_any(&shared))
            .filter(chats::chat_type.eq(ChatType::Private.to_string()))
            .first(&mut conn)
            .optional()?;
        row.map(ChatRow::into_domain).transpose()
    }

    fn list_chats_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<(Chat, ChatMember)>, i64)> {
        let mut conn = self.conn()?;

        let total: i64 = chat_members::table
            .filter(chat_members::user_id.eq(user_id))
            .select(count_star())
            .first(&mut conn)?;

        let rows: Vec<(ChatRow, ChatMemberRow)> = chats::table
            .inner_join(chat_members::table)
            .filter(chat_members::user_id.eq(user_id))
            .order(chats::updated_at.desc())
            .offset(offset)
            .limit(limit)
            .load(&mut conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for (chat, member) in rows {
            out.push((chat.into_domain()?, member.into_domain()?));
        }
        Ok((out, total))
    }

    fn update_chat_details(&self, id: Uuid, change: ChatDetailsChange) -> AppResult<Chat> {
        let mut conn = self.conn()?;
        let row: ChatRow = diesel::update(chats::table.find(id))
            .set(ChatDetailsChangeset {
                name: change.name,
                description: change.description,
                image_url: change.image_url,
                updated_at: Utc::now(),
            })
            .get_result(&mut conn)?;
        row.into_domain()
    }

    fn set_last_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::update(chats::table.find(chat_id))
            .set((
                chats::last_message_id.eq(message_id),
                chats::updated_at.eq(at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn delete_chat(&self, id: Uuid) -> AppResult<()> {
        let mut conn = self.conn()?;
        // members and messages go with it via ON DELETE CASCADE
        diesel::delete(chats::table.find(id)).execute(&mut conn)?;
        Ok(())
    }

    fn insert_member(&self, member: NewChatMember) -> AppResult<ChatMember> {
        let mut conn = self.conn()?;
        let row: ChatMemberRow = diesel::insert_into(chat_members::table)
            .values(NewChatMemberRow::from(member))
            .get_result(&mut conn)?;
        row.into_domain()
    }

    fn insert_members(&self, members: Vec<NewChatMember>) -> AppResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let rows: Vec<NewChatMemberRow> =
            members.into_iter().map(NewChatMemberRow::from).collect();
        diesel::insert_into(chat_members::table)
            .values(&rows)
            .on_conflict((chat_members::chat_id, chat_members::user_id))
            .do_nothing()
            .execute(&mut conn)?;
        Ok(())
    }

    fn find_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<Option<ChatMember>> {
        let mut conn = self.conn()?;
        let row: Option<ChatMemberRow> = chat_members::table
            .filter(chat_members::chat_id.eq(chat_id))
            .filter(chat_members::user_id.eq(user_id))
            .first(&mut conn)
            .optional()?;
        row.map(ChatMemberRow::into_domain).transpose()
    }

    fn list_members(&self, chat_id: Uuid) -> AppResult<Vec<ChatMember>> {
        let mut conn = self.conn()?;
        let rows: Vec<ChatMemberRow> = chat_members::table
            .filter(chat_members::chat_id.eq(chat_id))
            .order(chat_members::joined_at.asc())
            .load(&mut conn)?;
        rows.into_iter().map(ChatMemberRow::into_domain).collect()
    }

    fn update_member_role(&self, chat_id: Uuid, user_id: Uuid, role: ChatRole) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::update(
            chat_members::table
                .filter(chat_members::chat_id.eq(chat_id))
                .filter(chat_members::user_id.eq(user_id)),
        )
        .set(chat_members::role.eq(role.to_string()))
        .execute(&mut conn)?;
        Ok(())
    }

    fn set_member_color(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        color: String,
    ) -> AppResult<ChatMember> {
        let mut conn = self.conn()?;
        let row: ChatMemberRow = diesel::update(
            chat_members::table
                .filter(chat_members::chat_id.eq(chat_id))
                .filter(chat_members::user_id.eq(user_id)),
        )
        .set(chat_members::name_color.eq(color))
        .get_result(&mut conn)?;
        row.into_domain()
    }

    fn set_member_background(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        theme: String,
    ) -> AppResult<ChatMember> {
        let mut conn = self.conn()?;
        let row: ChatMemberRow = diesel::update(
            chat_members::table
                .filter(chat_members::chat_id.eq(chat_id))
                .filter(chat_members::user_id.eq(user_id)),
        )
        .set(chat_members::background_theme.eq(theme))
        .get_result(&mut conn)?;
        row.into_domain()
    }

    fn set_member_last_read(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::update(
            chat_members::table
                .filter(chat_members::chat_id.eq(chat_id))
                .filter(chat_members::user_id.eq(user_id)),
        )
        .set(chat_members::last_read_at.eq(at))
        .execute(&mut conn)?;
        Ok(())
    }

    fn remove_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let removed = diesel::delete(
            chat_members::table
                .filter(chat_members::chat_id.eq(chat_id))
                .filter(chat_members::user_id.eq(user_id)),
        )
        .execute(&mut conn)?;
        Ok(removed)
    }

    fn insert_message(&self, message: NewChatMessage) -> AppResult<ChatMessage> {
        let mut conn = self.conn()?;
        let row: ChatMessageRow = diesel::insert_into(chat_messages::table)
            .values(NewChatMessageRow {
                chat_id: message.chat_id,
                author_id: message.author_id,
                content: message.content,
                image_url: message.image_url,
            })
            .get_result(&mut conn)?;
        Ok(row.into())
    }

    fn find_message(&self, id: Uuid) -> AppResult<Option<ChatMessage>> {
        let mut conn = self.conn()?;
        let row: Option<ChatMessageRow> =
            chat_messages::table.find(id).first(&mut conn).optional()?;
        Ok(row.map(Into::into))
    }

    fn list_messages(
        &self,
        chat_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<ChatMessage>, i64)> {
        let mut conn = self.conn()?;

        let total: i64 = chat_messages::table
            .filter(chat_messages::chat_id.eq(chat_id))
            .select(count_star())
            .first(&mut conn)?;

        let rows: Vec<ChatMessageRow> = chat_messages::table
            .filter(chat_messages::chat_id.eq(chat_id))
            .order(chat_messages::created_at.desc())
            .offset(offset)
            .limit(limit)
            .load(&mut conn)?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    fn update_message_content(&self, id: Uuid, content: String) -> AppResult<ChatMessage> {
        let mut conn = self.conn()?;
        let row: ChatMessageRow = diesel::update(chat_messages::table.find(id))
            .set((
                chat_messages::content.eq(content),
                chat_messages::updated_at.eq(Utc::now()),
            ))
            .get_result(&mut conn)?;
        Ok(row.into())
    }

    fn delete_message(&self, id: Uuid) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::delete(chat_messages::table.find(id)).execute(&mut conn)?;
        Ok(())
    }

    fn mark_chat_messages_read(&self, chat_id: Uuid) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            chat_messages::table
                .filter(chat_messages::chat_id.eq(chat_id))
                .filter(chat_messages::is_read.eq(false)),
        )
        .set(chat_messages::is_read.eq(true))
        .execute(&mut conn)?;
        Ok(updated)
    }

    fn count_messages_after(
        &self,
        chat_id: Uuid,
        after: Option<DateTime<Utc>>,
        exclude_author: Uuid,
    ) -> AppResult<i64> {
        let mut conn = self.conn()?;
        let mut query = chat_messages::table
            .filter(chat_messages::chat_id.eq(chat_id))
            .filter(chat_messages::author_id.ne(exclude_author))
            .into_boxed();
        if let Some(after) = after {
            query = query.filter(chat_messages::created_at.gt(after));
        }
        let count: i64 = query.select(count_star()).first(&mut conn)?;
        Ok(count)
    }
}

// --- NotificationStore ---

impl NotificationStore for PgStore {
    fn insert_notification(&self, notification: NewNotification) -> AppResult<Notification> {
        let mut conn = self.conn()?;
        let row: NotificationRow = diesel::insert_into(notifications::table)
            .values(NewNotificationRow {
                user_id: notification.user_id,
                title: notification.title,
                body: notification.body,
                icon: notification.icon,
                data: notification.data,
            })
            .get_result(&mut conn)?;
        Ok(row.into())
    }

    fn list_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Notification>, i64)> {
        let mut conn = self.conn()?;

        let total: i64 = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .select(count_star())
            .first(&mut conn)?;

        let rows: Vec<NotificationRow> = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .order(notifications::created_at.desc())
            .offset(offset)
            .limit(limit)
            .load(&mut conn)?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    fn mark_read(&self, user_id: Uuid, id: Uuid) -> AppResult<Notification> {
        let mut conn = self.conn()?;
        let row: Option<NotificationRow> = diesel::update(
            notifications::table
                .filter(notifications::id.eq(id))
                .filter(notifications::user_id.eq(user_id)),
        )
        .set(notifications::is_read.eq(true))
        .get_result(&mut conn)
        .optional()?;
        row.map(Notification::from).ok_or_else(|| {
            AppError::new(ErrorCode::NotificationNotFound, "notification not found")
        })
    }

    fn mark_all_read(&self, user_id: Uuid) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::is_read.eq(false)),
        )
        .set(notifications::is_read.eq(true))
        .execute(&mut conn)?;
        Ok(updated)
    }

    fn count_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let mut conn = self.conn()?;
        let count: i64 = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .select(count_star())
            .first(&mut conn)?;
        Ok(count)
    }

    fn prune_oldest(&self, user_id: Uuid, keep: usize) -> AppResult<usize> {
        let mut conn = self.conn()?;

        let stale: Vec<Uuid> = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .offset(keep as i64)
            .select(notifications::id)
            .load(&mut conn)?;
        if stale.is_empty() {
            return Ok(0);
        }

        let evicted = diesel::delete(notifications::table.filter(notifications::id.eq_any(&stale)))
            .execute(&mut conn)?;
        Ok(evicted)
    }
}

// --- UserStore ---

impl UserStore for PgStore {
    fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let mut conn = self.conn()?;
        let row: Option<UserRow> = users::table.find(id).first(&mut conn).optional()?;
        row.map(UserRow::into_domain).transpose()
    }

    fn list_admins(&self) -> AppResult<Vec<User>> {
        let mut conn = self.conn()?;
        let rows: Vec<UserRow> = users::table
            .filter(users::role.eq("admin"))
            .load(&mut conn)?;
        rows.into_iter().map(UserRow::into_domain).collect()
    }

    fn list_users(&self) -> AppResult<Vec<User>> {
        let mut conn = self.conn()?;
        let rows: Vec<UserRow> = users::table.load(&mut conn)?;
        rows.into_iter().map(UserRow::into_domain).collect()
    }
}
