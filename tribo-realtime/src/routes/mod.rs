pub mod chats;
pub mod health;
pub mod notifications;
