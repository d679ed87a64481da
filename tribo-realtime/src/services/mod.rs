pub mod chat_service;
pub mod notification_service;

pub use chat_service::ChatService;
pub use notification_service::NotificationService;
