pub mod config;
pub mod live;
pub mod models;
pub mod presence;
pub mod push;
pub mod routes;
pub mod schema;
pub mod services;
pub mod socket;
pub mod store;

use std::sync::Arc;

use socketioxide::SocketIo;

use tribo_shared::clients::db::DbPool;

use config::AppConfig;
use presence::PresenceHub;
use services::{ChatService, NotificationService};

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub io: SocketIo,
    pub presence: Arc<PresenceHub>,
    pub chats: ChatService,
    pub notifications: NotificationService,
}
