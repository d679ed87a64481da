use std::sync::Arc;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use socketioxide::SocketIo;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tribo_realtime::config::AppConfig;
use tribo_realtime::live::{LiveBroadcaster, SocketBroadcaster};
use tribo_realtime::presence::PresenceHub;
use tribo_realtime::push::{ExpoPushGateway, PushDispatcher};
use tribo_realtime::services::{ChatService, NotificationService};
use tribo_realtime::store::postgres::PgStore;
use tribo_realtime::{routes, socket, AppState};
use tribo_shared::clients::db::create_pool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tribo_shared::middleware::init_tracing("tribo-realtime");

    let config = AppConfig::load()?;
    let port = config.port;

    // The token validator reads the secret from the environment; keep the
    // config value authoritative.
    std::env::set_var("JWT_SECRET", &config.jwt_secret);

    let db = create_pool(&config.database_url)?;
    let store = Arc::new(PgStore::new(db.clone()));

    // Socket.IO layer first - the broadcaster needs io, and REST handlers
    // emit through the services.
    let (sio_layer, io) = SocketIo::builder().build_layer();
    let broadcaster: Arc<dyn LiveBroadcaster> = Arc::new(SocketBroadcaster::new(io.clone()));

    let push = PushDispatcher::new(
        Arc::new(ExpoPushGateway::new(config.push_api_url.clone())),
        config.push_chunk_size,
    );

    let chats = ChatService::new(store.clone(), store.clone(), broadcaster.clone());
    let notifications = NotificationService::new(
        store.clone(),
        store.clone(),
        broadcaster.clone(),
        push,
        config.notification_retention,
    );

    let state = Arc::new(AppState {
        db,
        config,
        io: io.clone(),
        presence: Arc::new(PresenceHub::new()),
        chats,
        notifications,
    });

    io.ns("/", {
        let state = state.clone();
        move |socket: socketioxide::extract::SocketRef| {
            let state = state.clone();
            async move {
                socket::handlers::on_connect(socket, state);
            }
        }
    });

    let app = Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Chats
        .route("/chats", get(routes::chats::list_chats))
        .route("/chats/group", post(routes::chats::create_group))
        .route("/chats/private/:user_id", post(routes::chats::create_private))
        .route(
            "/chats/:id",
            get(routes::chats::get_chat)
                .patch(routes::chats::update_chat)
                .delete(routes::chats::delete_chat),
        )
        .route("/chats/:id/leave", post(routes::chats::leave_chat))
        .route("/chats/:id/members", post(routes::chats::add_members))
        .route(
            "/chats/:id/members/:member_id",
            delete(routes::chats::remove_member),
        )
        .route(
            "/chats/:id/members/:member_id/promote",
            patch(routes::chats::promote_member),
        )
        .route("/chats/:id/my-color", patch(routes::chats::update_my_color))
        .route(
            "/chats/:id/my-background",
            patch(routes::chats::update_my_background),
        )
        // Messages
        .route(
            "/chats/:id/messages",
            get(routes::chats::list_messages).post(routes::chats::send_message),
        )
        .route("/chats/:id/mark-as-read", post(routes::chats::mark_as_read))
        .route(
            "/chats/messages/:id",
            patch(routes::chats::edit_message).delete(routes::chats::delete_message),
        )
        // Notifications
        .route(
            "/notifications",
            get(routes::notifications::list_notifications),
        )
        .route(
            "/notifications/read-all",
            patch(routes::notifications::mark_all_read),
        )
        .route(
            "/notifications/:id/read",
            patch(routes::notifications::mark_read),
        )
        .route(
            "/notifications/admin-broadcast",
            post(routes::notifications::admin_broadcast),
        )
        .layer(sio_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "tribo-realtime starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
