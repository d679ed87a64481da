use axum::Json;

use tribo_shared::types::api::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy(
        "tribo-realtime",
        env!("CARGO_PKG_VERSION"),
    ))
}
