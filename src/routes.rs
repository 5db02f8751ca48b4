use std::sync::Arc;

use axum::{middleware::from_fn, routing::get, Extension, Json, Router};
use tower_http::trace::TraceLayer;

use crate::{
    handler::{chat::chat_handler, jobs::jobs_handler},
    middleware::require_actor,
    AppState,
};

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(jobs_handler())
        .merge(chat_handler())
        .layer(from_fn(require_actor))
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
