pub mod chat;
pub mod sessions;
pub mod yamls;

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};
use tracing::error;

use crate::error::Result;
use crate::server::AppState;
use crate::streaming;

/// Create the API router with all endpoint routes
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat::chat))
        .route("/chat/submit", post(chat::submit))
        .route("/chat/result/:request_id", get(chat::poll_result))
        .route(
            "/chat/status/:chat_id",
            get(chat::status_updates).delete(chat::clear_status),
        )
        .route("/chat/stream", post(streaming::chat_stream_handler))
        .route("/logs/stream", get(streaming::log_stream_handler))
        .route("/get_yamls/:chat_id", get(yamls::get_yamls))
        .route("/edit_yaml", post(yamls::edit_yaml))
        .route("/validate_yaml", post(yamls::validate_yaml))
        .route("/chat_history", get(sessions::chat_history))
        .route("/chat_session/:chat_id", get(sessions::get_chat_session))
        .route("/chat_sessions", post(sessions::create_chat_session))
        .route(
            "/chat_sessions/:chat_id",
            delete(sessions::delete_chat_session),
        )
        .route("/delete_all_chats", delete(sessions::delete_all_chats))
}

async fn health_check(State(state): State<AppState>) -> Result<Json<Value>> {
    let db_version = match crate::database::schema::get_database_info(&state.db).await {
        Ok(version) => version,
        Err(e) => {
            error!("Database health check failed: {}", e);
            return Ok(Json(json!({
                "status": "unhealthy",
                "service": "flowforge",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "error": "Database connection failed"
            })));
        }
    };

    Ok(Json(json!({
        "status": "healthy",
        "service": "flowforge",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "database": {
            "version": db_version,
            "status": "connected"
        }
    })))
}
