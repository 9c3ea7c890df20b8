use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;

use crate::database::sessions::ChatSession;
use crate::error::{AppError, Result};
use crate::progress::TracingSink;
use crate::server::AppState;
use crate::supervisor::Supervisor;

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub chat_id: Option<String>,
}

fn default_role() -> String {
    "user".to_string()
}

/// POST /api/chat - Run the orchestration pipeline synchronously.
pub async fn chat(
    State(state): State<AppState>,
    Json(message): Json<ChatMessage>,
) -> Result<impl IntoResponse> {
    if message.content.trim().is_empty() {
        return Err(AppError::BadRequest("content must not be empty".to_string()));
    }

    let chat_id = ChatSession::ensure(&state.db, message.chat_id).await?;

    let supervisor = Supervisor::new(Arc::clone(&state.services), Arc::new(TracingSink));
    let result = supervisor
        .run_with_fallback(&state.db, &chat_id, &message.content)
        .await?;

    Ok(Json(result))
}

/// POST /api/chat/submit - Queue a background orchestration run.
pub async fn submit(
    State(state): State<AppState>,
    Json(message): Json<ChatMessage>,
) -> Result<impl IntoResponse> {
    if message.content.trim().is_empty() {
        return Err(AppError::BadRequest("content must not be empty".to_string()));
    }

    let chat_id = ChatSession::ensure(&state.db, message.chat_id).await?;
    let request_id = state.jobs.submit(&chat_id, &message.content).await?;

    Ok(Json(json!({
        "request_id": request_id,
        "chat_id": chat_id,
        "status": "processing",
        "message": "Request queued, poll /api/chat/result/{request_id} for the outcome"
    })))
}

/// GET /api/chat/result/:request_id - Consume-once poll for a background
/// run. A finished record is returned exactly once.
pub async fn poll_result(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse> {
    match state.jobs.take_result(&request_id) {
        Some(Ok(result)) => Ok(Json(serde_json::to_value(result)?)),
        Some(Err(failure)) => Err(AppError::Pipeline(failure)),
        None => Ok(Json(json!({
            "status": "processing",
            "message": "Request is still being processed"
        }))),
    }
}

/// GET /api/chat/status/:chat_id - Status lines appended since the last
/// poll for this chat.
pub async fn status_updates(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> impl IntoResponse {
    let lines = state.status_logs.drain_new(&chat_id);
    Json(json!({
        "chat_id": chat_id,
        "lines": lines
    }))
}

/// DELETE /api/chat/status/:chat_id - Drop a chat's status log and cursor.
pub async fn clear_status(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> impl IntoResponse {
    state.status_logs.clear(&chat_id);
    Json(json!({"message": "Status log cleared"}))
}
