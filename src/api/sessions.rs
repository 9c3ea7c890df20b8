use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::database::messages::Message;
use crate::database::sessions::ChatSession;
use crate::database::yaml_files::YamlFile;
use crate::error::{AppError, Result};
use crate::server::AppState;

/// GET /api/chat_history - All sessions, newest activity first.
pub async fn chat_history(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let summaries = ChatSession::list_summaries(&state.db).await?;
    Ok(Json(summaries))
}

#[derive(Debug, Serialize)]
pub struct ChatSessionDetail {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
    pub messages: Vec<Message>,
    pub yaml_files: HashMap<String, String>,
}

/// GET /api/chat_session/:chat_id - One session with messages and documents.
pub async fn get_chat_session(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse> {
    let session = ChatSession::get_by_id(&state.db, &chat_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Chat session '{chat_id}' not found")))?;

    let messages = Message::list(&state.db, &chat_id, None).await?;
    let yaml_files = YamlFile::list(&state.db, &chat_id)
        .await?
        .into_iter()
        .map(|f| (f.name, f.content))
        .collect();

    Ok(Json(ChatSessionDetail {
        id: session.id,
        name: session.name,
        created_at: session.created_at,
        updated_at: session.updated_at,
        message_count: session.message_count,
        messages,
        yaml_files,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionQuery {
    pub name: Option<String>,
}

/// POST /api/chat_sessions - Create a session, optionally named.
pub async fn create_chat_session(
    State(state): State<AppState>,
    Query(query): Query<CreateSessionQuery>,
) -> Result<impl IntoResponse> {
    let chat_id = ChatSession::create(&state.db, None, query.name).await?;
    Ok(Json(json!({"chat_id": chat_id})))
}

/// DELETE /api/chat_sessions/:chat_id
pub async fn delete_chat_session(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse> {
    if !ChatSession::delete(&state.db, &chat_id).await? {
        return Err(AppError::NotFound(format!(
            "Chat session '{chat_id}' not found"
        )));
    }

    // The status log follows the session's lifecycle.
    state.status_logs.clear(&chat_id);

    Ok(Json(json!({"message": "Chat session deleted successfully"})))
}

/// DELETE /api/delete_all_chats
pub async fn delete_all_chats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let deleted = ChatSession::delete_all(&state.db).await?;
    Ok(Json(json!({
        "message": "All chat sessions deleted successfully",
        "deleted": deleted
    })))
}
