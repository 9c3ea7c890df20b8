use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use crate::database::yaml_files::YamlFile;
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::supervisor::editor::YamlEditor;
use crate::validator;

/// GET /api/get_yamls/:chat_id - Stored documents for a chat session.
pub async fn get_yamls(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse> {
    let files = YamlFile::list(&state.db, &chat_id).await?;
    if files.is_empty() {
        return Err(AppError::NotFound(
            "Chat session not found or no YAML files".to_string(),
        ));
    }
    Ok(Json(files))
}

#[derive(Debug, Deserialize)]
pub struct EditYamlRequest {
    pub yaml: String,
    pub instruction: String,
    /// 'agents' or 'workflow'
    pub file_type: String,
}

#[derive(Debug, Serialize)]
pub struct EditYamlResponse {
    pub edited_yaml: String,
}

/// POST /api/edit_yaml - Direct editor passthrough used by the frontend's
/// YAML panel; no classification involved.
pub async fn edit_yaml(
    State(state): State<AppState>,
    Json(request): Json<EditYamlRequest>,
) -> Result<impl IntoResponse> {
    let editor = YamlEditor::new(Arc::clone(&state.services));
    let edited = editor
        .edit(&request.yaml, &request.file_type, &request.instruction)
        .await?;

    Ok(Json(EditYamlResponse {
        edited_yaml: edited.yaml,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ValidateYamlRequest {
    pub yaml: String,
}

/// POST /api/validate_yaml - Run the external validator on a candidate
/// document.
pub async fn validate_yaml(
    State(state): State<AppState>,
    Json(request): Json<ValidateYamlRequest>,
) -> Result<impl IntoResponse> {
    let outcome = validator::validate_yaml(&state.config.validator_command, &request.yaml).await?;
    Ok(Json(outcome))
}
