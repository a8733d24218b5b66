use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::Caller;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::service::wire::{file_to_response, files_to_response, FileResponse};
use crate::storage::models::{validate_title, PermissionsFilter};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default)]
    pub permissions: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChangePermissionsRequest {
    pub permissions: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSend<Vec<FileResponse>>>, ApiError> {
    let filter = params
        .permissions
        .as_deref()
        .unwrap_or("any")
        .parse::<PermissionsFilter>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let files = state.files.list_files(filter, &caller).await?;
    Ok(JSend::success(files_to_response(&files)))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    caller: Option<Caller>,
    Path(id): Path<String>,
) -> Result<Json<JSend<TokenResponse>>, ApiError> {
    let caller = caller.map(|Caller(c)| c);
    let token = state.files.get_file(&id, caller.as_deref()).await?;
    Ok(JSend::success(TokenResponse { token }))
}

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JSend<FileResponse>>), ApiError> {
    let mut file_data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

                if data.len() as u64 > state.config.server.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.server.max_upload_size
                    )));
                }
                file_data = Some(data);
            }
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid title: {e}")))?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let title = title.ok_or_else(|| ApiError::bad_request("title field is required"))?;
    validate_title(&title).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let file_data = file_data.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    let file_name =
        file_name.ok_or_else(|| ApiError::bad_request("file must carry a filename"))?;

    let record = state
        .files
        .upload_file(&title, &file_name, &caller, file_data)
        .await?;

    Ok((
        StatusCode::CREATED,
        JSend::success(file_to_response(&record)),
    ))
}

pub async fn change_permissions(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    AppJson(req): AppJson<ChangePermissionsRequest>,
) -> Result<Json<JSend<()>>, ApiError> {
    state
        .files
        .change_permissions(&caller, &id, &req.permissions)
        .await?;
    Ok(JSend::success(()))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.files.delete_file(&caller, &id).await?;
    Ok(JSend::success(()))
}
