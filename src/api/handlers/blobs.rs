use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery};
use crate::object_store::signed_url::SignatureError;
use crate::object_store::ObjectStoreError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BlobParams {
    pub expires: i64,
    pub signature: String,
}

/// Serve blob content behind a signed read token.
/// Route: GET /blobs/*key
pub async fn serve_blob(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    AppQuery(params): AppQuery<BlobParams>,
) -> Result<Response, ApiError> {
    // Only the local backend hands out links to this route
    let signer = state
        .signer
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Not found"))?;

    signer
        .verify(&key, params.expires, &params.signature)
        .map_err(|e| match e {
            SignatureError::Expired => ApiError::forbidden("Link has expired"),
            SignatureError::Invalid => ApiError::forbidden("Invalid signature"),
        })?;

    let data = state
        .files
        .blobs()
        .backend()
        .get(&key)
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) => ApiError::not_found("File content not found"),
            ObjectStoreError::InvalidKey(_) => ApiError::bad_request(e.to_string()),
            _ => ApiError::internal(format!("Failed to retrieve file: {e}")),
        })?;

    let length = data.len() as u64;
    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    let mime_type = mime_guess::from_path(&key).first_or_octet_stream();
    headers.insert(
        header::CONTENT_TYPE,
        mime_type
            .as_ref()
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, header::HeaderValue::from(length));

    let filename = key.rsplit('/').next().unwrap_or(&key);
    if let Ok(value) = format!("inline; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    // Never cache past the link's own expiry
    let max_age = (params.expires - Utc::now().timestamp()).max(0);
    if let Ok(value) = format!("private, max-age={max_age}").parse() {
        headers.insert(header::CACHE_CONTROL, value);
    }

    Ok(response)
}
