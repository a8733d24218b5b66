mod blobs;
mod files;
mod health;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::response::ApiError;

pub use blobs::serve_blob;
pub use files::{change_permissions, delete_file, get_file, list_files, upload_file};
pub use health::health;

/// Header carrying the authenticated user id, set by the upstream gateway.
pub const CALLER_HEADER: &str = "x-user-id";

/// Identity of the authenticated caller. Well-formedness is checked by the
/// file service, which answers `BadRequest` for malformed ids.
pub struct Caller(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, ApiError> {
        let value = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| ApiError::unauthorized(format!("Missing {CALLER_HEADER} header")))?;
        let caller = value
            .to_str()
            .map_err(|_| ApiError::bad_request(format!("Invalid {CALLER_HEADER} header")))?
            .trim();
        if caller.is_empty() {
            return Err(ApiError::unauthorized(format!("Missing {CALLER_HEADER} header")));
        }
        Ok(Caller(caller.to_string()))
    }
}
