use axum::{
    extract::DefaultBodyLimit,
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Leave headroom for the multipart framing around the file itself
    let upload_limit = state.config.server.max_upload_size as usize + 64 * 1024;

    Router::new()
        // Files
        .route(
            "/files",
            get(handlers::list_files)
                .post(handlers::upload_file)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/files/:id",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/files/:id/permissions", put(handlers::change_permissions))
        // Signed blob content (local backend)
        .route("/blobs/*key", get(handlers::serve_blob))
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::CALLER_HEADER;
    use crate::testutil::{test_state, OTHER_USER, TEST_USER};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const BOUNDARY: &str = "test-boundary";

    fn multipart_body(title: &str, file_name: &str, content: &str) -> String {
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             {title}\r\n\
             --{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        )
    }

    async fn send(
        state: &Arc<AppState>,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = create_router(Arc::clone(state))
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn upload(state: &Arc<AppState>, title: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::post("/files")
            .header(CALLER_HEADER, TEST_USER)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(title, "notes.txt", "hello world")))
            .unwrap();
        send(state, request).await
    }

    #[tokio::test]
    async fn test_health() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = test_state(&temp_dir);
        let request = Request::get("/_internal/health").body(Body::empty()).unwrap();
        let (status, json) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
    }

    #[tokio::test]
    async fn test_upload_requires_caller() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = test_state(&temp_dir);
        let request = Request::post("/files")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body("notes", "notes.txt", "x")))
            .unwrap();
        let (status, json) = send(&state, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["status"], "fail");
    }

    #[tokio::test]
    async fn test_upload_list_and_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = test_state(&temp_dir);

        let (status, json) = upload(&state, "notes").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["filename"], "notes.txt");
        assert_eq!(json["data"]["permissions"], "private");
        assert_eq!(json["data"]["user"]["$oid"], TEST_USER);
        let id = json["data"]["_id"]["$oid"].as_str().unwrap().to_string();

        let (status, _) = upload(&state, "notes").await;
        assert_eq!(status, StatusCode::CONFLICT);

        let request = Request::get("/files?permissions=private")
            .header(CALLER_HEADER, TEST_USER)
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().unwrap().len(), 1);

        let request = Request::get(format!("/files/{id}"))
            .header(CALLER_HEADER, OTHER_USER)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::get(format!("/files/{id}"))
            .header(CALLER_HEADER, TEST_USER)
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        let token = json["data"]["token"].as_str().unwrap();
        let path = token.strip_prefix("http://localhost:8080").unwrap();

        let response = create_router(Arc::clone(&state))
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/plain");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello world");
    }

    #[tokio::test]
    async fn test_blob_route_rejects_bad_signature() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = test_state(&temp_dir);
        let request = Request::get("/blobs/user_files/a.txt?expires=99999999999&signature=00")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_permissions_and_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = test_state(&temp_dir);
        let (_, json) = upload(&state, "report").await;
        let id = json["data"]["_id"]["$oid"].as_str().unwrap().to_string();

        let request = Request::put(format!("/files/{id}/permissions"))
            .header(CALLER_HEADER, TEST_USER)
            .header("content-type", "application/json")
            .body(Body::from(r#"{"permissions":"shared"}"#))
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::put(format!("/files/{id}/permissions"))
            .header(CALLER_HEADER, TEST_USER)
            .header("content-type", "application/json")
            .body(Body::from(r#"{"permissions":"public"}"#))
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);

        // Public files are readable without a caller
        let request = Request::get(format!("/files/{id}")).body(Body::empty()).unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::delete(format!("/files/{id}"))
            .header(CALLER_HEADER, TEST_USER)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::get(format!("/files/{id}"))
            .header(CALLER_HEADER, TEST_USER)
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&state, request).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(json["status"], "fail");
    }
}
