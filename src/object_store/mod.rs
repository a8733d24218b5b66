mod blobs;
mod gcs;
mod local;
pub mod signed_url;

pub use blobs::{BlobStore, DeleteWait};
pub use gcs::GcsStore;
pub use local::LocalStore;
pub use signed_url::UrlSigner;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Object {0} still present after delete")]
    DeleteNotConfirmed(String),
}

/// Abstraction over object storage backends.
/// Keys are slash-separated paths; the blobs mean nothing without the metadata store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
    /// A URL granting read access to `key` until `ttl` elapses.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError>;
    /// The stable location of `key`. Not a read grant.
    fn location(&self, key: &str) -> String;
}

/// Reject keys that are empty, absolute, or contain empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let bad_segment = key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if key.is_empty() || key.contains('\\') || bad_segment {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Percent-encode each path segment of a key, keeping the separators.
pub(crate) fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("user_files/abc/1.png").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a\\b").is_err());
    }

    #[test]
    fn test_encode_key_path() {
        assert_eq!(encode_key_path("a b/c&d.png"), "a%20b/c%26d.png");
    }
}
