use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::{ObjectStore, ObjectStoreError};

/// How long `delete_object` keeps checking that an object is gone.
#[derive(Debug, Clone, Copy)]
pub struct DeleteWait {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for DeleteWait {
    fn default() -> Self {
        Self {
            attempts: 20,
            interval: Duration::from_secs(5),
        }
    }
}

/// Blob-store client used by the file service: read tokens, uploads under a
/// key prefix, and deletes that only return once the object is absent.
#[derive(Clone)]
pub struct BlobStore {
    inner: Arc<dyn ObjectStore>,
    token_ttl: Duration,
    wait: DeleteWait,
}

impl BlobStore {
    pub fn new(inner: Arc<dyn ObjectStore>, token_ttl: Duration, wait: DeleteWait) -> Self {
        Self {
            inner,
            token_ttl,
            wait,
        }
    }

    pub fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }

    pub async fn issue_read_token(&self, key: &str) -> Result<String, ObjectStoreError> {
        self.inner.presign_get(key, self.token_ttl).await
    }

    /// Store `data` under a fresh key `<prefix>/<uuid>.<extension>` and
    /// return `(location, key)`.
    pub async fn upload(
        &self,
        data: Bytes,
        prefix: &str,
        extension: &str,
    ) -> Result<(String, String), ObjectStoreError> {
        let key = format!(
            "{}/{}.{extension}",
            prefix.trim_end_matches('/'),
            uuid::Uuid::new_v4()
        );
        self.inner.put(&key, data).await?;
        Ok((self.inner.location(&key), key))
    }

    /// Delete `key` and poll until the backend no longer reports it.
    pub async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.inner.delete(key).await?;
        self.wait_until_absent(key).await
    }

    async fn wait_until_absent(&self, key: &str) -> Result<(), ObjectStoreError> {
        for attempt in 0..self.wait.attempts.max(1) {
            if !self.inner.exists(key).await? {
                return Ok(());
            }
            tracing::debug!(key, attempt, "Object still present after delete");
            tokio::time::sleep(self.wait.interval).await;
        }
        Err(ObjectStoreError::DeleteNotConfirmed(key.to_string()))
    }
}
