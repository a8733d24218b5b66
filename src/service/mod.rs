//! The file lifecycle engine: visibility rules, ownership checks, upload
//! dedup, and the transactional soft-delete that keeps metadata and blobs
//! consistent. Stateless between calls; all state lives in the two stores.

pub mod batch;
pub mod wire;

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::object_store::{BlobStore, ObjectStoreError};
use crate::storage::models::{
    validate_title, FileRecord, NewFile, Permissions, PermissionsFilter, ValidationError,
};
use crate::storage::{DatabaseError, InvalidObjectId, MetadataStore, ObjectId};
use batch::{fan_out, BatchOutcome};

pub const DEFAULT_BATCH_CONCURRENCY: usize = 10;

/// Failure classes the transports map onto status codes and envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    NotFound,
    Gone,
    Conflict,
    Unavailable,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Gone(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{context}: {source}")]
    Unavailable {
        context: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::BadRequest(_) => ErrorKind::BadRequest,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Gone(_) => ErrorKind::Gone,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::Unavailable { .. } => ErrorKind::Unavailable,
        }
    }

    fn store(context: &'static str, e: DatabaseError) -> Self {
        match e {
            DatabaseError::Schema(v) => ServiceError::BadRequest(v.to_string()),
            DatabaseError::FilenameTaken(name) => {
                ServiceError::Conflict(format!("a file named '{name}' already exists"))
            }
            other => ServiceError::Unavailable {
                context,
                source: Box::new(other),
            },
        }
    }

    fn blob(context: &'static str, e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::InvalidKey(key) => {
                ServiceError::BadRequest(format!("invalid object key '{key}'"))
            }
            other => ServiceError::Unavailable {
                context,
                source: Box::new(other),
            },
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        ServiceError::BadRequest(e.to_string())
    }
}

impl From<InvalidObjectId> for ServiceError {
    fn from(e: InvalidObjectId) -> Self {
        ServiceError::BadRequest(e.to_string())
    }
}

/// Fields carried by a classroom ingestion event.
#[derive(Debug, Clone)]
pub struct ClassroomUpload {
    pub location: String,
    pub filename: String,
    pub mime_type: String,
    pub key: String,
}

pub struct FileService {
    store: Arc<dyn MetadataStore>,
    blobs: BlobStore,
    batch_concurrency: usize,
}

impl FileService {
    pub fn new(store: Arc<dyn MetadataStore>, blobs: BlobStore) -> Self {
        Self {
            store,
            blobs,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    // ========================================================================
    // Owner-facing operations
    // ========================================================================

    /// Records owned by the caller, optionally narrowed to one permission class.
    pub async fn list_files(
        &self,
        filter: PermissionsFilter,
        caller: &str,
    ) -> Result<Vec<FileRecord>, ServiceError> {
        let owner = ObjectId::parse(caller)?;
        self.store
            .list_by_owner(&owner, filter)
            .await
            .map_err(|e| ServiceError::store("Failed to list files", e))
    }

    /// Resolve a file and, if the caller may read it, issue a time-limited read token.
    pub async fn get_file(
        &self,
        file_id: &str,
        caller: Option<&str>,
    ) -> Result<String, ServiceError> {
        let caller = caller.map(ObjectId::parse).transpose()?;
        let file = self.find_file(file_id).await?;

        if !file.is_active() {
            return Err(ServiceError::Gone("the file has been deleted".into()));
        }
        if file.permissions == Permissions::Private
            && !caller.is_some_and(|c| file.is_owned_by(&c))
        {
            return Err(ServiceError::Unauthorized("the file is private".into()));
        }
        if file.permissions == Permissions::PublicClassroom {
            return Err(ServiceError::BadRequest(
                "cannot determine whether the file belongs to a classroom".into(),
            ));
        }

        self.blobs
            .issue_read_token(&file.key)
            .await
            .map_err(|e| ServiceError::blob("Failed to issue read token", e))
    }

    /// Store a user upload as `<title>.<extension>`, private by default.
    pub async fn upload_file(
        &self,
        title: &str,
        original_name: &str,
        caller: &str,
        data: Bytes,
    ) -> Result<FileRecord, ServiceError> {
        validate_title(title)?;
        let owner = ObjectId::parse(caller)?;
        let extension = original_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && !ext.contains('/'))
            .ok_or_else(|| ServiceError::BadRequest("the file must have an extension".into()))?;

        let filename = format!("{title}.{extension}");
        if self
            .store
            .filename_exists(&filename)
            .await
            .map_err(|e| ServiceError::store("Failed to check filename", e))?
        {
            return Err(ServiceError::Conflict(format!(
                "a file named '{filename}' already exists"
            )));
        }

        let mime_type = mime_guess::from_ext(extension)
            .first_or_octet_stream()
            .to_string();
        let new_file = NewFile::construct(
            filename.clone(),
            String::new(),
            String::new(),
            title,
            mime_type,
            Some(caller),
            Permissions::Private,
        )?;

        // Phase 1: bytes to the blob store
        let (location, key) = self
            .blobs
            .upload(data, &format!("user_files/{owner}"), extension)
            .await
            .map_err(|e| ServiceError::blob("Failed to store file", e))?;

        // Phase 2: metadata, compensating the blob if the insert fails or
        // another upload claimed the filename in the meantime
        let new_file = NewFile {
            key: key.clone(),
            url: location,
            ..new_file
        };
        match self.store.insert_unique_filename(new_file).await {
            Ok(record) => {
                tracing::debug!(file_id = %record.id, filename = %filename, "Uploaded file");
                Ok(record)
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.backend().delete(&key).await {
                    tracing::error!(key = %key, error = %cleanup, "Orphaned blob after failed metadata insert");
                }
                Err(ServiceError::store("Failed to save file metadata", e))
            }
        }
    }

    /// Owner-only permission change. No other field is touched.
    pub async fn change_permissions(
        &self,
        caller: &str,
        file_id: &str,
        permissions: &str,
    ) -> Result<(), ServiceError> {
        let permissions: Permissions = permissions.parse()?;
        let caller = ObjectId::parse(caller)?;
        let file = self.find_file(file_id).await?;

        if !file.is_owned_by(&caller) {
            return Err(ServiceError::Unauthorized(
                "the file belongs to another user".into(),
            ));
        }
        if !file.is_active() {
            return Err(ServiceError::Gone("the file has been deleted".into()));
        }

        let updated = self
            .store
            .set_permissions(&file.id, permissions)
            .await
            .map_err(|e| ServiceError::store("Failed to update permissions", e))?;
        if !updated {
            return Err(ServiceError::NotFound("file not found".into()));
        }

        tracing::debug!(file_id = %file.id, permissions = %permissions, "Changed permissions");
        Ok(())
    }

    /// Owner-only soft-delete.
    pub async fn delete_file(&self, caller: &str, file_id: &str) -> Result<(), ServiceError> {
        let caller = ObjectId::parse(caller)?;
        let file = self.find_file(file_id).await?;

        if !file.is_owned_by(&caller) {
            return Err(ServiceError::Unauthorized(
                "the file belongs to another user".into(),
            ));
        }
        self.soft_delete(&file).await
    }

    // ========================================================================
    // System flows (bus-originated, no ownership checks)
    // ========================================================================

    pub async fn find_file(&self, file_id: &str) -> Result<FileRecord, ServiceError> {
        let id = ObjectId::parse(file_id)?;
        self.store
            .find(&id)
            .await
            .map_err(|e| ServiceError::store("Failed to load file", e))?
            .ok_or_else(|| ServiceError::NotFound("file not found".into()))
    }

    /// Register an already-uploaded image as a public, ownerless record.
    pub async fn ingest_image(&self, key: &str) -> Result<FileRecord, ServiceError> {
        let filename = key.rsplit('/').next().unwrap_or(key);
        let mime_type = mime_guess::from_path(filename)
            .first_or_octet_stream()
            .to_string();
        let new_file = NewFile::construct(
            filename,
            key,
            key,
            filename,
            mime_type,
            None,
            Permissions::Public,
        )?;
        let record = self
            .store
            .insert(new_file)
            .await
            .map_err(|e| ServiceError::store("Failed to save image", e))?;

        tracing::debug!(file_id = %record.id, key, "Ingested image");
        Ok(record)
    }

    /// Register classroom content as an ownerless `public_classroom` record.
    pub async fn ingest_classroom_file(
        &self,
        upload: ClassroomUpload,
    ) -> Result<FileRecord, ServiceError> {
        let new_file = NewFile::construct(
            upload.filename.clone(),
            upload.key,
            upload.location,
            upload.filename,
            upload.mime_type,
            None,
            Permissions::PublicClassroom,
        )?;
        let inserted = self
            .store
            .insert(new_file)
            .await
            .map_err(|e| ServiceError::store("Failed to save classroom file", e))?;

        // Reply with what the store holds, not what we sent it
        let record = self.find_file(&inserted.id.to_hex()).await?;
        tracing::debug!(file_id = %record.id, "Ingested classroom file");
        Ok(record)
    }

    /// Remove a blob that has no record of its own (e.g. a replaced avatar).
    pub async fn delete_blob(&self, key: &str) -> Result<(), ServiceError> {
        self.blobs
            .delete_object(key)
            .await
            .map_err(|e| ServiceError::blob("Failed to delete object", e))
    }

    /// Soft-delete on behalf of the system, whoever owns the record.
    pub async fn system_delete(&self, file_id: &str) -> Result<(), ServiceError> {
        let file = self.find_file(file_id).await?;
        self.soft_delete(&file).await
    }

    pub async fn key_of(&self, file_id: &str) -> Result<String, ServiceError> {
        Ok(self.find_file(file_id).await?.key)
    }

    pub async fn permissions_of(&self, file_id: &str) -> Result<Permissions, ServiceError> {
        Ok(self.find_file(file_id).await?.permissions)
    }

    pub async fn issue_token_for_key(&self, key: &str) -> Result<String, ServiceError> {
        self.blobs
            .issue_read_token(key)
            .await
            .map_err(|e| ServiceError::blob("Failed to issue read token", e))
    }

    // ========================================================================
    // Batches
    // ========================================================================

    /// Read tokens for many keys, in request order.
    pub async fn issue_read_tokens(
        self: &Arc<Self>,
        keys: Vec<String>,
    ) -> BatchOutcome<String, ServiceError> {
        let service = Arc::clone(self);
        fan_out(keys, self.batch_concurrency, move |key| {
            let service = Arc::clone(&service);
            async move { service.issue_token_for_key(&key).await }
        })
        .await
    }

    /// Permission class of many files, in request order.
    pub async fn permissions_for(
        self: &Arc<Self>,
        file_ids: Vec<String>,
    ) -> BatchOutcome<Permissions, ServiceError> {
        let service = Arc::clone(self);
        fan_out(file_ids, self.batch_concurrency, move |id| {
            let service = Arc::clone(&service);
            async move { service.permissions_of(&id).await }
        })
        .await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Mark the record deleted and remove its blob inside one transaction.
    /// A failed blob delete aborts the transaction, leaving the record active.
    async fn soft_delete(&self, file: &FileRecord) -> Result<(), ServiceError> {
        if !file.is_active() {
            return Err(ServiceError::Gone("the file has already been deleted".into()));
        }

        let mut txn = self
            .store
            .begin()
            .await
            .map_err(|e| ServiceError::store("Failed to start transaction", e))?;

        let staged = match txn.deactivate(&file.id).await {
            Ok(staged) => staged,
            Err(e) => {
                let _ = txn.abort().await;
                return Err(ServiceError::store("Failed to mark file deleted", e));
            }
        };
        if !staged {
            let _ = txn.abort().await;
            return Err(ServiceError::NotFound("file not found".into()));
        }

        if let Err(e) = self.blobs.delete_object(&file.key).await {
            if let Err(abort) = txn.abort().await {
                tracing::error!(file_id = %file.id, error = %abort, "Failed to abort delete transaction");
            }
            tracing::warn!(file_id = %file.id, error = %e, "Blob delete failed, rolled back soft-delete");
            return Err(ServiceError::blob("Failed to delete file content", e));
        }

        txn.commit().await.map_err(|e| {
            tracing::error!(file_id = %file.id, key = %file.key, error = %e, "Blob deleted but soft-delete did not commit");
            ServiceError::store("Failed to commit delete", e)
        })?;

        tracing::debug!(file_id = %file.id, "Deleted file");
        Ok(())
    }
}
