use async_trait::async_trait;

use super::db::{Database, DatabaseError};
use super::models::{FileRecord, NewFile, Permissions, PermissionsFilter};
use super::object_id::ObjectId;
use super::transaction::FileTransaction;

/// Document store holding file records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new record; the store assigns its identifier.
    async fn insert(&self, file: NewFile) -> Result<FileRecord, DatabaseError>;
    /// Insert only if no record uses the filename yet, atomically.
    async fn insert_unique_filename(&self, file: NewFile) -> Result<FileRecord, DatabaseError>;
    async fn find(&self, id: &ObjectId) -> Result<Option<FileRecord>, DatabaseError>;
    async fn filename_exists(&self, filename: &str) -> Result<bool, DatabaseError>;
    async fn list_by_owner(
        &self,
        owner: &ObjectId,
        filter: PermissionsFilter,
    ) -> Result<Vec<FileRecord>, DatabaseError>;
    async fn set_permissions(
        &self,
        id: &ObjectId,
        permissions: Permissions,
    ) -> Result<bool, DatabaseError>;
    async fn begin(&self) -> Result<Box<dyn MetadataTransaction>, DatabaseError>;
}

#[async_trait]
pub trait MetadataTransaction: Send {
    /// Stage a soft-delete. Returns false if the record does not exist.
    async fn deactivate(&mut self, id: &ObjectId) -> Result<bool, DatabaseError>;
    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;
    async fn abort(self: Box<Self>) -> Result<(), DatabaseError>;
}

#[async_trait]
impl MetadataStore for Database {
    async fn insert(&self, file: NewFile) -> Result<FileRecord, DatabaseError> {
        self.insert_file(file)
    }

    async fn insert_unique_filename(&self, file: NewFile) -> Result<FileRecord, DatabaseError> {
        Database::insert_unique_filename(self, file)
    }

    async fn find(&self, id: &ObjectId) -> Result<Option<FileRecord>, DatabaseError> {
        self.get_file(id)
    }

    async fn filename_exists(&self, filename: &str) -> Result<bool, DatabaseError> {
        Database::filename_exists(self, filename)
    }

    async fn list_by_owner(
        &self,
        owner: &ObjectId,
        filter: PermissionsFilter,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        self.list_files_by_owner(owner, filter)
    }

    async fn set_permissions(
        &self,
        id: &ObjectId,
        permissions: Permissions,
    ) -> Result<bool, DatabaseError> {
        Database::set_permissions(self, id, permissions)
    }

    async fn begin(&self) -> Result<Box<dyn MetadataTransaction>, DatabaseError> {
        Ok(Box::new(self.begin_transaction()))
    }
}

#[async_trait]
impl MetadataTransaction for FileTransaction {
    async fn deactivate(&mut self, id: &ObjectId) -> Result<bool, DatabaseError> {
        FileTransaction::deactivate(self, id)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        FileTransaction::commit(*self)
    }

    async fn abort(self: Box<Self>) -> Result<(), DatabaseError> {
        FileTransaction::abort(*self);
        Ok(())
    }
}
