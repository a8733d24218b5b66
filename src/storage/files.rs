use redb::{ReadableTable, Table};

use super::db::{Database, DatabaseError};
use super::models::{FileRecord, NewFile, Permissions, PermissionsFilter};
use super::object_id::ObjectId;
use super::tables::*;

/// Append `id` to the msgpack id list stored under `key`.
fn push_index(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut ids: Vec<String> = match table.get(key)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
        let data = rmp_serde::to_vec_named(&ids)?;
        table.insert(key, data.as_slice())?;
    }
    Ok(())
}

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Assign an identifier, validate against the schema, and store the
    /// record along with its filename and owner index entries.
    pub fn insert_file(&self, file: NewFile) -> Result<FileRecord, DatabaseError> {
        self.insert_record(file, false)
    }

    /// Like [`Database::insert_file`], but fails with
    /// [`DatabaseError::FilenameTaken`] if any record already uses the
    /// filename. The check and the insert share one write transaction.
    pub fn insert_unique_filename(&self, file: NewFile) -> Result<FileRecord, DatabaseError> {
        self.insert_record(file, true)
    }

    fn insert_record(&self, file: NewFile, unique: bool) -> Result<FileRecord, DatabaseError> {
        let record = file.into_record(ObjectId::new());
        record.validate_schema()?;

        let id = record.id.to_hex();
        let write_txn = self.begin_write()?;
        let taken = {
            let mut names = write_txn.open_table(FILE_NAMES)?;
            let taken = unique && names.get(record.filename.as_str())?.is_some();
            if !taken {
                push_index(&mut names, &record.filename, &id)?;

                let mut table = write_txn.open_table(FILES)?;
                let data = rmp_serde::to_vec_named(&record)?;
                table.insert(id.as_str(), data.as_slice())?;

                if let Some(owner) = record.owner {
                    let mut owners = write_txn.open_table(OWNER_FILES)?;
                    push_index(&mut owners, &owner.to_hex(), &id)?;
                }
            }
            taken
        };

        if taken {
            write_txn.abort()?;
            return Err(DatabaseError::FilenameTaken(record.filename));
        }
        write_txn.commit()?;
        Ok(record)
    }

    /// Get a file by its identifier
    pub fn get_file(&self, id: &ObjectId) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(id.to_hex().as_str())? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Whether any record, active or soft-deleted, already uses this filename
    pub fn filename_exists(&self, filename: &str) -> Result<bool, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILE_NAMES)?;
        Ok(table.get(filename)?.is_some())
    }

    /// All records owned by `owner`, narrowed by permission class
    pub fn list_files_by_owner(
        &self,
        owner: &ObjectId,
        filter: PermissionsFilter,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_table = read_txn.open_table(OWNER_FILES)?;
        let files_table = read_txn.open_table(FILES)?;

        let file_ids: Vec<String> = match owner_table.get(owner.to_hex().as_str())? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut files = Vec::new();
        for file_id in file_ids {
            if let Some(data) = files_table.get(file_id.as_str())? {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                if filter.matches(file.permissions) {
                    files.push(file);
                }
            }
        }

        Ok(files)
    }

    /// Overwrite the permissions field only. Returns false if the record is missing.
    pub fn set_permissions(
        &self,
        id: &ObjectId,
        permissions: Permissions,
    ) -> Result<bool, DatabaseError> {
        let key = id.to_hex();
        let write_txn = self.begin_write()?;

        let existing = {
            let table = write_txn.open_table(FILES)?;
            let result = match table.get(key.as_str())? {
                Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                None => None,
            };
            result
        };

        let updated = match existing {
            Some(mut file) => {
                file.permissions = permissions;
                file.validate_schema()?;
                let data = rmp_serde::to_vec_named(&file)?;
                let mut table = write_txn.open_table(FILES)?;
                table.insert(key.as_str(), data.as_slice())?;
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(updated)
    }
}
