//! Multi-statement transaction scope over the metadata store.
//!
//! Reads are served from a snapshot taken the first time a document is read
//! inside the transaction. Only the `status` field can be staged. On commit
//! the staged status is applied onto the current stored record in a single
//! redb write transaction. Commit fails with [`DatabaseError::WriteConflict`]
//! if the record disappeared or its `status` or `key` changed since it was
//! read; changes to other fields (e.g. permissions) are kept.
//! Nothing is written until commit, so an abort never has to undo anything.

use std::collections::HashMap;

use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::FileRecord;
use super::object_id::ObjectId;
use super::tables::FILES;

pub struct FileTransaction {
    db: Database,
    snapshot: HashMap<ObjectId, Option<FileRecord>>,
    staged: HashMap<ObjectId, FileRecord>,
}

impl FileTransaction {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            db,
            snapshot: HashMap::new(),
            staged: HashMap::new(),
        }
    }

    /// Read a record as this transaction sees it, including staged writes.
    pub fn read(&mut self, id: &ObjectId) -> Result<Option<FileRecord>, DatabaseError> {
        if let Some(staged) = self.staged.get(id) {
            return Ok(Some(staged.clone()));
        }
        if !self.snapshot.contains_key(id) {
            let record = self.db.get_file(id)?;
            self.snapshot.insert(*id, record);
        }
        Ok(self.snapshot.get(id).cloned().flatten())
    }

    /// Stage `status = false`. Returns false if the record does not exist.
    pub fn deactivate(&mut self, id: &ObjectId) -> Result<bool, DatabaseError> {
        match self.read(id)? {
            Some(mut record) => {
                record.status = false;
                self.staged.insert(*id, record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn commit(self) -> Result<(), DatabaseError> {
        if self.staged.is_empty() {
            return Ok(());
        }

        let write_txn = self.db.begin_write()?;
        let conflict = {
            let mut table = write_txn.open_table(FILES)?;
            let mut conflict = None;
            for (id, staged) in &self.staged {
                let key = id.to_hex();
                let current = match table.get(key.as_str())? {
                    Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                    None => None,
                };
                let seen = self.snapshot.get(id).and_then(Option::as_ref);
                let mut current = match (current, seen) {
                    (Some(current), Some(seen))
                        if current.status == seen.status && current.key == seen.key =>
                    {
                        current
                    }
                    _ => {
                        conflict = Some(key);
                        break;
                    }
                };
                current.status = staged.status;
                current.validate_schema()?;
                let data = rmp_serde::to_vec_named(&current)?;
                table.insert(key.as_str(), data.as_slice())?;
            }
            conflict
        };

        if let Some(key) = conflict {
            write_txn.abort()?;
            return Err(DatabaseError::WriteConflict(key));
        }

        write_txn.commit()?;
        Ok(())
    }

    pub fn abort(self) {
        tracing::debug!(staged = self.staged.len(), "Transaction aborted");
    }
}

impl Database {
    /// Open a transaction scope with snapshot reads and all-or-nothing writes.
    pub fn begin_transaction(&self) -> FileTransaction {
        FileTransaction::new(self.clone())
    }
}
