//! Record shape exchanged with other services.

use serde::{Deserialize, Serialize};

use crate::storage::models::{FileRecord, Permissions};
use crate::storage::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oid {
    #[serde(rename = "$oid")]
    pub oid: String,
}

impl From<&ObjectId> for Oid {
    fn from(id: &ObjectId) -> Self {
        Oid { oid: id.to_hex() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    #[serde(rename = "$date")]
    pub date: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResponse {
    #[serde(rename = "_id")]
    pub id: Oid,
    pub filename: String,
    pub key: String,
    pub url: String,
    /// Zero identifier for system-owned records.
    pub user: Oid,
    pub title: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub status: bool,
    pub permissions: Permissions,
    pub date: Timestamp,
}

pub fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        id: Oid::from(&file.id),
        filename: file.filename.clone(),
        key: file.key.clone(),
        url: file.url.clone(),
        user: Oid::from(file.owner.as_ref().unwrap_or(&ObjectId::ZERO)),
        title: file.title.clone(),
        mime_type: file.mime_type.clone(),
        status: file.status,
        permissions: file.permissions,
        date: Timestamp {
            date: file.created_at.timestamp(),
        },
    }
}

pub fn files_to_response(files: &[FileRecord]) -> Vec<FileResponse> {
    files.iter().map(file_to_response).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::NewFile;

    #[test]
    fn test_system_record_shape() {
        let id = ObjectId::new();
        let record = NewFile::construct(
            "cat.png",
            "images/cat.png",
            "images/cat.png",
            "cat.png",
            "image/png",
            None,
            Permissions::Public,
        )
        .unwrap()
        .into_record(id);

        let json = serde_json::to_value(file_to_response(&record)).unwrap();
        assert_eq!(json["_id"]["$oid"], id.to_hex());
        assert_eq!(json["user"]["$oid"], "000000000000000000000000");
        assert_eq!(json["type"], "image/png");
        assert_eq!(json["permissions"], "public");
        assert_eq!(json["date"]["$date"], record.created_at.timestamp());
        assert_eq!(json["status"], true);
    }
}
