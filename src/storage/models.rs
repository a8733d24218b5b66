use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::object_id::{InvalidObjectId, ObjectId};

pub const TITLE_MIN_LEN: usize = 3;
pub const TITLE_MAX_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid owner: {0}")]
    Owner(#[from] InvalidObjectId),
    #[error("permissions must be private, public or public_classroom (got '{0}')")]
    Permissions(String),
    #[error("title must be between {} and {} characters", TITLE_MIN_LEN, TITLE_MAX_LEN)]
    TitleLength,
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
}

/// Read-access class of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permissions {
    Private,
    Public,
    PublicClassroom,
}

impl Permissions {
    pub const ALL: [Permissions; 3] = [
        Permissions::Private,
        Permissions::Public,
        Permissions::PublicClassroom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permissions::Private => "private",
            Permissions::Public => "public",
            Permissions::PublicClassroom => "public_classroom",
        }
    }
}

impl FromStr for Permissions {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permissions::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ValidationError::Permissions(s.to_string()))
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listing filter: every permission class, or exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionsFilter {
    #[default]
    Any,
    Only(Permissions),
}

impl PermissionsFilter {
    pub fn matches(&self, permissions: Permissions) -> bool {
        match self {
            PermissionsFilter::Any => true,
            PermissionsFilter::Only(p) => *p == permissions,
        }
    }
}

impl FromStr for PermissionsFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "any" {
            return Ok(PermissionsFilter::Any);
        }
        s.parse().map(PermissionsFilter::Only)
    }
}

/// Application-level title check applied to user uploads.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    let len = title.chars().count();
    if !(TITLE_MIN_LEN..=TITLE_MAX_LEN).contains(&len) {
        return Err(ValidationError::TitleLength);
    }
    Ok(())
}

/// A validated file record that has not been assigned an identifier yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFile {
    pub filename: String,
    pub key: String,
    pub url: String,
    pub title: String,
    pub mime_type: String,
    pub owner: Option<ObjectId>,
    pub status: bool,
    pub permissions: Permissions,
    pub created_at: DateTime<Utc>,
}

impl NewFile {
    /// Build an active record stamped with the current time. An empty owner
    /// means the record belongs to the system; anything else must be a
    /// well-formed identity reference.
    pub fn construct(
        filename: impl Into<String>,
        key: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        mime_type: impl Into<String>,
        owner: Option<&str>,
        permissions: Permissions,
    ) -> Result<Self, ValidationError> {
        let owner = match owner.filter(|o| !o.is_empty()) {
            Some(o) => Some(ObjectId::parse(o)?),
            None => None,
        };

        Ok(NewFile {
            filename: filename.into(),
            key: key.into(),
            url: url.into(),
            title: title.into(),
            mime_type: mime_type.into(),
            owner,
            status: true,
            permissions,
            created_at: Utc::now(),
        })
    }

    pub fn into_record(self, id: ObjectId) -> FileRecord {
        FileRecord {
            id,
            filename: self.filename,
            key: self.key,
            url: self.url,
            title: self.title,
            mime_type: self.mime_type,
            owner: self.owner,
            status: self.status,
            permissions: self.permissions,
            created_at: self.created_at,
        }
    }
}

/// A file record stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: ObjectId,
    pub filename: String,
    pub key: String,
    pub url: String,
    pub title: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(default)]
    pub owner: Option<ObjectId>,
    /// `true` while active; soft-deleted records stay `false` forever.
    pub status: bool,
    pub permissions: Permissions,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_active(&self) -> bool {
        self.status
    }

    pub fn is_owned_by(&self, caller: &ObjectId) -> bool {
        self.owner.as_ref() == Some(caller)
    }

    /// Checks enforced when a record crosses into the store, independent of
    /// whatever the caller validated.
    pub fn validate_schema(&self) -> Result<(), ValidationError> {
        let required = [
            ("filename", &self.filename),
            ("key", &self.key),
            ("url", &self.url),
            ("title", &self.title),
            ("type", &self.mime_type),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ValidationError::Missing(field));
            }
        }
        if self.title.chars().count() > TITLE_MAX_LEN {
            return Err(ValidationError::TooLong {
                field: "title",
                max: TITLE_MAX_LEN,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_without_owner() {
        let file = NewFile::construct(
            "a.png",
            "img/a.png",
            "img/a.png",
            "a.png",
            "image/png",
            Some(""),
            Permissions::Public,
        )
        .unwrap();
        assert!(file.status);
        assert_eq!(file.owner, None);
    }

    #[test]
    fn test_construct_rejects_malformed_owner() {
        let err = NewFile::construct(
            "a.png",
            "k",
            "u",
            "title",
            "image/png",
            Some("nope"),
            Permissions::Private,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::Owner(_)));
    }

    #[test]
    fn test_permissions_parse() {
        assert_eq!(
            "public_classroom".parse::<Permissions>().unwrap(),
            Permissions::PublicClassroom
        );
        assert!("shared".parse::<Permissions>().is_err());
        assert_eq!(
            "any".parse::<PermissionsFilter>().unwrap(),
            PermissionsFilter::Any
        );
        assert!("any".parse::<Permissions>().is_err());
    }

    #[test]
    fn test_title_bounds() {
        assert!(validate_title("ab").is_err());
        assert!(validate_title("abc").is_ok());
        assert!(validate_title(&"x".repeat(100)).is_ok());
        assert!(validate_title(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_schema_rejects_long_title_and_missing_fields() {
        let mut record = NewFile::construct(
            "a.txt",
            "k",
            "u",
            "title",
            "text/plain",
            None,
            Permissions::Public,
        )
        .unwrap()
        .into_record(ObjectId::new());
        assert!(record.validate_schema().is_ok());

        record.title = "x".repeat(101);
        assert!(record.validate_schema().is_err());

        record.title = "ok title".to_string();
        record.key.clear();
        assert_eq!(
            record.validate_schema(),
            Err(ValidationError::Missing("key"))
        );
    }
}
