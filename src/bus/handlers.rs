use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::envelope::{Envelope, EnvelopeError};
use crate::api::response::{FailData, JSend, JSendError, JSendFail, JSendStatus};
use crate::service::batch::{BatchFailure, ItemFailure};
use crate::service::wire::file_to_response;
use crate::service::{ClassroomUpload, ErrorKind, FileService, ServiceError};

/// Commands served over the bus, one subject each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    UploadImage,
    DeleteImage,
    DeleteAwsFile,
    UploadFilesClassroom,
    GetAwsTokenAccess,
    GetKeyFromIdFile,
    GetPermissionsFiles,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::UploadImage,
        Command::DeleteImage,
        Command::DeleteAwsFile,
        Command::UploadFilesClassroom,
        Command::GetAwsTokenAccess,
        Command::GetKeyFromIdFile,
        Command::GetPermissionsFiles,
    ];

    pub fn subject(&self) -> &'static str {
        match self {
            Command::UploadImage => "upload_image",
            Command::DeleteImage => "delete_image",
            Command::DeleteAwsFile => "delete_aws_file",
            Command::UploadFilesClassroom => "upload_files_classroom",
            Command::GetAwsTokenAccess => "get_aws_token_access",
            Command::GetKeyFromIdFile => "get_key_from_id_file",
            Command::GetPermissionsFiles => "get_permissions_files",
        }
    }

    /// Fire-and-forget commands perform their side effect and never answer.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Command::DeleteAwsFile)
    }
}

#[derive(Debug, Deserialize)]
struct ClassroomFile {
    location: String,
    filename: String,
    #[serde(rename = "mime-type")]
    mime_type: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct PermissionsRequest {
    files: Vec<String>,
    #[serde(default)]
    id_user: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchFailData {
    message: String,
    total: usize,
    failures: Vec<ItemFailure>,
}

/// Why a command produced no successful reply.
enum Failure {
    Envelope(EnvelopeError),
    Service(ServiceError),
    Batch(BatchFailure),
}

impl From<EnvelopeError> for Failure {
    fn from(e: EnvelopeError) -> Self {
        Failure::Envelope(e)
    }
}

impl From<ServiceError> for Failure {
    fn from(e: ServiceError) -> Self {
        Failure::Service(e)
    }
}

impl From<BatchFailure> for Failure {
    fn from(e: BatchFailure) -> Self {
        Failure::Batch(e)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Envelope(e) => e.fmt(f),
            Failure::Service(e) => e.fmt(f),
            Failure::Batch(e) => e.fmt(f),
        }
    }
}

impl Failure {
    fn into_reply(self) -> Bytes {
        match self {
            Failure::Service(e) if e.kind() == ErrorKind::Unavailable => encode(&JSendError {
                message: e.to_string(),
                status: JSendStatus::Error,
            }),
            Failure::Batch(batch) => encode(&JSend {
                data: BatchFailData {
                    message: batch.to_string(),
                    total: batch.total,
                    failures: batch.failures,
                },
                status: JSendStatus::Fail,
            }),
            other => encode(&JSendFail {
                data: FailData {
                    message: other.to_string(),
                },
                status: JSendStatus::Fail,
            }),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Bytes {
    match serde_json::to_vec(value) {
        Ok(json) => Bytes::from(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode bus reply");
            Bytes::from_static(br#"{"message":"failed to encode reply","status":"error"}"#)
        }
    }
}

/// Decodes bus payloads, runs them against the file service, and builds replies.
pub struct CommandHandler {
    service: Arc<FileService>,
}

impl CommandHandler {
    pub fn new(service: Arc<FileService>) -> Self {
        Self { service }
    }

    /// Run `command`. Returns the reply body, or `None` for commands that
    /// never answer.
    pub async fn handle(&self, command: Command, payload: &[u8]) -> Option<Bytes> {
        let result = match command {
            Command::UploadImage => self.upload_image(payload).await,
            Command::DeleteImage => self.delete_image(payload).await,
            Command::DeleteAwsFile => self.delete_aws_file(payload).await,
            Command::UploadFilesClassroom => self.upload_files_classroom(payload).await,
            Command::GetAwsTokenAccess => self.get_aws_token_access(payload).await,
            Command::GetKeyFromIdFile => self.get_key_from_id_file(payload).await,
            Command::GetPermissionsFiles => self.get_permissions_files(payload).await,
        };

        match result {
            Ok(reply) => command.expects_reply().then_some(reply),
            Err(failure) if command.expects_reply() => {
                tracing::debug!(subject = command.subject(), error = %failure, "Command failed");
                Some(failure.into_reply())
            }
            Err(failure) => {
                tracing::warn!(subject = command.subject(), error = %failure, "Dropped fire-and-forget command");
                None
            }
        }
    }

    async fn upload_image(&self, payload: &[u8]) -> Result<Bytes, Failure> {
        let key = Envelope::decode_text(payload)?.into_data();
        let record = self.service.ingest_image(&key).await?;
        Ok(encode(&file_to_response(&record)))
    }

    async fn delete_image(&self, payload: &[u8]) -> Result<Bytes, Failure> {
        let key = Envelope::decode_text(payload)?.into_data();
        self.service.delete_blob(&key).await?;
        Ok(Bytes::from_static(b"success"))
    }

    async fn delete_aws_file(&self, payload: &[u8]) -> Result<Bytes, Failure> {
        let file_id = Envelope::decode_text(payload)?.into_data();
        self.service.system_delete(&file_id).await?;
        tracing::info!(file_id = %file_id, "Deleted file on system request");
        Ok(Bytes::new())
    }

    async fn upload_files_classroom(&self, payload: &[u8]) -> Result<Bytes, Failure> {
        let file = Envelope::<ClassroomFile>::decode(payload)?.into_data();
        let record = self
            .service
            .ingest_classroom_file(ClassroomUpload {
                location: file.location,
                filename: file.filename,
                mime_type: file.mime_type,
                key: file.key,
            })
            .await?;
        Ok(encode(&file_to_response(&record)))
    }

    async fn get_aws_token_access(&self, payload: &[u8]) -> Result<Bytes, Failure> {
        let keys = Envelope::<Vec<String>>::decode(payload)?.into_data();
        let tokens = self.service.issue_read_tokens(keys).await.into_results()?;
        Ok(encode(&tokens))
    }

    async fn get_key_from_id_file(&self, payload: &[u8]) -> Result<Bytes, Failure> {
        let file_id = Envelope::decode_text(payload)?.into_data();
        let key = self.service.key_of(&file_id).await?;
        Ok(Bytes::from(key))
    }

    async fn get_permissions_files(&self, payload: &[u8]) -> Result<Bytes, Failure> {
        let request = Envelope::<PermissionsRequest>::decode(payload)?.into_data();
        tracing::debug!(
            id_user = request.id_user.as_deref().unwrap_or(""),
            files = request.files.len(),
            "Resolving permissions"
        );
        let permissions = self
            .service
            .permissions_for(request.files)
            .await
            .into_results()?;
        Ok(encode(&permissions))
    }
}
