//! file-lifecycle - Ownership, visibility and lifecycle management for uploaded files
//!
//! This crate keeps file metadata and file bytes consistent across two stores:
//! - redb embedded database for file records (owner, permissions, soft-delete status)
//! - Swappable object storage backends (local filesystem, GCS) with time-limited read tokens
//! - An HTTP surface for owners and a NATS queue-group surface for other services
//! - Transactional soft-delete that rolls back when the blob cannot be removed

pub mod api;
pub mod bus;
pub mod config;
pub mod object_store;
pub mod service;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use object_store::UrlSigner;
use service::FileService;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub files: Arc<FileService>,
    /// Present when blobs are served by this process (local backend)
    pub signer: Option<Arc<UrlSigner>>,
}
