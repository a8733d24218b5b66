//! Shared test helpers for file-lifecycle unit tests.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BusConfig, Config, FilesConfig, ServerConfig, StorageConfig};
use crate::object_store::{BlobStore, LocalStore, UrlSigner};
use crate::service::FileService;
use crate::storage::Database;
use crate::AppState;

pub const TEST_USER: &str = "64b7f0c2a1e4d3b2c1a09f8e";
pub const OTHER_USER: &str = "64b7f0c2a1e4d3b2c1a09f8f";

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
            max_upload_size: 1024 * 1024, // 1MB for tests
        },
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
            url_signing_secret: "test-secret".to_string(),
            ..Default::default()
        },
        files: FilesConfig {
            delete_wait_attempts: 2,
            delete_wait_interval_ms: 1,
            ..Default::default()
        },
        bus: BusConfig::default(),
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let signer = Arc::new(UrlSigner::new(
        config.storage.url_signing_secret.as_bytes(),
        config.storage.public_base_url.as_str(),
    ));
    let object_store =
        LocalStore::new(&files_dir, Arc::clone(&signer)).expect("Failed to create test object store");
    let blobs = BlobStore::new(
        Arc::new(object_store),
        Duration::from_secs(60),
        config.delete_wait(),
    );

    Arc::new(AppState {
        config,
        files: Arc::new(FileService::new(Arc::new(db), blobs)),
        signer: Some(signer),
    })
}
