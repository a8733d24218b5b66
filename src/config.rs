use std::time::Duration;

use thiserror::Error;

use crate::object_store::DeleteWait;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub files: FilesConfig,
    pub bus: BusConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub data_dir: String,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// Base URL the `/blobs` route is reachable under (local backend)
    pub public_base_url: String,
    /// HMAC secret for local signed URLs
    pub url_signing_secret: String,
    /// GCS bucket name (required when backend is gcs)
    pub gcs_bucket: Option<String>,
    /// Path to GCS service account JSON (optional, defaults to the metadata server)
    pub gcs_credentials_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FilesConfig {
    pub read_token_ttl_seconds: u64,
    pub delete_wait_attempts: u32,
    pub delete_wait_interval_ms: u64,
    /// Upper bound on in-flight items per batch request
    pub batch_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Bus surface is disabled when unset
    pub nats_url: Option<String>,
    pub queue_group: String,
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
            max_upload_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./files".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            url_signing_secret: random_secret(),
            gcs_bucket: None,
            gcs_credentials_file: None,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            read_token_ttl_seconds: 15 * 60,
            delete_wait_attempts: 20,
            delete_wait_interval_ms: 5000,
            batch_concurrency: 10,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            queue_group: "files".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

fn random_secret() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            bind_address: lookup("BIND_ADDRESS").unwrap_or(server_defaults.bind_address),
            data_dir: lookup("DATA_DIR").unwrap_or(server_defaults.data_dir),
            max_upload_size: parse_var(&lookup, "MAX_UPLOAD_SIZE")
                .unwrap_or(server_defaults.max_upload_size),
        };

        let backend = match lookup("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => StorageBackend::Gcs,
            "local" => StorageBackend::Local,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "STORAGE_BACKEND must be local or gcs (got '{other}')"
                )))
            }
        };

        let storage = StorageConfig {
            backend,
            local_storage_path: lookup("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|| "./files".to_string()),
            public_base_url: lookup("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            url_signing_secret: lookup("URL_SIGNING_SECRET")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(random_secret),
            gcs_bucket: lookup("GCS_BUCKET"),
            gcs_credentials_file: lookup("GCS_CREDENTIALS_FILE"),
        };

        let files_defaults = FilesConfig::default();
        let files = FilesConfig {
            read_token_ttl_seconds: parse_var(&lookup, "READ_TOKEN_TTL_SECONDS")
                .unwrap_or(files_defaults.read_token_ttl_seconds),
            delete_wait_attempts: parse_var(&lookup, "DELETE_WAIT_ATTEMPTS")
                .unwrap_or(files_defaults.delete_wait_attempts),
            delete_wait_interval_ms: parse_var(&lookup, "DELETE_WAIT_INTERVAL_MS")
                .unwrap_or(files_defaults.delete_wait_interval_ms),
            batch_concurrency: parse_var(&lookup, "BATCH_CONCURRENCY")
                .unwrap_or(files_defaults.batch_concurrency),
        };

        let bus_defaults = BusConfig::default();
        let bus = BusConfig {
            nats_url: lookup("NATS_URL").filter(|s| !s.is_empty()),
            queue_group: lookup("BUS_QUEUE_GROUP").unwrap_or(bus_defaults.queue_group),
            request_timeout_seconds: parse_var(&lookup, "BUS_REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(bus_defaults.request_timeout_seconds),
        };

        let config = Config {
            server,
            storage,
            files,
            bus,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StorageBackend::Gcs && self.storage.gcs_bucket.is_none() {
            return Err(ConfigError::ValidationError(
                "GCS_BUCKET is required when STORAGE_BACKEND=gcs".to_string(),
            ));
        }

        if self.files.batch_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "BATCH_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        if self.files.read_token_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "READ_TOKEN_TTL_SECONDS must be positive".to_string(),
            ));
        }

        if self.bus.queue_group.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "BUS_QUEUE_GROUP cannot be empty".to_string(),
            ));
        }

        if self.bus.nats_url.is_none() {
            tracing::warn!("NATS_URL is not set; bus commands will not be served");
        }

        Ok(())
    }

    pub fn read_token_ttl(&self) -> Duration {
        Duration::from_secs(self.files.read_token_ttl_seconds)
    }

    pub fn delete_wait(&self) -> DeleteWait {
        DeleteWait {
            attempts: self.files.delete_wait_attempts,
            interval: Duration::from_millis(self.files.delete_wait_interval_ms),
        }
    }

    pub fn bus_request_timeout(&self) -> Duration {
        Duration::from_secs(self.bus.request_timeout_seconds)
    }
}
