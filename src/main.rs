use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_lifecycle::{
    api,
    bus::{BusServer, NatsTransport},
    config::{Config, StorageBackend},
    object_store as obj,
    service::FileService,
    storage::{Database, MetadataStore},
    AppState,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "file-lifecycle starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize metadata store
    let db = Database::open(&config.server.data_dir)?;
    info!("Database opened at: {}", config.server.data_dir);

    // Initialize object store backend
    let (object_store, signer): (Arc<dyn obj::ObjectStore>, Option<Arc<obj::UrlSigner>>) =
        match config.storage.backend {
            StorageBackend::Local => {
                let signer = Arc::new(obj::UrlSigner::new(
                    config.storage.url_signing_secret.as_bytes(),
                    config.storage.public_base_url.as_str(),
                ));
                let store =
                    obj::LocalStore::new(&config.storage.local_storage_path, Arc::clone(&signer))?;
                info!(
                    "Using local storage backend at: {}",
                    config.storage.local_storage_path
                );
                (Arc::new(store), Some(signer))
            }
            StorageBackend::Gcs => {
                let bucket = config
                    .storage
                    .gcs_bucket
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("GCS_BUCKET is required for the gcs backend"))?;
                let store =
                    obj::GcsStore::new(bucket, config.storage.gcs_credentials_file.as_deref())
                        .await?;
                info!("Using GCS storage backend, bucket: {}", bucket);
                (Arc::new(store), None)
            }
        };

    let blobs = obj::BlobStore::new(object_store, config.read_token_ttl(), config.delete_wait());
    let store: Arc<dyn MetadataStore> = Arc::new(db);
    let files = Arc::new(
        FileService::new(store, blobs).with_batch_concurrency(config.files.batch_concurrency),
    );

    // Start bus subscribers
    let mut bus_handles = Vec::new();
    let mut nats = None;
    if let Some(url) = config.bus.nats_url.as_deref() {
        let transport = NatsTransport::connect(url).await?;
        let server = BusServer::new(
            Arc::new(transport.clone()),
            Arc::clone(&files),
            config.bus.queue_group.as_str(),
        );
        bus_handles = server.start().await?;
        nats = Some(transport);
    }

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        files,
        signer,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup: stop bus subscribers
    info!("Shutting down background tasks");
    for handle in bus_handles {
        handle.abort();
    }

    if let Some(transport) = nats {
        if let Err(e) = transport.flush().await {
            tracing::error!(error = %e, "Failed to flush bus during shutdown");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
