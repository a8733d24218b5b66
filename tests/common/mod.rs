//! Fakes shared by the service, batch and bus integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use file_lifecycle::object_store::{BlobStore, DeleteWait, ObjectStore, ObjectStoreError};
use file_lifecycle::service::FileService;
use file_lifecycle::storage::Database;

pub const OWNER: &str = "64b7f0c2a1e4d3b2c1a09f8e";
pub const STRANGER: &str = "64b7f0c2a1e4d3b2c1a09f8f";

type DeleteHook = Box<dyn Fn(&str) + Send + Sync>;

/// In-memory object store with switchable failures and per-key latency.
#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    delays: Mutex<HashMap<String, Duration>>,
    put_delay: Mutex<Option<Duration>>,
    on_delete: Mutex<Option<DeleteHook>>,
    fail_delete: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn delay_presign(&self, key: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
    }

    pub fn delay_puts(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    /// Run `hook` with the key at the start of every delete.
    pub fn on_delete(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_delete.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        if let Some(hook) = self.on_delete.lock().unwrap().as_ref() {
            hook(key);
        }
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("delete refused".into()));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.contains(key))
    }

    async fn presign_get(&self, key: &str, _ttl: Duration) -> Result<String, ObjectStoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(key).copied();
        tokio::time::sleep(delay.unwrap_or(Duration::from_millis(2))).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if key.starts_with("broken/") {
            return Err(ObjectStoreError::Backend(format!("cannot sign {key}")));
        }
        Ok(format!("https://blobs.test/{key}?token=signed"))
    }

    fn location(&self, key: &str) -> String {
        format!("https://blobs.test/{key}")
    }
}

pub fn blob_store(objects: Arc<FakeObjectStore>) -> BlobStore {
    BlobStore::new(
        objects,
        Duration::from_secs(900),
        DeleteWait {
            attempts: 2,
            interval: Duration::from_millis(1),
        },
    )
}

/// A file service over a temporary redb and the given fake object store.
pub fn test_service(
    dir: &tempfile::TempDir,
    objects: Arc<FakeObjectStore>,
) -> (Arc<FileService>, Database) {
    let db = Database::open(dir.path().join("data")).unwrap();
    let service = FileService::new(Arc::new(db.clone()), blob_store(objects));
    (Arc::new(service), db)
}
