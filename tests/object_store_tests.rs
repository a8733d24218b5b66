use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use file_lifecycle::object_store::{
    BlobStore, DeleteWait, LocalStore, ObjectStore, ObjectStoreError, UrlSigner,
};

fn local_store(dir: &tempfile::TempDir) -> LocalStore {
    let signer = Arc::new(UrlSigner::new(b"secret", "http://localhost:8080"));
    LocalStore::new(dir.path(), signer).unwrap()
}

fn blob_store(dir: &tempfile::TempDir) -> BlobStore {
    BlobStore::new(
        Arc::new(local_store(dir)),
        Duration::from_secs(900),
        DeleteWait {
            attempts: 3,
            interval: Duration::from_millis(1),
        },
    )
}

#[tokio::test]
async fn test_local_store_put_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);

    let data = Bytes::from("hello world");
    store.put("user_files/a/test.txt", data.clone()).await.unwrap();

    let retrieved = store.get("user_files/a/test.txt").await.unwrap();
    assert_eq!(retrieved, data);
}

#[tokio::test]
async fn test_local_store_exists() {
    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);

    assert!(!store.exists("missing").await.unwrap());

    store.put("present", Bytes::from("data")).await.unwrap();
    assert!(store.exists("present").await.unwrap());
}

#[tokio::test]
async fn test_local_store_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);

    store.put("to-delete", Bytes::from("data")).await.unwrap();
    store.delete("to-delete").await.unwrap();
    assert!(!store.exists("to-delete").await.unwrap());

    // Deleting a nonexistent key should not error
    store.delete("to-delete").await.unwrap();
}

#[tokio::test]
async fn test_local_store_get_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);

    assert!(matches!(
        store.get("missing").await,
        Err(ObjectStoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_local_store_rejects_escaping_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = local_store(&dir);

    for key in ["../outside", "/etc/passwd", "a/./b", ""] {
        assert!(matches!(
            store.put(key, Bytes::from("x")).await,
            Err(ObjectStoreError::InvalidKey(_))
        ));
    }
}

#[tokio::test]
async fn test_local_store_presign_is_verifiable() {
    let dir = tempfile::tempdir().unwrap();
    let signer = Arc::new(UrlSigner::new(b"secret", "http://localhost:8080"));
    let store = LocalStore::new(dir.path(), Arc::clone(&signer)).unwrap();

    let url = store
        .presign_get("user_files/a/doc.pdf", Duration::from_secs(60))
        .await
        .unwrap();
    let (location, query) = url.split_once('?').unwrap();
    assert_eq!(location, store.location("user_files/a/doc.pdf"));

    let mut expires = 0;
    let mut signature = "";
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("expires", v)) => expires = v.parse().unwrap(),
            Some(("signature", v)) => signature = v,
            _ => {}
        }
    }
    assert!(signer
        .verify("user_files/a/doc.pdf", expires, signature)
        .is_ok());
    assert!(signer.verify("user_files/a/other.pdf", expires, signature).is_err());
}

#[tokio::test]
async fn test_blob_store_upload_key_layout() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = blob_store(&dir);

    let (location, key) = blobs
        .upload(Bytes::from("data"), "user_files/64b7f0c2a1e4d3b2c1a09f8e", "png")
        .await
        .unwrap();

    assert!(key.starts_with("user_files/64b7f0c2a1e4d3b2c1a09f8e/"));
    assert!(key.ends_with(".png"));
    assert_eq!(location, format!("http://localhost:8080/blobs/{key}"));
    assert!(blobs.backend().exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_blob_store_delete_waits_until_absent() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = blob_store(&dir);
    let (_, key) = blobs
        .upload(Bytes::from("data"), "images", "jpg")
        .await
        .unwrap();

    blobs.delete_object(&key).await.unwrap();
    assert!(!blobs.backend().exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_blob_store_issue_read_token() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = blob_store(&dir);

    let token = blobs.issue_read_token("images/cat.jpg").await.unwrap();
    assert!(token.starts_with("http://localhost:8080/blobs/images/cat.jpg?expires="));
}
