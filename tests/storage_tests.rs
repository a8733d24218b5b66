use file_lifecycle::storage::models::{NewFile, Permissions, PermissionsFilter};
use file_lifecycle::storage::{Database, DatabaseError, ObjectId};

const OWNER: &str = "64b7f0c2a1e4d3b2c1a09f8e";

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_file(filename: &str, owner: Option<&str>, permissions: Permissions) -> NewFile {
    NewFile::construct(
        filename,
        format!("user_files/{filename}"),
        format!("http://localhost:8080/blobs/user_files/{filename}"),
        "Quarterly report",
        "application/pdf",
        owner,
        permissions,
    )
    .unwrap()
}

#[test]
fn test_insert_and_reload_round_trip() {
    let (_dir, db) = test_db();
    let new_file = sample_file("report.pdf", Some(OWNER), Permissions::Private);
    let inserted = db.insert_file(new_file.clone()).unwrap();

    let retrieved = db.get_file(&inserted.id).unwrap().expect("file should exist");
    assert_eq!(retrieved.filename, new_file.filename);
    assert_eq!(retrieved.key, new_file.key);
    assert_eq!(retrieved.title, new_file.title);
    assert_eq!(retrieved.mime_type, new_file.mime_type);
    assert_eq!(retrieved.permissions, new_file.permissions);
    assert_eq!(retrieved.owner, new_file.owner);
    assert!(retrieved.status);
}

#[test]
fn test_insert_assigns_distinct_ids() {
    let (_dir, db) = test_db();
    let a = db
        .insert_file(sample_file("a.pdf", Some(OWNER), Permissions::Private))
        .unwrap();
    let b = db
        .insert_file(sample_file("b.pdf", Some(OWNER), Permissions::Private))
        .unwrap();
    assert_ne!(a.id, b.id);
}

#[test]
fn test_get_file_not_found() {
    let (_dir, db) = test_db();
    assert!(db.get_file(&ObjectId::new()).unwrap().is_none());
}

#[test]
fn test_insert_rejects_schema_violation() {
    let (_dir, db) = test_db();
    let mut file = sample_file("long.pdf", Some(OWNER), Permissions::Private);
    file.title = "x".repeat(101);
    assert!(matches!(
        db.insert_file(file),
        Err(DatabaseError::Schema(_))
    ));
    assert!(!db.filename_exists("long.pdf").unwrap());
}

#[test]
fn test_filename_exists() {
    let (_dir, db) = test_db();
    assert!(!db.filename_exists("report.pdf").unwrap());
    db.insert_file(sample_file("report.pdf", Some(OWNER), Permissions::Private))
        .unwrap();
    assert!(db.filename_exists("report.pdf").unwrap());
}

#[test]
fn test_insert_unique_filename_rejects_taken_name() {
    let (_dir, db) = test_db();
    db.insert_unique_filename(sample_file("plan.pdf", Some(OWNER), Permissions::Private))
        .unwrap();

    let err = db
        .insert_unique_filename(sample_file("plan.pdf", None, Permissions::Public))
        .unwrap_err();
    assert!(matches!(err, DatabaseError::FilenameTaken(name) if name == "plan.pdf"));

    // Nothing from the rejected insert is indexed
    let owner = ObjectId::parse(OWNER).unwrap();
    assert_eq!(db.list_files_by_owner(&owner, PermissionsFilter::Any).unwrap().len(), 1);

    // System ingestion may still reuse the name
    db.insert_file(sample_file("plan.pdf", None, Permissions::Public))
        .unwrap();
}

#[test]
fn test_list_files_by_owner_with_filter() {
    let (_dir, db) = test_db();
    let other = ObjectId::new().to_hex();
    db.insert_file(sample_file("a.pdf", Some(OWNER), Permissions::Private))
        .unwrap();
    db.insert_file(sample_file("b.pdf", Some(OWNER), Permissions::Public))
        .unwrap();
    db.insert_file(sample_file("c.pdf", Some(&other), Permissions::Public))
        .unwrap();
    db.insert_file(sample_file("d.png", None, Permissions::Public))
        .unwrap();

    let owner = ObjectId::parse(OWNER).unwrap();
    let all = db
        .list_files_by_owner(&owner, PermissionsFilter::Any)
        .unwrap();
    assert_eq!(all.len(), 2);

    let public = db
        .list_files_by_owner(&owner, PermissionsFilter::Only(Permissions::Public))
        .unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].filename, "b.pdf");

    let classroom = db
        .list_files_by_owner(&owner, PermissionsFilter::Only(Permissions::PublicClassroom))
        .unwrap();
    assert!(classroom.is_empty());
}

#[test]
fn test_set_permissions_changes_only_permissions() {
    let (_dir, db) = test_db();
    let inserted = db
        .insert_file(sample_file("a.pdf", Some(OWNER), Permissions::Private))
        .unwrap();

    assert!(db.set_permissions(&inserted.id, Permissions::Public).unwrap());

    let updated = db.get_file(&inserted.id).unwrap().unwrap();
    assert_eq!(updated.permissions, Permissions::Public);
    assert_eq!(
        updated,
        file_lifecycle::storage::models::FileRecord {
            permissions: Permissions::Public,
            ..inserted
        }
    );
}

#[test]
fn test_set_permissions_missing_record() {
    let (_dir, db) = test_db();
    assert!(!db
        .set_permissions(&ObjectId::new(), Permissions::Public)
        .unwrap());
}

#[test]
fn test_transaction_soft_delete_commit() {
    let (_dir, db) = test_db();
    let inserted = db
        .insert_file(sample_file("a.pdf", Some(OWNER), Permissions::Private))
        .unwrap();

    let mut txn = db.begin_transaction();
    assert!(txn.deactivate(&inserted.id).unwrap());
    txn.commit().unwrap();

    let file = db.get_file(&inserted.id).unwrap().unwrap();
    assert!(!file.status);
    assert_eq!(file.permissions, Permissions::Private);
}

#[test]
fn test_transaction_abort_leaves_record_active() {
    let (_dir, db) = test_db();
    let inserted = db
        .insert_file(sample_file("a.pdf", Some(OWNER), Permissions::Private))
        .unwrap();

    let mut txn = db.begin_transaction();
    assert!(txn.deactivate(&inserted.id).unwrap());
    txn.abort();

    assert!(db.get_file(&inserted.id).unwrap().unwrap().status);
}

#[test]
fn test_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let db = Database::open(dir.path().join("data")).unwrap();
        db.insert_file(sample_file("a.pdf", Some(OWNER), Permissions::Public))
            .unwrap()
            .id
    };

    let db = Database::open(dir.path().join("data")).unwrap();
    assert_eq!(db.get_file(&id).unwrap().unwrap().filename, "a.pdf");
}
