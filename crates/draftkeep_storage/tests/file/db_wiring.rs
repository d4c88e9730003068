#![forbid(unsafe_code)]

use draftkeep_storage::{FileStorage, StorageAdapter, StorageError};

#[test]
fn at_file_db_01_round_trip_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut s = FileStorage::open(dir.path()).unwrap();
        s.set("attender_application_v1.0", "{\"data\":{}}").unwrap();
    }

    let reopened = FileStorage::open(dir.path()).unwrap();
    assert_eq!(
        reopened.get("attender_application_v1.0").unwrap().as_deref(),
        Some("{\"data\":{}}")
    );
}

#[test]
fn at_file_db_02_missing_key_reads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let s = FileStorage::open(dir.path()).unwrap();
    assert_eq!(s.get("never_written_v1").unwrap(), None);
}

#[test]
fn at_file_db_03_overwrite_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = FileStorage::open(dir.path()).unwrap();
    s.set("draft_v2", "first").unwrap();
    s.set("draft_v2", "second").unwrap();

    assert_eq!(s.get("draft_v2").unwrap().as_deref(), Some("second"));
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["draft_v2.json".to_string()]);
}

#[test]
fn at_file_db_04_remove_then_get_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = FileStorage::open(dir.path()).unwrap();
    s.set("draft_v1", "x").unwrap();
    s.remove("draft_v1").unwrap();
    s.remove("draft_v1").unwrap();
    assert_eq!(s.get("draft_v1").unwrap(), None);
}

#[test]
fn at_file_db_05_traversal_key_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = FileStorage::open(dir.path()).unwrap();
    assert!(matches!(
        s.set("../outside", "x"),
        Err(StorageError::InvalidKey { .. })
    ));
    assert!(matches!(
        s.get("a/b"),
        Err(StorageError::InvalidKey { .. })
    ));
}
