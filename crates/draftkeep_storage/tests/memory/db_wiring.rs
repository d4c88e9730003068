#![forbid(unsafe_code)]

use draftkeep_storage::{InMemoryStorage, StorageAdapter, StorageError};

#[test]
fn at_mem_db_01_set_overwrites_not_appends() {
    let mut s = InMemoryStorage::new();
    s.set("attender_application_v1.0", "{\"a\":1}").unwrap();
    s.set("attender_application_v1.0", "{\"a\":2}").unwrap();

    assert_eq!(s.len(), 1);
    assert_eq!(
        s.get("attender_application_v1.0").unwrap().as_deref(),
        Some("{\"a\":2}")
    );
    assert_eq!(s.write_count(), 2);
}

#[test]
fn at_mem_db_02_remove_is_idempotent() {
    let mut s = InMemoryStorage::new();
    s.set("draft_v1", "x").unwrap();
    s.remove("draft_v1").unwrap();
    s.remove("draft_v1").unwrap();
    assert_eq!(s.get("draft_v1").unwrap(), None);
    assert!(s.is_empty());
}

#[test]
fn at_mem_db_03_quota_exceeded_keeps_previous_value() {
    let mut s = InMemoryStorage::with_quota(16);
    s.set("k_v1", "small").unwrap();

    let out = s.set("k_v1", "this value is far too large");
    assert!(matches!(out, Err(StorageError::QuotaExceeded { limit: 16, .. })));
    assert_eq!(s.get("k_v1").unwrap().as_deref(), Some("small"));
}

#[test]
fn at_mem_db_04_overwrite_counts_only_new_size_against_quota() {
    let mut s = InMemoryStorage::with_quota(12);
    s.set("k_v1", "12345678").unwrap();
    // Same size rewrite must fit even though the old value is still resident.
    s.set("k_v1", "87654321").unwrap();
    assert_eq!(s.used_bytes(), 12);
}

#[test]
fn at_mem_db_05_disabled_storage_reports_unavailable() {
    let mut s = InMemoryStorage::new();
    s.set_disabled(true);
    assert!(matches!(
        s.set("k_v1", "x"),
        Err(StorageError::Unavailable { .. })
    ));
    assert!(matches!(s.get("k_v1"), Err(StorageError::Unavailable { .. })));

    s.set_disabled(false);
    s.set("k_v1", "x").unwrap();
}

#[test]
fn at_mem_db_06_rejects_path_like_keys() {
    let mut s = InMemoryStorage::new();
    assert!(matches!(
        s.set("../escape", "x"),
        Err(StorageError::InvalidKey { .. })
    ));
    assert!(matches!(s.set("", "x"), Err(StorageError::InvalidKey { .. })));
}
