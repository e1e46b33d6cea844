#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use profile_kernel_contracts::identity::{IdentityId, IdentityMetadata, IdentityRecord};
use profile_kernel_contracts::profile::{ProfileRecord, ProfileRole};
use profile_kernel_contracts::MonotonicTimeNs;
use profile_storage::repo::IdentityStoreRepo;
use profile_storage::{IdentityCursor, ProfileDb, SharedProfileDb, StorageError};

fn identity(user: &str, email: Option<&str>, created_at: u64) -> IdentityRecord {
    IdentityRecord::v1(
        IdentityId::new(user).unwrap(),
        email.map(str::to_string),
        IdentityMetadata::empty(),
        MonotonicTimeNs(created_at),
    )
    .unwrap()
}

fn ids(rows: &[IdentityRecord]) -> Vec<&str> {
    rows.iter().map(|r| r.identity_id.as_str()).collect()
}

#[test]
fn at_id_db_01_duplicate_identity_rejected() {
    let mut s = ProfileDb::new_in_memory();
    s.insert_identity(identity("dbw_i_a", Some("a@example.com"), 1))
        .unwrap();
    assert!(matches!(
        s.insert_identity(identity("dbw_i_a", Some("b@example.com"), 2)),
        Err(StorageError::DuplicateKey { table: "identities", .. })
    ));
}

#[test]
fn at_id_db_02_anti_join_orders_by_created_at_then_id_and_pages_by_cursor() {
    let mut s = ProfileDb::new_in_memory();
    s.insert_identity(identity("dbw_i_c", Some("c@example.com"), 5))
        .unwrap();
    s.insert_identity(identity("dbw_i_b", Some("b@example.com"), 5))
        .unwrap();
    s.insert_identity(identity("dbw_i_a", Some("a@example.com"), 9))
        .unwrap();
    s.insert_identity(identity("dbw_i_d", None, 1)).unwrap();
    s.insert_profile(
        ProfileRecord::v1(
            IdentityId::new("dbw_i_c").unwrap(),
            "c@example.com".to_string(),
            "c".to_string(),
            ProfileRole::Parent,
            MonotonicTimeNs(6),
        )
        .unwrap(),
    )
    .unwrap();

    let first = s.identities_without_profile(None, 2);
    assert_eq!(ids(&first), vec!["dbw_i_d", "dbw_i_b"]);
    let cursor = IdentityCursor::after(first.last().unwrap());
    let second = s.identities_without_profile(Some(&cursor), 2);
    assert_eq!(ids(&second), vec!["dbw_i_a"]);

    let counts = s.count_identities_without_profile();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.with_email, 2);
}

#[test]
fn at_id_db_03_creation_hooks_fire_after_commit_and_survive_panics() {
    let db = SharedProfileDb::new_in_memory();
    let seen = Arc::new(AtomicUsize::new(0));
    let probe_db = db.clone();
    let probe_seen = Arc::clone(&seen);
    db.install_identity_created_hook(
        "probe",
        Arc::new(move |record: &IdentityRecord| {
            // Committed before delivery.
            assert!(probe_db.identity_row(&record.identity_id).unwrap().is_some());
            probe_seen.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    db.install_identity_created_hook(
        "broken",
        Arc::new(|_: &IdentityRecord| panic!("hook failure")),
    )
    .unwrap();

    db.create_identity(identity("dbw_i_hook", Some("h@example.com"), 1))
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    let id = IdentityId::new("dbw_i_hook").unwrap();
    assert_eq!(db.redeliver_identity_created(&id).unwrap(), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    assert!(db.remove_identity_created_hook("broken").unwrap());
    assert!(!db.has_identity_created_hook("broken").unwrap());
    assert!(db.has_identity_created_hook("probe").unwrap());
}

#[test]
fn at_id_db_04_duplicate_creation_fires_no_hook() {
    let db = SharedProfileDb::new_in_memory();
    let seen = Arc::new(AtomicUsize::new(0));
    let probe_seen = Arc::clone(&seen);
    db.install_identity_created_hook(
        "probe",
        Arc::new(move |_: &IdentityRecord| {
            probe_seen.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    db.create_identity(identity("dbw_i_once", None, 1)).unwrap();
    assert!(db
        .create_identity(identity("dbw_i_once", None, 2))
        .is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    let missing = IdentityId::new("dbw_i_missing").unwrap();
    assert!(matches!(
        db.redeliver_identity_created(&missing),
        Err(StorageError::NotFound { .. })
    ));
}
