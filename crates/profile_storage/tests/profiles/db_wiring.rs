#![forbid(unsafe_code)]

use profile_kernel_contracts::identity::{IdentityId, IdentityMetadata, IdentityRecord};
use profile_kernel_contracts::profile::{ProfileRecord, ProfileRole, ProfileUpdate};
use profile_kernel_contracts::MonotonicTimeNs;
use profile_storage::repo::ProfileStoreRepo;
use profile_storage::{ProfileDb, SharedProfileDb, StorageError};

fn user(n: u32) -> IdentityId {
    IdentityId::new(format!("dbw_p_user_{n}")).unwrap()
}

fn store_with_identities(count: u32) -> ProfileDb {
    let mut s = ProfileDb::new_in_memory();
    for n in 1..=count {
        s.insert_identity(
            IdentityRecord::v1(
                user(n),
                Some(format!("p{n}@example.com")),
                IdentityMetadata::empty(),
                MonotonicTimeNs(u64::from(n)),
            )
            .unwrap(),
        )
        .unwrap();
    }
    s
}

fn profile(n: u32, now: u64) -> ProfileRecord {
    ProfileRecord::v1(
        user(n),
        format!("p{n}@example.com"),
        format!("p{n}"),
        ProfileRole::Parent,
        MonotonicTimeNs(now),
    )
    .unwrap()
}

#[test]
fn at_p_db_01_profile_insert_requires_identity() {
    let mut s = store_with_identities(1);
    assert!(matches!(
        s.insert_profile(profile(2, 10)),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
    s.insert_profile(profile(1, 10)).unwrap();
    assert_eq!(s.profile_rows().len(), 1);
}

#[test]
fn at_p_db_02_second_insert_is_duplicate_and_keeps_first_row() {
    let mut s = store_with_identities(1);
    s.insert_profile(profile(1, 10)).unwrap();

    let mut second = profile(1, 20);
    second.display_name = "other".to_string();
    assert!(matches!(
        s.insert_profile(second),
        Err(StorageError::DuplicateKey { table: "profiles", .. })
    ));
    let stored = s.get_profile(&user(1)).unwrap();
    assert_eq!(stored.display_name, "p1");
    assert_eq!(stored.created_at, MonotonicTimeNs(10));
}

#[test]
fn at_p_db_03_update_trims_coerces_and_advances_updated_at() {
    let mut s = store_with_identities(1);
    s.insert_profile(profile(1, 10)).unwrap();

    let update = ProfileUpdate {
        display_name: Some("  Pat  ".to_string()),
        role: Some("superuser".to_string()),
        ..ProfileUpdate::default()
    };
    // A clock reading behind the row still moves updated_at forward.
    let row = s.update_profile(&user(1), &update, MonotonicTimeNs(5)).unwrap();
    assert_eq!(row.display_name, "Pat");
    assert_eq!(row.role, ProfileRole::Parent);
    assert_eq!(row.updated_at, MonotonicTimeNs(11));

    let update = ProfileUpdate {
        role: Some("specialist".to_string()),
        is_active: Some(false),
        ..ProfileUpdate::default()
    };
    let row = s.update_profile(&user(1), &update, MonotonicTimeNs(50)).unwrap();
    assert_eq!(row.role, ProfileRole::Specialist);
    assert!(!row.is_active);
    assert_eq!(row.updated_at, MonotonicTimeNs(50));
    assert_eq!(row.created_at, MonotonicTimeNs(10));
}

#[test]
fn at_p_db_04_update_rejects_id_change_blank_name_and_missing_row() {
    let mut s = store_with_identities(2);
    s.insert_profile(profile(1, 10)).unwrap();

    let reassign = ProfileUpdate {
        profile_id: Some(user(2)),
        ..ProfileUpdate::default()
    };
    assert!(matches!(
        s.update_profile(&user(1), &reassign, MonotonicTimeNs(20)),
        Err(StorageError::ContractViolation(_))
    ));

    let blank = ProfileUpdate {
        display_name: Some("   ".to_string()),
        ..ProfileUpdate::default()
    };
    assert!(s
        .update_profile(&user(1), &blank, MonotonicTimeNs(20))
        .is_err());
    assert_eq!(s.get_profile(&user(1)).unwrap().display_name, "p1");

    assert!(matches!(
        s.update_profile(&user(2), &ProfileUpdate::default(), MonotonicTimeNs(20)),
        Err(StorageError::NotFound { .. })
    ));
}

#[test]
fn at_p_db_05_shared_handle_reports_unavailable_and_timeout() {
    let db = SharedProfileDb::new(store_with_identities(1))
        .with_call_timeout(std::time::Duration::from_millis(20));

    db.set_available(false);
    assert!(matches!(
        db.insert_profile_row(profile(1, 10)),
        Err(StorageError::Unavailable { .. })
    ));
    db.set_available(true);

    // Hold the store lock from inside one call while a second call waits it out.
    let contender = db.clone();
    let err = db
        .with_db(|_| {
            let inner = contender.profile_row(&user(1));
            Ok(inner)
        })
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, StorageError::Timeout { timeout_ms: 20, .. }));
    assert!(err.is_transient());

    db.insert_profile_row(profile(1, 10)).unwrap();
    assert!(db.profile_row(&user(1)).unwrap().is_some());
}

#[test]
fn at_p_db_06_empty_update_leaves_row_untouched() {
    let mut s = store_with_identities(1);
    s.insert_profile(profile(1, 10)).unwrap();

    let pinned = ProfileUpdate {
        profile_id: Some(user(1)),
        ..ProfileUpdate::default()
    };
    for update in [ProfileUpdate::default(), pinned] {
        let row = s
            .update_profile(&user(1), &update, MonotonicTimeNs(40))
            .unwrap();
        assert_eq!(row.updated_at, MonotonicTimeNs(10));
    }
    assert_eq!(s.get_profile(&user(1)).unwrap(), &profile(1, 10));
}
