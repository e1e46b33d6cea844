#![forbid(unsafe_code)]

use profile_kernel_contracts::identity::IdentityId;
use profile_kernel_contracts::policy::{
    PolicyPredicate, ProfileAccessPolicy, ProfileOperation, POLICY_PROFILES_SELECT_OWN,
};
use profile_kernel_contracts::provisioning::{
    reason_codes, ProvisioningAuditInput, ProvisioningAuditOutcome, ProvisioningPath,
};
use profile_kernel_contracts::MonotonicTimeNs;
use profile_storage::audit::{attempt_id_hex, ProvisioningAuditRuntime};
use profile_storage::repo::ProvisioningCatalogRepo;
use profile_storage::{ProfileDb, SharedProfileDb};

fn user() -> IdentityId {
    IdentityId::new("dbw_c_user_1").unwrap()
}

fn audit_input(path: ProvisioningPath, at: u64) -> ProvisioningAuditInput {
    ProvisioningAuditInput::v1(
        user(),
        path,
        ProvisioningAuditOutcome::Created,
        reason_codes::PROFILE_PROVISION_CREATED,
        MonotonicTimeNs(at),
        None,
    )
    .unwrap()
}

#[test]
fn at_c_db_01_function_registration_is_visible_through_catalog_repo() {
    let db = SharedProfileDb::new_in_memory();
    assert!(!db.provisioning_function_registered("handle_new_identity").unwrap());
    db.with_db(|d| d.register_function("handle_new_identity"))
        .unwrap();
    assert!(db.provisioning_function_registered("handle_new_identity").unwrap());
    assert!(db.with_db(|d| d.register_function("  ")).is_err());
}

#[test]
fn at_c_db_02_policy_upsert_replaces_by_name_and_drop_removes() {
    let mut s = ProfileDb::new_in_memory();
    s.upsert_profile_policy(
        ProfileAccessPolicy::v1(
            POLICY_PROFILES_SELECT_OWN,
            ProfileOperation::Read,
            PolicyPredicate::OwnerOnly,
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(s.active_profile_policies_for(ProfileOperation::Read), 1);

    let mut disabled = ProfileAccessPolicy::v1(
        POLICY_PROFILES_SELECT_OWN,
        ProfileOperation::Read,
        PolicyPredicate::OwnerOnly,
    )
    .unwrap();
    disabled.enabled = false;
    s.upsert_profile_policy(disabled).unwrap();
    assert_eq!(s.profile_policy_rows().len(), 1);
    assert_eq!(s.active_profile_policies_for(ProfileOperation::Read), 0);

    assert!(s.drop_profile_policy(POLICY_PROFILES_SELECT_OWN));
    assert!(!s.drop_profile_policy(POLICY_PROFILES_SELECT_OWN));
    assert!(s.profile_policy_rows().is_empty());
}

#[test]
fn at_c_db_03_audit_ledger_is_append_only_with_deterministic_attempt_ids() {
    let db = SharedProfileDb::new_in_memory();
    let first = ProvisioningAuditRuntime::emit(&db, audit_input(ProvisioningPath::Event, 10))
        .unwrap();
    let second = ProvisioningAuditRuntime::emit(&db, audit_input(ProvisioningPath::Backfill, 11))
        .unwrap();
    assert_eq!((first, second), (1, 2));

    let rows = db
        .with_db(|d| Ok(d.provisioning_audit_rows().to_vec()))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].attempt_id,
        attempt_id_hex(&user(), ProvisioningPath::Event, MonotonicTimeNs(10), 1)
    );
    assert_eq!(rows[0].attempt_id.len(), 32);
    assert_ne!(rows[0].attempt_id, rows[1].attempt_id);
    assert_eq!(rows[1].path, ProvisioningPath::Backfill);
}

#[test]
fn at_c_db_04_oversized_audit_detail_is_rejected() {
    let err = ProvisioningAuditInput::v1(
        user(),
        ProvisioningPath::Event,
        ProvisioningAuditOutcome::TransientStoreError,
        reason_codes::PROFILE_PROVISION_TRANSIENT_STORE_ERROR,
        MonotonicTimeNs(1),
        Some("x".repeat(600)),
    );
    assert!(err.is_err());
}

#[test]
fn at_c_db_05_repeated_no_change_outcomes_reuse_first_row() {
    let mut s = ProfileDb::new_in_memory();
    let skipped = |path: ProvisioningPath, at: u64| {
        ProvisioningAuditInput::v1(
            user(),
            path,
            ProvisioningAuditOutcome::SkippedNoEmail,
            reason_codes::PROFILE_PROVISION_SKIPPED_NO_EMAIL,
            MonotonicTimeNs(at),
            None,
        )
        .unwrap()
    };

    let first = s
        .append_provisioning_audit(skipped(ProvisioningPath::Backfill, 10))
        .unwrap();
    for at in 11..50 {
        assert_eq!(
            s.append_provisioning_audit(skipped(ProvisioningPath::Backfill, at))
                .unwrap(),
            first
        );
    }
    let event_row = s
        .append_provisioning_audit(skipped(ProvisioningPath::Event, 60))
        .unwrap();
    assert_ne!(event_row, first);
    assert_eq!(s.provisioning_audit_rows().len(), 2);
    assert_eq!(
        s.provisioning_audit_rows()[0].recorded_at,
        MonotonicTimeNs(10)
    );

    // Created rows are always appended.
    s.append_provisioning_audit(audit_input(ProvisioningPath::Backfill, 70))
        .unwrap();
    s.append_provisioning_audit(audit_input(ProvisioningPath::Backfill, 71))
        .unwrap();
    assert_eq!(s.provisioning_audit_rows().len(), 4);
}
