#![forbid(unsafe_code)]

use profile_kernel_contracts::health::{HealthCheckName, HealthStatus};
use profile_kernel_contracts::identity::{IdentityId, IdentityMetadata, IdentityRecord};
use profile_kernel_contracts::policy::ActingIdentity;
use profile_kernel_contracts::profile::{ProfileRole, ProfileUpdate};
use profile_kernel_contracts::provisioning::ProvisionOutcome;
use profile_kernel_contracts::MonotonicTimeNs;
use profile_os::access_gateway::GatewayError;
use profile_os::{
    install_profile_provisioning, ProfileProvisioningWiring, ProvisioningWiringConfig,
};
use profile_storage::repo::ProfileStoreRepo;
use profile_storage::SharedProfileDb;

fn identity(user: &str, email: Option<&str>, created_at: u64) -> IdentityRecord {
    IdentityRecord::v1(
        IdentityId::new(user).unwrap(),
        email.map(str::to_string),
        IdentityMetadata::from_json_object_str(r#"{"name":"Sam","role":"teacher","age":9}"#),
        MonotonicTimeNs(created_at),
    )
    .unwrap()
}

fn wired(page_size: usize) -> ProfileProvisioningWiring {
    let mut config = ProvisioningWiringConfig::mvp_v1();
    config.backfill_page_size = page_size;
    install_profile_provisioning(SharedProfileDb::new_in_memory(), config).unwrap()
}

#[test]
fn at_drift_01_backfill_converges_after_event_path_outage() {
    let wiring = wired(7);
    wiring.uninstall_creation_hook().unwrap();
    for n in 0..40u64 {
        let email = format!("u{n}@example.com");
        wiring
            .db()
            .create_identity(identity(&format!("user_{n:02}"), Some(&email), n + 1))
            .unwrap();
    }
    wiring
        .db()
        .create_identity(identity("user_no_email", None, 100))
        .unwrap();

    let before = wiring.verifier().report(MonotonicTimeNs(200));
    assert_eq!(before.orphaned_identities, Some(41));
    assert_eq!(before.overall_status(), HealthStatus::Warning);

    let first = wiring
        .reconciler()
        .backfill_missing_profiles(MonotonicTimeNs(201))
        .unwrap();
    assert_eq!(first.created_and_errors(), (40, 0));
    assert_eq!(first.skipped_no_email, 1);
    assert_eq!(first.scanned, 41);

    let second = wiring
        .reconciler()
        .backfill_missing_profiles(MonotonicTimeNs(202))
        .unwrap();
    assert_eq!(second.created_and_errors(), (0, 0));

    wiring.install_creation_hook().unwrap();
    let after = wiring.verifier().report(MonotonicTimeNs(203));
    let drift = after.check(HealthCheckName::OrphanedIdentities).unwrap();
    assert_eq!(drift.status, HealthStatus::Ok);
    // The no-email identity stays deferred and counted.
    assert_eq!(after.orphaned_identities, Some(1));
    assert_eq!(after.overall_status(), HealthStatus::Ok);

    let row = wiring
        .db()
        .profile_row(&IdentityId::new("user_07").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(row.display_name, "Sam");
    assert_eq!(row.role, ProfileRole::Teacher);
}

#[test]
fn at_drift_02_redelivery_after_backfill_is_a_duplicate() {
    let wiring = wired(10);
    wiring.uninstall_creation_hook().unwrap();
    let record = identity("user_late", Some("late@example.com"), 1);
    wiring.db().create_identity(record.clone()).unwrap();

    wiring
        .reconciler()
        .backfill_missing_profiles(MonotonicTimeNs(5))
        .unwrap();
    let outcome = wiring
        .provisioner()
        .on_identity_created(&record, MonotonicTimeNs(6))
        .unwrap();
    assert_eq!(outcome, ProvisionOutcome::DuplicateProfile);
}

#[test]
fn at_drift_03_owner_can_edit_but_not_reassign_provisioned_profile() {
    let wiring = wired(10);
    wiring
        .db()
        .create_identity(identity("user_owner", Some("owner@example.com"), 1))
        .unwrap();
    let owner_id = IdentityId::new("user_owner").unwrap();
    let owner = ActingIdentity::authenticated(owner_id.clone());
    let stranger = ActingIdentity::authenticated(IdentityId::new("user_other").unwrap());
    let gateway = wiring.gateway();

    assert!(gateway.read_profile(&owner, &owner_id).is_ok());
    assert!(matches!(
        gateway.read_profile(&stranger, &owner_id),
        Err(GatewayError::Denied { .. })
    ));

    let rename = ProfileUpdate {
        display_name: Some("Samuel".to_string()),
        ..ProfileUpdate::default()
    };
    let updated = gateway
        .update_profile(&owner, &owner_id, &rename, MonotonicTimeNs::from_system_clock())
        .unwrap();
    assert_eq!(updated.display_name, "Samuel");
    assert!(updated.updated_at > updated.created_at);

    let reassign = ProfileUpdate {
        profile_id: Some(IdentityId::new("user_other").unwrap()),
        ..ProfileUpdate::default()
    };
    let now = MonotonicTimeNs::from_system_clock();
    assert!(matches!(
        gateway.update_profile(&owner, &owner_id, &reassign, now),
        Err(GatewayError::Denied { .. })
    ));
}

#[test]
fn at_drift_04_health_report_renders_as_json() {
    let wiring = wired(10);
    let report = wiring.verifier().report(MonotonicTimeNs(9));
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["orphaned_identities"], 0);
    assert_eq!(json["checks"].as_array().unwrap().len(), 4);
    assert_eq!(json["checks"][0]["status"], "ok");
}
