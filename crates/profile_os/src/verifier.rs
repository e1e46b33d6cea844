#![forbid(unsafe_code)]

use profile_kernel_contracts::health::{HealthCheck, HealthCheckName, HealthReport, HealthStatus};
use profile_kernel_contracts::policy::ProfileOperation;
use profile_kernel_contracts::provisioning::{
    IDENTITY_CREATED_HOOK_NAME, PROVISIONING_FUNCTION_NAME,
};
use profile_kernel_contracts::MonotonicTimeNs;
use profile_storage::repo::{IdentityStoreRepo, ProvisioningCatalogRepo};

const MAX_CHECK_DETAIL_BYTES: usize = 512;

const REQUIRED_POLICY_OPERATIONS: [ProfileOperation; 3] = [
    ProfileOperation::Create,
    ProfileOperation::Read,
    ProfileOperation::Update,
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerifyError {
    #[error("no provisioning health check could be computed; stores unavailable")]
    StoresUnavailable(HealthReport),
}

/// Read-only health report over the provisioning path. Each check is computed independently;
/// a check whose store call fails reports `Unknown` and the rest still run.
#[derive(Debug, Clone)]
pub struct ProvisioningVerifier<S> {
    store: S,
}

impl<S> ProvisioningVerifier<S>
where
    S: IdentityStoreRepo + ProvisioningCatalogRepo,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn report(&self, now: MonotonicTimeNs) -> HealthReport {
        let (orphan_check, orphaned_identities) = self.check_orphaned_identities();
        HealthReport {
            generated_at: now,
            checks: vec![
                self.check_creation_hook(),
                self.check_provisioning_function(),
                self.check_policies(),
                orphan_check,
            ],
            orphaned_identities,
        }
    }

    /// Like [`Self::report`], but every check being `Unknown` is surfaced as an error.
    pub fn try_report(&self, now: MonotonicTimeNs) -> Result<HealthReport, VerifyError> {
        let report = self.report(now);
        if report
            .checks
            .iter()
            .all(|c| c.status == HealthStatus::Unknown)
        {
            return Err(VerifyError::StoresUnavailable(report));
        }
        Ok(report)
    }

    fn check_creation_hook(&self) -> HealthCheck {
        let name = HealthCheckName::IdentityCreatedHook;
        match self
            .store
            .identity_created_hook_installed(IDENTITY_CREATED_HOOK_NAME)
        {
            Ok(true) => check(
                name,
                HealthStatus::Ok,
                format!("hook {IDENTITY_CREATED_HOOK_NAME} is installed"),
            ),
            Ok(false) => check(
                name,
                HealthStatus::Warning,
                format!(
                    "hook {IDENTITY_CREATED_HOOK_NAME} is missing; new identities are only \
                     provisioned by backfill"
                ),
            ),
            Err(e) => unknown(name, &e),
        }
    }

    fn check_provisioning_function(&self) -> HealthCheck {
        let name = HealthCheckName::ProvisioningFunction;
        match self
            .store
            .provisioning_function_registered(PROVISIONING_FUNCTION_NAME)
        {
            Ok(true) => check(
                name,
                HealthStatus::Ok,
                format!("function {PROVISIONING_FUNCTION_NAME} is registered"),
            ),
            Ok(false) => check(
                name,
                HealthStatus::Warning,
                format!("function {PROVISIONING_FUNCTION_NAME} is not registered"),
            ),
            Err(e) => unknown(name, &e),
        }
    }

    fn check_policies(&self) -> HealthCheck {
        let name = HealthCheckName::ProfileAccessPolicies;
        let policies = match self.store.profile_policy_rows() {
            Ok(p) => p,
            Err(e) => return unknown(name, &e),
        };
        let active: Vec<_> = policies.iter().filter(|p| p.enabled).collect();
        let missing: Vec<&str> = REQUIRED_POLICY_OPERATIONS
            .iter()
            .filter(|op| !active.iter().any(|p| p.operation == **op))
            .map(|op| operation_name(*op))
            .collect();
        if missing.is_empty() {
            check(
                name,
                HealthStatus::Ok,
                format!("{} active policies on profiles", active.len()),
            )
        } else {
            check(
                name,
                HealthStatus::Warning,
                format!(
                    "{} active policies on profiles; no policy for: {}",
                    active.len(),
                    missing.join(", ")
                ),
            )
        }
    }

    fn check_orphaned_identities(&self) -> (HealthCheck, Option<u64>) {
        let name = HealthCheckName::OrphanedIdentities;
        let counts = match self.store.orphaned_identity_count() {
            Ok(c) => c,
            Err(e) => return (unknown(name, &e), None),
        };
        let deferred = counts.total - counts.with_email;
        let status = if counts.with_email == 0 {
            HealthStatus::Ok
        } else {
            HealthStatus::Warning
        };
        let detail = format!(
            "{} identities without profile ({} awaiting backfill, {} deferred without email)",
            counts.total, counts.with_email, deferred
        );
        (check(name, status, detail), Some(counts.total))
    }
}

fn operation_name(op: ProfileOperation) -> &'static str {
    match op {
        ProfileOperation::Create => "create",
        ProfileOperation::Read => "read",
        ProfileOperation::Update => "update",
    }
}

fn check(name: HealthCheckName, status: HealthStatus, mut detail: String) -> HealthCheck {
    if detail.len() > MAX_CHECK_DETAIL_BYTES {
        let mut end = MAX_CHECK_DETAIL_BYTES;
        while !detail.is_char_boundary(end) {
            end -= 1;
        }
        detail.truncate(end);
    }
    HealthCheck::v1(name, status, detail).unwrap_or_else(|violation| HealthCheck {
        check_name: name,
        status: HealthStatus::Unknown,
        detail: format!("check detail rejected: {violation}"),
    })
}

fn unknown(name: HealthCheckName, error: &dyn std::fmt::Display) -> HealthCheck {
    tracing::warn!(check = ?name, error = %error, "health check could not be computed");
    check(
        name,
        HealthStatus::Unknown,
        format!("could not be computed: {error}"),
    )
}
