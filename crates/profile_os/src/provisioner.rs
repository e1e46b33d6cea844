#![forbid(unsafe_code)]

use profile_kernel_contracts::identity::{IdentityId, IdentityRecord};
use profile_kernel_contracts::provisioning::{
    reason_codes, ProvisionOutcome, ProvisioningAuditInput, ProvisioningAuditOutcome,
    ProvisioningPath,
};
use profile_kernel_contracts::{MonotonicTimeNs, ReasonCodeId};
use profile_storage::audit::ProvisioningAuditRuntime;
use profile_storage::repo::{ProfileStoreRepo, ProvisioningAuditRepo};
use profile_storage::StorageError;

use crate::derivation::{derive_profile, ProfileDerivation};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProvisionError {
    /// Store unavailable or timed out. The identity stays eligible for the next backfill pass.
    #[error("transient store error provisioning {identity_id}: {source}")]
    TransientStore {
        identity_id: IdentityId,
        source: StorageError,
    },
    /// Row rejected by store constraints.
    #[error("permanent store error provisioning {identity_id}: {source}")]
    PermanentStore {
        identity_id: IdentityId,
        source: StorageError,
    },
}

impl ProvisionError {
    fn classify(identity_id: &IdentityId, source: StorageError) -> Self {
        let identity_id = identity_id.clone();
        if source.is_transient() {
            ProvisionError::TransientStore {
                identity_id,
                source,
            }
        } else {
            ProvisionError::PermanentStore {
                identity_id,
                source,
            }
        }
    }

    pub fn identity_id(&self) -> &IdentityId {
        match self {
            ProvisionError::TransientStore { identity_id, .. }
            | ProvisionError::PermanentStore { identity_id, .. } => identity_id,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProvisionError::TransientStore { .. })
    }

    fn audit_outcome(&self) -> (ProvisioningAuditOutcome, ReasonCodeId) {
        match self {
            ProvisionError::TransientStore { .. } => (
                ProvisioningAuditOutcome::TransientStoreError,
                reason_codes::PROFILE_PROVISION_TRANSIENT_STORE_ERROR,
            ),
            ProvisionError::PermanentStore { .. } => (
                ProvisioningAuditOutcome::PermanentStoreError,
                reason_codes::PROFILE_PROVISION_PERMANENT_STORE_ERROR,
            ),
        }
    }
}

/// Event-path provisioner. Holds no state besides the store handle, so redelivery is safe.
#[derive(Debug, Clone)]
pub struct ProfileProvisioner<S> {
    store: S,
}

impl<S> ProfileProvisioner<S>
where
    S: ProfileStoreRepo + ProvisioningAuditRepo,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Reacts to one identity-creation delivery.
    ///
    /// `Ok(DuplicateProfile)` on redelivery or when a backfill pass got there first.
    pub fn on_identity_created(
        &self,
        identity: &IdentityRecord,
        now: MonotonicTimeNs,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        provision_identity(&self.store, identity, ProvisioningPath::Event, now)
    }
}

/// Shared by the event and backfill paths. Writes directly to the store, bypassing the access
/// enforcer; these two paths are the only callers.
pub(crate) fn provision_identity<S>(
    store: &S,
    identity: &IdentityRecord,
    path: ProvisioningPath,
    now: MonotonicTimeNs,
) -> Result<ProvisionOutcome, ProvisionError>
where
    S: ProfileStoreRepo + ProvisioningAuditRepo + ?Sized,
{
    let identity_id = &identity.identity_id;
    let result = match derive_profile(identity, now) {
        Ok(ProfileDerivation::NoEmail) => Ok(ProvisionOutcome::SkippedNoEmail),
        Ok(ProfileDerivation::Ready(record)) => match store.insert_profile_row(record) {
            Ok(()) => Ok(ProvisionOutcome::Created),
            Err(StorageError::DuplicateKey { .. }) => Ok(ProvisionOutcome::DuplicateProfile),
            Err(e) => Err(ProvisionError::classify(identity_id, e)),
        },
        Err(violation) => Err(ProvisionError::PermanentStore {
            identity_id: identity_id.clone(),
            source: StorageError::ContractViolation(violation),
        }),
    };

    let (outcome, reason_code, detail) = match &result {
        Ok(outcome) => {
            match outcome {
                ProvisionOutcome::Created => tracing::info!(
                    identity_id = %identity_id,
                    path = path.as_str(),
                    "profile provisioned"
                ),
                ProvisionOutcome::DuplicateProfile => tracing::info!(
                    identity_id = %identity_id,
                    path = path.as_str(),
                    "profile already exists; provisioning is a no-op"
                ),
                ProvisionOutcome::SkippedNoEmail => tracing::info!(
                    identity_id = %identity_id,
                    path = path.as_str(),
                    "identity has no email; provisioning deferred"
                ),
            }
            ((*outcome).into(), outcome.reason_code(), None)
        }
        Err(e) => {
            tracing::warn!(
                identity_id = %identity_id,
                path = path.as_str(),
                transient = e.is_transient(),
                error = %e,
                "profile provisioning failed"
            );
            let (outcome, reason_code) = e.audit_outcome();
            (outcome, reason_code, Some(e.to_string()))
        }
    };
    record_attempt(store, identity_id, path, outcome, reason_code, now, detail);
    result
}

fn record_attempt<S>(
    store: &S,
    identity_id: &IdentityId,
    path: ProvisioningPath,
    outcome: ProvisioningAuditOutcome,
    reason_code: ReasonCodeId,
    now: MonotonicTimeNs,
    detail: Option<String>,
) where
    S: ProvisioningAuditRepo + ?Sized,
{
    let detail = detail.map(|mut d| {
        if d.len() > 512 {
            let mut end = 512;
            while !d.is_char_boundary(end) {
                end -= 1;
            }
            d.truncate(end);
        }
        d
    });
    let input = match ProvisioningAuditInput::v1(
        identity_id.clone(),
        path,
        outcome,
        reason_code,
        now,
        detail,
    ) {
        Ok(input) => input,
        Err(violation) => {
            tracing::warn!(identity_id = %identity_id, error = %violation, "audit input rejected");
            return;
        }
    };
    if let Err(e) = ProvisioningAuditRuntime::emit(store, input) {
        tracing::warn!(
            identity_id = %identity_id,
            error = %e,
            "provisioning audit append failed"
        );
    }
}
