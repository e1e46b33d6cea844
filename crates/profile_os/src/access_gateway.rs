#![forbid(unsafe_code)]

use profile_kernel_contracts::identity::IdentityId;
use profile_kernel_contracts::policy::{AccessGateDecision, ActingIdentity, ProfileOperation};
use profile_kernel_contracts::profile::{ProfileRecord, ProfileUpdate};
use profile_kernel_contracts::{MonotonicTimeNs, ReasonCodeId};
use profile_storage::repo::{ProfileStoreRepo, ProvisioningCatalogRepo};
use profile_storage::StorageError;

use crate::access_policy::{ProfileAccessEnforcer, ProfileAccessTarget};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("{operation:?} on profile {profile_id} denied (reason {reason_code:?})")]
    Denied {
        operation: ProfileOperation,
        profile_id: IdentityId,
        reason_code: ReasonCodeId,
    },
    #[error("profile {0} not found")]
    NotFound(IdentityId),
    #[error(transparent)]
    Store(#[from] StorageError),
}

/// Entry point for every externally triggered profile operation.
///
/// Each call loads the live policy set from the catalog and asks the enforcer before touching
/// the store. Provisioning paths never come through here.
#[derive(Debug, Clone)]
pub struct ProfileAccessGateway<S> {
    store: S,
}

impl<S> ProfileAccessGateway<S>
where
    S: ProfileStoreRepo + ProvisioningCatalogRepo,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Permitted for any authenticated caller; a second row for the same identity is refused by
    /// the store with `DuplicateKey`.
    pub fn create_profile(
        &self,
        actor: &ActingIdentity,
        draft: ProfileRecord,
    ) -> Result<ProfileRecord, GatewayError> {
        self.authorize(
            actor,
            ProfileOperation::Create,
            ProfileAccessTarget::row(&draft.profile_id),
        )?;
        self.store.insert_profile_row(draft.clone())?;
        Ok(draft)
    }

    /// Authorization is decided before the lookup, so a denied caller learns nothing about
    /// whether the row exists.
    pub fn read_profile(
        &self,
        actor: &ActingIdentity,
        profile_id: &IdentityId,
    ) -> Result<ProfileRecord, GatewayError> {
        self.authorize(
            actor,
            ProfileOperation::Read,
            ProfileAccessTarget::row(profile_id),
        )?;
        self.store
            .profile_row(profile_id)?
            .ok_or_else(|| GatewayError::NotFound(profile_id.clone()))
    }

    pub fn update_profile(
        &self,
        actor: &ActingIdentity,
        profile_id: &IdentityId,
        update: &ProfileUpdate,
        now: MonotonicTimeNs,
    ) -> Result<ProfileRecord, GatewayError> {
        let written = update.profile_id.as_ref().unwrap_or(profile_id);
        self.authorize(
            actor,
            ProfileOperation::Update,
            ProfileAccessTarget::write(profile_id, written),
        )?;
        match self.store.update_profile_row(profile_id, update, now) {
            Ok(row) => Ok(row),
            Err(StorageError::NotFound { .. }) => Err(GatewayError::NotFound(profile_id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn authorize(
        &self,
        actor: &ActingIdentity,
        operation: ProfileOperation,
        target: ProfileAccessTarget<'_>,
    ) -> Result<AccessGateDecision, GatewayError> {
        let enforcer = ProfileAccessEnforcer::new(self.store.profile_policy_rows()?);
        let decision = enforcer.evaluate(actor, operation, target);
        if decision.is_allow() {
            return Ok(decision);
        }
        tracing::info!(
            actor = actor.identity_id().map(IdentityId::as_str).unwrap_or("anonymous"),
            profile_id = %target.profile_id,
            operation = ?operation,
            reason_code = decision.reason_code.0,
            "profile access denied"
        );
        Err(GatewayError::Denied {
            operation,
            profile_id: target.profile_id.clone(),
            reason_code: decision.reason_code,
        })
    }
}
