#![forbid(unsafe_code)]

use profile_kernel_contracts::identity::{IdentityId, IdentityRecord};
use profile_kernel_contracts::policy::ProfileAccessPolicy;
use profile_kernel_contracts::profile::{ProfileRecord, ProfileUpdate};
use profile_kernel_contracts::provisioning::ProvisioningAuditInput;
use profile_kernel_contracts::MonotonicTimeNs;

use crate::profile_db::{IdentityCursor, OrphanCount, StorageError};
use crate::shared::{SharedProfileDb, IDENTITY_STORE, PROFILE_STORE};

/// Read-only view over externally managed identities.
pub trait IdentityStoreRepo {
    fn identity_row(&self, identity_id: &IdentityId)
        -> Result<Option<IdentityRecord>, StorageError>;

    /// Anti-join page: identities lacking a profile, ordered by `(created_at, identity_id)`.
    fn identities_without_profile_rows(
        &self,
        after: Option<&IdentityCursor>,
        limit: usize,
    ) -> Result<Vec<IdentityRecord>, StorageError>;

    fn orphaned_identity_count(&self) -> Result<OrphanCount, StorageError>;
}

/// Profile table access. `insert_profile_row` must detect id conflicts atomically.
pub trait ProfileStoreRepo {
    fn insert_profile_row(&self, record: ProfileRecord) -> Result<(), StorageError>;
    fn profile_row(&self, profile_id: &IdentityId) -> Result<Option<ProfileRecord>, StorageError>;
    fn update_profile_row(
        &self,
        profile_id: &IdentityId,
        update: &ProfileUpdate,
        now: MonotonicTimeNs,
    ) -> Result<ProfileRecord, StorageError>;
}

/// Catalog facts the verifier and the policy enforcer read.
pub trait ProvisioningCatalogRepo {
    fn identity_created_hook_installed(&self, hook_name: &str) -> Result<bool, StorageError>;
    fn provisioning_function_registered(&self, function_name: &str)
        -> Result<bool, StorageError>;
    fn profile_policy_rows(&self) -> Result<Vec<ProfileAccessPolicy>, StorageError>;
}

pub trait ProvisioningAuditRepo {
    fn append_provisioning_audit_row(
        &self,
        input: ProvisioningAuditInput,
    ) -> Result<u64, StorageError>;
}

impl IdentityStoreRepo for SharedProfileDb {
    fn identity_row(
        &self,
        identity_id: &IdentityId,
    ) -> Result<Option<IdentityRecord>, StorageError> {
        self.locked(IDENTITY_STORE, |db| Ok(db.get_identity(identity_id).cloned()))
    }

    fn identities_without_profile_rows(
        &self,
        after: Option<&IdentityCursor>,
        limit: usize,
    ) -> Result<Vec<IdentityRecord>, StorageError> {
        self.locked(IDENTITY_STORE, |db| {
            Ok(db.identities_without_profile(after, limit))
        })
    }

    fn orphaned_identity_count(&self) -> Result<OrphanCount, StorageError> {
        self.locked(IDENTITY_STORE, |db| Ok(db.count_identities_without_profile()))
    }
}

impl ProfileStoreRepo for SharedProfileDb {
    fn insert_profile_row(&self, record: ProfileRecord) -> Result<(), StorageError> {
        self.locked(PROFILE_STORE, |db| db.insert_profile(record))
    }

    fn profile_row(&self, profile_id: &IdentityId) -> Result<Option<ProfileRecord>, StorageError> {
        self.locked(PROFILE_STORE, |db| Ok(db.get_profile(profile_id).cloned()))
    }

    fn update_profile_row(
        &self,
        profile_id: &IdentityId,
        update: &ProfileUpdate,
        now: MonotonicTimeNs,
    ) -> Result<ProfileRecord, StorageError> {
        self.locked(PROFILE_STORE, |db| db.update_profile(profile_id, update, now))
    }
}

impl ProvisioningCatalogRepo for SharedProfileDb {
    fn identity_created_hook_installed(&self, hook_name: &str) -> Result<bool, StorageError> {
        self.has_identity_created_hook(hook_name)
    }

    fn provisioning_function_registered(
        &self,
        function_name: &str,
    ) -> Result<bool, StorageError> {
        self.locked(PROFILE_STORE, |db| Ok(db.has_function(function_name)))
    }

    fn profile_policy_rows(&self) -> Result<Vec<ProfileAccessPolicy>, StorageError> {
        self.locked(PROFILE_STORE, |db| Ok(db.profile_policy_rows().to_vec()))
    }
}

impl ProvisioningAuditRepo for SharedProfileDb {
    fn append_provisioning_audit_row(
        &self,
        input: ProvisioningAuditInput,
    ) -> Result<u64, StorageError> {
        self.locked(PROFILE_STORE, |db| db.append_provisioning_audit(input))
    }
}
