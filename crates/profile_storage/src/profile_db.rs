#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use profile_kernel_contracts::identity::{IdentityId, IdentityRecord};
use profile_kernel_contracts::policy::{ProfileAccessPolicy, ProfileOperation};
use profile_kernel_contracts::profile::{ProfileRecord, ProfileRole, ProfileUpdate};
use profile_kernel_contracts::provisioning::{
    ProvisioningAuditEvent, ProvisioningAuditInput, ProvisioningAuditOutcome, ProvisioningPath,
    PROVISIONING_CONTRACT_VERSION,
};
use profile_kernel_contracts::{ContractViolation, MonotonicTimeNs, Validate};

use crate::audit::attempt_id_hex;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("foreign key violation on {table}: {key}")]
    ForeignKeyViolation { table: &'static str, key: String },
    #[error("duplicate key on {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("row not found in {table}: {key}")]
    NotFound { table: &'static str, key: String },
    #[error("{store} store unavailable")]
    Unavailable { store: &'static str },
    #[error("{store} store call timed out after {timeout_ms}ms")]
    Timeout { store: &'static str, timeout_ms: u64 },
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

impl StorageError {
    /// Unavailable and timed-out calls may succeed on a later attempt; everything else will not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable { .. } | StorageError::Timeout { .. }
        )
    }
}

/// Restart point for the identities-without-profile scan: strictly after this key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IdentityCursor {
    pub created_at: MonotonicTimeNs,
    pub identity_id: IdentityId,
}

impl IdentityCursor {
    pub fn after(record: &IdentityRecord) -> Self {
        Self {
            created_at: record.created_at,
            identity_id: record.identity_id.clone(),
        }
    }
}

/// Drift counters: identities with no profile, and how many of those carry a usable email.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanCount {
    pub total: u64,
    pub with_email: u64,
}

#[derive(Debug, Clone)]
pub struct ProfileDb {
    identities: BTreeMap<IdentityId, IdentityRecord>,
    // Oldest-first scan order for backfill: (created_at, identity_id).
    identities_by_created: BTreeSet<(MonotonicTimeNs, IdentityId)>,

    profiles: BTreeMap<IdentityId, ProfileRecord>,

    // Catalog: registered derivation functions and row policies on `profiles`.
    functions: BTreeSet<String>,
    profile_policies: Vec<ProfileAccessPolicy>,

    provisioning_audit: Vec<ProvisioningAuditEvent>,
    // First row for each no-change outcome; repeats resolve to it instead of appending.
    provisioning_audit_idempotency_index:
        BTreeMap<(IdentityId, ProvisioningPath, ProvisioningAuditOutcome), u64>,
    next_audit_id: u64,
}

impl Default for ProfileDb {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl ProfileDb {
    pub fn new_in_memory() -> Self {
        Self {
            identities: BTreeMap::new(),
            identities_by_created: BTreeSet::new(),
            profiles: BTreeMap::new(),
            functions: BTreeSet::new(),
            profile_policies: Vec::new(),
            provisioning_audit: Vec::new(),
            provisioning_audit_idempotency_index: BTreeMap::new(),
            next_audit_id: 1,
        }
    }

    pub fn insert_identity(&mut self, record: IdentityRecord) -> Result<(), StorageError> {
        record.validate()?;
        if self.identities.contains_key(&record.identity_id) {
            return Err(StorageError::DuplicateKey {
                table: "identities",
                key: record.identity_id.as_str().to_string(),
            });
        }
        self.identities_by_created
            .insert((record.created_at, record.identity_id.clone()));
        self.identities.insert(record.identity_id.clone(), record);
        Ok(())
    }

    pub fn get_identity(&self, identity_id: &IdentityId) -> Option<&IdentityRecord> {
        self.identities.get(identity_id)
    }

    /// Insert-or-detect-conflict. The existence check and the write happen under the same
    /// `&mut self` borrow, so callers holding the store lock see one atomic step.
    pub fn insert_profile(&mut self, record: ProfileRecord) -> Result<(), StorageError> {
        record.validate()?;
        if !self.identities.contains_key(&record.profile_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "profiles.id",
                key: record.profile_id.as_str().to_string(),
            });
        }
        if self.profiles.contains_key(&record.profile_id) {
            return Err(StorageError::DuplicateKey {
                table: "profiles",
                key: record.profile_id.as_str().to_string(),
            });
        }
        self.profiles.insert(record.profile_id.clone(), record);
        Ok(())
    }

    pub fn get_profile(&self, profile_id: &IdentityId) -> Option<&ProfileRecord> {
        self.profiles.get(profile_id)
    }

    pub fn profile_rows(&self) -> &BTreeMap<IdentityId, ProfileRecord> {
        &self.profiles
    }

    pub fn update_profile(
        &mut self,
        profile_id: &IdentityId,
        update: &ProfileUpdate,
        now: MonotonicTimeNs,
    ) -> Result<ProfileRecord, StorageError> {
        update.validate()?;
        if !update.keeps_profile_id(profile_id) {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "profile_update.profile_id",
                    reason: "profile id is immutable",
                },
            ));
        }
        let Some(current) = self.profiles.get(profile_id) else {
            return Err(StorageError::NotFound {
                table: "profiles",
                key: profile_id.as_str().to_string(),
            });
        };

        if update.is_noop() {
            return Ok(current.clone());
        }

        let mut next = current.clone();
        if let Some(name) = &update.display_name {
            next.display_name = name.trim().to_string();
        }
        if let Some(role) = &update.role {
            next.role = ProfileRole::coerce(Some(role));
        }
        if let Some(active) = update.is_active {
            next.is_active = active;
        }
        next.updated_at = MonotonicTimeNs(now.0.max(current.updated_at.0.saturating_add(1)));
        next.validate()?;

        self.profiles.insert(profile_id.clone(), next.clone());
        Ok(next)
    }

    /// Identities with no profile, oldest first, strictly after `after`, at most `limit` rows.
    pub fn identities_without_profile(
        &self,
        after: Option<&IdentityCursor>,
        limit: usize,
    ) -> Vec<IdentityRecord> {
        self.identities_by_created
            .iter()
            .filter(|(created_at, id)| match after {
                Some(c) => (*created_at, id) > (c.created_at, &c.identity_id),
                None => true,
            })
            .filter(|(_, id)| !self.profiles.contains_key(id))
            .filter_map(|(_, id)| self.identities.get(id).cloned())
            .take(limit)
            .collect()
    }

    pub fn count_identities_without_profile(&self) -> OrphanCount {
        self.identities
            .values()
            .filter(|r| !self.profiles.contains_key(&r.identity_id))
            .fold(OrphanCount::default(), |mut acc, r| {
                acc.total += 1;
                if r.contactable_email().is_some() {
                    acc.with_email += 1;
                }
                acc
            })
    }

    pub fn register_function(&mut self, name: &str) -> Result<(), StorageError> {
        if name.trim().is_empty() {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "functions.name",
                    reason: "must not be empty",
                },
            ));
        }
        self.functions.insert(name.to_string());
        Ok(())
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    /// Replaces any existing policy with the same name.
    pub fn upsert_profile_policy(
        &mut self,
        policy: ProfileAccessPolicy,
    ) -> Result<(), StorageError> {
        policy.validate()?;
        match self
            .profile_policies
            .iter_mut()
            .find(|p| p.policy_name == policy.policy_name)
        {
            Some(existing) => *existing = policy,
            None => self.profile_policies.push(policy),
        }
        Ok(())
    }

    pub fn drop_profile_policy(&mut self, policy_name: &str) -> bool {
        let before = self.profile_policies.len();
        self.profile_policies.retain(|p| p.policy_name != policy_name);
        before != self.profile_policies.len()
    }

    pub fn profile_policy_rows(&self) -> &[ProfileAccessPolicy] {
        &self.profile_policies
    }

    pub fn active_profile_policies_for(&self, operation: ProfileOperation) -> usize {
        self.profile_policies
            .iter()
            .filter(|p| p.enabled && p.operation == operation)
            .count()
    }

    /// Appends one ledger row and returns its id. A repeated no-change outcome for the same
    /// identity and path returns the id of the row first recorded for it.
    pub fn append_provisioning_audit(
        &mut self,
        input: ProvisioningAuditInput,
    ) -> Result<u64, StorageError> {
        input.validate()?;
        let idempotency_key = input
            .outcome
            .is_no_change()
            .then(|| (input.identity_id.clone(), input.path, input.outcome));
        if let Some(existing) = idempotency_key
            .as_ref()
            .and_then(|k| self.provisioning_audit_idempotency_index.get(k))
        {
            return Ok(*existing);
        }
        let audit_id = self.next_audit_id;
        let attempt_id = attempt_id_hex(
            &input.identity_id,
            input.path,
            input.recorded_at,
            audit_id,
        );
        let row = ProvisioningAuditEvent {
            schema_version: PROVISIONING_CONTRACT_VERSION,
            audit_id,
            attempt_id,
            identity_id: input.identity_id,
            path: input.path,
            outcome: input.outcome,
            reason_code: input.reason_code,
            recorded_at: input.recorded_at,
            detail: input.detail,
        };
        row.validate()?;
        self.provisioning_audit.push(row);
        if let Some(key) = idempotency_key {
            self.provisioning_audit_idempotency_index.insert(key, audit_id);
        }
        self.next_audit_id += 1;
        Ok(audit_id)
    }

    pub fn provisioning_audit_rows(&self) -> &[ProvisioningAuditEvent] {
        &self.provisioning_audit
    }

    pub fn provisioning_audit_rows_for(
        &self,
        identity_id: &IdentityId,
    ) -> Vec<&ProvisioningAuditEvent> {
        self.provisioning_audit
            .iter()
            .filter(|r| &r.identity_id == identity_id)
            .collect()
    }
}
