#![forbid(unsafe_code)]

use serde::Serialize;

use crate::common::validate_id;
use crate::identity::IdentityId;
use crate::{ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate};

pub const PROVISIONING_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Catalog name of the profile derivation function.
pub const PROVISIONING_FUNCTION_NAME: &str = "handle_new_identity";
/// Name under which the provisioner subscribes to identity creation.
pub const IDENTITY_CREATED_HOOK_NAME: &str = "on_identity_created";

pub mod reason_codes {
    use crate::ReasonCodeId;

    pub const PROFILE_PROVISION_CREATED: ReasonCodeId = ReasonCodeId(0x5052_0001);
    pub const PROFILE_PROVISION_SKIPPED_NO_EMAIL: ReasonCodeId = ReasonCodeId(0x5052_0002);
    pub const PROFILE_PROVISION_DUPLICATE: ReasonCodeId = ReasonCodeId(0x5052_0003);
    pub const PROFILE_PROVISION_TRANSIENT_STORE_ERROR: ReasonCodeId = ReasonCodeId(0x5052_01F1);
    pub const PROFILE_PROVISION_PERMANENT_STORE_ERROR: ReasonCodeId = ReasonCodeId(0x5052_01F2);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningPath {
    Event,
    Backfill,
}

impl ProvisioningPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ProvisioningPath::Event => "event",
            ProvisioningPath::Backfill => "backfill",
        }
    }
}

/// Non-error results of a provisioning attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionOutcome {
    Created,
    SkippedNoEmail,
    DuplicateProfile,
}

impl ProvisionOutcome {
    pub fn reason_code(self) -> ReasonCodeId {
        match self {
            ProvisionOutcome::Created => reason_codes::PROFILE_PROVISION_CREATED,
            ProvisionOutcome::SkippedNoEmail => reason_codes::PROFILE_PROVISION_SKIPPED_NO_EMAIL,
            ProvisionOutcome::DuplicateProfile => reason_codes::PROFILE_PROVISION_DUPLICATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningAuditOutcome {
    Created,
    SkippedNoEmail,
    DuplicateProfile,
    TransientStoreError,
    PermanentStoreError,
}

impl ProvisioningAuditOutcome {
    /// Outcomes that left the profile table unchanged and repeat on every later attempt.
    pub fn is_no_change(self) -> bool {
        matches!(
            self,
            ProvisioningAuditOutcome::SkippedNoEmail | ProvisioningAuditOutcome::DuplicateProfile
        )
    }
}

impl From<ProvisionOutcome> for ProvisioningAuditOutcome {
    fn from(o: ProvisionOutcome) -> Self {
        match o {
            ProvisionOutcome::Created => ProvisioningAuditOutcome::Created,
            ProvisionOutcome::SkippedNoEmail => ProvisioningAuditOutcome::SkippedNoEmail,
            ProvisionOutcome::DuplicateProfile => ProvisioningAuditOutcome::DuplicateProfile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningAuditInput {
    pub identity_id: IdentityId,
    pub path: ProvisioningPath,
    pub outcome: ProvisioningAuditOutcome,
    pub reason_code: ReasonCodeId,
    pub recorded_at: MonotonicTimeNs,
    pub detail: Option<String>,
}

impl ProvisioningAuditInput {
    pub fn v1(
        identity_id: IdentityId,
        path: ProvisioningPath,
        outcome: ProvisioningAuditOutcome,
        reason_code: ReasonCodeId,
        recorded_at: MonotonicTimeNs,
        detail: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let i = Self {
            identity_id,
            path,
            outcome,
            reason_code,
            recorded_at,
            detail,
        };
        i.validate()?;
        Ok(i)
    }
}

impl Validate for ProvisioningAuditInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.identity_id.validate()?;
        if let Some(detail) = &self.detail {
            if detail.len() > 512 {
                return Err(ContractViolation::InvalidValue {
                    field: "provisioning_audit_input.detail",
                    reason: "must be <= 512 chars",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningAuditEvent {
    pub schema_version: SchemaVersion,
    pub audit_id: u64,
    pub attempt_id: String,
    pub identity_id: IdentityId,
    pub path: ProvisioningPath,
    pub outcome: ProvisioningAuditOutcome,
    pub reason_code: ReasonCodeId,
    pub recorded_at: MonotonicTimeNs,
    pub detail: Option<String>,
}

impl Validate for ProvisioningAuditEvent {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.audit_id == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "provisioning_audit_event.audit_id",
                reason: "must be > 0",
            });
        }
        validate_id("provisioning_audit_event.attempt_id", &self.attempt_id, 64)?;
        self.identity_id.validate()
    }
}

/// Aggregate counts from one reconciler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub scanned: u64,
    pub created: u64,
    pub duplicates: u64,
    pub skipped_no_email: u64,
    pub errors: u64,
}

impl BackfillSummary {
    pub fn created_and_errors(&self) -> (u64, u64) {
        (self.created, self.errors)
    }
}
