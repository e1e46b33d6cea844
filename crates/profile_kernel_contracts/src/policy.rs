#![forbid(unsafe_code)]

use serde::Serialize;

use crate::common::validate_text;
use crate::identity::IdentityId;
use crate::{ContractViolation, ReasonCodeId, SchemaVersion, Validate};

pub const PROFILE_POLICY_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const POLICY_PROFILES_INSERT_AUTHENTICATED: &str = "profiles_insert_authenticated";
pub const POLICY_PROFILES_SELECT_OWN: &str = "profiles_select_own";
pub const POLICY_PROFILES_UPDATE_OWN: &str = "profiles_update_own";

pub mod reason_codes {
    use crate::ReasonCodeId;

    pub const PROFILE_ACCESS_ALLOW_AUTHENTICATED_CREATE: ReasonCodeId = ReasonCodeId(0x5041_0001);
    pub const PROFILE_ACCESS_ALLOW_OWNER: ReasonCodeId = ReasonCodeId(0x5041_0002);
    pub const PROFILE_ACCESS_DENY_UNAUTHENTICATED: ReasonCodeId = ReasonCodeId(0x5041_0101);
    pub const PROFILE_ACCESS_DENY_NOT_OWNER: ReasonCodeId = ReasonCodeId(0x5041_0102);
    pub const PROFILE_ACCESS_DENY_ID_REASSIGNMENT: ReasonCodeId = ReasonCodeId(0x5041_0103);
    pub const PROFILE_ACCESS_DENY_NO_POLICY: ReasonCodeId = ReasonCodeId(0x5041_01F1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileOperation {
    Create,
    Read,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessDecision {
    Allow,
    Deny,
}

/// The caller on whose behalf an external profile operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingIdentity {
    identity_id: Option<IdentityId>,
}

impl ActingIdentity {
    pub fn authenticated(identity_id: IdentityId) -> Self {
        Self {
            identity_id: Some(identity_id),
        }
    }

    pub fn anonymous() -> Self {
        Self { identity_id: None }
    }

    pub fn identity_id(&self) -> Option<&IdentityId> {
        self.identity_id.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyPredicate {
    /// Any authenticated actor.
    AnyAuthenticated,
    /// `actor.id == target.id`.
    OwnerOnly,
    /// `actor.id == target.id` and the written row keeps `target.id`.
    OwnerOnlyIdPinned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileAccessPolicy {
    pub schema_version: SchemaVersion,
    pub policy_name: String,
    pub operation: ProfileOperation,
    pub predicate: PolicyPredicate,
    pub enabled: bool,
}

impl ProfileAccessPolicy {
    pub fn v1(
        policy_name: impl Into<String>,
        operation: ProfileOperation,
        predicate: PolicyPredicate,
    ) -> Result<Self, ContractViolation> {
        let p = Self {
            schema_version: PROFILE_POLICY_CONTRACT_VERSION,
            policy_name: policy_name.into(),
            operation,
            predicate,
            enabled: true,
        };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for ProfileAccessPolicy {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("profile_access_policy.policy_name", &self.policy_name, 96)?;
        if self.operation == ProfileOperation::Create
            && self.predicate == PolicyPredicate::OwnerOnlyIdPinned
        {
            return Err(ContractViolation::InvalidValue {
                field: "profile_access_policy.predicate",
                reason: "id pinning applies to update only",
            });
        }
        Ok(())
    }
}

/// Outcome of one enforcer evaluation; `policy_name` is the policy that matched, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGateDecision {
    pub decision: AccessDecision,
    pub policy_name: Option<String>,
    pub reason_code: ReasonCodeId,
}

impl AccessGateDecision {
    pub fn is_allow(&self) -> bool {
        self.decision == AccessDecision::Allow
    }
}
