#![forbid(unsafe_code)]

use profile_kernel_contracts::identity::IdentityId;
use profile_kernel_contracts::policy::{
    reason_codes, AccessDecision, AccessGateDecision, ActingIdentity, PolicyPredicate,
    ProfileAccessPolicy, ProfileOperation, POLICY_PROFILES_INSERT_AUTHENTICATED,
    POLICY_PROFILES_SELECT_OWN, POLICY_PROFILES_UPDATE_OWN,
};
use profile_kernel_contracts::{ContractViolation, ReasonCodeId};

/// The row an operation touches. For updates, `written_profile_id` is the id the row would
/// carry afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileAccessTarget<'a> {
    pub profile_id: &'a IdentityId,
    pub written_profile_id: Option<&'a IdentityId>,
}

impl<'a> ProfileAccessTarget<'a> {
    pub fn row(profile_id: &'a IdentityId) -> Self {
        Self {
            profile_id,
            written_profile_id: None,
        }
    }

    pub fn write(profile_id: &'a IdentityId, written_profile_id: &'a IdentityId) -> Self {
        Self {
            profile_id,
            written_profile_id: Some(written_profile_id),
        }
    }
}

/// Insert for any authenticated caller, select and update for the owner only.
pub fn default_profile_policies() -> Result<Vec<ProfileAccessPolicy>, ContractViolation> {
    Ok(vec![
        ProfileAccessPolicy::v1(
            POLICY_PROFILES_INSERT_AUTHENTICATED,
            ProfileOperation::Create,
            PolicyPredicate::AnyAuthenticated,
        )?,
        ProfileAccessPolicy::v1(
            POLICY_PROFILES_SELECT_OWN,
            ProfileOperation::Read,
            PolicyPredicate::OwnerOnly,
        )?,
        ProfileAccessPolicy::v1(
            POLICY_PROFILES_UPDATE_OWN,
            ProfileOperation::Update,
            PolicyPredicate::OwnerOnlyIdPinned,
        )?,
    ])
}

/// Row-level access decisions for external callers.
///
/// Evaluation is pure: policies are scanned in order and the first enabled policy covering the
/// operation decides. No covering policy means Deny. Ownership is the only predicate; profile
/// roles play no part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileAccessEnforcer {
    policies: Vec<ProfileAccessPolicy>,
}

impl ProfileAccessEnforcer {
    pub fn new(policies: Vec<ProfileAccessPolicy>) -> Self {
        Self { policies }
    }

    pub fn with_default_policies() -> Result<Self, ContractViolation> {
        Ok(Self::new(default_profile_policies()?))
    }

    pub fn policies(&self) -> &[ProfileAccessPolicy] {
        &self.policies
    }

    pub fn evaluate(
        &self,
        actor: &ActingIdentity,
        operation: ProfileOperation,
        target: ProfileAccessTarget<'_>,
    ) -> AccessGateDecision {
        let Some(policy) = self
            .policies
            .iter()
            .find(|p| p.enabled && p.operation == operation)
        else {
            return AccessGateDecision {
                decision: AccessDecision::Deny,
                policy_name: None,
                reason_code: reason_codes::PROFILE_ACCESS_DENY_NO_POLICY,
            };
        };
        let (decision, reason_code) = evaluate_predicate(policy.predicate, actor, target);
        AccessGateDecision {
            decision,
            policy_name: Some(policy.policy_name.clone()),
            reason_code,
        }
    }
}

fn evaluate_predicate(
    predicate: PolicyPredicate,
    actor: &ActingIdentity,
    target: ProfileAccessTarget<'_>,
) -> (AccessDecision, ReasonCodeId) {
    let Some(actor_id) = actor.identity_id() else {
        return (
            AccessDecision::Deny,
            reason_codes::PROFILE_ACCESS_DENY_UNAUTHENTICATED,
        );
    };
    match predicate {
        PolicyPredicate::AnyAuthenticated => (
            AccessDecision::Allow,
            reason_codes::PROFILE_ACCESS_ALLOW_AUTHENTICATED_CREATE,
        ),
        PolicyPredicate::OwnerOnly | PolicyPredicate::OwnerOnlyIdPinned
            if actor_id != target.profile_id =>
        {
            (
                AccessDecision::Deny,
                reason_codes::PROFILE_ACCESS_DENY_NOT_OWNER,
            )
        }
        PolicyPredicate::OwnerOnlyIdPinned
            if target
                .written_profile_id
                .is_some_and(|written| written != target.profile_id) =>
        {
            (
                AccessDecision::Deny,
                reason_codes::PROFILE_ACCESS_DENY_ID_REASSIGNMENT,
            )
        }
        PolicyPredicate::OwnerOnly | PolicyPredicate::OwnerOnlyIdPinned => {
            (AccessDecision::Allow, reason_codes::PROFILE_ACCESS_ALLOW_OWNER)
        }
    }
}
