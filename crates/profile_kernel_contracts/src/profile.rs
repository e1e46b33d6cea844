#![forbid(unsafe_code)]

use serde::Serialize;

use crate::common::validate_text;
use crate::identity::IdentityId;
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const PROFILE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

const MAX_DISPLAY_NAME_LEN: usize = 256;
const MAX_EMAIL_LEN: usize = 320;

/// Closed role set carried on every profile.
///
/// Not an access predicate: row access is decided by ownership alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileRole {
    Parent,
    Teacher,
    Specialist,
    Admin,
}

impl ProfileRole {
    /// Least-privileged member; the landing value for absent or unknown input.
    pub const DEFAULT: ProfileRole = ProfileRole::Parent;

    pub const ALL: [ProfileRole; 4] = [
        ProfileRole::Parent,
        ProfileRole::Teacher,
        ProfileRole::Specialist,
        ProfileRole::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProfileRole::Parent => "parent",
            ProfileRole::Teacher => "teacher",
            ProfileRole::Specialist => "specialist",
            ProfileRole::Admin => "admin",
        }
    }

    /// Exact membership test against the closed set. Matching is case-sensitive.
    pub fn parse_member(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == raw.trim())
    }

    /// Never rejects: anything outside the closed set becomes [`ProfileRole::DEFAULT`].
    pub fn coerce(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse_member).unwrap_or(Self::DEFAULT)
    }
}

impl Default for ProfileRole {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileRecord {
    pub schema_version: SchemaVersion,
    pub profile_id: IdentityId,
    pub email: String,
    pub display_name: String,
    pub role: ProfileRole,
    pub is_active: bool,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl ProfileRecord {
    /// Fresh row as written by provisioning: active, `created_at == updated_at`.
    pub fn v1(
        profile_id: IdentityId,
        email: String,
        display_name: String,
        role: ProfileRole,
        now: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: PROFILE_CONTRACT_VERSION,
            profile_id,
            email,
            display_name,
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for ProfileRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "profile_record.schema_version",
                reason: "must be > 0",
            });
        }
        self.profile_id.validate()?;
        validate_text("profile_record.email", &self.email, MAX_EMAIL_LEN)?;
        validate_text(
            "profile_record.display_name",
            &self.display_name,
            MAX_DISPLAY_NAME_LEN,
        )?;
        if self.updated_at < self.created_at {
            return Err(ContractViolation::InvalidValue {
                field: "profile_record.updated_at",
                reason: "must be >= created_at",
            });
        }
        Ok(())
    }
}

/// Field patch for an owner-initiated profile update.
///
/// `profile_id` is carried so a reassignment attempt is visible to the access policy; the store
/// never applies it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub profile_id: Option<IdentityId>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

impl ProfileUpdate {
    /// True unless the patch tries to move the row to a different identity.
    pub fn keeps_profile_id(&self, current: &IdentityId) -> bool {
        self.profile_id.as_ref().map_or(true, |id| id == current)
    }

    pub fn is_noop(&self) -> bool {
        self.display_name.is_none() && self.role.is_none() && self.is_active.is_none()
    }
}

impl Validate for ProfileUpdate {
    fn validate(&self) -> Result<(), ContractViolation> {
        if let Some(id) = &self.profile_id {
            id.validate()?;
        }
        if let Some(name) = &self.display_name {
            validate_text("profile_update.display_name", name, MAX_DISPLAY_NAME_LEN)?;
        }
        Ok(())
    }
}
