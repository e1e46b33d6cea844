#![forbid(unsafe_code)]

use serde::Serialize;

use crate::common::validate_text;
use crate::{ContractViolation, MonotonicTimeNs, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckName {
    IdentityCreatedHook,
    ProvisioningFunction,
    ProfileAccessPolicies,
    OrphanedIdentities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Warning,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub check_name: HealthCheckName,
    pub status: HealthStatus,
    pub detail: String,
}

impl HealthCheck {
    pub fn v1(
        check_name: HealthCheckName,
        status: HealthStatus,
        detail: impl Into<String>,
    ) -> Result<Self, ContractViolation> {
        let c = Self {
            check_name,
            status,
            detail: detail.into(),
        };
        c.validate()?;
        Ok(c)
    }
}

impl Validate for HealthCheck {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("health_check.detail", &self.detail, 512)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub generated_at: MonotonicTimeNs,
    pub checks: Vec<HealthCheck>,
    /// Identities lacking a profile, when the drift check could be computed.
    pub orphaned_identities: Option<u64>,
}

impl HealthReport {
    pub fn check(&self, name: HealthCheckName) -> Option<&HealthCheck> {
        self.checks.iter().find(|c| c.check_name == name)
    }

    /// Warning dominates Unknown, Unknown dominates Ok.
    pub fn overall_status(&self) -> HealthStatus {
        if self.checks.iter().any(|c| c.status == HealthStatus::Warning) {
            HealthStatus::Warning
        } else if self.checks.iter().any(|c| c.status == HealthStatus::Unknown) {
            HealthStatus::Unknown
        } else {
            HealthStatus::Ok
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
