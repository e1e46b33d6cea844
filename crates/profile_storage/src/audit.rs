#![forbid(unsafe_code)]

use profile_kernel_contracts::identity::IdentityId;
use profile_kernel_contracts::provisioning::{ProvisioningAuditInput, ProvisioningPath};
use profile_kernel_contracts::MonotonicTimeNs;
use sha2::{Digest, Sha256};

use crate::profile_db::StorageError;
use crate::repo::ProvisioningAuditRepo;

/// Append-only writer for the provisioning audit ledger.
#[derive(Debug, Default)]
pub struct ProvisioningAuditRuntime;

impl ProvisioningAuditRuntime {
    pub fn emit<R>(repo: &R, input: ProvisioningAuditInput) -> Result<u64, StorageError>
    where
        R: ProvisioningAuditRepo + ?Sized,
    {
        let identity_id = input.identity_id.clone();
        let outcome = input.outcome;
        let audit_id = repo.append_provisioning_audit_row(input)?;
        tracing::debug!(
            identity_id = %identity_id,
            audit_id,
            outcome = ?outcome,
            "provisioning audit row appended"
        );
        Ok(audit_id)
    }
}

/// Deterministic 32-hex-char attempt id for one audit row.
pub fn attempt_id_hex(
    identity_id: &IdentityId,
    path: ProvisioningPath,
    recorded_at: MonotonicTimeNs,
    audit_id: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity_id.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(path.as_str().as_bytes());
    hasher.update(recorded_at.0.to_be_bytes());
    hasher.update(audit_id.to_be_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}
