#![forbid(unsafe_code)]

use profile_kernel_contracts::identity::{
    IdentityRecord, METADATA_KEY_FULL_NAME, METADATA_KEY_NAME, METADATA_KEY_ROLE,
};
use profile_kernel_contracts::profile::{ProfileRecord, ProfileRole};
use profile_kernel_contracts::{ContractViolation, MonotonicTimeNs};

const MAX_DISPLAY_NAME_BYTES: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileDerivation {
    /// Identity has no contactable email; provisioning is deferred.
    NoEmail,
    Ready(ProfileRecord),
}

/// Derives the profile row an identity should have. Pure: same identity, same row.
pub fn derive_profile(
    identity: &IdentityRecord,
    now: MonotonicTimeNs,
) -> Result<ProfileDerivation, ContractViolation> {
    let Some(email) = identity.contactable_email() else {
        return Ok(ProfileDerivation::NoEmail);
    };
    let record = ProfileRecord::v1(
        identity.identity_id.clone(),
        email.to_string(),
        derive_display_name(identity, email),
        derive_role(identity),
        now,
    )?;
    Ok(ProfileDerivation::Ready(record))
}

/// `full_name`, then `name`, then the email local part, then the whole email.
/// The first candidate that is non-empty after trimming wins.
pub fn derive_display_name(identity: &IdentityRecord, email: &str) -> String {
    let local_part = email.split('@').next().unwrap_or_default();
    let candidates = [
        identity.metadata.get(METADATA_KEY_FULL_NAME),
        identity.metadata.get(METADATA_KEY_NAME),
        Some(local_part),
        Some(email),
    ];
    let chosen = candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|c| !c.is_empty())
        .unwrap_or(email);
    truncate_at_char_boundary(chosen, MAX_DISPLAY_NAME_BYTES).to_string()
}

pub fn derive_role(identity: &IdentityRecord) -> ProfileRole {
    ProfileRole::coerce(identity.metadata.get(METADATA_KEY_ROLE))
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].trim_end()
}
