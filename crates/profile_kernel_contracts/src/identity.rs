#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::Serialize;

use crate::common::validate_text;
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const IDENTITY_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const METADATA_KEY_FULL_NAME: &str = "full_name";
pub const METADATA_KEY_NAME: &str = "name";
pub const METADATA_KEY_ROLE: &str = "role";

const MAX_EMAIL_LEN: usize = 320;
const MAX_METADATA_ENTRIES: usize = 256;

/// Opaque identifier issued by the external authentication provider. Only blank and oversized
/// ids are refused; the content is never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for IdentityId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("identity_id", &self.0, 128)
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-supplied key/value metadata. Values are untrusted and never schema-validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMetadata(BTreeMap<String, String>);

impl IdentityMetadata {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Keeps at most the first 256 pairs; the rest are dropped, never rejected.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .take(MAX_METADATA_ENTRIES)
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Ingests the provider's raw JSON metadata blob.
    ///
    /// Only top-level string values are kept. Anything that is not a JSON object yields empty
    /// metadata, since identity creation must never fail on metadata shape.
    pub fn from_json_object_str(raw: &str) -> Self {
        let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(raw)
        else {
            return Self::empty();
        };
        Self(
            map.into_iter()
                .filter_map(|(k, v)| match v {
                    serde_json::Value::String(s) => Some((k, s)),
                    _ => None,
                })
                .take(MAX_METADATA_ENTRIES)
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub schema_version: SchemaVersion,
    pub identity_id: IdentityId,
    pub email: Option<String>,
    pub metadata: IdentityMetadata,
    pub created_at: MonotonicTimeNs,
}

impl IdentityRecord {
    pub fn v1(
        identity_id: IdentityId,
        email: Option<String>,
        metadata: IdentityMetadata,
        created_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: IDENTITY_CONTRACT_VERSION,
            identity_id,
            email,
            metadata,
            created_at,
        };
        r.validate()?;
        Ok(r)
    }

    /// Trimmed email, or `None` when the identity has nothing contactable.
    pub fn contactable_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

impl Validate for IdentityRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "identity_record.schema_version",
                reason: "must be > 0",
            });
        }
        self.identity_id.validate()?;
        if let Some(email) = &self.email {
            if email.len() > MAX_EMAIL_LEN {
                return Err(ContractViolation::InvalidValue {
                    field: "identity_record.email",
                    reason: "must be <= 320 chars",
                });
            }
        }
        Ok(())
    }
}
