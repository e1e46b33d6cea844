#![forbid(unsafe_code)]

pub mod common;
pub mod health;
pub mod identity;
pub mod policy;
pub mod profile;
pub mod provisioning;

pub use common::{ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate};
