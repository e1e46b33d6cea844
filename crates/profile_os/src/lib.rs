#![forbid(unsafe_code)]

pub mod access_gateway;
pub mod access_policy;
pub mod derivation;
pub mod provisioner;
pub mod reconciler;
pub mod verifier;
pub mod wiring;
pub mod worker;

pub use wiring::{
    install_profile_provisioning, ProfileProvisioningWiring, ProvisioningWiringConfig,
};
