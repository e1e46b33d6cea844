#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use profile_kernel_contracts::identity::IdentityRecord;
use profile_kernel_contracts::provisioning::{
    IDENTITY_CREATED_HOOK_NAME, PROVISIONING_FUNCTION_NAME,
};
use profile_kernel_contracts::{ContractViolation, MonotonicTimeNs};
use profile_storage::shared::IdentityCreatedHook;
use profile_storage::{SharedProfileDb, StorageError};
use tokio::task::JoinHandle;

use crate::access_gateway::ProfileAccessGateway;
use crate::access_policy::default_profile_policies;
use crate::provisioner::ProfileProvisioner;
use crate::reconciler::{ProfileReconciler, DEFAULT_BACKFILL_PAGE_SIZE};
use crate::verifier::ProvisioningVerifier;
use crate::worker::spawn_backfill_worker;

pub const ENV_BACKFILL_PAGE_SIZE: &str = "PROFILE_BACKFILL_PAGE_SIZE";
pub const ENV_STORE_CALL_TIMEOUT_MS: &str = "PROFILE_STORE_CALL_TIMEOUT_MS";
pub const ENV_BACKFILL_WORKER_ENABLED: &str = "PROFILE_BACKFILL_WORKER_ENABLED";
pub const ENV_BACKFILL_INTERVAL_MS: &str = "PROFILE_BACKFILL_INTERVAL_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisioningWiringConfig {
    pub backfill_page_size: usize,
    pub store_call_timeout_ms: u64,
    pub backfill_worker_enabled: bool,
    pub backfill_interval_ms: u64,
}

impl ProvisioningWiringConfig {
    pub fn mvp_v1() -> Self {
        Self {
            backfill_page_size: DEFAULT_BACKFILL_PAGE_SIZE,
            store_call_timeout_ms: 2_000,
            backfill_worker_enabled: true,
            backfill_interval_ms: 60_000,
        }
    }

    pub fn from_env() -> Self {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    /// Overrides `mvp_v1` defaults from the environment. Unparseable or out-of-range values
    /// keep the default.
    pub fn from_env_var_map<F>(mut env_getter: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let defaults = Self::mvp_v1();
        let backfill_page_size = env_getter(ENV_BACKFILL_PAGE_SIZE)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| (1..=10_000).contains(v))
            .unwrap_or(defaults.backfill_page_size);
        let store_call_timeout_ms = env_getter(ENV_STORE_CALL_TIMEOUT_MS)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| (1..=60_000).contains(v))
            .unwrap_or(defaults.store_call_timeout_ms);
        let backfill_worker_enabled = match env_getter(ENV_BACKFILL_WORKER_ENABLED) {
            Some(v) => !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            ),
            None => defaults.backfill_worker_enabled,
        };
        let backfill_interval_ms = env_getter(ENV_BACKFILL_INTERVAL_MS)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| (100..=3_600_000).contains(v))
            .unwrap_or(defaults.backfill_interval_ms);

        Self {
            backfill_page_size,
            store_call_timeout_ms,
            backfill_worker_enabled,
            backfill_interval_ms,
        }
    }

    pub fn validate(&self) -> Result<(), ContractViolation> {
        if self.backfill_page_size == 0 || self.backfill_page_size > 10_000 {
            return Err(ContractViolation::InvalidValue {
                field: "provisioning_wiring_config.backfill_page_size",
                reason: "must be within 1..=10000",
            });
        }
        if self.store_call_timeout_ms == 0 || self.store_call_timeout_ms > 60_000 {
            return Err(ContractViolation::InvalidValue {
                field: "provisioning_wiring_config.store_call_timeout_ms",
                reason: "must be within 1..=60000",
            });
        }
        if !(100..=3_600_000).contains(&self.backfill_interval_ms) {
            return Err(ContractViolation::InvalidValue {
                field: "provisioning_wiring_config.backfill_interval_ms",
                reason: "must be within 100..=3600000",
            });
        }
        Ok(())
    }
}

/// Provisioning installed against one shared store: catalog function, default access
/// policies and the identity-created subscription.
#[derive(Debug, Clone)]
pub struct ProfileProvisioningWiring {
    config: ProvisioningWiringConfig,
    db: SharedProfileDb,
    provisioner: Arc<ProfileProvisioner<SharedProfileDb>>,
}

pub fn install_profile_provisioning(
    db: SharedProfileDb,
    config: ProvisioningWiringConfig,
) -> Result<ProfileProvisioningWiring, StorageError> {
    ProfileProvisioningWiring::install(db, config)
}

impl ProfileProvisioningWiring {
    pub fn install(
        db: SharedProfileDb,
        config: ProvisioningWiringConfig,
    ) -> Result<Self, StorageError> {
        config.validate()?;
        let db = db.with_call_timeout(Duration::from_millis(config.store_call_timeout_ms));
        let policies = default_profile_policies()?;
        db.with_db(|d| {
            d.register_function(PROVISIONING_FUNCTION_NAME)?;
            for policy in policies {
                d.upsert_profile_policy(policy)?;
            }
            Ok(())
        })?;

        let wiring = Self {
            config,
            provisioner: Arc::new(ProfileProvisioner::new(db.clone())),
            db,
        };
        wiring.install_creation_hook()?;
        tracing::info!(
            hook = IDENTITY_CREATED_HOOK_NAME,
            function = PROVISIONING_FUNCTION_NAME,
            page_size = config.backfill_page_size,
            "profile provisioning installed"
        );
        Ok(wiring)
    }

    pub fn config(&self) -> ProvisioningWiringConfig {
        self.config
    }

    pub fn db(&self) -> &SharedProfileDb {
        &self.db
    }

    /// Subscribes the provisioner to identity creation. Re-installing replaces the hook.
    pub fn install_creation_hook(&self) -> Result<(), StorageError> {
        let provisioner = Arc::clone(&self.provisioner);
        let hook: IdentityCreatedHook = Arc::new(move |identity: &IdentityRecord| {
            let now = MonotonicTimeNs::from_system_clock();
            if let Err(err) = provisioner.on_identity_created(identity, now) {
                tracing::debug!(
                    identity_id = %err.identity_id(),
                    transient = err.is_transient(),
                    "event-path provisioning failed; identity left for backfill"
                );
            }
        });
        self.db
            .install_identity_created_hook(IDENTITY_CREATED_HOOK_NAME, hook)
    }

    /// Returns whether a hook was installed.
    pub fn uninstall_creation_hook(&self) -> Result<bool, StorageError> {
        let removed = self
            .db
            .remove_identity_created_hook(IDENTITY_CREATED_HOOK_NAME)?;
        if removed {
            tracing::warn!(
                hook = IDENTITY_CREATED_HOOK_NAME,
                "identity-created hook removed; new identities rely on backfill"
            );
        }
        Ok(removed)
    }

    pub fn provisioner(&self) -> &ProfileProvisioner<SharedProfileDb> {
        &self.provisioner
    }

    pub fn reconciler(&self) -> ProfileReconciler<SharedProfileDb> {
        ProfileReconciler::with_page_size(self.db.clone(), self.config.backfill_page_size)
    }

    pub fn verifier(&self) -> ProvisioningVerifier<SharedProfileDb> {
        ProvisioningVerifier::new(self.db.clone())
    }

    pub fn gateway(&self) -> ProfileAccessGateway<SharedProfileDb> {
        ProfileAccessGateway::new(self.db.clone())
    }

    /// Must be called inside a tokio runtime. `None` when the worker is disabled.
    pub fn start_backfill_worker(&self) -> Option<JoinHandle<()>> {
        if !self.config.backfill_worker_enabled {
            tracing::info!("backfill worker disabled");
            return None;
        }
        Some(spawn_backfill_worker(
            Arc::new(self.reconciler()),
            Duration::from_millis(self.config.backfill_interval_ms),
        ))
    }
}
