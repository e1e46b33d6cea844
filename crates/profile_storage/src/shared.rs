#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::time::{Duration, Instant};

use profile_kernel_contracts::identity::{IdentityId, IdentityRecord};

use crate::profile_db::{ProfileDb, StorageError};

pub const DEFAULT_STORE_CALL_TIMEOUT: Duration = Duration::from_millis(2_000);
const LOCK_RETRY_BACKOFF: Duration = Duration::from_millis(1);

pub const IDENTITY_STORE: &str = "identity";
pub const PROFILE_STORE: &str = "profile";

/// Callback fired after an identity row durably exists. Delivery is at-least-once.
pub type IdentityCreatedHook = Arc<dyn Fn(&IdentityRecord) + Send + Sync>;

/// Cloneable handle over one [`ProfileDb`], shared by every concurrent caller.
///
/// Every call takes the store lock for its whole duration, bounded by `call_timeout`.
#[derive(Clone)]
pub struct SharedProfileDb {
    db: Arc<Mutex<ProfileDb>>,
    hooks: Arc<RwLock<BTreeMap<String, IdentityCreatedHook>>>,
    available: Arc<AtomicBool>,
    call_timeout: Duration,
}

impl std::fmt::Debug for SharedProfileDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedProfileDb")
            .field("available", &self.available.load(Ordering::Acquire))
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for SharedProfileDb {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl SharedProfileDb {
    pub fn new(db: ProfileDb) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            hooks: Arc::new(RwLock::new(BTreeMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            call_timeout: DEFAULT_STORE_CALL_TIMEOUT,
        }
    }

    pub fn new_in_memory() -> Self {
        Self::new(ProfileDb::new_in_memory())
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Maintenance switch: while unavailable every call fails with `StorageError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn with_db<R>(
        &self,
        f: impl FnOnce(&mut ProfileDb) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        self.locked(PROFILE_STORE, f)
    }

    pub(crate) fn locked<R>(
        &self,
        store: &'static str,
        f: impl FnOnce(&mut ProfileDb) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        if !self.available.load(Ordering::Acquire) {
            return Err(StorageError::Unavailable { store });
        }
        let deadline = Instant::now() + self.call_timeout;
        loop {
            match self.db.try_lock() {
                Ok(mut guard) => return f(&mut guard),
                Err(TryLockError::Poisoned(_)) => return Err(StorageError::Unavailable { store }),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(StorageError::Timeout {
                            store,
                            timeout_ms: u64::try_from(self.call_timeout.as_millis())
                                .unwrap_or(u64::MAX),
                        });
                    }
                    std::thread::sleep(LOCK_RETRY_BACKOFF);
                }
            }
        }
    }

    /// Commits the identity, then notifies hooks. Hook outcomes never fail the creation.
    pub fn create_identity(&self, record: IdentityRecord) -> Result<(), StorageError> {
        self.locked(IDENTITY_STORE, |db| db.insert_identity(record.clone()))?;
        let delivered = self.fire_identity_created(&record);
        tracing::debug!(
            identity_id = %record.identity_id,
            delivered,
            "identity created"
        );
        Ok(())
    }

    /// Re-fires the creation event for a stored identity, as an at-least-once bus may.
    pub fn redeliver_identity_created(
        &self,
        identity_id: &IdentityId,
    ) -> Result<usize, StorageError> {
        let record = self.locked(IDENTITY_STORE, |db| {
            db.get_identity(identity_id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound {
                    table: "identities",
                    key: identity_id.as_str().to_string(),
                })
        })?;
        Ok(self.fire_identity_created(&record))
    }

    pub fn install_identity_created_hook(
        &self,
        hook_name: &str,
        hook: IdentityCreatedHook,
    ) -> Result<(), StorageError> {
        let mut hooks = self
            .hooks
            .write()
            .map_err(|_| StorageError::Unavailable {
                store: IDENTITY_STORE,
            })?;
        hooks.insert(hook_name.to_string(), hook);
        Ok(())
    }

    pub fn remove_identity_created_hook(&self, hook_name: &str) -> Result<bool, StorageError> {
        let mut hooks = self
            .hooks
            .write()
            .map_err(|_| StorageError::Unavailable {
                store: IDENTITY_STORE,
            })?;
        Ok(hooks.remove(hook_name).is_some())
    }

    pub fn has_identity_created_hook(&self, hook_name: &str) -> Result<bool, StorageError> {
        if !self.available.load(Ordering::Acquire) {
            return Err(StorageError::Unavailable {
                store: IDENTITY_STORE,
            });
        }
        let hooks = self.hooks.read().map_err(|_| StorageError::Unavailable {
            store: IDENTITY_STORE,
        })?;
        Ok(hooks.contains_key(hook_name))
    }

    fn fire_identity_created(&self, record: &IdentityRecord) -> usize {
        let hooks: Vec<(String, IdentityCreatedHook)> = match self.hooks.read() {
            Ok(hooks) => hooks
                .iter()
                .map(|(name, hook)| (name.clone(), Arc::clone(hook)))
                .collect(),
            Err(_) => {
                tracing::warn!(
                    identity_id = %record.identity_id,
                    "identity-created hook registry poisoned; event not delivered"
                );
                return 0;
            }
        };
        let mut delivered = 0;
        for (hook_name, hook) in hooks {
            if catch_unwind(AssertUnwindSafe(|| hook(record))).is_err() {
                tracing::warn!(
                    identity_id = %record.identity_id,
                    hook = %hook_name,
                    "identity-created hook panicked"
                );
                continue;
            }
            delivered += 1;
        }
        delivered
    }
}
