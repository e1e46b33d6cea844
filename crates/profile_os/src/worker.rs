#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use profile_kernel_contracts::MonotonicTimeNs;
use profile_storage::repo::{IdentityStoreRepo, ProfileStoreRepo, ProvisioningAuditRepo};
use tokio::task::JoinHandle;

use crate::reconciler::ProfileReconciler;

const MIN_BACKFILL_INTERVAL: Duration = Duration::from_millis(1);

/// Runs a backfill pass on every tick until the handle is aborted.
///
/// Passes run on the blocking pool since store calls block. A failed or panicked pass is logged
/// and the next tick tries again.
pub fn spawn_backfill_worker<S>(
    reconciler: Arc<ProfileReconciler<S>>,
    interval: Duration,
) -> JoinHandle<()>
where
    S: IdentityStoreRepo + ProfileStoreRepo + ProvisioningAuditRepo + Send + Sync + 'static,
{
    let interval = interval.max(MIN_BACKFILL_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reconciler = Arc::clone(&reconciler);
            let pass = tokio::task::spawn_blocking(move || {
                reconciler.backfill_missing_profiles(MonotonicTimeNs::from_system_clock())
            })
            .await;
            match pass {
                Ok(Ok(summary)) if summary.scanned == 0 => {
                    tracing::debug!("backfill pass found no orphaned identities");
                }
                Ok(Ok(summary)) => tracing::info!(
                    scanned = summary.scanned,
                    created = summary.created,
                    duplicates = summary.duplicates,
                    skipped_no_email = summary.skipped_no_email,
                    errors = summary.errors,
                    "backfill pass finished"
                ),
                Ok(Err(err)) => tracing::warn!(error = %err, "backfill pass failed"),
                Err(join_err) => tracing::warn!(error = %join_err, "backfill pass panicked"),
            }
        }
    })
}
