#![forbid(unsafe_code)]

use profile_kernel_contracts::provisioning::{
    BackfillSummary, ProvisionOutcome, ProvisioningPath,
};
use profile_kernel_contracts::MonotonicTimeNs;
use profile_storage::repo::{IdentityStoreRepo, ProfileStoreRepo, ProvisioningAuditRepo};
use profile_storage::{IdentityCursor, StorageError};

use crate::provisioner::provision_identity;

pub const DEFAULT_BACKFILL_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    /// The anti-join scan could not be read at all. `partial` holds what this pass already did.
    #[error("identity scan unavailable after {} rows: {source}", .partial.scanned)]
    IdentityScanUnavailable {
        source: StorageError,
        partial: BackfillSummary,
    },
}

/// Batch repair of identities that never got a profile.
///
/// Re-entrant: concurrent passes and concurrent event-path provisioning race only on the
/// store's atomic insert, and the loser observes `DuplicateProfile`.
#[derive(Debug, Clone)]
pub struct ProfileReconciler<S> {
    store: S,
    page_size: usize,
}

impl<S> ProfileReconciler<S>
where
    S: IdentityStoreRepo + ProfileStoreRepo + ProvisioningAuditRepo,
{
    pub fn new(store: S) -> Self {
        Self::with_page_size(store, DEFAULT_BACKFILL_PAGE_SIZE)
    }

    pub fn with_page_size(store: S, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// One oldest-first pass over identities lacking a profile.
    ///
    /// Per-row failures are counted in `errors` and never stop the pass. Only a scan that cannot
    /// read its first page is an error.
    pub fn backfill_missing_profiles(
        &self,
        now: MonotonicTimeNs,
    ) -> Result<BackfillSummary, ReconcileError> {
        let mut summary = BackfillSummary::default();
        let mut cursor: Option<IdentityCursor> = None;

        loop {
            let page = match self
                .store
                .identities_without_profile_rows(cursor.as_ref(), self.page_size)
            {
                Ok(page) => page,
                // Later pages failing transiently end the pass early; what is left waits for
                // the next pass.
                Err(source) if cursor.is_some() && source.is_transient() => {
                    tracing::warn!(
                        error = %source,
                        scanned = summary.scanned,
                        "backfill scan interrupted; remaining identities deferred"
                    );
                    break;
                }
                Err(source) => {
                    tracing::warn!(
                        error = %source,
                        scanned = summary.scanned,
                        "backfill scan failed"
                    );
                    return Err(ReconcileError::IdentityScanUnavailable {
                        source,
                        partial: summary,
                    });
                }
            };
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(IdentityCursor::after(last));
            let short_page = page.len() < self.page_size;

            for identity in &page {
                summary.scanned += 1;
                match provision_identity(&self.store, identity, ProvisioningPath::Backfill, now) {
                    Ok(ProvisionOutcome::Created) => summary.created += 1,
                    Ok(ProvisionOutcome::DuplicateProfile) => summary.duplicates += 1,
                    Ok(ProvisionOutcome::SkippedNoEmail) => summary.skipped_no_email += 1,
                    Err(_) => summary.errors += 1,
                }
            }

            if short_page {
                break;
            }
        }

        tracing::info!(
            scanned = summary.scanned,
            created = summary.created,
            duplicates = summary.duplicates,
            skipped_no_email = summary.skipped_no_email,
            errors = summary.errors,
            "profile backfill pass complete"
        );
        Ok(summary)
    }
}
