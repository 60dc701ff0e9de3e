//! Charge-item repository that keeps the local cache in step with a remote source.
//!
//! Synchronisation is incremental: the remote is asked only for items entered after the newest
//! cached `entered_date`. Returned items are upserted, and the caller always receives the full
//! local list, so an empty remote answer still yields everything cached so far.

use crate::charge_item::{ChargeItem, SparseChargeItem};
use crate::error::{RemoteError, RepositoryError, RepositoryResult};
use crate::repositories::local::LocalChargeItemStore;
use crate::session::ChargeItemRepository;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Remote listing and deletion of one insured person's charge items.
#[async_trait]
pub trait RemoteChargeItemSource: Send + Sync {
    /// Items entered strictly after `after`, or all items when `after` is `None`.
    async fn list_after(
        &self,
        after: Option<DateTime<FixedOffset>>,
    ) -> Result<Vec<SparseChargeItem>, RemoteError>;

    /// Deletes the item. `Ok(false)` means the remote did not confirm the deletion.
    async fn delete(&self, identifier: &str) -> Result<bool, RemoteError>;
}

#[async_trait]
impl<R: RemoteChargeItemSource + ?Sized> RemoteChargeItemSource for Arc<R> {
    async fn list_after(
        &self,
        after: Option<DateTime<FixedOffset>>,
    ) -> Result<Vec<SparseChargeItem>, RemoteError> {
        (**self).list_after(after).await
    }

    async fn delete(&self, identifier: &str) -> Result<bool, RemoteError> {
        (**self).delete(identifier).await
    }
}

pub struct SyncingChargeItemRepository<R> {
    remote: R,
    local: LocalChargeItemStore,
    cache_guard: Arc<Mutex<()>>,
}

impl<R: RemoteChargeItemSource> SyncingChargeItemRepository<R> {
    pub fn new(remote: R, local: LocalChargeItemStore) -> Self {
        Self {
            remote,
            local,
            cache_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Shares a cache guard with other repositories over the same local store, so their
    /// read-modify-write cycles do not interleave.
    pub fn with_cache_guard(mut self, cache_guard: Arc<Mutex<()>>) -> Self {
        self.cache_guard = cache_guard;
        self
    }
}

#[async_trait]
impl<R: RemoteChargeItemSource> ChargeItemRepository for SyncingChargeItemRepository<R> {
    async fn load_local(&self) -> RepositoryResult<Vec<SparseChargeItem>> {
        let _guard = self.cache_guard.lock().await;
        Ok(self.local.list_all()?)
    }

    async fn load_remote_and_save(&self) -> RepositoryResult<Vec<SparseChargeItem>> {
        let _guard = self.cache_guard.lock().await;

        let after = self.local.latest_entered_date()?;
        let fetched = self.remote.list_after(after).await?;
        if let Some(after) = after {
            if fetched.iter().any(|item| item.entered_date <= after) {
                tracing::warn!(
                    profile_id = %self.local.profile_id(),
                    since = %after,
                    "remote returned charge items older than requested"
                );
                return Err(RemoteError::InconsistentResponse.into());
            }
        }
        let saved = self.local.save(&fetched)?;
        tracing::debug!(
            profile_id = %self.local.profile_id(),
            since = ?after,
            saved,
            "charge item cache updated"
        );

        Ok(self.local.list_all()?)
    }

    async fn load_remote(&self) -> RepositoryResult<Vec<SparseChargeItem>> {
        Ok(self.remote.list_after(None).await?)
    }

    /// Deletes remotely, then from the cache. An item the remote no longer knows is purged from
    /// the cache as well; the call succeeds when a stale local copy was removed.
    async fn delete(&self, item: &ChargeItem) -> RepositoryResult<bool> {
        let remote_missing = match self.remote.delete(&item.identifier).await {
            Ok(true) => None,
            Ok(false) => return Ok(false),
            Err(err) => {
                let err = RepositoryError::from(err);
                if !err.is_not_found() {
                    return Err(err);
                }
                Some(err)
            }
        };

        let _guard = self.cache_guard.lock().await;
        let purged = self.local.delete(&[item.identifier.as_str()])?;
        match remote_missing {
            None => Ok(true),
            Some(_) if purged => {
                tracing::info!(
                    profile_id = %self.local.profile_id(),
                    identifier = %item.identifier,
                    "charge item already gone remotely; stale cache entry removed"
                );
                Ok(true)
            }
            Some(err) => Err(err),
        }
    }

    async fn delete_all_local(&self) -> RepositoryResult<bool> {
        let _guard = self.cache_guard.lock().await;
        self.local.clear()?;
        Ok(true)
    }
}
