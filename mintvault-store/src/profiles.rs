//! Higher-level profile operations built from read-merge-write over the
//! [`ProfileStore`] primitives.
//!
//! Within one process every read-merge-write for an identity runs under a
//! per-identity async lock. Writers in other processes sharing the same
//! remote service are not serialised.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use mintvault_common::{
    AssetRef, ContentReference, Identity, ProfileRecord, ProfileUpdate, Tier, TradingStatsUpdate,
};

use crate::error::{Result, StoreError};
use crate::profile_store::{ProfileStore, StoredProfile};

type LockCell = Arc<tokio::sync::Mutex<()>>;

/// Async locks keyed by identity. Entries are dropped once no task holds or
/// waits on them.
#[derive(Default)]
struct IdentityLocks {
    cells: std::sync::Mutex<HashMap<Identity, LockCell>>,
}

struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    identity: Identity,
    guard: Option<OwnedMutexGuard<()>>,
}

impl IdentityLocks {
    async fn lock(&self, identity: &Identity) -> IdentityGuard<'_> {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            cells.entry(identity.clone()).or_default().clone()
        };
        let guard = cell.lock_owned().await;
        IdentityGuard {
            locks: self,
            identity: identity.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        // Release the async lock before inspecting the refcount so our own
        // clone is not counted.
        self.guard.take();
        let mut cells = self.locks.cells.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cell) = cells.get(&self.identity) {
            if Arc::strong_count(cell) == 1 {
                cells.remove(&self.identity);
            }
        }
    }
}

pub struct ProfileManager {
    store: ProfileStore,
    locks: IdentityLocks,
}

impl ProfileManager {
    pub fn new(store: ProfileStore) -> Self {
        Self {
            store,
            locks: IdentityLocks::default(),
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub async fn get_profile(&self, identity: &str) -> Result<Option<StoredProfile>> {
        let identity = Identity::parse(identity)?;
        self.store.get(&identity).await
    }

    /// Replace the whole record without merging.
    pub async fn save_profile(&self, record: ProfileRecord) -> Result<StoredProfile> {
        let _guard = self.locks.lock(&record.identity).await;
        self.store.put(record).await
    }

    /// Write a fresh record with default stats and preferences, then the
    /// given fields on top. An existing record is replaced except for its
    /// `created_at`.
    pub async fn create_profile(&self, identity: &str, initial: ProfileUpdate) -> Result<StoredProfile> {
        let identity = Identity::parse(identity)?;
        let _guard = self.locks.lock(&identity).await;
        self.create_locked(identity, initial).await
    }

    async fn create_locked(&self, identity: Identity, initial: ProfileUpdate) -> Result<StoredProfile> {
        let mut record = ProfileRecord::new(identity, Utc::now());
        record.apply(initial);
        let saved = self.store.put(record).await?;
        info!(identity = %saved.record.identity, tier = ?saved.tier, "Created profile");
        Ok(saved)
    }

    /// Merge `update` into the current record, creating it when absent.
    pub async fn update_profile(&self, identity: &str, update: ProfileUpdate) -> Result<StoredProfile> {
        let identity = Identity::parse(identity)?;
        let _guard = self.locks.lock(&identity).await;

        let Some(current) = self.store.get(&identity).await? else {
            return self.create_locked(identity, update).await;
        };
        let mut record = current.record;
        record.apply(update);
        let saved = self.store.put(record).await?;
        debug!(identity = %saved.record.identity, tier = ?saved.tier, "Updated profile");
        Ok(saved)
    }

    /// Record a token the identity created. An entry with the same address
    /// (any case) is replaced in place.
    pub async fn add_created_token(&self, identity: &str, asset: AssetRef) -> Result<StoredProfile> {
        let identity = Identity::parse(identity)?;
        let _guard = self.locks.lock(&identity).await;

        let mut record = match self.store.get(&identity).await? {
            Some(current) => current.record,
            None => ProfileRecord::new(identity, Utc::now()),
        };
        let address = asset.token_address.clone();
        record.upsert_asset(asset);
        let saved = self.store.put(record).await?;
        info!(
            identity = %saved.record.identity,
            token = %address,
            tier = ?saved.tier,
            "Recorded created token"
        );
        Ok(saved)
    }

    /// Merge trading counters. Unlike other updates this never creates a
    /// profile.
    pub async fn update_trading_stats(
        &self,
        identity: &str,
        update: TradingStatsUpdate,
    ) -> Result<StoredProfile> {
        let identity = Identity::parse(identity)?;
        let _guard = self.locks.lock(&identity).await;

        let Some(current) = self.store.get(&identity).await? else {
            return Err(StoreError::ProfileNotFound(identity));
        };
        let mut record = current.record;
        record.stats.merge(update, Utc::now());
        self.store.put(record).await
    }

    pub async fn delete_profile(&self, identity: &str) -> Result<Tier> {
        let identity = Identity::parse(identity)?;
        let _guard = self.locks.lock(&identity).await;
        self.store.delete(&identity).await
    }

    /// Attach an avatar to the identity's profile, creating it when absent.
    pub async fn set_avatar_url(
        &self,
        identity: &Identity,
        url: &str,
        reference: ContentReference,
    ) -> Result<StoredProfile> {
        let update = ProfileUpdate {
            avatar_url: Some(url.to_string()),
            avatar_ref: Some(reference),
            ..Default::default()
        };
        self.update_profile(identity.as_str(), update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use chrono::TimeZone;
    use mintvault_common::{NullBackend, Preferences, Theme, TradingStats};

    use crate::profile_index::LocalProfileIndex;

    fn manager(dir: &tempfile::TempDir) -> ProfileManager {
        ProfileManager::new(ProfileStore::new(
            Arc::new(NullBackend),
            LocalProfileIndex::new(dir.path().join("profiles.json")),
            Duration::from_secs(1),
        ))
    }

    fn asset(address: &str, name: &str) -> AssetRef {
        AssetRef {
            token_address: address.to_string(),
            token_name: name.to_string(),
            token_symbol: name.to_uppercase(),
            curve_address: Some("0xcurve".to_string()),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            tx_hash: "0xtx".to_string(),
            image_url: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_profile_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let saved = manager
            .create_profile("0xABCDEF1234", ProfileUpdate::default())
            .await
            .unwrap();
        let record = saved.record;
        assert_eq!(record.identity.as_str(), "0xabcdef1234");
        assert_eq!(record.display_name.as_deref(), Some("User_0xabcd"));
        assert_eq!(record.stats, TradingStats::default());
        assert_eq!(record.preferences, Preferences::default());
        assert_eq!(record.preferences.theme, Theme::Light);
        assert_eq!(saved.tier, Tier::Local);
    }

    #[tokio::test]
    async fn test_update_missing_profile_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let update = ProfileUpdate {
            bio: Some("x".to_string()),
            ..Default::default()
        };
        let saved = manager.update_profile("0xaa", update).await.unwrap();
        assert_eq!(saved.record.bio.as_deref(), Some("x"));
        assert_eq!(saved.record.stats, TradingStats::default());
        assert_eq!(saved.record.preferences, Preferences::default());
    }

    #[tokio::test]
    async fn test_update_preserves_untouched_fields() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let initial = ProfileUpdate {
            display_name: Some("alice".to_string()),
            ..Default::default()
        };
        let created = manager.create_profile("0xaa", initial).await.unwrap().record;
        manager.add_created_token("0xaa", asset("0xt1", "one")).await.unwrap();

        let update = ProfileUpdate {
            bio: Some("x".to_string()),
            ..Default::default()
        };
        let updated = manager.update_profile("0xAA", update).await.unwrap().record;

        assert_eq!(updated.bio.as_deref(), Some("x"));
        assert_eq!(updated.display_name.as_deref(), Some("alice"));
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.created_assets.len(), 1);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_add_created_token_replaces_same_address() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        manager.add_created_token("0xaa", asset("0xTOKEN", "first")).await.unwrap();
        let saved = manager
            .add_created_token("0xaa", asset("0xtoken", "second"))
            .await
            .unwrap();

        assert_eq!(saved.record.created_assets.len(), 1);
        assert_eq!(saved.record.created_assets[0].token_name, "second");
    }

    #[tokio::test]
    async fn test_update_trading_stats_requires_profile() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let update = TradingStatsUpdate {
            total_trades: Some(3),
            ..Default::default()
        };
        let err = manager.update_trading_stats("0xaa", update.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::ProfileNotFound(_)));
        assert!(manager.get_profile("0xaa").await.unwrap().is_none());

        manager.create_profile("0xaa", ProfileUpdate::default()).await.unwrap();
        let saved = manager.update_trading_stats("0xaa", update).await.unwrap();
        assert_eq!(saved.record.stats.total_trades, 3);
        assert!(saved.record.stats.last_trade_at.is_some());
    }

    #[tokio::test]
    async fn test_invalid_identity_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let err = manager.get_profile("  ").await.unwrap_err();
        assert!(err.is_validation());
        let err = manager
            .update_profile("../etc", ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_concurrent_token_adds_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(manager(&dir));

        let mut handles = Vec::new();
        for i in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .add_created_token("0xaa", asset(&format!("0xt{}", i), "tok"))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let record = manager.get_profile("0xaa").await.unwrap().unwrap().record;
        assert_eq!(record.created_assets.len(), 10);
        assert_eq!(manager.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_profile() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        manager.create_profile("0xaa", ProfileUpdate::default()).await.unwrap();
        assert_eq!(manager.delete_profile("0xAA").await.unwrap(), Tier::Local);
        assert!(manager.get_profile("0xaa").await.unwrap().is_none());
    }
}
