//! Local profile index: a single JSON file mapping lowercased identity to
//! profile record.
//!
//! Every read-modify-write of the file runs under one async mutex, and the
//! new contents replace the old through temp-file + rename, so concurrent
//! updates to different identities cannot clobber each other and readers
//! never see a half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use mintvault_common::{Identity, ProfileRecord};

use crate::error::{Result, StoreError};
use crate::local_store::write_atomic;

type ProfileMap = BTreeMap<Identity, ProfileRecord>;

pub struct LocalProfileIndex {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalProfileIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_index(&self) -> Result<ProfileMap> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ProfileMap::new()),
            Err(e) => return Err(StoreError::io(&self.path)(e)),
        };
        if content.trim().is_empty() {
            return Ok(ProfileMap::new());
        }
        serde_json::from_str(&content).map_err(|e| StoreError::data(&self.path, e))
    }

    async fn write_index(&self, index: &ProfileMap) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::io(parent))?;
        }
        let json = serde_json::to_vec_pretty(index).map_err(|e| StoreError::data(&self.path, e))?;
        write_atomic(&self.path, &json).await
    }

    pub async fn get(&self, identity: &Identity) -> Result<Option<ProfileRecord>> {
        let mut index = self.read_index().await?;
        Ok(index.remove(identity))
    }

    /// Insert or replace a record. An existing record's `created_at` is kept.
    pub async fn put(&self, mut record: ProfileRecord) -> Result<ProfileRecord> {
        let _guard = self.write_lock.lock().await;
        let mut index = self.read_index().await?;
        if let Some(existing) = index.get(&record.identity) {
            record.created_at = existing.created_at;
        }
        index.insert(record.identity.clone(), record.clone());
        self.write_index(&index).await?;
        debug!(identity = %record.identity, "Saved profile to local index");
        Ok(record)
    }

    /// Remove a record. Returns whether one existed.
    pub async fn delete(&self, identity: &Identity) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut index = self.read_index().await?;
        let existed = index.remove(identity).is_some();
        if existed {
            self.write_index(&index).await?;
            info!(identity = %identity, "Deleted profile from local index");
        }
        Ok(existed)
    }

    pub async fn list(&self) -> Result<Vec<ProfileRecord>> {
        Ok(self.read_index().await?.into_values().collect())
    }
}
