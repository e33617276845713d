//! Remote-first profile storage with a local JSON fallback.
//!
//! The two tiers are independent sources of truth chosen by availability:
//! a remote write is not mirrored locally and a local write is not replayed
//! to the remote later. Whenever the remote answers a read, its answer is
//! authoritative, including "no such profile"; the local index is consulted
//! only when the remote fails.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use mintvault_common::{Identity, ProfileBackend, ProfileRecord, RemoteAck, RemoteError, Tier};

use crate::error::Result;
use crate::profile_index::LocalProfileIndex;

/// A record together with the tier it was read from or written to.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProfile {
    pub record: ProfileRecord,
    pub tier: Tier,
    /// Transaction hash reported by the remote tier on writes.
    pub tx_hash: Option<String>,
}

pub struct ProfileStore {
    remote: Arc<dyn ProfileBackend>,
    local: LocalProfileIndex,
    timeout: Duration,
}

impl ProfileStore {
    pub fn new(remote: Arc<dyn ProfileBackend>, local: LocalProfileIndex, timeout: Duration) -> Self {
        Self {
            remote,
            local,
            timeout,
        }
    }

    pub fn local(&self) -> &LocalProfileIndex {
        &self.local
    }

    pub async fn get(&self, identity: &Identity) -> Result<Option<StoredProfile>> {
        match self.remote.get_profile(identity, self.timeout).await {
            Ok(record) => {
                debug!(identity = %identity, found = record.is_some(), "Profile read from remote tier");
                return Ok(record.map(|record| StoredProfile {
                    record,
                    tier: Tier::Remote,
                    tx_hash: None,
                }));
            }
            Err(e) => {
                info!(identity = %identity, error = %e, "Remote profile read failed, using local index");
            }
        }

        Ok(self.local.get(identity).await?.map(|record| StoredProfile {
            record,
            tier: Tier::Local,
            tx_hash: None,
        }))
    }

    /// Persist a whole record, stamping `updated_at` first. A record that
    /// already exists on the chosen tier keeps its stored `created_at`.
    ///
    /// The remote is asked for the current record before it is written; if
    /// that read fails the write goes straight to the local index.
    pub async fn put(&self, mut record: ProfileRecord) -> Result<StoredProfile> {
        record.updated_at = Utc::now();

        match self.put_remote(&mut record).await {
            Ok(ack) => {
                debug!(identity = %record.identity, "Profile saved to remote tier");
                return Ok(StoredProfile {
                    record,
                    tier: Tier::Remote,
                    tx_hash: ack.tx_hash,
                });
            }
            Err(e) => {
                info!(identity = %record.identity, error = %e, "Remote profile save failed, using local index");
            }
        }

        let record = self.local.put(record).await?;
        Ok(StoredProfile {
            record,
            tier: Tier::Local,
            tx_hash: None,
        })
    }

    async fn put_remote(&self, record: &mut ProfileRecord) -> std::result::Result<RemoteAck, RemoteError> {
        if let Some(existing) = self.remote.get_profile(&record.identity, self.timeout).await? {
            record.created_at = existing.created_at;
        }
        self.remote.put_profile(record, self.timeout).await
    }

    /// Remove a whole record from whichever tier is reachable.
    pub async fn delete(&self, identity: &Identity) -> Result<Tier> {
        match self.remote.delete_profile(identity, self.timeout).await {
            Ok(()) => {
                info!(identity = %identity, "Profile deleted on remote tier");
                return Ok(Tier::Remote);
            }
            Err(e) => {
                info!(identity = %identity, error = %e, "Remote profile delete failed, using local index");
            }
        }
        self.local.delete(identity).await?;
        Ok(Tier::Local)
    }
}
