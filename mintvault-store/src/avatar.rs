//! Avatar uploads: validate, store locally by content hash, then link the
//! result into the owner's profile.
//!
//! Avatars never go through the remote blob tier. The blob write and the
//! profile link are decoupled: once the blob is on disk it stays there even
//! if the profile cannot be updated.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use mintvault_common::{ContentReference, Identity};

use crate::config::AVATAR_MAX_BYTES;
use crate::error::{Result, StoreError};
use crate::local_store::LocalContentStore;
use crate::profiles::ProfileManager;

#[derive(Debug)]
pub struct AvatarUpload {
    pub reference: ContentReference,
    pub reused: bool,
    pub url: String,
    /// Set when the image was stored but attaching it to the profile failed.
    pub profile_error: Option<StoreError>,
}

pub struct AvatarPipeline {
    store: LocalContentStore,
    profiles: Arc<ProfileManager>,
    max_bytes: u64,
}

impl AvatarPipeline {
    /// `max_bytes` is clamped to the fixed 5 MiB ceiling.
    pub fn new(store: LocalContentStore, profiles: Arc<ProfileManager>, max_bytes: u64) -> Self {
        Self {
            store,
            profiles,
            max_bytes: max_bytes.min(AVATAR_MAX_BYTES),
        }
    }

    pub fn store(&self) -> &LocalContentStore {
        &self.store
    }

    pub async fn set_avatar(
        &self,
        identity: &str,
        data: Bytes,
        declared_media_type: &str,
        file_name: Option<&str>,
    ) -> Result<AvatarUpload> {
        let identity = Identity::parse(identity)?;
        self.validate(data.len() as u64, declared_media_type)?;

        let extension = file_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext);
        let put = self.store.put(&data, declared_media_type, extension).await?;
        let url = self.store.url_for(&put.file_name);

        let profile_error = match self
            .profiles
            .set_avatar_url(&identity, &url, put.reference.clone())
            .await
        {
            Ok(saved) => {
                info!(identity = %identity, url = %url, tier = ?saved.tier, "Avatar linked to profile");
                None
            }
            Err(e) => {
                warn!(identity = %identity, url = %url, error = %e, "Avatar stored but profile update failed");
                Some(e)
            }
        };

        Ok(AvatarUpload {
            reference: put.reference,
            reused: put.reused,
            url,
            profile_error,
        })
    }

    fn validate(&self, size: u64, media_type: &str) -> Result<()> {
        if !media_type.to_ascii_lowercase().starts_with("image/") {
            return Err(StoreError::Validation(format!(
                "avatar must be an image, got {:?}",
                media_type
            )));
        }
        if size > self.max_bytes {
            return Err(StoreError::Validation(format!(
                "avatar of {} bytes exceeds the {} byte limit",
                size, self.max_bytes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use mintvault_common::{NullBackend, Tier};

    use crate::profile_index::LocalProfileIndex;
    use crate::profile_store::ProfileStore;

    fn pipeline(dir: &tempfile::TempDir, profiles_file: std::path::PathBuf) -> AvatarPipeline {
        let manager = ProfileManager::new(ProfileStore::new(
            Arc::new(NullBackend),
            LocalProfileIndex::new(profiles_file),
            Duration::from_secs(1),
        ));
        AvatarPipeline::new(
            LocalContentStore::new(dir.path().join("avatars"), "/avatars"),
            Arc::new(manager),
            AVATAR_MAX_BYTES,
        )
    }

    #[tokio::test]
    async fn test_avatar_is_stored_and_linked() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir, dir.path().join("profiles.json"));

        let upload = pipeline
            .set_avatar("0xAA", Bytes::from_static(b"\x89PNG"), "image/png", Some("me.png"))
            .await
            .unwrap();
        assert!(upload.profile_error.is_none());
        assert!(!upload.reused);
        assert_eq!(upload.reference.tier, Tier::Local);
        assert_eq!(upload.url, format!("/avatars/{}.png", upload.reference.hash));

        let record = pipeline
            .profiles
            .get_profile("0xaa")
            .await
            .unwrap()
            .unwrap()
            .record;
        assert_eq!(record.avatar_url.as_deref(), Some(upload.url.as_str()));
        assert_eq!(record.avatar_ref, Some(upload.reference));
    }

    #[tokio::test]
    async fn test_oversized_avatar_rejected_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir, dir.path().join("profiles.json"));

        let big = Bytes::from(vec![0u8; 6 * 1024 * 1024]);
        let err = pipeline
            .set_avatar("0xaa", big, "image/png", Some("big.png"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(!dir.path().join("avatars").exists());
        assert!(!dir.path().join("profiles.json").exists());
    }

    #[tokio::test]
    async fn test_non_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir, dir.path().join("profiles.json"));

        let err = pipeline
            .set_avatar("0xaa", Bytes::from_static(b"hi"), "text/plain", None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(!dir.path().join("avatars").exists());
    }

    #[tokio::test]
    async fn test_profile_failure_keeps_blob() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = dir.path().join("profiles.json");
        tokio::fs::write(&corrupt, b"not json").await.unwrap();
        let pipeline = pipeline(&dir, corrupt);

        let upload = pipeline
            .set_avatar("0xaa", Bytes::from_static(b"img"), "image/jpeg", None)
            .await
            .unwrap();
        assert!(matches!(upload.profile_error, Some(StoreError::LocalData { .. })));
        assert!(pipeline.store().exists(&mintvault_common::ContentHash::of(b"img")).await.unwrap());
        assert!(upload.url.ends_with(".jpg"));
    }

    #[test]
    fn test_max_bytes_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ProfileManager::new(ProfileStore::new(
            Arc::new(NullBackend),
            LocalProfileIndex::new(dir.path().join("profiles.json")),
            Duration::from_secs(1),
        ));
        let pipeline = AvatarPipeline::new(
            LocalContentStore::new(dir.path().join("avatars"), "/avatars"),
            Arc::new(manager),
            u64::MAX,
        );
        assert_eq!(pipeline.max_bytes, AVATAR_MAX_BYTES);
    }
}
