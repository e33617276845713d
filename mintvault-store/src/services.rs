//! Wiring of the storage components from a loaded configuration.

use std::sync::Arc;

use tracing::info;

use mintvault_common::{BlobBackend, NullBackend, ProfileBackend};

use crate::avatar::AvatarPipeline;
use crate::config::MintvaultConfig;
use crate::local_store::LocalContentStore;
use crate::profile_index::LocalProfileIndex;
use crate::profile_store::ProfileStore;
use crate::profiles::ProfileManager;
use crate::remote::HttpBackend;
use crate::uploads::{UploadConstraints, UploadOrchestrator};

pub const UPLOADS_URL_PREFIX: &str = "/uploads";
pub const AVATARS_URL_PREFIX: &str = "/avatars";

/// Every storage service a request handler needs, built once at startup.
pub struct Mintvault {
    pub uploads: UploadOrchestrator,
    pub upload_constraints: UploadConstraints,
    pub profiles: Arc<ProfileManager>,
    pub avatars: AvatarPipeline,
}

impl Mintvault {
    pub fn from_config(config: &MintvaultConfig) -> Self {
        let http = config
            .remote
            .backend_url
            .as_deref()
            .map(|url| Arc::new(HttpBackend::new(url)));

        let blob_backend: Arc<dyn BlobBackend> = match &http {
            Some(http) if config.remote.uploads_enabled => http.clone(),
            _ => Arc::new(NullBackend),
        };
        let profile_backend: Arc<dyn ProfileBackend> = match &http {
            Some(http) => http.clone(),
            None => Arc::new(NullBackend),
        };
        match &http {
            Some(http) => info!(
                backend_url = %http.base_url(),
                uploads_enabled = config.remote.uploads_enabled,
                "Remote tier configured"
            ),
            None => info!("No backend URL configured, using local storage only"),
        }

        Self::with_backends(config, blob_backend, profile_backend)
    }

    /// Build the services around explicit remote backends.
    pub fn with_backends(
        config: &MintvaultConfig,
        blob_backend: Arc<dyn BlobBackend>,
        profile_backend: Arc<dyn ProfileBackend>,
    ) -> Self {
        let uploads = UploadOrchestrator::new(
            blob_backend,
            LocalContentStore::new(config.uploads_dir(), UPLOADS_URL_PREFIX),
            config.upload_timeout(),
        );

        let profiles = Arc::new(ProfileManager::new(ProfileStore::new(
            profile_backend,
            LocalProfileIndex::new(config.profiles_file()),
            config.profile_timeout(),
        )));

        let avatars = AvatarPipeline::new(
            LocalContentStore::new(config.avatars_dir(), AVATARS_URL_PREFIX),
            profiles.clone(),
            config.avatars.max_bytes,
        );

        Self {
            uploads,
            upload_constraints: config.upload_constraints(),
            profiles,
            avatars,
        }
    }
}
