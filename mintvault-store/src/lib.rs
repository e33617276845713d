//! Tiered content and profile storage.
//!
//! Blobs and profile records are written to a remote backend service when
//! it is reachable and to local files when it is not. See [`Mintvault`] for
//! the assembled set of services.

pub mod avatar;
pub mod config;
pub mod error;
pub mod local_store;
pub mod profile_index;
pub mod profile_store;
pub mod profiles;
pub mod remote;
pub mod services;
pub mod uploads;

pub use avatar::{AvatarPipeline, AvatarUpload};
pub use config::MintvaultConfig;
pub use error::{Result, StoreError};
pub use local_store::{LocalContentStore, LocalPut, StoredObject};
pub use profile_index::LocalProfileIndex;
pub use profile_store::{ProfileStore, StoredProfile};
pub use profiles::ProfileManager;
pub use remote::HttpBackend;
pub use services::Mintvault;
pub use uploads::{Fetched, StoreOutcome, UploadConstraints, UploadOrchestrator};
