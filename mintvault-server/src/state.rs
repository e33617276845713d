use std::path::PathBuf;

use mintvault_store::{Mintvault, MintvaultConfig};

/// Shared application state
pub struct AppState {
    pub vault: Mintvault,
    pub uploads_dir: PathBuf,
    pub avatars_dir: PathBuf,
    /// Largest request body accepted, sized for the biggest allowed upload.
    pub body_limit: usize,
}

// Room for multipart framing and the metadata part around the file.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

impl AppState {
    pub fn new(config: &MintvaultConfig) -> Self {
        let largest = config.uploads.max_bytes.max(config.avatars.max_bytes);
        Self {
            vault: Mintvault::from_config(config),
            uploads_dir: config.uploads_dir(),
            avatars_dir: config.avatars_dir(),
            body_limit: usize::try_from(largest + MULTIPART_OVERHEAD).unwrap_or(usize::MAX),
        }
    }
}
