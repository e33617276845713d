use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::uploads::UploadConstraints;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PROFILE_TIMEOUT_MS: u64 = 4_000;
const DEFAULT_UPLOAD_MAX_BYTES: u64 = 10 * 1024 * 1024;
/// Fixed ceiling for avatar images.
pub const AVATAR_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, Deserialize)]
pub struct MintvaultConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub uploads_dir: Option<PathBuf>,
    #[serde(default)]
    pub avatars_dir: Option<PathBuf>,
    #[serde(default)]
    pub profiles_file: Option<PathBuf>,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub avatars: AvatarsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the backend service. `None` disables the remote tier.
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default = "default_true")]
    pub uploads_enabled: bool,
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
    #[serde(default = "default_profile_timeout_ms")]
    pub profile_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_upload_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_allowed_media_types")]
    pub allowed_media_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvatarsConfig {
    #[serde(default = "default_avatar_max_bytes")]
    pub max_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}
fn default_true() -> bool {
    true
}
fn default_upload_timeout_ms() -> u64 {
    DEFAULT_UPLOAD_TIMEOUT_MS
}
fn default_profile_timeout_ms() -> u64 {
    DEFAULT_PROFILE_TIMEOUT_MS
}
fn default_upload_max_bytes() -> u64 {
    DEFAULT_UPLOAD_MAX_BYTES
}
fn default_avatar_max_bytes() -> u64 {
    AVATAR_MAX_BYTES
}
fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}
fn default_allowed_media_types() -> Vec<String> {
    ["image/png", "image/jpeg", "image/jpg", "image/gif", "image/webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            uploads_enabled: true,
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
            profile_timeout_ms: DEFAULT_PROFILE_TIMEOUT_MS,
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
            allowed_media_types: default_allowed_media_types(),
        }
    }
}

impl Default for AvatarsConfig {
    fn default() -> Self {
        Self { max_bytes: AVATAR_MAX_BYTES }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: default_listen_addr() }
    }
}

impl Default for MintvaultConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            uploads_dir: None,
            avatars_dir: None,
            profiles_file: None,
            remote: RemoteConfig::default(),
            uploads: UploadsConfig::default(),
            avatars: AvatarsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl MintvaultConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let mut config: MintvaultConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults. Environment
    /// overrides apply either way.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("MINTVAULT_BACKEND_URL") {
            self.remote.backend_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Ok(dir) = std::env::var("MINTVAULT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(url) = &self.remote.backend_url {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| anyhow::anyhow!("backend_url is not a valid URL ({}): {}", url, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                anyhow::bail!("backend_url must be http or https: {}", url);
            }
        }
        if self.remote.upload_timeout_ms == 0 || self.remote.profile_timeout_ms == 0 {
            anyhow::bail!("remote timeouts must be greater than zero");
        }
        if self.uploads.max_bytes == 0 {
            anyhow::bail!("uploads.max_bytes must be greater than zero");
        }
        if self.uploads.allowed_media_types.is_empty() {
            anyhow::bail!("uploads.allowed_media_types must contain at least one type");
        }
        if self.avatars.max_bytes == 0 || self.avatars.max_bytes > AVATAR_MAX_BYTES {
            anyhow::bail!(
                "avatars.max_bytes must be between 1 and {} bytes",
                AVATAR_MAX_BYTES
            );
        }
        Ok(())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.uploads_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }

    pub fn avatars_dir(&self) -> PathBuf {
        self.avatars_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("avatars"))
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.profiles_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("profiles.json"))
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.upload_timeout_ms)
    }

    pub fn profile_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.profile_timeout_ms)
    }

    pub fn upload_constraints(&self) -> UploadConstraints {
        UploadConstraints {
            max_bytes: self.uploads.max_bytes,
            allowed_media_types: self.uploads.allowed_media_types.clone(),
        }
    }
}
