//! Seams to the remote backend service.
//!
//! The core never talks HTTP directly; it holds a `BlobBackend` and a
//! `ProfileBackend` and decides, from the classified `RemoteError`, whether to
//! fall back to the local tier. Every call carries the caller's timeout and
//! must give up once it expires.

use std::time::Duration;

use bytes::Bytes;

use crate::documents::ProfileRecord;
use crate::identity::Identity;

/// Failure classes reported by a remote backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Connection failure, timeout or server-side outage. Triggers fallback.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    /// The remote refused the request itself. Never triggers upload fallback.
    #[error("remote rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected remote response: {0}")]
    Unknown(String),
}

/// Metadata sent alongside an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadMetadata {
    pub file_name: Option<String>,
    pub media_type: String,
    pub extra: serde_json::Value,
}

impl UploadMetadata {
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            file_name: None,
            media_type: media_type.into(),
            extra: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Extension of the supplied file name, if any.
    pub fn extension(&self) -> Option<&str> {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUpload {
    pub root_hash: String,
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub bytes: Bytes,
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAck {
    pub tx_hash: Option<String>,
}

/// Remote content-addressed upload/download service.
#[async_trait::async_trait]
pub trait BlobBackend: Send + Sync {
    async fn upload(
        &self,
        data: Bytes,
        metadata: &UploadMetadata,
        timeout: Duration,
    ) -> Result<RemoteUpload, RemoteError>;

    async fn download(&self, hash: &str, timeout: Duration) -> Result<Downloaded, RemoteError>;
}

/// Remote keyed profile service.
#[async_trait::async_trait]
pub trait ProfileBackend: Send + Sync {
    /// `Ok(None)` when the remote answers but holds no record.
    async fn get_profile(
        &self,
        identity: &Identity,
        timeout: Duration,
    ) -> Result<Option<ProfileRecord>, RemoteError>;

    async fn put_profile(
        &self,
        record: &ProfileRecord,
        timeout: Duration,
    ) -> Result<RemoteAck, RemoteError>;

    async fn delete_profile(&self, identity: &Identity, timeout: Duration)
        -> Result<(), RemoteError>;
}

/// Stand-in used when no remote backend is configured. Every call reports
/// `Unavailable`, so callers always take the local tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

const NULL_REASON: &str = "no remote backend configured";

#[async_trait::async_trait]
impl BlobBackend for NullBackend {
    async fn upload(
        &self,
        _data: Bytes,
        _metadata: &UploadMetadata,
        _timeout: Duration,
    ) -> Result<RemoteUpload, RemoteError> {
        Err(RemoteError::Unavailable(NULL_REASON.to_string()))
    }

    async fn download(&self, _hash: &str, _timeout: Duration) -> Result<Downloaded, RemoteError> {
        Err(RemoteError::Unavailable(NULL_REASON.to_string()))
    }
}

#[async_trait::async_trait]
impl ProfileBackend for NullBackend {
    async fn get_profile(
        &self,
        _identity: &Identity,
        _timeout: Duration,
    ) -> Result<Option<ProfileRecord>, RemoteError> {
        Err(RemoteError::Unavailable(NULL_REASON.to_string()))
    }

    async fn put_profile(
        &self,
        _record: &ProfileRecord,
        _timeout: Duration,
    ) -> Result<RemoteAck, RemoteError> {
        Err(RemoteError::Unavailable(NULL_REASON.to_string()))
    }

    async fn delete_profile(
        &self,
        _identity: &Identity,
        _timeout: Duration,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::Unavailable(NULL_REASON.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_extension() {
        let meta = UploadMetadata::new("image/png").with_file_name("coin.logo.PNG");
        assert_eq!(meta.extension(), Some("PNG"));
        assert_eq!(UploadMetadata::new("image/png").extension(), None);
        let trailing = UploadMetadata::new("image/png").with_file_name("noext.");
        assert_eq!(trailing.extension(), None);
    }

    #[tokio::test]
    async fn test_null_backend_is_always_unavailable() {
        let backend = NullBackend;
        let timeout = Duration::from_secs(1);
        let err = backend
            .upload(Bytes::from_static(b"abc"), &UploadMetadata::new("image/png"), timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));

        let id = Identity::parse("0xab").unwrap();
        assert!(matches!(
            backend.get_profile(&id, timeout).await,
            Err(RemoteError::Unavailable(_))
        ));
    }
}
