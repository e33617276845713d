//! Upload orchestration across the remote and local tiers.
//!
//! Tier 1: remote backend (bounded by the upload timeout)
//! Tier 2: local content store, taken only when tier 1 is unavailable
//!
//! Validation happens before either tier is touched. A `Rejected` answer
//! from the remote means the payload is bad, not the tier, so it is
//! surfaced and the local tier is never tried.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use mintvault_common::{
    BlobBackend, ContentHash, ContentReference, RemoteError, Tier, UploadMetadata,
};

use crate::error::{Result, StoreError};
use crate::local_store::LocalContentStore;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Limits enforced before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConstraints {
    pub max_bytes: u64,
    pub allowed_media_types: Vec<String>,
}

impl UploadConstraints {
    /// Constraints for JSON documents of at most `max_bytes`.
    pub fn json(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            allowed_media_types: vec![JSON_MEDIA_TYPE.to_string()],
        }
    }

    pub fn check(&self, size: u64, media_type: &str) -> Result<()> {
        if size > self.max_bytes {
            return Err(StoreError::Validation(format!(
                "payload of {} bytes exceeds the {} byte limit",
                size, self.max_bytes
            )));
        }
        if !self
            .allowed_media_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(media_type))
        {
            return Err(StoreError::Validation(format!(
                "media type {:?} is not allowed (expected one of: {})",
                media_type,
                self.allowed_media_types.join(", ")
            )));
        }
        Ok(())
    }
}

/// Result of storing a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    pub reference: ContentReference,
    pub reused: bool,
    /// Public URL for local objects. Remote objects are fetched by hash.
    pub url: Option<String>,
}

/// Content fetched back through a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub bytes: Bytes,
    pub media_type: Option<String>,
    /// On-disk location of local content.
    pub path: Option<PathBuf>,
}

pub struct UploadOrchestrator {
    remote: Arc<dyn BlobBackend>,
    local: LocalContentStore,
    timeout: Duration,
}

impl UploadOrchestrator {
    pub fn new(remote: Arc<dyn BlobBackend>, local: LocalContentStore, timeout: Duration) -> Self {
        Self {
            remote,
            local,
            timeout,
        }
    }

    pub fn local(&self) -> &LocalContentStore {
        &self.local
    }

    /// Store a payload and return a tier-tagged reference to it.
    pub async fn store(
        &self,
        data: Bytes,
        metadata: &UploadMetadata,
        constraints: &UploadConstraints,
    ) -> Result<StoreOutcome> {
        constraints.check(data.len() as u64, &metadata.media_type)?;

        let size = data.len() as u64;
        match self.remote.upload(data.clone(), metadata, self.timeout).await {
            Ok(upload) => {
                info!(root_hash = %upload.root_hash, size, reused = upload.reused, "Stored on remote tier");
                return Ok(StoreOutcome {
                    reference: ContentReference {
                        hash: upload.root_hash,
                        tier: Tier::Remote,
                        size_bytes: size,
                        media_type: metadata.media_type.clone(),
                    },
                    reused: upload.reused,
                    url: None,
                });
            }
            Err(RemoteError::Rejected { status, message }) => {
                warn!(status, message = %message, "Remote rejected upload");
                return Err(StoreError::RemoteRejected { status, message });
            }
            Err(e) => {
                info!(error = %e, "Remote upload not available, using local storage");
            }
        }

        let put = self
            .local
            .put(&data, &metadata.media_type, metadata.extension())
            .await?;
        let url = self.local.url_for(&put.file_name);
        Ok(StoreOutcome {
            reference: put.reference,
            reused: put.reused,
            url: Some(url),
        })
    }

    /// Serialize `value` as JSON and store it.
    pub async fn store_json<T: Serialize>(&self, value: &T, max_bytes: u64) -> Result<StoreOutcome> {
        let body = serde_json::to_vec(value)
            .map_err(|e| StoreError::Validation(format!("value is not serializable: {}", e)))?;
        let metadata = UploadMetadata::new(JSON_MEDIA_TYPE).with_file_name("data.json");
        self.store(Bytes::from(body), &metadata, &UploadConstraints::json(max_bytes))
            .await
    }

    /// Fetch content from the tier its reference names. `Ok(None)` when the
    /// tier answers but does not hold it.
    pub async fn fetch(&self, reference: &ContentReference) -> Result<Option<Fetched>> {
        self.fetch_from(reference.tier, &reference.hash).await
    }

    /// Fetch by tier and hash alone, for callers that only hold the parts of
    /// a reference (e.g. a URL path).
    pub async fn fetch_from(&self, tier: Tier, hash: &str) -> Result<Option<Fetched>> {
        match tier {
            Tier::Local => Ok(self.local.get(hash).await?.map(|object| Fetched {
                bytes: object.bytes,
                media_type: Some(object.media_type),
                path: Some(object.path),
            })),
            Tier::Remote => match self.remote.download(hash, self.timeout).await {
                Ok(downloaded) => Ok(Some(Fetched {
                    bytes: downloaded.bytes,
                    media_type: downloaded.media_type,
                    path: None,
                })),
                Err(RemoteError::Rejected { status: 404, .. }) => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Fetch and decode a JSON document. Undecodable local content is a
    /// local data error against the stored file.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        reference: &ContentReference,
    ) -> Result<Option<T>> {
        let Some(fetched) = self.fetch(reference).await? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&fetched.bytes).map_err(|e| match &fetched.path {
            Some(path) => StoreError::data(path, format!("not valid JSON: {}", e)),
            None => StoreError::Validation(format!(
                "content {} is not valid JSON: {}",
                reference.hash, e
            )),
        })?;
        Ok(Some(value))
    }

    /// Check that the stored bytes still hash to the reference. Remote root
    /// hashes that are not SHA-256 digests cannot be checked and report false.
    pub async fn verify(&self, reference: &ContentReference) -> Result<bool> {
        let Ok(expected) = ContentHash::parse(&reference.hash) else {
            debug!(hash = %reference.hash, "Reference hash is not a SHA-256 digest");
            return Ok(false);
        };
        let Some(fetched) = self.fetch(reference).await? else {
            return Ok(false);
        };
        Ok(ContentHash::of(&fetched.bytes) == expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use mintvault_common::{Downloaded, NullBackend, RemoteUpload};

    /// In-process remote that answers with a fixed behaviour and counts calls.
    struct ScriptedRemote {
        answer: std::result::Result<RemoteUpload, RemoteError>,
        calls: AtomicUsize,
    }

    impl ScriptedRemote {
        fn new(answer: std::result::Result<RemoteUpload, RemoteError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BlobBackend for ScriptedRemote {
        async fn upload(
            &self,
            _data: Bytes,
            _metadata: &UploadMetadata,
            _timeout: Duration,
        ) -> std::result::Result<RemoteUpload, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }

        async fn download(
            &self,
            hash: &str,
            _timeout: Duration,
        ) -> std::result::Result<Downloaded, RemoteError> {
            if hash == "0xroot" {
                Ok(Downloaded {
                    bytes: Bytes::from_static(b"abc"),
                    media_type: Some("image/png".to_string()),
                })
            } else {
                Err(RemoteError::Rejected {
                    status: 404,
                    message: "not found".to_string(),
                })
            }
        }
    }

    fn constraints() -> UploadConstraints {
        UploadConstraints {
            max_bytes: 1024,
            allowed_media_types: vec!["image/png".to_string(), "image/jpeg".to_string()],
        }
    }

    fn orchestrator(
        remote: Arc<dyn BlobBackend>,
        dir: &tempfile::TempDir,
    ) -> UploadOrchestrator {
        UploadOrchestrator::new(
            remote,
            LocalContentStore::new(dir.path().join("uploads"), "/uploads"),
            Duration::from_secs(1),
        )
    }

    fn png() -> UploadMetadata {
        UploadMetadata::new("image/png").with_file_name("coin.png")
    }

    async fn local_objects(dir: &tempfile::TempDir) -> usize {
        let store = LocalContentStore::new(dir.path().join("uploads"), "/uploads");
        store.list().await.unwrap().len()
    }

    #[tokio::test]
    async fn test_remote_success_is_returned_directly() {
        let dir = tempfile::tempdir().unwrap();
        let remote = ScriptedRemote::new(Ok(RemoteUpload {
            root_hash: "0xroot".to_string(),
            reused: false,
        }));
        let orch = orchestrator(remote.clone(), &dir);

        let outcome = orch.store(Bytes::from_static(b"abc"), &png(), &constraints()).await.unwrap();
        assert_eq!(outcome.reference.tier, Tier::Remote);
        assert_eq!(outcome.reference.hash, "0xroot");
        assert_eq!(outcome.reference.size_bytes, 3);
        assert!(outcome.url.is_none());
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        // No cross-tier copy.
        assert_eq!(local_objects(&dir).await, 0);
    }

    #[tokio::test]
    async fn test_unavailable_falls_back_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let remote = ScriptedRemote::new(Err(RemoteError::Unavailable("down".to_string())));
        let orch = orchestrator(remote.clone(), &dir);

        let first = orch.store(Bytes::from_static(b"abc"), &png(), &constraints()).await.unwrap();
        let second = orch.store(Bytes::from_static(b"abc"), &png(), &constraints()).await.unwrap();

        assert_eq!(first.reference.tier, Tier::Local);
        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.reference, second.reference);
        assert_eq!(first.reference.hash, ContentHash::of(b"abc").to_string());
        assert_eq!(
            first.url.as_deref(),
            Some(format!("/uploads/{}.png", first.reference.hash).as_str())
        );
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
        assert_eq!(local_objects(&dir).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let remote = ScriptedRemote::new(Err(RemoteError::Unknown("garbled".to_string())));
        let orch = orchestrator(remote, &dir);
        let outcome = orch.store(Bytes::from_static(b"abc"), &png(), &constraints()).await.unwrap();
        assert_eq!(outcome.reference.tier, Tier::Local);
    }

    #[tokio::test]
    async fn test_rejected_is_surfaced_without_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let remote = ScriptedRemote::new(Err(RemoteError::Rejected {
            status: 400,
            message: "bad image".to_string(),
        }));
        let orch = orchestrator(remote, &dir);

        let err = orch
            .store(Bytes::from_static(b"abc"), &png(), &constraints())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RemoteRejected { status: 400, .. }));
        assert_eq!(local_objects(&dir).await, 0);
    }

    #[tokio::test]
    async fn test_validation_precedes_io() {
        let dir = tempfile::tempdir().unwrap();
        let remote = ScriptedRemote::new(Err(RemoteError::Unavailable("down".to_string())));
        let orch = orchestrator(remote.clone(), &dir);

        let too_big = Bytes::from(vec![0u8; 2048]);
        let err = orch.store(too_big, &png(), &constraints()).await.unwrap_err();
        assert!(err.is_validation());

        let pdf = UploadMetadata::new("application/pdf");
        let err = orch.store(Bytes::from_static(b"%PDF"), &pdf, &constraints()).await.unwrap_err();
        assert!(err.is_validation());

        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn test_store_json_and_fetch_back() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(NullBackend), &dir);

        let doc = serde_json::json!({ "name": "Coin", "symbol": "CN" });
        let outcome = orch.store_json(&doc, 4096).await.unwrap();
        assert_eq!(outcome.reference.media_type, "application/json");
        assert!(outcome.url.unwrap().ends_with(".json"));

        let back: serde_json::Value = orch.fetch_json(&outcome.reference).await.unwrap().unwrap();
        assert_eq!(back, doc);
        assert!(orch.verify(&outcome.reference).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_json_of_non_json_local_content_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(NullBackend), &dir);

        let metadata = UploadMetadata::new("application/json").with_file_name("doc.json");
        let outcome = orch
            .store(Bytes::from_static(b"{not json"), &metadata, &UploadConstraints::json(4096))
            .await
            .unwrap();
        assert_eq!(outcome.reference.tier, Tier::Local);

        let err = orch
            .fetch_json::<serde_json::Value>(&outcome.reference)
            .await
            .unwrap_err();
        match err {
            StoreError::LocalData { path, .. } => {
                let expected = format!("{}.json", outcome.reference.hash);
                assert_eq!(path, dir.path().join("uploads").join(expected));
            }
            other => panic!("expected local data error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_routes_by_tier() {
        let dir = tempfile::tempdir().unwrap();
        let remote = ScriptedRemote::new(Err(RemoteError::Unavailable("down".to_string())));
        let orch = orchestrator(remote, &dir);

        let remote_ref = ContentReference {
            hash: "0xroot".to_string(),
            tier: Tier::Remote,
            size_bytes: 3,
            media_type: "image/png".to_string(),
        };
        let fetched = orch.fetch(&remote_ref).await.unwrap().unwrap();
        assert_eq!(&fetched.bytes[..], b"abc");

        let missing_remote = ContentReference {
            hash: "0xgone".to_string(),
            ..remote_ref.clone()
        };
        assert!(orch.fetch(&missing_remote).await.unwrap().is_none());

        let missing_local = ContentReference {
            hash: ContentHash::of(b"nothing").to_string(),
            tier: Tier::Local,
            ..remote_ref
        };
        assert!(orch.fetch(&missing_local).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_non_sha_remote_hash() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::new(NullBackend), &dir);
        let reference = ContentReference {
            hash: "0xroot".to_string(),
            tier: Tier::Remote,
            size_bytes: 3,
            media_type: "image/png".to_string(),
        };
        assert!(!orch.verify(&reference).await.unwrap());
    }

    #[test]
    fn test_constraints_media_type_case_insensitive() {
        assert!(constraints().check(10, "IMAGE/PNG").is_ok());
        assert!(constraints().check(1024, "image/png").is_ok());
        assert!(constraints().check(1025, "image/png").is_err());
    }
}
