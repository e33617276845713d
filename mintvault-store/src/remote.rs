//! HTTP client for the remote backend service.
//!
//! Endpoints: `POST /upload`, `GET /download/{hash}`, and
//! `GET|PUT|DELETE /profile/{identity}`. Every call is wrapped in
//! `tokio::time::timeout`; when it fires the request future is dropped, which
//! cancels the in-flight request.
//!
//! Classification: connect failures, timeouts and 5xx are `Unavailable`;
//! 4xx is `Rejected`; a 2xx body that cannot be understood is `Unknown`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use mintvault_common::{
    BlobBackend, Downloaded, Identity, ProfileBackend, ProfileRecord, RemoteAck, RemoteError,
    RemoteUpload, UploadMetadata,
};

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    root_hash: Option<String>,
    #[serde(default)]
    reused: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetProfileResponse {
    #[serde(default)]
    success: bool,
    profile: Option<ProfileRecord>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteResponse {
    #[serde(default)]
    success: bool,
    tx_hash: Option<String>,
    error: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn profile_url(&self, identity: &Identity) -> String {
        format!(
            "{}/profile/{}",
            self.base_url,
            urlencoding::encode(identity.as_str())
        )
    }

    /// URL a client can use to fetch remote content directly.
    pub fn download_url(&self, hash: &str) -> String {
        format!("{}/download/{}", self.base_url, urlencoding::encode(hash))
    }
}

/// Run `fut` under `timeout`. Expiry drops (and so cancels) the request.
async fn bounded<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Unavailable(format!(
            "{} timed out after {} ms",
            what,
            timeout.as_millis()
        ))),
    }
}

fn send_error(e: reqwest::Error) -> RemoteError {
    if e.is_builder() {
        RemoteError::Unknown(e.to_string())
    } else {
        RemoteError::Unavailable(e.to_string())
    }
}

fn body_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Unavailable(e.to_string())
    } else {
        RemoteError::Unknown(e.to_string())
    }
}

/// Map a non-success status to its error class, pulling a message out of
/// the body when the server sent one.
async fn check_status(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);

    if status.is_client_error() {
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        })
    } else {
        Err(RemoteError::Unavailable(format!("HTTP {} - {}", status, message)))
    }
}

impl HttpBackend {
    async fn send_upload(
        &self,
        form: multipart::Form,
        size: usize,
    ) -> Result<RemoteUpload, RemoteError> {
        let url = format!("{}/upload", self.base_url);
        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(send_error)?;
        let resp = check_status(resp).await?;
        let body: UploadResponse = resp.json().await.map_err(body_error)?;

        match body.root_hash {
            Some(root_hash) if body.success && !root_hash.is_empty() => {
                debug!(root_hash = %root_hash, size, reused = body.reused, "Remote upload complete");
                Ok(RemoteUpload {
                    root_hash,
                    reused: body.reused,
                })
            }
            _ => Err(RemoteError::Unknown(format!(
                "upload not acknowledged: {}",
                body.error.unwrap_or_else(|| "missing rootHash".to_string())
            ))),
        }
    }

    async fn fetch_download(&self, hash: &str) -> Result<Downloaded, RemoteError> {
        let resp = self
            .client
            .get(self.download_url(hash))
            .send()
            .await
            .map_err(send_error)?;
        let resp = check_status(resp).await?;
        let media_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await.map_err(body_error)?;
        debug!(hash = %hash, size = bytes.len(), "Remote download complete");
        Ok(Downloaded { bytes, media_type })
    }

    async fn fetch_profile(&self, identity: &Identity) -> Result<Option<ProfileRecord>, RemoteError> {
        let resp = self
            .client
            .get(self.profile_url(identity))
            .send()
            .await
            .map_err(send_error)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp).await?;
        let body: GetProfileResponse = resp.json().await.map_err(body_error)?;
        if !body.success {
            return Err(RemoteError::Unknown(
                body.error.unwrap_or_else(|| "profile lookup failed".to_string()),
            ));
        }
        Ok(body.profile)
    }

    async fn send_profile(&self, record: &ProfileRecord) -> Result<RemoteAck, RemoteError> {
        let resp = self
            .client
            .put(self.profile_url(&record.identity))
            .json(record)
            .send()
            .await
            .map_err(send_error)?;
        let body = write_response(resp, "profile save failed").await?;
        Ok(RemoteAck { tx_hash: body.tx_hash })
    }

    async fn send_delete(&self, identity: &Identity) -> Result<(), RemoteError> {
        let resp = self
            .client
            .delete(self.profile_url(identity))
            .send()
            .await
            .map_err(send_error)?;
        write_response(resp, "profile delete failed").await?;
        Ok(())
    }
}

async fn write_response(resp: Response, failure: &str) -> Result<WriteResponse, RemoteError> {
    let resp = check_status(resp).await?;
    let body: WriteResponse = resp.json().await.map_err(body_error)?;
    if !body.success {
        return Err(RemoteError::Unknown(
            body.error.clone().unwrap_or_else(|| failure.to_string()),
        ));
    }
    Ok(body)
}

#[async_trait]
impl BlobBackend for HttpBackend {
    async fn upload(
        &self,
        data: Bytes,
        metadata: &UploadMetadata,
        timeout: Duration,
    ) -> Result<RemoteUpload, RemoteError> {
        let size = data.len();
        let file_name = metadata
            .file_name
            .clone()
            .unwrap_or_else(|| "upload".to_string());
        let part = multipart::Part::bytes(data.to_vec())
            .file_name(file_name)
            .mime_str(&metadata.media_type)
            .map_err(|e| RemoteError::Unknown(format!("invalid media type: {}", e)))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("metadata", metadata.extra.to_string());

        bounded(timeout, "upload", self.send_upload(form, size)).await
    }

    async fn download(&self, hash: &str, timeout: Duration) -> Result<Downloaded, RemoteError> {
        bounded(timeout, "download", self.fetch_download(hash)).await
    }
}

#[async_trait]
impl ProfileBackend for HttpBackend {
    async fn get_profile(
        &self,
        identity: &Identity,
        timeout: Duration,
    ) -> Result<Option<ProfileRecord>, RemoteError> {
        bounded(timeout, "get profile", self.fetch_profile(identity)).await
    }

    async fn put_profile(
        &self,
        record: &ProfileRecord,
        timeout: Duration,
    ) -> Result<RemoteAck, RemoteError> {
        bounded(timeout, "put profile", self.send_profile(record)).await
    }

    async fn delete_profile(
        &self,
        identity: &Identity,
        timeout: Duration,
    ) -> Result<(), RemoteError> {
        bounded(timeout, "delete profile", self.send_delete(identity)).await
    }
}
