//! Local content-addressed blob store.
//!
//! Each object is a `{sha256}.{ext}` file. Beside it sits a claim file named
//! by the bare hash that holds the object's file name. Claims and objects are
//! published with a no-replace link, so the first writer of a hash fixes its
//! extension and every later writer converges on that name, concurrent or
//! not. Looking up a hash reads its claim instead of scanning the directory.
//!
//! Payloads go to a dot-prefixed temp file and are fsynced before they are
//! linked into place, so a failed write never leaves a partial file under its
//! final name.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, warn};

use mintvault_common::{ContentHash, ContentReference, Tier};

use crate::error::{Result, StoreError};

const FALLBACK_EXTENSION: &str = "bin";
const MAX_EXTENSION_LEN: usize = 8;

/// Outcome of a `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPut {
    pub reference: ContentReference,
    /// True when an object with this hash already existed and nothing was written.
    pub reused: bool,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub media_type: String,
    pub path: PathBuf,
}

pub struct LocalContentStore {
    root: PathBuf,
    /// URL path under which the directory is served, e.g. `/uploads`.
    public_prefix: String,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the object for `hash`. Flat today; hash-prefix
    /// sharding only needs to change this function.
    fn object_dir(&self, _hash: &ContentHash) -> PathBuf {
        self.root.clone()
    }

    fn claim_path(&self, hash: &ContentHash) -> PathBuf {
        self.object_dir(hash).join(hash.as_str())
    }

    /// Public URL of a stored file name.
    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_prefix.trim_end_matches('/'), file_name)
    }

    /// Store `data`, reusing any existing object with the same hash.
    pub async fn put(
        &self,
        data: &[u8],
        media_type: &str,
        extension_hint: Option<&str>,
    ) -> Result<LocalPut> {
        let hash = ContentHash::of(data);
        let reference = ContentReference {
            hash: hash.to_string(),
            tier: Tier::Local,
            size_bytes: data.len() as u64,
            media_type: media_type.to_string(),
        };

        if let Some(existing) = self.find(&hash).await? {
            let file_name = file_name_of(&existing);
            debug!(hash = %hash, file = %file_name, "Object already exists, reusing");
            return Ok(LocalPut {
                reference,
                reused: true,
                file_name,
            });
        }

        let dir = self.object_dir(&hash);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(StoreError::io(&dir))?;

        let wanted = format!("{}.{}", hash, pick_extension(extension_hint, media_type));
        let claim_path = self.claim_path(&hash);
        let file_name = if publish_new(&claim_path, wanted.as_bytes()).await? {
            wanted
        } else {
            // Claimed by another writer; its extension wins.
            self.read_claim(&hash)
                .await?
                .ok_or_else(|| StoreError::data(&claim_path, "claim removed while storing"))?
        };

        // The claim holder may still be writing or may have crashed before
        // writing, so the object itself is also published no-replace.
        let dest = dir.join(&file_name);
        let written = publish_new(&dest, data).await?;
        if written {
            info!(hash = %hash, size = data.len(), file = %file_name, "Stored local object");
        } else {
            debug!(hash = %hash, file = %file_name, "Object written concurrently, reusing");
        }
        Ok(LocalPut {
            reference,
            reused: !written,
            file_name,
        })
    }

    /// Fetch an object by hash. `Ok(None)` when absent.
    pub async fn get(&self, hash: &str) -> Result<Option<StoredObject>> {
        let hash = ContentHash::parse(hash).map_err(|e| StoreError::Validation(e.to_string()))?;
        let Some(path) = self.find(&hash).await? else {
            return Ok(None);
        };
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            // Lost a race with an external delete.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path)(e)),
        };
        let media_type = media_type_for(&path);
        Ok(Some(StoredObject {
            bytes: Bytes::from(data),
            media_type,
            path,
        }))
    }

    pub async fn exists(&self, hash: &ContentHash) -> Result<bool> {
        Ok(self.find(hash).await?.is_some())
    }

    /// Re-hash a stored object. `Ok(None)` when the object is absent.
    pub async fn verify(&self, hash: &str) -> Result<Option<bool>> {
        let Some(object) = self.get(hash).await? else {
            return Ok(None);
        };
        let actual = ContentHash::of(&object.bytes);
        let ok = actual.as_str().eq_ignore_ascii_case(hash);
        if !ok {
            warn!(expected = %hash, actual = %actual, "Stored object failed verification");
        }
        Ok(Some(ok))
    }

    /// File name recorded by the claim for `hash`, if any.
    async fn read_claim(&self, hash: &ContentHash) -> Result<Option<String>> {
        let path = self.claim_path(hash);
        let name = match tokio::fs::read_to_string(&path).await {
            Ok(name) => name,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path)(e)),
        };
        let well_formed = name
            .strip_prefix(hash.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|ext| sanitize_extension(ext).as_deref() == Some(ext));
        if !well_formed {
            return Err(StoreError::data(&path, format!("claim names {:?}", name)));
        }
        Ok(Some(name))
    }

    /// Locate the object for `hash`. A claim whose object was never
    /// written counts as absent.
    async fn find(&self, hash: &ContentHash) -> Result<Option<PathBuf>> {
        let Some(file_name) = self.read_claim(hash).await? else {
            return Ok(None);
        };
        let path = self.object_dir(hash).join(file_name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Err(StoreError::data(&path, "object is not a regular file")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path)(e)),
        }
    }

    /// All stored object hashes, walking subdirectories so a sharded layout
    /// is still listed.
    pub async fn list(&self) -> Result<Vec<ContentHash>> {
        let mut hashes = Vec::new();
        if !self.root.exists() {
            return Ok(hashes);
        }

        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(StoreError::io(&dir))?;

            while let Some(entry) = entries.next_entry().await.map_err(StoreError::io(&dir))? {
                let path = entry.path();
                let meta = entry.metadata().await.map_err(StoreError::io(&path))?;
                if meta.is_dir() {
                    stack.push(path);
                } else if meta.is_file() {
                    let name = entry.file_name();
                    if let Some(hash) = name.to_str().and_then(object_hash) {
                        if let Ok(hash) = ContentHash::parse(hash) {
                            hashes.push(hash);
                        }
                    }
                }
            }
        }

        hashes.sort();
        Ok(hashes)
    }
}

/// Hash part of an object file name. Claims have no extension and temp files
/// start with a dot, so neither matches.
fn object_hash(file_name: &str) -> Option<&str> {
    if file_name.starts_with('.') {
        return None;
    }
    file_name.split_once('.').map(|(stem, _)| stem)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn media_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Choose the stored extension: a clean caller hint, else one derived from
/// the media type, else `bin`.
pub fn pick_extension(hint: Option<&str>, media_type: &str) -> String {
    if let Some(ext) = hint.and_then(sanitize_extension) {
        return ext;
    }
    let preferred = match media_type {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "application/json" => Some("json"),
        _ => None,
    };
    if let Some(ext) = preferred {
        return ext.to_string();
    }
    mime_guess::get_mime_extensions_str(media_type)
        .and_then(|exts| exts.first())
        .and_then(|ext| sanitize_extension(ext))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

fn sanitize_extension(ext: &str) -> Option<String> {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext)
}

/// Write `data` to a fsynced temp file beside `dest` and return its path.
async fn write_temp(dest: &Path, data: &[u8]) -> Result<PathBuf> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(".{}.{}.tmp", file_name_of(dest), uuid::Uuid::new_v4()));

    let result = async {
        tokio::fs::write(&tmp_path, data)
            .await
            .map_err(StoreError::io(&tmp_path))?;

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&tmp_path)
            .await
            .map_err(StoreError::io(&tmp_path))?;
        file.sync_all().await.map_err(StoreError::io(&tmp_path))
    }
    .await;

    match result {
        Ok(()) => Ok(tmp_path),
        Err(e) => {
            remove_temp(&tmp_path).await;
            Err(e)
        }
    }
}

async fn remove_temp(tmp_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %tmp_path.display(), error = %e, "Failed to remove temp file");
        }
    }
}

/// Write `data` to a temp file beside `dest`, fsync, then rename into place.
pub(crate) async fn write_atomic(dest: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = write_temp(dest, data).await?;
    let result = tokio::fs::rename(&tmp_path, dest)
        .await
        .map_err(StoreError::io(dest));
    if result.is_err() {
        remove_temp(&tmp_path).await;
    }
    result
}

/// Like [`write_atomic`] but never replaces an existing `dest`. Returns
/// false, writing nothing, when `dest` already exists.
async fn publish_new(dest: &Path, data: &[u8]) -> Result<bool> {
    let tmp_path = write_temp(dest, data).await?;
    let linked = match tokio::fs::hard_link(&tmp_path, dest).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StoreError::io(dest)(e)),
    };
    remove_temp(&tmp_path).await;
    linked
}
