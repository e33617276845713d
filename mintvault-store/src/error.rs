use std::path::{Path, PathBuf};

use mintvault_common::{Identity, InvalidIdentity, RemoteError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Bad size or media type. Raised before any I/O, never retried.
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    InvalidIdentity(#[from] InvalidIdentity),
    #[error("remote storage unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("remote storage rejected the request (HTTP {status}): {message}")]
    RemoteRejected { status: u16, message: String },
    /// Disk-level failure: permissions, disk full, missing directory.
    #[error("local storage I/O error at {path}: {source}", path = .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The bytes on disk exist but cannot be understood.
    #[error("corrupt local data at {path}: {reason}", path = .path.display())]
    LocalData { path: PathBuf, reason: String },
    #[error("profile not found: {0}")]
    ProfileNotFound(Identity),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Adapter for `map_err` on filesystem calls.
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
        move |source| StoreError::LocalIo {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn data(path: &Path, reason: impl ToString) -> StoreError {
        StoreError::LocalData {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_) | StoreError::InvalidIdentity(_))
    }
}

impl From<RemoteError> for StoreError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unavailable(reason) => StoreError::RemoteUnavailable(reason),
            RemoteError::Rejected { status, message } => {
                StoreError::RemoteRejected { status, message }
            }
            RemoteError::Unknown(reason) => StoreError::RemoteUnavailable(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_mapping() {
        let rejected: StoreError = RemoteError::Rejected {
            status: 400,
            message: "bad".to_string(),
        }
        .into();
        assert!(matches!(rejected, StoreError::RemoteRejected { status: 400, .. }));

        let unknown: StoreError = RemoteError::Unknown("garbled".to_string()).into();
        assert!(matches!(unknown, StoreError::RemoteUnavailable(_)));
    }

    #[test]
    fn test_io_error_names_path() {
        let err = StoreError::io(Path::new("/data/profiles.json"))(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let msg = err.to_string();
        assert!(msg.contains("/data/profiles.json"));
        assert!(msg.contains("denied"));
    }
}
