pub mod profiles;
pub mod uploads;

use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use tracing::{error, warn};

use mintvault_store::StoreError;

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

fn error_json(message: &str) -> serde_json::Value {
    serde_json::json!({ "success": false, "error": message })
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(error_json(message))).into_response()
}

fn status_for(e: &StoreError) -> StatusCode {
    match e {
        StoreError::Validation(_) | StoreError::InvalidIdentity(_) => StatusCode::BAD_REQUEST,
        StoreError::ProfileNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::RemoteRejected { .. } => StatusCode::BAD_GATEWAY,
        StoreError::RemoteUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::LocalIo { .. } | StoreError::LocalData { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn store_error(e: StoreError) -> Response {
    let status = status_for(&e);
    if status.is_server_error() {
        error!(error = %e, "Storage operation failed");
    } else {
        warn!(error = %e, "Request refused");
    }
    let mut body = error_json(&e.to_string());
    if let StoreError::RemoteRejected { status: remote_status, .. } = &e {
        body["remoteStatus"] = serde_json::json!(remote_status);
    }
    (status, Json(body)).into_response()
}

/// A file part pulled out of a multipart form.
pub(crate) struct FilePart {
    pub data: Bytes,
    pub file_name: Option<String>,
    pub media_type: String,
}

/// Read the form until the file part called `name`. Other parts are
/// collected into `extras` as text, keyed by field name.
pub(crate) async fn read_file_part(
    multipart: &mut Multipart,
    name: &str,
    extras: &mut Vec<(String, String)>,
) -> Result<FilePart, Response> {
    let mut found = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(error_response(StatusCode::BAD_REQUEST, &e.body_text()));
            }
        };
        let field_name = field.name().unwrap_or("").to_string();
        if field_name == name && found.is_none() {
            let file_name = field.file_name().map(|s| s.to_string());
            let media_type = field
                .content_type()
                .unwrap_or(DEFAULT_MEDIA_TYPE)
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.body_text()))?;
            found = Some(FilePart {
                data,
                file_name,
                media_type,
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.body_text()))?;
            extras.push((field_name, text));
        }
    }
    found.ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "No file provided"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use mintvault_common::Identity;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&StoreError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&StoreError::ProfileNotFound(Identity::parse("0xaa").unwrap())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&StoreError::RemoteRejected { status: 413, message: "big".into() }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&StoreError::LocalData { path: PathBuf::from("p"), reason: "r".into() }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
