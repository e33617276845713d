use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use mintvault_common::{Tier, UploadMetadata};

use super::{error_response, read_file_part, store_error};
use crate::state::AppState;

// ── POST /api/upload ──

pub async fn upload(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut extras = Vec::new();
    let file = match read_file_part(&mut multipart, "file", &mut extras).await {
        Ok(file) => file,
        Err(response) => return response,
    };

    let mut metadata = UploadMetadata::new(file.media_type);
    metadata.file_name = file.file_name;
    if let Some((_, raw)) = extras.iter().find(|(name, _)| name == "metadata") {
        match serde_json::from_str(raw) {
            Ok(extra) => metadata.extra = extra,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("metadata part is not valid JSON: {}", e),
                );
            }
        }
    }

    match state
        .vault
        .uploads
        .store(file.data, &metadata, &state.vault.upload_constraints)
        .await
    {
        Ok(outcome) => Json(serde_json::json!({
            "success": true,
            "rootHash": outcome.reference.hash,
            "reused": outcome.reused,
            "tier": outcome.reference.tier,
            "url": outcome.url,
            "reference": outcome.reference,
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}

// ── GET /api/content/{tier}/{hash} ──

pub async fn get_content(
    State(state): State<Arc<AppState>>,
    Path((tier, hash)): Path<(String, String)>,
) -> Response {
    let tier: Tier = match tier.parse() {
        Ok(tier) => tier,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    match state.vault.uploads.fetch_from(tier, &hash).await {
        Ok(Some(fetched)) => {
            let media_type = fetched
                .media_type
                .unwrap_or_else(|| "application/octet-stream".to_string());
            ([(header::CONTENT_TYPE, media_type)], fetched.bytes).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Content not found"),
        Err(e) => store_error(e),
    }
}
