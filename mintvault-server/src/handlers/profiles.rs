use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use mintvault_common::{AssetRef, Identity, ProfileRecord, ProfileUpdate, TradingStatsUpdate};
use mintvault_store::StoredProfile;

use super::{read_file_part, store_error};
use crate::state::AppState;

fn profile_json(saved: &StoredProfile) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "profile": saved.record,
        "tier": saved.tier,
        "txHash": saved.tx_hash,
    })
}

// ── GET /api/profile/{address} ──

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Response {
    match state.vault.profiles.get_profile(&address).await {
        Ok(Some(found)) => Json(serde_json::json!({
            "success": true,
            "profile": found.record,
            "tier": found.tier,
        }))
        .into_response(),
        Ok(None) => Json(serde_json::json!({ "success": true, "profile": null })).into_response(),
        Err(e) => store_error(e),
    }
}

// ── PUT /api/profile/{address} ──

/// Replace the whole record. The address in the path wins over the one in
/// the body.
pub async fn put_profile(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Json(mut record): Json<ProfileRecord>,
) -> Response {
    record.identity = match Identity::parse(&address) {
        Ok(identity) => identity,
        Err(e) => return store_error(e.into()),
    };
    match state.vault.profiles.save_profile(record).await {
        Ok(saved) => Json(profile_json(&saved)).into_response(),
        Err(e) => store_error(e),
    }
}

// ── PATCH /api/profile/{address} ──

pub async fn patch_profile(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    match state.vault.profiles.update_profile(&address, update).await {
        Ok(saved) => Json(profile_json(&saved)).into_response(),
        Err(e) => store_error(e),
    }
}

// ── DELETE /api/profile/{address} ──

pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Response {
    match state.vault.profiles.delete_profile(&address).await {
        Ok(tier) => Json(serde_json::json!({ "success": true, "tier": tier })).into_response(),
        Err(e) => store_error(e),
    }
}

// ── POST /api/profile/{address}/avatar ──

pub async fn upload_avatar(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let mut extras = Vec::new();
    let file = match read_file_part(&mut multipart, "avatar", &mut extras).await {
        Ok(file) => file,
        Err(response) => return response,
    };

    match state
        .vault
        .avatars
        .set_avatar(&address, file.data, &file.media_type, file.file_name.as_deref())
        .await
    {
        Ok(upload) => Json(serde_json::json!({
            "success": true,
            "avatarUrl": upload.url,
            "reference": upload.reference,
            "reused": upload.reused,
            "profileError": upload.profile_error.map(|e| e.to_string()),
        }))
        .into_response(),
        Err(e) => store_error(e),
    }
}

// ── POST /api/profile/{address}/tokens ──

pub async fn add_token(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Json(asset): Json<AssetRef>,
) -> Response {
    let status = asset.trading_status();
    match state.vault.profiles.add_created_token(&address, asset).await {
        Ok(saved) => {
            let mut body = profile_json(&saved);
            body["tradingStatus"] = serde_json::json!(status);
            Json(body).into_response()
        }
        Err(e) => store_error(e),
    }
}

// ── POST /api/profile/{address}/stats ──

pub async fn update_stats(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Json(update): Json<TradingStatsUpdate>,
) -> Response {
    match state.vault.profiles.update_trading_stats(&address, update).await {
        Ok(saved) => Json(profile_json(&saved)).into_response(),
        Err(e) => store_error(e),
    }
}
