use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;

use crate::handlers::{profiles, uploads};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Content
        .route("/api/upload", post(uploads::upload))
        .route("/api/content/{tier}/{hash}", get(uploads::get_content))
        // Profiles
        .route(
            "/api/profile/{address}",
            get(profiles::get_profile)
                .put(profiles::put_profile)
                .patch(profiles::patch_profile)
                .delete(profiles::delete_profile),
        )
        .route("/api/profile/{address}/avatar", post(profiles::upload_avatar))
        .route("/api/profile/{address}/tokens", post(profiles::add_token))
        .route("/api/profile/{address}/stats", post(profiles::update_stats))
        .layer(DefaultBodyLimit::max(state.body_limit));

    Router::new()
        .merge(api_routes)
        .nest_service("/uploads", ServeDir::new(&state.uploads_dir))
        .nest_service("/avatars", ServeDir::new(&state.avatars_dir))
        .with_state(state)
}
