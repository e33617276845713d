mod handlers;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mintvault_store::MintvaultConfig;
use state::AppState;

const DEFAULT_CONFIG_PATH: &str = "mintvault.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    info!("mintvault-server starting");

    let config_path = PathBuf::from(
        std::env::var("MINTVAULT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    );
    let config = MintvaultConfig::load_or_default(&config_path)?;
    info!(
        data_dir = %config.data_dir.display(),
        backend_url = config.remote.backend_url.as_deref().unwrap_or("<none>"),
        "Configuration loaded"
    );

    let state = Arc::new(AppState::new(&config));
    for dir in [&state.uploads_dir, &state.avatars_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let app = routes::build_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
