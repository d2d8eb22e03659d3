mod auth;
mod config;
mod credentials;
mod error;
mod handlers;
mod routes;
mod state;
mod store;
mod vfs;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::ServerConfig;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    info!("bucketfs-server starting");

    let config_path = std::env::var("BUCKETFS_CONFIG").ok().map(PathBuf::from);
    let settings = ServerConfig::load(config_path.as_deref())?;
    info!(
        backend = ?settings.backend,
        region = %settings.region,
        endpoint = %settings.store.url,
        "Configuration loaded"
    );

    if settings.api_token.is_none() {
        warn!("BUCKETFS_API_TOKEN is not set; every request will be admitted");
    }

    let addr: SocketAddr = format!("{}:{}", settings.bind, settings.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", settings.bind, settings.port))?;

    let provider = store::from_config(&settings);
    let state = Arc::new(AppState::new(settings, provider));
    info!(path = %state.profile_path.display(), "Credential profile location");

    if credentials::check_authenticated(&state).await {
        info!("Object store credentials verified");
    } else {
        warn!("No working object store credentials yet; POST /auth to configure them");
    }

    let app = routes::build_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("bucketfs-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
