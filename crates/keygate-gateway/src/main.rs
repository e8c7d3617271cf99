//! Keygate gateway - admin API for API keys and upstream tokens.
//!
//! Configuration comes from the environment:
//!
//! - `LISTEN_ADDR` (default `0.0.0.0:8000`)
//! - `DATA_DIR` (default `data`), `STORAGE_MODE` (`file`, `sql` or `rocks`)
//! - `ADMIN_USERNAME`, `ADMIN_PASSWORD` (admin login is disabled when unset)
//! - `PROXY_URL`, `CACHE_PROXY_URL`, `CF_CLEARANCE` (global network defaults,
//!   until an admin saves new ones through `POST /settings`)
//! - `STORE_TIMEOUT_MS`, `USAGE_FLUSH_SECS`, `CORS_ORIGINS`

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keygate_gateway::{create_router, GatewayConfig, GatewayState};
use keygate_store::open_store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,keygate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting keygate gateway");

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        listen_addr = %config.server.listen_addr,
        data_dir = %config.store.data_dir.display(),
        backend = %config.store.backend,
        auth = ?config.auth,
        "Gateway configuration loaded"
    );

    if !config.auth.login_enabled() {
        tracing::warn!("No ADMIN_PASSWORD set - admin login is disabled");
    }

    let store = open_store(&config.store)?;
    let listen_addr = config.server.listen_addr.clone();
    let state = GatewayState::from_store(store, config);

    let keys = state.keys.reload().await?;
    let tokens = state.tokens.reload().await?;
    let stored_settings = state.settings.reload().await?;
    tracing::info!(keys, tokens, stored_settings, "Credentials loaded");

    let flusher = state.keys.spawn_usage_flusher();
    let key_manager = Arc::clone(&state.keys);

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    flusher.abort();
    match key_manager.flush_usage().await {
        Ok(flushed) => tracing::info!(flushed, "Final usage flush complete"),
        Err(e) => tracing::warn!(error = %e, "Final usage flush failed"),
    }

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
